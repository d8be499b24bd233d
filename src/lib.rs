//! # link-import
//!
//! Import places into a trip from a link someone pasted.
//!
//! Two stages:
//!
//! - [`SafeFetcher`] fetches an untrusted URL without becoming an SSRF proxy. Every
//!   redirect hop is re-validated: hostname blocklists, DNS answers checked against
//!   private and reserved ranges, and the connection pinned to the checked addresses.
//!   Bodies are capped and only text-like content types are accepted.
//! - [`CandidateResolver`] turns place mentions extracted from that content into
//!   `add_place` operations, clarification questions, or drops, using a
//!   [`Geocoder`] and a [`PlaceSearch`] such as [`GooglePlacesClient`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use link_import::{FetchConfig, FetchOptions, SafeFetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = SafeFetcher::from_config(FetchConfig::default())?;
//! let page = fetcher
//!     .fetch("https://example.com/paris-weekend", FetchOptions::default())
//!     .await?;
//! println!("{} ({} bytes)", page.final_url, page.bytes_read);
//! # Ok(())
//! # }
//! ```

mod blocklist;
mod config;
mod dns;
mod error;
mod fetch;
mod google;
mod model;
mod places;
mod resolver;
mod safe_url;
mod score;
mod transport;
mod validator;

pub use config::{FetchConfig, ImportConfig, ResolverConfig, DEFAULT_USER_AGENT};
pub use dns::{DnsResolver, SystemResolver};
pub use error::{
    Blocked, ConfigError, DnsError, FetchErrorCode, PlacesError, SafeFetchError, TransportError,
};
pub use fetch::{FetchOptions, SafeFetchResult, SafeFetcher};
pub use google::{GooglePlacesClient, API_KEY_ENV};
pub use model::{
    AddPlaceOperation, Attribution, Candidate, ClarificationOption, Destination, Operation,
    PendingClarification, ResolveOutcome,
};
pub use places::{Coordinates, Geocoder, PlaceSearch, PlaceSearchResult};
pub use resolver::{normalize_place_id, CandidateResolver, ResolveRequest};
pub use safe_url::SafeUrl;
pub use score::score;
pub use transport::{BodyStream, HopRequest, HopResponse, ReqwestTransport, Transport};
pub use validator::{HostValidator, HostValidatorBuilder};
