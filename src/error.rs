//! Error types for link-import.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Failure categories reported by [`SafeFetcher::fetch`](crate::SafeFetcher::fetch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorCode {
    InvalidUrl,
    DisallowedProtocol,
    BlockedHost,
    BlockedIp,
    FetchFailed,
    Timeout,
    RedirectMissingLocation,
    HttpError,
    ContentTypeNotAllowed,
    TooLarge,
    TooManyRedirects,
}

impl FetchErrorCode {
    /// Wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorCode::InvalidUrl => "invalid_url",
            FetchErrorCode::DisallowedProtocol => "disallowed_protocol",
            FetchErrorCode::BlockedHost => "blocked_host",
            FetchErrorCode::BlockedIp => "blocked_ip",
            FetchErrorCode::FetchFailed => "fetch_failed",
            FetchErrorCode::Timeout => "timeout",
            FetchErrorCode::RedirectMissingLocation => "redirect_missing_location",
            FetchErrorCode::HttpError => "http_error",
            FetchErrorCode::ContentTypeNotAllowed => "content_type_not_allowed",
            FetchErrorCode::TooLarge => "too_large",
            FetchErrorCode::TooManyRedirects => "too_many_redirects",
        }
    }
}

impl fmt::Display for FetchErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed fetch, with everything known about the chain at the point of failure.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{code}: {message}")]
pub struct SafeFetchError {
    pub code: FetchErrorCode,
    pub message: String,

    /// URL of the hop that failed.
    pub final_url: String,

    /// HTTP status, when the failure happened after a response arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Redirect hops traversed before the failure, in order.
    pub redirects: Vec<String>,
}

impl SafeFetchError {
    pub(crate) fn new(
        code: FetchErrorCode,
        final_url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            final_url: final_url.into(),
            status: None,
            redirects: Vec::new(),
        }
    }

    pub(crate) fn blocked(final_url: impl Into<String>, blocked: &Blocked) -> Self {
        let code = match blocked {
            Blocked::Host { .. } => FetchErrorCode::BlockedHost,
            Blocked::Ip { .. } => FetchErrorCode::BlockedIp,
        };
        Self::new(code, final_url, blocked.to_string())
    }

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub(crate) fn with_redirects(mut self, redirects: &[String]) -> Self {
        self.redirects = redirects.to_vec();
        self
    }
}

/// Why the host validator refused a hostname or address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Blocked {
    /// Hostname is on a blocklist.
    #[error("hostname {host} is blocked: {reason}")]
    Host { host: String, reason: String },

    /// Address falls in a forbidden range.
    #[error("address {ip} is blocked: {reason}")]
    Ip { ip: IpAddr, reason: String },
}

impl Blocked {
    pub(crate) fn host(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Host {
            host: host.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn ip(ip: IpAddr, reason: impl Into<String>) -> Self {
        Self::Ip {
            ip,
            reason: reason.into(),
        }
    }
}

/// DNS resolution failures.
#[derive(Debug, Clone, Error)]
pub enum DnsError {
    #[error("DNS lookup for {host} failed: {message}")]
    Lookup { host: String, message: String },

    #[error("DNS lookup for {host} returned no addresses")]
    NoAddresses { host: String },
}

impl DnsError {
    pub(crate) fn lookup(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Lookup {
            host: host.into(),
            message: message.into(),
        }
    }
}

/// Failures raised by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("response body failed: {0}")]
    Body(String),

    #[error("request timed out")]
    Timeout,
}

/// Failures from the geocoding and place-search collaborators.
#[derive(Debug, Error)]
pub enum PlacesError {
    /// Built with the URL stripped, since request URLs can carry the API key.
    #[error("places request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("places API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("no geocoding result for {0}")]
    NotFound(String),

    #[error("places API key is not configured")]
    MissingApiKey,
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid blocked CIDR {0:?}")]
    Cidr(String),

    #[error("failed to set up DNS resolver: {0}")]
    Resolver(#[from] DnsError),
}
