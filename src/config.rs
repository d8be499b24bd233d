//! Tunables for fetching and candidate resolution, loadable from TOML.
//!
//! ```toml
//! [fetch]
//! timeout_ms = 8000
//! max_bytes = 1048576
//! blocked_hosts = ["*.corp.example.com"]
//!
//! [resolver]
//! max_operations = 10
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::validator::HostValidator;

pub const DEFAULT_USER_AGENT: &str = "link-import/0.1 (itinerary link preview bot)";

/// Top-level config file layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub fetch: FetchConfig,
    pub resolver: ResolverConfig,
}

impl ImportConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}

/// Limits and headers applied by [`SafeFetcher`](crate::SafeFetcher).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Budget for each hop (request plus body), not for the whole chain.
    pub timeout_ms: u64,
    pub max_bytes: u64,
    pub max_redirects: u8,
    pub user_agent: String,
    pub accept_language: String,
    /// Extra hostname patterns to refuse, e.g. `*.corp.example.com`.
    pub blocked_hosts: Vec<String>,
    /// Extra address ranges to refuse, in CIDR notation.
    pub blocked_cidrs: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_bytes: 2 * 1024 * 1024,
            max_redirects: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            blocked_hosts: Vec::new(),
            blocked_cidrs: Vec::new(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Build the host validator described by the configured extra blocks.
    pub fn host_validator(&self) -> Result<HostValidator, ConfigError> {
        let builder = self
            .blocked_hosts
            .iter()
            .fold(HostValidator::builder(), |builder, host| builder.block_host(host));

        self.blocked_cidrs
            .iter()
            .try_fold(builder, |builder, cidr| builder.try_block_cidr(cidr))
            .map(|builder| builder.build())
    }
}

/// Thresholds used by [`CandidateResolver`](crate::CandidateResolver).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub max_operations: usize,
    pub max_candidates: usize,
    /// Search results considered per candidate.
    pub max_results: usize,
    pub search_radius_m: u32,
    /// Candidates with an explicit confidence below this are dropped.
    pub min_confidence: f64,
    /// Minimum top score for auto-accepting among several results.
    pub accept_score: f64,
    /// Minimum lead of the top score over the runner-up.
    pub accept_margin: f64,
    pub max_clarifications: usize,
    /// Options listed per ambiguous candidate.
    pub max_options: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_operations: 15,
            max_candidates: 30,
            max_results: 6,
            search_radius_m: 20_000,
            min_confidence: 0.25,
            accept_score: 0.75,
            accept_margin: 0.20,
            max_clarifications: 5,
            max_options: 3,
        }
    }
}
