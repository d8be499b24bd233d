//! Host validation: the single gate every fetch hop passes through.
//!
//! [`HostValidator`] combines the built-in blocklists with any extra restrictions a
//! deployment configures through [`HostValidatorBuilder`]. Extra rules can only add
//! blocks; nothing configured here re-allows a built-in block.
//!
//! A hostname that is not an IP literal must be resolved by the caller, and every
//! resolved address passed through [`HostValidator::validate_addrs`]. One public
//! address among several forbidden ones is not enough.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::blocklist::{is_hostname_blocked, is_ip_blocked};
use crate::error::{Blocked, ConfigError};

/// Decides whether a hostname or address may be fetched.
///
/// # Example
///
/// ```rust
/// use link_import::HostValidator;
///
/// let validator = HostValidator::builder()
///     .block_host("*.corp.example.com")
///     .build();
///
/// assert!(validator.validate("example.com").is_ok());
/// assert!(validator.validate("wiki.corp.example.com").is_err());
/// assert!(validator.validate("127.0.0.1").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HostValidator {
    blocked_cidrs: Vec<IpNet>,
    blocked_hosts: Vec<String>,
}

impl HostValidator {
    /// Validator with only the built-in rules.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> HostValidatorBuilder {
        HostValidatorBuilder::default()
    }

    /// Validate a hostname or IP literal (IPv6 may be bracketed).
    ///
    /// For a hostname this only checks the name itself; resolved addresses still
    /// need [`validate_addrs`](Self::validate_addrs).
    pub fn validate(&self, host: &str) -> Result<(), Blocked> {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return self.validate_ip(ip);
        }

        let host = bare.trim_end_matches('.').to_lowercase();
        if let Some(reason) = is_hostname_blocked(&host) {
            return Err(Blocked::host(host, reason));
        }

        if let Some(pattern) = self
            .blocked_hosts
            .iter()
            .find(|pattern| matches_hostname_pattern(&host, pattern))
        {
            return Err(Blocked::host(
                host.clone(),
                format!("matches configured pattern {}", pattern),
            ));
        }

        Ok(())
    }

    /// Validate a single address.
    pub fn validate_ip(&self, ip: IpAddr) -> Result<(), Blocked> {
        if let Some(reason) = is_ip_blocked(ip) {
            return Err(Blocked::ip(ip, reason));
        }

        if let Some(cidr) = self.blocked_cidrs.iter().find(|cidr| cidr.contains(&ip)) {
            return Err(Blocked::ip(ip, format!("inside configured range {}", cidr)));
        }

        Ok(())
    }

    /// Validate every address a hostname resolved to. The first forbidden one fails
    /// the whole set; an empty set is not considered safe.
    pub fn validate_addrs(&self, host: &str, addrs: &[IpAddr]) -> Result<(), Blocked> {
        if addrs.is_empty() {
            return Err(Blocked::host(host, "resolved to no addresses"));
        }
        addrs.iter().try_for_each(|ip| self.validate_ip(*ip))
    }
}

/// Builder for a [`HostValidator`] with deployment-specific extra blocks.
#[derive(Debug, Clone, Default)]
pub struct HostValidatorBuilder {
    blocked_cidrs: Vec<IpNet>,
    blocked_hosts: Vec<String>,
}

impl HostValidatorBuilder {
    /// Block an IP range (CIDR notation). Unparseable ranges are ignored; use
    /// [`try_block_cidr`](Self::try_block_cidr) when the input comes from config.
    pub fn block_cidr(mut self, cidr: &str) -> Self {
        if let Ok(net) = cidr.parse() {
            self.blocked_cidrs.push(net);
        }
        self
    }

    /// Block an IP range, rejecting malformed input.
    pub fn try_block_cidr(mut self, cidr: &str) -> Result<Self, ConfigError> {
        let net = cidr
            .trim()
            .parse()
            .map_err(|_| ConfigError::Cidr(cidr.to_string()))?;
        self.blocked_cidrs.push(net);
        Ok(self)
    }

    /// Block a hostname or wildcard pattern such as `*.corp.example.com`.
    pub fn block_host(mut self, pattern: &str) -> Self {
        self.blocked_hosts.push(pattern.trim().to_lowercase());
        self
    }

    pub fn build(self) -> HostValidator {
        HostValidator {
            blocked_cidrs: self.blocked_cidrs,
            blocked_hosts: self.blocked_hosts,
        }
    }
}

/// Match a lowercase hostname against a pattern (supports a leading `*.`).
fn matches_hostname_pattern(host: &str, pattern: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => host == base || host.ends_with(&format!(".{}", base)),
        None => host == pattern,
    }
}
