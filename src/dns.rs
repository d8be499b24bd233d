//! Host resolution and validation for a single fetch hop.

use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::TokioResolver;

use crate::error::{DnsError, FetchErrorCode, SafeFetchError};
use crate::safe_url::SafeUrl;
use crate::validator::HostValidator;

/// Resolves a hostname to every address it currently maps to.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, DnsError>;
}

/// [`DnsResolver`] backed by the system configuration via hickory.
pub struct SystemResolver {
    inner: TokioResolver,
}

impl SystemResolver {
    pub fn new() -> Result<Self, DnsError> {
        let inner = TokioResolver::builder_tokio()
            .map_err(|e| DnsError::lookup("system", e.to_string()))?
            .build();
        Ok(Self { inner })
    }
}

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        let response = self
            .inner
            .lookup_ip(host)
            .await
            .map_err(|e| DnsError::lookup(host, e.to_string()))?;

        let addrs: Vec<IpAddr> = response.iter().collect();
        if addrs.is_empty() {
            return Err(DnsError::NoAddresses {
                host: host.to_string(),
            });
        }
        Ok(addrs)
    }
}

/// Validate a hop's host and return the addresses the request may use.
///
/// 1. Checks the hostname against the blocklists
/// 2. Uses an IP literal directly, otherwise resolves DNS
/// 3. Requires every resolved address to pass
pub(crate) async fn validate_hop(
    url: &SafeUrl,
    resolver: &dyn DnsResolver,
    validator: &HostValidator,
) -> Result<Vec<IpAddr>, SafeFetchError> {
    validator
        .validate(url.host())
        .map_err(|blocked| SafeFetchError::blocked(url.as_str(), &blocked))?;

    let bare = url.host().trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    let addrs = resolver.lookup(url.host()).await.map_err(|e| {
        SafeFetchError::new(FetchErrorCode::FetchFailed, url.as_str(), e.to_string())
    })?;

    validator
        .validate_addrs(url.host(), &addrs)
        .map_err(|blocked| SafeFetchError::blocked(url.as_str(), &blocked))?;

    Ok(addrs)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Resolver answering from a fixed table, recording every lookup.
    #[derive(Default)]
    pub(crate) struct StaticResolver {
        table: HashMap<String, Vec<IpAddr>>,
        pub(crate) lookups: Mutex<Vec<String>>,
    }

    impl StaticResolver {
        pub(crate) fn with(mut self, host: &str, addrs: &[&str]) -> Self {
            self.table.insert(
                host.to_string(),
                addrs.iter().map(|a| a.parse().unwrap()).collect(),
            );
            self
        }
    }

    #[async_trait]
    impl DnsResolver for StaticResolver {
        async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
            self.lookups.lock().unwrap().push(host.to_string());
            self.table
                .get(host)
                .cloned()
                .ok_or_else(|| DnsError::lookup(host, "NXDOMAIN"))
        }
    }

    async fn check(url: &str, resolver: &StaticResolver) -> Result<Vec<IpAddr>, SafeFetchError> {
        let url = SafeUrl::parse(url).unwrap();
        validate_hop(&url, resolver, &HostValidator::new()).await
    }

    #[tokio::test]
    async fn test_public_host_allowed() {
        let resolver = StaticResolver::default().with("example.com", &["93.184.216.34"]);
        let addrs = check("https://example.com/", &resolver).await.unwrap();
        assert_eq!(addrs, vec!["93.184.216.34".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_ip_literal_skips_dns() {
        let resolver = StaticResolver::default();
        let addrs = check("http://93.184.216.34/", &resolver).await.unwrap();
        assert_eq!(addrs.len(), 1);
        assert!(resolver.lookups.lock().unwrap().is_empty());

        let err = check("http://[::1]/", &resolver).await.unwrap_err();
        assert_eq!(err.code, FetchErrorCode::BlockedIp);
    }

    #[tokio::test]
    async fn test_blocked_hostname_skips_dns() {
        let resolver = StaticResolver::default().with("localhost", &["127.0.0.1"]);
        let err = check("http://localhost:8080/", &resolver).await.unwrap_err();
        assert_eq!(err.code, FetchErrorCode::BlockedHost);
        assert!(resolver.lookups.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rebinding_style_answer_blocked() {
        let resolver = StaticResolver::default()
            .with("evil.example", &["93.184.216.34", "169.254.169.254"]);
        let err = check("https://evil.example/", &resolver).await.unwrap_err();
        assert_eq!(err.code, FetchErrorCode::BlockedIp);
        assert!(err.message.contains("169.254.169.254"));
    }

    #[tokio::test]
    async fn test_dns_failure_is_fetch_failed() {
        let resolver = StaticResolver::default();
        let err = check("https://missing.example/", &resolver).await.unwrap_err();
        assert_eq!(err.code, FetchErrorCode::FetchFailed);
    }
}
