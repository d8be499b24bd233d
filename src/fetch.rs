//! Fetching a user-supplied URL without becoming an SSRF proxy.
//!
//! The redirect loop is an explicit state machine. Every `Redirected` transition
//! re-enters `Validating` for the new URL, so a chain that starts on a public host
//! cannot hop onto an internal one.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::dns::{validate_hop, DnsResolver, SystemResolver};
use crate::error::{ConfigError, FetchErrorCode, SafeFetchError, TransportError};
use crate::safe_url::SafeUrl;
use crate::transport::{BodyStream, HopRequest, ReqwestTransport, Transport};
use crate::validator::HostValidator;

/// Base content types a fetched page may have.
const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "text/html",
    "text/plain",
    "application/json",
    "application/ld+json",
    "text/xml",
    "application/xml",
];

/// Per-call overrides of the configured limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub timeout_ms: Option<u64>,
    pub max_bytes: Option<u64>,
}

/// A successfully fetched page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeFetchResult {
    /// URL of the last hop, after all redirects.
    pub final_url: String,
    pub status: u16,

    /// Base content type, lowercase and without parameters.
    pub content_type: String,

    pub text: String,
    pub bytes_read: u64,

    /// Every URL that answered with a redirect, in order.
    pub redirects: Vec<String>,
}

/// Fetches URLs hop by hop, validating each host before any request is sent.
///
/// # Example
///
/// ```rust,no_run
/// use link_import::{FetchConfig, FetchOptions, SafeFetcher};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = SafeFetcher::from_config(FetchConfig::default())?;
/// match fetcher.fetch("https://example.com/trip", FetchOptions::default()).await {
///     Ok(page) => println!("{} bytes from {}", page.bytes_read, page.final_url),
///     Err(e) => println!("refused: {} ({})", e.code, e.message),
/// }
/// # Ok(())
/// # }
/// ```
pub struct SafeFetcher {
    transport: Box<dyn Transport>,
    resolver: Box<dyn DnsResolver>,
    validator: HostValidator,
    config: FetchConfig,
}

impl fmt::Debug for SafeFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeFetcher")
            .field("validator", &self.validator)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Where a fetch is in its hop loop.
#[derive(Debug)]
enum HopState {
    Validating(SafeUrl),
    Fetching {
        url: SafeUrl,
        addrs: Vec<IpAddr>,
        deadline: Instant,
    },
    Redirected { from: SafeUrl, location: String },
    Done(SafeFetchResult),
    Failed(SafeFetchError),
}

/// What a single hop produced.
enum HopOutcome {
    Redirect(String),
    Page {
        status: u16,
        content_type: String,
        body: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    timeout: Duration,
    max_bytes: u64,
}

impl SafeFetcher {
    /// Fetcher with explicit collaborators.
    pub fn new(
        config: FetchConfig,
        transport: impl Transport + 'static,
        resolver: impl DnsResolver + 'static,
    ) -> Result<Self, ConfigError> {
        let validator = config.host_validator()?;
        Ok(Self {
            transport: Box::new(transport),
            resolver: Box::new(resolver),
            validator,
            config,
        })
    }

    /// Fetcher over reqwest and the system DNS configuration.
    pub fn from_config(config: FetchConfig) -> Result<Self, ConfigError> {
        Self::new(config, ReqwestTransport::new(), SystemResolver::new()?)
    }

    /// Fetch `url`, following at most `max_redirects` redirects.
    ///
    /// Every failure comes back as a [`SafeFetchError`] carrying the hops followed
    /// so far; nothing here panics on hostile input.
    pub async fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<SafeFetchResult, SafeFetchError> {
        let limits = Limits {
            timeout: options
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| self.config.timeout()),
            max_bytes: options.max_bytes.unwrap_or(self.config.max_bytes),
        };

        let mut redirects: Vec<String> = Vec::new();
        let mut attempts: u32 = 0;
        let mut state = HopState::Validating(SafeUrl::parse(url)?);

        loop {
            state = match state {
                HopState::Validating(url) => {
                    // The hop budget starts here, so a slow DNS answer counts against it
                    let deadline = Instant::now() + limits.timeout;
                    let validated = timeout_at(
                        deadline,
                        validate_hop(&url, self.resolver.as_ref(), &self.validator),
                    )
                    .await
                    .unwrap_or_else(|_| Err(timeout_error(&url, limits)));

                    match validated {
                        Ok(addrs) => {
                            debug!(url = %url.as_str(), ?addrs, "hop validated");
                            HopState::Fetching {
                                url,
                                addrs,
                                deadline,
                            }
                        }
                        Err(e) => {
                            warn!(url = %url.as_str(), code = %e.code, reason = %e.message, "hop rejected");
                            HopState::Failed(e)
                        }
                    }
                }
                HopState::Fetching {
                    url,
                    addrs,
                    deadline,
                } => {
                    attempts += 1;
                    match self.fetch_hop(&url, &addrs, limits, deadline).await {
                        Ok(HopOutcome::Redirect(location)) => HopState::Redirected {
                            from: url,
                            location,
                        },
                        Ok(HopOutcome::Page {
                            status,
                            content_type,
                            body,
                        }) => HopState::Done(SafeFetchResult {
                            final_url: url.as_str().to_string(),
                            status,
                            content_type,
                            bytes_read: body.len() as u64,
                            text: String::from_utf8_lossy(&body).into_owned(),
                            redirects: std::mem::take(&mut redirects),
                        }),
                        Err(e) => HopState::Failed(e),
                    }
                }
                HopState::Redirected { from, location } => {
                    redirects.push(from.as_str().to_string());
                    if attempts > u32::from(self.config.max_redirects) {
                        HopState::Failed(SafeFetchError::new(
                            FetchErrorCode::TooManyRedirects,
                            from.as_str(),
                            format!("more than {} redirects", self.config.max_redirects),
                        ))
                    } else {
                        match from.join(&location) {
                            Ok(next) => {
                                debug!(from = %from.as_str(), to = %next.as_str(), "following redirect");
                                HopState::Validating(next)
                            }
                            Err(e) => HopState::Failed(e),
                        }
                    }
                }
                HopState::Done(result) => {
                    info!(
                        url = %result.final_url,
                        bytes = result.bytes_read,
                        redirects = result.redirects.len(),
                        "fetch complete"
                    );
                    return Ok(result);
                }
                HopState::Failed(e) => return Err(e.with_redirects(&redirects)),
            };
        }
    }

    /// One GET against already-validated addresses. `deadline` covers DNS, the
    /// request and the body together, and restarts for every hop.
    async fn fetch_hop(
        &self,
        url: &SafeUrl,
        addrs: &[IpAddr],
        limits: Limits,
        deadline: Instant,
    ) -> Result<HopOutcome, SafeFetchError> {
        let request = HopRequest {
            url,
            addrs,
            user_agent: &self.config.user_agent,
            accept_language: &self.config.accept_language,
        };

        let response = match timeout_at(deadline, self.transport.get(request)).await {
            Err(_) | Ok(Err(TransportError::Timeout)) => return Err(timeout_error(url, limits)),
            Ok(Err(e)) => {
                return Err(SafeFetchError::new(
                    FetchErrorCode::FetchFailed,
                    url.as_str(),
                    e.to_string(),
                ))
            }
            Ok(Ok(response)) => response,
        };
        let status = response.status;

        if matches!(status, 301 | 302 | 303 | 307 | 308) {
            return match header_str(&response.headers, LOCATION) {
                Some(location) if !location.trim().is_empty() => {
                    Ok(HopOutcome::Redirect(location.to_string()))
                }
                _ => Err(SafeFetchError::new(
                    FetchErrorCode::RedirectMissingLocation,
                    url.as_str(),
                    format!("redirect status {} without Location header", status),
                )
                .with_status(status)),
            };
        }

        if !(200..300).contains(&status) {
            return Err(SafeFetchError::new(
                FetchErrorCode::HttpError,
                url.as_str(),
                format!("server answered with status {}", status),
            )
            .with_status(status));
        }

        let content_type = base_content_type(&response.headers);
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            let shown = if content_type.is_empty() {
                "(none)"
            } else {
                content_type.as_str()
            };
            return Err(SafeFetchError::new(
                FetchErrorCode::ContentTypeNotAllowed,
                url.as_str(),
                format!("content type {} is not allowed", shown),
            )
            .with_status(status));
        }

        if let Some(len) = header_str(&response.headers, CONTENT_LENGTH)
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            if len > limits.max_bytes {
                return Err(too_large(url, status, limits));
            }
        }

        let body = read_limited(response.body, url, status, limits, deadline).await?;

        Ok(HopOutcome::Page {
            status,
            content_type,
            body,
        })
    }
}

/// Drain the body stream, refusing to buffer more than `max_bytes`.
async fn read_limited(
    mut body: BodyStream,
    url: &SafeUrl,
    status: u16,
    limits: Limits,
    deadline: Instant,
) -> Result<Vec<u8>, SafeFetchError> {
    let mut buf = Vec::new();

    loop {
        let next = timeout_at(deadline, body.next())
            .await
            .map_err(|_| timeout_error(url, limits))?;

        let Some(chunk) = next else {
            return Ok(buf);
        };

        let chunk = chunk.map_err(|e| match e {
            TransportError::Timeout => timeout_error(url, limits),
            e => SafeFetchError::new(FetchErrorCode::FetchFailed, url.as_str(), e.to_string())
                .with_status(status),
        })?;

        if buf.len() as u64 + chunk.len() as u64 > limits.max_bytes {
            return Err(too_large(url, status, limits));
        }
        buf.extend_from_slice(&chunk);
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `text/HTML; charset=utf-8` → `text/html`.
fn base_content_type(headers: &HeaderMap) -> String {
    header_str(headers, CONTENT_TYPE)
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn timeout_error(url: &SafeUrl, limits: Limits) -> SafeFetchError {
    SafeFetchError::new(
        FetchErrorCode::Timeout,
        url.as_str(),
        format!("no complete response within {} ms", limits.timeout.as_millis()),
    )
}

fn too_large(url: &SafeUrl, status: u16, limits: Limits) -> SafeFetchError {
    SafeFetchError::new(
        FetchErrorCode::TooLarge,
        url.as_str(),
        format!("response exceeds {} bytes", limits.max_bytes),
    )
    .with_status(status)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use reqwest::header::HeaderValue;

    use super::*;
    use crate::dns::tests::StaticResolver;
    use crate::error::DnsError;
    use crate::transport::HopResponse;

    /// Canned reply for one URL.
    #[derive(Clone)]
    enum Reply {
        Response {
            status: u16,
            headers: Vec<(&'static str, String)>,
            chunks: Vec<&'static str>,
        },
        /// Chunks repeated forever, counting how many were pulled.
        Endless {
            chunk: Bytes,
            content_length: Option<u64>,
            pulled: Arc<AtomicUsize>,
        },
        /// One chunk, then the body stalls.
        Stall,
        Hang,
        Refused,
    }

    fn page(content_type: &str, body: &'static str) -> Reply {
        Reply::Response {
            status: 200,
            headers: vec![("content-type", content_type.to_string())],
            chunks: vec![body],
        }
    }

    fn redirect(location: &str) -> Reply {
        Reply::Response {
            status: 302,
            headers: vec![("location", location.to_string())],
            chunks: vec![],
        }
    }

    #[derive(Clone, Default)]
    struct ScriptedTransport {
        replies: HashMap<String, Reply>,
        requested: Arc<Mutex<Vec<(String, Vec<IpAddr>)>>>,
    }

    impl ScriptedTransport {
        fn on(mut self, url: &str, reply: Reply) -> Self {
            self.replies.insert(url.to_string(), reply);
            self
        }

        fn requested_urls(&self) -> Vec<String> {
            self.requested
                .lock()
                .unwrap()
                .iter()
                .map(|(url, _)| url.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, request: HopRequest<'_>) -> Result<HopResponse, TransportError> {
            self.requested
                .lock()
                .unwrap()
                .push((request.url.as_str().to_string(), request.addrs.to_vec()));

            let reply = self
                .replies
                .get(request.url.as_str())
                .cloned()
                .unwrap_or(Reply::Refused);

            match reply {
                Reply::Response {
                    status,
                    headers,
                    chunks,
                } => {
                    let mut map = HeaderMap::new();
                    for (name, value) in headers {
                        map.insert(name, HeaderValue::from_str(&value).unwrap());
                    }
                    let body = stream::iter(
                        chunks
                            .into_iter()
                            .map(|c| Ok(Bytes::from_static(c.as_bytes()))),
                    );
                    Ok(HopResponse {
                        status,
                        headers: map,
                        body: body.boxed(),
                    })
                }
                Reply::Endless {
                    chunk,
                    content_length,
                    pulled,
                } => {
                    let mut map = HeaderMap::new();
                    map.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                    if let Some(len) = content_length {
                        map.insert(CONTENT_LENGTH, HeaderValue::from(len));
                    }
                    let body = stream::repeat_with(move || {
                        pulled.fetch_add(1, Ordering::SeqCst);
                        Ok(chunk.clone())
                    });
                    Ok(HopResponse {
                        status: 200,
                        headers: map,
                        body: body.boxed(),
                    })
                }
                Reply::Stall => {
                    let mut map = HeaderMap::new();
                    map.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
                    let body = stream::iter(vec![Ok(Bytes::from_static(b"<html>"))])
                        .chain(stream::pending());
                    Ok(HopResponse {
                        status: 200,
                        headers: map,
                        body: body.boxed(),
                    })
                }
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(TransportError::Request("unreachable".into()))
                }
                Reply::Refused => Err(TransportError::Request("connection refused".into())),
            }
        }
    }

    fn public_resolver() -> StaticResolver {
        StaticResolver::default()
            .with("blog.example.com", &["93.184.216.34"])
            .with("short.example.net", &["93.184.216.35"])
            .with("cdn.example.org", &["2606:2800:220:1::1"])
            .with("sneaky.example.com", &["93.184.216.36", "10.0.0.7"])
            .with("metadata.example.com", &["169.254.169.254"])
    }

    fn fetcher(transport: ScriptedTransport) -> SafeFetcher {
        fetcher_with(FetchConfig::default(), transport)
    }

    fn fetcher_with(config: FetchConfig, transport: ScriptedTransport) -> SafeFetcher {
        SafeFetcher::new(config, transport, public_resolver()).unwrap()
    }

    async fn run(fetcher: &SafeFetcher, url: &str) -> Result<SafeFetchResult, SafeFetchError> {
        fetcher.fetch(url, FetchOptions::default()).await
    }

    #[tokio::test]
    async fn test_simple_page() {
        let transport = ScriptedTransport::default().on(
            "https://blog.example.com/post",
            page("text/html; charset=UTF-8", "<h1>Paris</h1>"),
        );
        let result = run(&fetcher(transport.clone()), "https://blog.example.com/post")
            .await
            .unwrap();

        assert_eq!(result.final_url, "https://blog.example.com/post");
        assert_eq!(result.status, 200);
        assert_eq!(result.content_type, "text/html");
        assert_eq!(result.text, "<h1>Paris</h1>");
        assert_eq!(result.bytes_read, 14);
        assert!(result.redirects.is_empty());

        let requested = transport.requested.lock().unwrap();
        assert_eq!(requested[0].1, vec!["93.184.216.34".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_disallowed_protocol_issues_no_request() {
        let transport = ScriptedTransport::default();
        let err = run(&fetcher(transport.clone()), "ftp://blog.example.com/")
            .await
            .unwrap_err();
        assert_eq!(err.code, FetchErrorCode::DisallowedProtocol);
        assert!(transport.requested_urls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = run(&fetcher(ScriptedTransport::default()), "http://")
            .await
            .unwrap_err();
        assert_eq!(err.code, FetchErrorCode::InvalidUrl);
    }

    #[tokio::test]
    async fn test_private_resolution_issues_no_request() {
        let transport = ScriptedTransport::default()
            .on("https://metadata.example.com/", page("text/html", "secret"))
            .on("https://sneaky.example.com/", page("text/html", "secret"));
        let fetcher = fetcher(transport.clone());

        let err = run(&fetcher, "https://metadata.example.com/").await.unwrap_err();
        assert_eq!(err.code, FetchErrorCode::BlockedIp);

        let err = run(&fetcher, "https://sneaky.example.com/").await.unwrap_err();
        assert_eq!(err.code, FetchErrorCode::BlockedIp);

        let err = run(&fetcher, "http://localhost/").await.unwrap_err();
        assert_eq!(err.code, FetchErrorCode::BlockedHost);

        assert!(transport.requested_urls().is_empty());
    }

    #[tokio::test]
    async fn test_redirect_chain_followed() {
        let transport = ScriptedTransport::default()
            .on("https://short.example.net/abc", redirect("https://blog.example.com/a"))
            .on("https://blog.example.com/a", redirect("/b?x=1"))
            .on("https://blog.example.com/b?x=1", page("application/ld+json", "{}"));

        let result = run(&fetcher(transport), "https://short.example.net/abc")
            .await
            .unwrap();

        assert_eq!(result.final_url, "https://blog.example.com/b?x=1");
        assert_eq!(
            result.redirects,
            vec![
                "https://short.example.net/abc".to_string(),
                "https://blog.example.com/a".to_string(),
            ]
        );
        assert_eq!(result.content_type, "application/ld+json");
    }

    #[tokio::test]
    async fn test_redirect_to_loopback_blocked_at_second_hop() {
        let transport = ScriptedTransport::default()
            .on("https://blog.example.com/go", redirect("http://127.0.0.1/admin"))
            .on("http://127.0.0.1/admin", page("text/html", "admin"));

        let err = run(&fetcher(transport.clone()), "https://blog.example.com/go")
            .await
            .unwrap_err();

        assert_eq!(err.code, FetchErrorCode::BlockedIp);
        assert_eq!(err.final_url, "http://127.0.0.1/admin");
        assert_eq!(err.redirects, vec!["https://blog.example.com/go".to_string()]);
        assert_eq!(transport.requested_urls(), vec!["https://blog.example.com/go"]);
    }

    #[tokio::test]
    async fn test_redirect_to_blocked_hostname_and_protocol() {
        let transport = ScriptedTransport::default()
            .on("https://blog.example.com/a", redirect("http://metadata.google.internal/"))
            .on("https://blog.example.com/b", redirect("file:///etc/passwd"));
        let fetcher = fetcher(transport);

        let err = run(&fetcher, "https://blog.example.com/a").await.unwrap_err();
        assert_eq!(err.code, FetchErrorCode::BlockedHost);

        let err = run(&fetcher, "https://blog.example.com/b").await.unwrap_err();
        assert_eq!(err.code, FetchErrorCode::DisallowedProtocol);
    }

    #[tokio::test]
    async fn test_too_many_redirects() {
        let mut transport = ScriptedTransport::default();
        for i in 0..10 {
            transport = transport.on(
                &format!("https://blog.example.com/{}", i),
                redirect(&format!("/{}", i + 1)),
            );
        }
        let config = FetchConfig {
            max_redirects: 3,
            ..FetchConfig::default()
        };

        let err = run(&fetcher_with(config, transport.clone()), "https://blog.example.com/0")
            .await
            .unwrap_err();

        assert_eq!(err.code, FetchErrorCode::TooManyRedirects);
        assert_eq!(transport.requested_urls().len(), 4);
        assert_eq!(err.redirects.len(), 4);
    }

    #[tokio::test]
    async fn test_max_redirects_exactly_reached_succeeds() {
        let transport = ScriptedTransport::default()
            .on("https://blog.example.com/0", redirect("/1"))
            .on("https://blog.example.com/1", redirect("/2"))
            .on("https://blog.example.com/2", page("text/plain", "ok"));
        let config = FetchConfig {
            max_redirects: 2,
            ..FetchConfig::default()
        };

        let result = run(&fetcher_with(config, transport), "https://blog.example.com/0")
            .await
            .unwrap();
        assert_eq!(result.redirects.len(), 2);
    }

    #[tokio::test]
    async fn test_redirect_missing_location() {
        let transport = ScriptedTransport::default().on(
            "https://blog.example.com/",
            Reply::Response {
                status: 301,
                headers: vec![],
                chunks: vec![],
            },
        );
        let err = run(&fetcher(transport), "https://blog.example.com/")
            .await
            .unwrap_err();
        assert_eq!(err.code, FetchErrorCode::RedirectMissingLocation);
        assert_eq!(err.status, Some(301));
    }

    #[tokio::test]
    async fn test_http_error_carries_status() {
        let transport = ScriptedTransport::default().on(
            "https://blog.example.com/gone",
            Reply::Response {
                status: 404,
                headers: vec![("content-type", "text/html".into())],
                chunks: vec!["not found"],
            },
        );
        let err = run(&fetcher(transport), "https://blog.example.com/gone")
            .await
            .unwrap_err();
        assert_eq!(err.code, FetchErrorCode::HttpError);
        assert_eq!(err.status, Some(404));
    }

    #[tokio::test]
    async fn test_content_type_allow_list() {
        let transport = ScriptedTransport::default()
            .on("https://blog.example.com/img", page("image/png", "PNG"))
            .on(
                "https://blog.example.com/none",
                Reply::Response {
                    status: 200,
                    headers: vec![],
                    chunks: vec!["?"],
                },
            )
            .on("https://blog.example.com/feed", page("Application/XML", "<rss/>"));
        let fetcher = fetcher(transport);

        let err = run(&fetcher, "https://blog.example.com/img").await.unwrap_err();
        assert_eq!(err.code, FetchErrorCode::ContentTypeNotAllowed);

        let err = run(&fetcher, "https://blog.example.com/none").await.unwrap_err();
        assert_eq!(err.code, FetchErrorCode::ContentTypeNotAllowed);

        let result = run(&fetcher, "https://blog.example.com/feed").await.unwrap();
        assert_eq!(result.content_type, "application/xml");
    }

    #[tokio::test]
    async fn test_content_length_over_limit_reads_nothing() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let transport = ScriptedTransport::default().on(
            "https://blog.example.com/big",
            Reply::Endless {
                chunk: Bytes::from_static(b"tiny"),
                content_length: Some(5000),
                pulled: pulled.clone(),
            },
        );
        let err = fetcher(transport)
            .fetch(
                "https://blog.example.com/big",
                FetchOptions {
                    max_bytes: Some(1000),
                    ..FetchOptions::default()
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, FetchErrorCode::TooLarge);
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit_aborts() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let transport = ScriptedTransport::default().on(
            "https://blog.example.com/stream",
            Reply::Endless {
                chunk: Bytes::from(vec![b'x'; 100]),
                content_length: None,
                pulled: pulled.clone(),
            },
        );
        let err = fetcher(transport)
            .fetch(
                "https://blog.example.com/stream",
                FetchOptions {
                    max_bytes: Some(1_050),
                    ..FetchOptions::default()
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, FetchErrorCode::TooLarge);
        // Ten chunks fit; the eleventh crosses the limit and is never buffered.
        assert_eq!(pulled.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn test_understated_content_length_still_enforced() {
        let transport = ScriptedTransport::default().on(
            "https://blog.example.com/liar",
            Reply::Response {
                status: 200,
                headers: vec![
                    ("content-type", "text/plain".into()),
                    ("content-length", "10".into()),
                ],
                chunks: vec!["0123456789", "0123456789", "0123456789"],
            },
        );
        let err = fetcher(transport)
            .fetch(
                "https://blog.example.com/liar",
                FetchOptions {
                    max_bytes: Some(25),
                    ..FetchOptions::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, FetchErrorCode::TooLarge);
    }

    #[tokio::test]
    async fn test_body_exactly_at_limit_allowed() {
        let transport = ScriptedTransport::default()
            .on("https://blog.example.com/exact", page("text/plain", "0123456789"));
        let result = fetcher(transport)
            .fetch(
                "https://blog.example.com/exact",
                FetchOptions {
                    max_bytes: Some(10),
                    ..FetchOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.bytes_read, 10);
    }

    #[tokio::test]
    async fn test_transport_failure_is_fetch_failed() {
        let err = run(&fetcher(ScriptedTransport::default()), "https://blog.example.com/")
            .await
            .unwrap_err();
        assert_eq!(err.code, FetchErrorCode::FetchFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let transport = ScriptedTransport::default().on("https://blog.example.com/slow", Reply::Hang);
        let err = fetcher(transport)
            .fetch(
                "https://blog.example.com/slow",
                FetchOptions {
                    timeout_ms: Some(500),
                    ..FetchOptions::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, FetchErrorCode::Timeout);
    }

    /// Answers after a fixed delay.
    struct SlowResolver(Duration);

    #[async_trait]
    impl DnsResolver for SlowResolver {
        async fn lookup(&self, _host: &str) -> Result<Vec<IpAddr>, DnsError> {
            tokio::time::sleep(self.0).await;
            Ok(vec!["93.184.216.34".parse().unwrap()])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_dns_counts_against_hop_timeout() {
        let transport = ScriptedTransport::default().on(
            "https://blog.example.com/post",
            page("text/html", "<h1>Paris</h1>"),
        );
        let fetcher = SafeFetcher::new(
            FetchConfig::default(),
            transport.clone(),
            SlowResolver(Duration::from_secs(60)),
        )
        .unwrap();

        let err = fetcher
            .fetch(
                "https://blog.example.com/post",
                FetchOptions {
                    timeout_ms: Some(500),
                    ..FetchOptions::default()
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, FetchErrorCode::Timeout);
        assert_eq!(err.final_url, "https://blog.example.com/post");
        assert!(transport.requested.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_body_timeout() {
        let transport = ScriptedTransport::default().on("https://blog.example.com/drip", Reply::Stall);
        let err = run(&fetcher(transport), "https://blog.example.com/drip")
            .await
            .unwrap_err();
        assert_eq!(err.code, FetchErrorCode::Timeout);
        assert_eq!(err.final_url, "https://blog.example.com/drip");
    }

    #[tokio::test]
    async fn test_ipv6_host_resolution_passed_to_transport() {
        let transport = ScriptedTransport::default()
            .on("https://cdn.example.org/x.json", page("application/json", "[]"));
        let result = run(&fetcher(transport.clone()), "https://cdn.example.org/x.json")
            .await
            .unwrap();
        assert_eq!(result.text, "[]");

        let requested = transport.requested.lock().unwrap();
        assert_eq!(
            requested[0].1,
            vec!["2606:2800:220:1::1".parse::<IpAddr>().unwrap()]
        );
    }

    #[tokio::test]
    async fn test_configured_blocked_host() {
        let transport = ScriptedTransport::default()
            .on("https://blog.example.com/", page("text/html", "hi"));
        let config = FetchConfig {
            blocked_hosts: vec!["*.example.com".into()],
            ..FetchConfig::default()
        };
        let err = run(&fetcher_with(config, transport), "https://blog.example.com/")
            .await
            .unwrap_err();
        assert_eq!(err.code, FetchErrorCode::BlockedHost);
    }

    #[test]
    fn test_error_serializes_with_wire_code() {
        let err = SafeFetchError::new(FetchErrorCode::TooLarge, "https://x.example/", "big")
            .with_status(200);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "too_large");
        assert_eq!(json["finalUrl"], "https://x.example/");
        assert_eq!(json["status"], 200);
    }
}
