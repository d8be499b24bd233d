//! The HTTP side of a fetch hop.
//!
//! A [`Transport`] issues exactly one GET and never follows redirects; the redirect
//! loop and every safety decision live in [`SafeFetcher`](crate::SafeFetcher).

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderMap, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::redirect::Policy as RedirectPolicy;
use reqwest::Client;
use crate::error::TransportError;
use crate::safe_url::SafeUrl;

/// Accept header sent with every hop; mirrors the content-type allow-list.
const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/json,application/ld+json,\
application/xml,text/xml,text/plain;q=0.9,*/*;q=0.1";

/// One hop's request.
#[derive(Debug, Clone, Copy)]
pub struct HopRequest<'a> {
    pub url: &'a SafeUrl,

    /// Addresses that passed validation; the connection must use one of these.
    pub addrs: &'a [IpAddr],

    pub user_agent: &'a str,
    pub accept_language: &'a str,
}

/// Streamed body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// One hop's response, with the body not yet read.
pub struct HopResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl fmt::Debug for HopResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HopResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Issues a single GET with redirects disabled.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: HopRequest<'_>) -> Result<HopResponse, TransportError>;
}

/// [`Transport`] over reqwest.
///
/// A client is built per hop so that hostname lookups inside reqwest are pinned to
/// the validated addresses: the connection cannot land on an address that was
/// swapped in after validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }

    fn build_client(&self, request: &HopRequest<'_>) -> Result<Client, TransportError> {
        let mut builder = Client::builder()
            .redirect(RedirectPolicy::none())
            .user_agent(request.user_agent)
            .no_proxy();

        if let Some(url::Host::Domain(domain)) = request.url.as_url().host() {
            let port = request.url.port();
            let addrs: Vec<SocketAddr> = request
                .addrs
                .iter()
                .map(|ip| SocketAddr::new(*ip, port))
                .collect();
            builder = builder.resolve_to_addrs(domain, &addrs);
        }

        builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: HopRequest<'_>) -> Result<HopResponse, TransportError> {
        let client = self.build_client(&request)?;

        let response = client
            .get(request.url.as_url().clone())
            .header(ACCEPT, ACCEPT_VALUE)
            .header(ACCEPT_LANGUAGE, request.accept_language)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Body(e.to_string())))
            .boxed();

        Ok(HopResponse {
            status,
            headers,
            body,
        })
    }
}
