//! Per-request dispatch on the `Host` header.
//!
//! Requests naming this machine are answered from the static root, hosts
//! present in the redirect map are proxied, everything else gets a 404.

use crate::common::{BoxError, ProxyBody, ResponseBuilder};
use crate::config::{RedirectConfig, RedirectEntry};
use crate::forwarder::ProxyForwarder;
use crate::resolver::DnsExchange;
use crate::static_files::StaticFileHandler;
use bytes::Bytes;
use hyper::body::Body;
use hyper::header::HOST;
use hyper::{Request, Response};
use log::{error, info, warn};

/// Host values treated as "this machine".
#[derive(Debug, Clone)]
pub struct LocalNames {
    names: [String; 3],
}

impl LocalNames {
    pub fn from_hostname(hostname: &str) -> Self {
        Self {
            names: [
                hostname.to_string(),
                "localhost".to_string(),
                format!("{}.local", hostname),
            ],
        }
    }

    pub fn contains(&self, host: &str) -> bool {
        self.names.iter().any(|name| name == host)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    Static,
    Proxy(&'a RedirectEntry),
    Unknown,
}

/// The `Host` header, or the authority of an absolute-form request target.
pub fn request_host<B>(req: &Request<B>) -> Option<String> {
    if let Some(host) = req.headers().get(HOST).and_then(|h| h.to_str().ok()) {
        return Some(host.to_string());
    }
    req.uri().authority().map(|authority| authority.to_string())
}

pub struct Router<E> {
    local_names: LocalNames,
    redirects: RedirectConfig,
    static_files: StaticFileHandler,
    forwarder: ProxyForwarder<E>,
}

impl<E: DnsExchange> Router<E> {
    pub fn new(
        local_names: LocalNames,
        redirects: RedirectConfig,
        static_files: StaticFileHandler,
        forwarder: ProxyForwarder<E>,
    ) -> Self {
        Self {
            local_names,
            redirects,
            static_files,
            forwarder,
        }
    }

    pub fn route(&self, host: &str) -> Route<'_> {
        if self.local_names.contains(host) {
            return Route::Static;
        }
        match self.redirects.lookup(host) {
            Some(entry) => Route::Proxy(entry),
            None => Route::Unknown,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        info!("{}", req.uri().path());
        let host = request_host(&req).unwrap_or_default();

        match self.route(&host) {
            Route::Static => match self.static_files.handle_request(&req).await {
                Ok(response) => response,
                Err(e) => {
                    error!("Static file error for {}: {}", req.uri().path(), e);
                    ResponseBuilder::internal_server_error()
                }
            },
            Route::Proxy(entry) => self.forwarder.forward(req, &host, entry).await,
            Route::Unknown => {
                warn!("Unknown {}", host);
                ResponseBuilder::status(hyper::StatusCode::NOT_FOUND)
            }
        }
    }
}
