use crate::common::{BoxError, ProxyBody, ResponseBuilder};
use crate::config::{RedirectEntry, Settings};
use crate::error::ProxyError;
use crate::headers::ForbiddenHeaderSet;
use crate::resolver::{DnsExchange, OverrideResolver};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::{HeaderName, HeaderValue, AUTHORIZATION};
use hyper::{Request, Response, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use log::{debug, error, info};

static CLEAR_SITE_DATA: HeaderName = HeaderName::from_static("clear-site-data");

/// HTTP(S) connector whose name lookups go through the override resolver.
pub type ResolvingConnector<E> = HttpsConnector<HttpConnector<OverrideResolver<E>>>;

pub struct ProxyForwarder<E> {
    connector: ResolvingConnector<E>,
    forbidden: ForbiddenHeaderSet,
    clear_site_data: bool,
}

impl<E: DnsExchange> ProxyForwarder<E> {
    pub fn new(
        resolver: OverrideResolver<E>,
        settings: &Settings,
        forbidden: ForbiddenHeaderSet,
    ) -> Self {
        let mut http = HttpConnector::new_with_resolver(resolver);
        http.set_connect_timeout(Some(settings.connect_timeout));
        http.set_keepalive(Some(settings.keepalive));
        http.enforce_http(false);

        Self {
            connector: HttpsConnector::new_with_connector(http),
            forbidden,
            clear_site_data: false,
        }
    }

    pub fn with_clear_site_data(mut self, enabled: bool) -> Self {
        self.clear_site_data = enabled;
        self
    }

    /// `{scheme}://{host}{path?query}`; the Host value is reused as authority.
    pub fn upstream_uri(scheme: &str, host: &str, path_and_query: &str) -> Result<Uri, ProxyError> {
        let uri: Uri = format!("{}://{}{}", scheme, host, path_and_query).parse()?;
        Ok(uri)
    }

    pub fn build_request<B>(
        &self,
        req: Request<B>,
        host: &str,
        entry: &RedirectEntry,
    ) -> Result<Request<ProxyBody>, ProxyError>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let uri = Self::upstream_uri(&entry.scheme, host, path_and_query)?;

        let mut outbound = Request::new(body.map_err(Into::<BoxError>::into).boxed());
        *outbound.method_mut() = parts.method;
        *outbound.uri_mut() = uri;
        self.forbidden.copy_filtered(&parts.headers, outbound.headers_mut());

        if let Some((username, password)) = entry.credentials() {
            let encoded = general_purpose::STANDARD.encode(format!("{}:{}", username, password));
            let value = HeaderValue::from_str(&format!("Basic {}", encoded)).map_err(|e| {
                ProxyError::Config(format!("Invalid credentials for {}: {}", host, e))
            })?;
            outbound.headers_mut().insert(AUTHORIZATION, value);
        }

        Ok(outbound)
    }

    pub async fn try_forward<B>(
        &self,
        req: Request<B>,
        host: &str,
        entry: &RedirectEntry,
    ) -> Result<Response<ProxyBody>, ProxyError>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let outbound = self.build_request(req, host, entry)?;
        info!("Forwarding {} {}", outbound.method(), outbound.uri());

        // A new client per request; nothing is pooled across requests
        let client: Client<ResolvingConnector<E>, ProxyBody> =
            Client::builder(TokioExecutor::new()).build(self.connector.clone());
        let upstream = client
            .request(outbound)
            .await
            .map_err(|e| ProxyError::Upstream(error_chain(&e)))?;

        let (parts, body) = upstream.into_parts();
        debug!("Upstream {} answered {}", host, parts.status);

        let mut response = Response::new(body.map_err(BoxError::from).boxed());
        *response.status_mut() = parts.status;
        self.forbidden.copy_filtered(&parts.headers, response.headers_mut());
        if self.clear_site_data {
            response.headers_mut().insert(CLEAR_SITE_DATA.clone(), HeaderValue::from_static("*"));
        }

        Ok(response)
    }

    /// Relays the request upstream; any failure becomes a bare 500.
    pub async fn forward<B>(
        &self,
        req: Request<B>,
        host: &str,
        entry: &RedirectEntry,
    ) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        match self.try_forward(req, host, entry).await {
            Ok(response) => response,
            Err(e) => {
                error!("Proxying to {} failed: {}", host, e);
                ResponseBuilder::internal_server_error()
            }
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
