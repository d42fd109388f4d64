use crate::error::ProxyError;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::{Response, StatusCode};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type used for every response the server writes.
pub type ProxyBody = BoxBody<Bytes, BoxError>;

pub fn full(chunk: impl Into<Bytes>) -> ProxyBody {
    Full::new(chunk.into()).map_err(|never| match never {}).boxed()
}

pub fn empty() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

/// Plain-text responses for the error paths
pub struct ResponseBuilder;

impl ResponseBuilder {
    pub fn status(status: StatusCode) -> Response<ProxyBody> {
        let mut response = Response::new(empty());
        *response.status_mut() = status;
        response
    }

    pub fn text(status: StatusCode, message: &str) -> Response<ProxyBody> {
        let mut response = Response::new(full(format!("{}\n", message)));
        *response.status_mut() = status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    pub fn internal_server_error() -> Response<ProxyBody> {
        Self::status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn not_found() -> Response<ProxyBody> {
        Self::text(StatusCode::NOT_FOUND, "404 page not found")
    }

    pub fn bad_request(message: &str) -> Response<ProxyBody> {
        Self::text(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden() -> Response<ProxyBody> {
        Self::text(StatusCode::FORBIDDEN, "403 Forbidden")
    }

    pub fn moved_permanently(location: &str) -> Result<Response<ProxyBody>, ProxyError> {
        Ok(Response::builder()
            .status(StatusCode::MOVED_PERMANENTLY)
            .header(hyper::header::LOCATION, location)
            .body(empty())?)
    }
}

pub struct TlsConfig;

impl TlsConfig {
    /// Loads the certificate chain and private key into a server config
    pub fn create_config(
        private_key_path: &Path,
        cert_path: &Path,
    ) -> Result<ServerConfig, ProxyError> {
        let mut private_key_file = BufReader::new(File::open(private_key_path).map_err(|e| {
            ProxyError::Tls(format!(
                "Failed to open private key file {}: {}",
                private_key_path.display(),
                e
            ))
        })?);

        let mut cert_file = BufReader::new(File::open(cert_path).map_err(|e| {
            ProxyError::Tls(format!(
                "Failed to open certificate file {}: {}",
                cert_path.display(),
                e
            ))
        })?);

        let certs = rustls_pemfile::certs(&mut cert_file)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProxyError::Tls(format!("Failed to read certificate: {}", e)))?;

        if certs.is_empty() {
            return Err(ProxyError::Tls("No valid certificate found".to_string()));
        }

        // PKCS#1, PKCS#8 and SEC1 keys are all accepted
        let private_key = rustls_pemfile::private_key(&mut private_key_file)
            .map_err(|e| ProxyError::Tls(format!("Failed to read private key: {}", e)))?
            .ok_or_else(|| ProxyError::Tls("No valid private key found".to_string()))?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, private_key)
            .map_err(|e| ProxyError::Tls(format!("Failed to create TLS config: {}", e)))?;

        Ok(config)
    }
}
