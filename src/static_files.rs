use crate::common::{empty, BoxError, ProxyBody, ResponseBuilder};
use crate::config::MimeTable;
use crate::error::ProxyError;
use futures::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED};
use hyper::{Method, Request, Response, StatusCode};
use log::debug;
use percent_encoding::percent_decode_str;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::io::ReaderStream;

pub const INDEX_FILE: &str = "index.html";

/// Serves the fixed static root for requests addressed to this machine.
#[derive(Debug, Clone)]
pub struct StaticFileHandler {
    root: PathBuf,
    mimes: MimeTable,
}

impl StaticFileHandler {
    pub fn new(root: impl Into<PathBuf>, mimes: MimeTable) -> Self {
        Self {
            root: root.into(),
            mimes,
        }
    }

    /// Directory-style paths get `index.html` appended.
    pub fn resolve_path(url_path: &str) -> String {
        if url_path.is_empty() {
            format!("/{}", INDEX_FILE)
        } else if url_path.ends_with('/') {
            format!("{}{}", url_path, INDEX_FILE)
        } else {
            url_path.to_string()
        }
    }

    pub fn content_type(&self, path: &str) -> Option<&str> {
        self.mimes.for_path(path)
    }

    pub async fn handle_request<B>(
        &self,
        req: &Request<B>,
    ) -> Result<Response<ProxyBody>, ProxyError> {
        let url_path = match percent_decode_str(req.uri().path()).decode_utf8() {
            Ok(path) => path.into_owned(),
            Err(_) => return Ok(ResponseBuilder::bad_request("invalid URL path")),
        };

        if contains_dot_dot(&url_path) {
            return Ok(ResponseBuilder::bad_request("invalid URL path"));
        }

        // Canonical URL for an index page is its directory
        if url_path.ends_with(&format!("/{}", INDEX_FILE)) {
            return local_redirect(req, "./");
        }

        let file_path = Self::resolve_path(&url_path);
        let full_path = self.root.join(file_path.trim_start_matches('/'));
        debug!("Serving {} from {}", url_path, full_path.display());

        let metadata = match tokio::fs::metadata(&full_path).await {
            Ok(metadata) => metadata,
            Err(e) => return Ok(error_response(e.kind())),
        };

        if metadata.is_dir() {
            if !url_path.ends_with('/') {
                let base = url_path.rsplit('/').next().unwrap_or_default();
                return local_redirect(req, &format!("{}/", base));
            }
            return Ok(ResponseBuilder::not_found());
        }

        let modified = metadata.modified().ok();
        if let (Some(modified), Some(since)) = (modified, if_modified_since(req)) {
            if truncate_to_secs(modified) <= since {
                return Ok(ResponseBuilder::status(StatusCode::NOT_MODIFIED));
            }
        }

        let mut response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_LENGTH, metadata.len().to_string());
        if let Some(content_type) = self.content_type(&file_path) {
            response = response.header(CONTENT_TYPE, content_type);
        }
        if let Some(modified) = modified {
            response = response.header(LAST_MODIFIED, httpdate::fmt_http_date(modified));
        }

        if req.method() == Method::HEAD {
            return Ok(response.body(empty())?);
        }

        let file = match tokio::fs::File::open(&full_path).await {
            Ok(file) => file,
            Err(e) => return Ok(error_response(e.kind())),
        };
        let stream = ReaderStream::new(file).map_ok(Frame::data).map_err(BoxError::from);
        Ok(response.body(StreamBody::new(stream).boxed())?)
    }
}

fn error_response(kind: ErrorKind) -> Response<ProxyBody> {
    match kind {
        // A file used as a directory, or a NUL in the decoded path, names nothing
        ErrorKind::NotFound | ErrorKind::NotADirectory | ErrorKind::InvalidInput => {
            ResponseBuilder::not_found()
        }
        ErrorKind::PermissionDenied => ResponseBuilder::forbidden(),
        _ => ResponseBuilder::text(StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error"),
    }
}

fn contains_dot_dot(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}

fn local_redirect<B>(req: &Request<B>, target: &str) -> Result<Response<ProxyBody>, ProxyError> {
    let location = match req.uri().query() {
        Some(query) => format!("{}?{}", target, query),
        None => target.to_string(),
    };
    ResponseBuilder::moved_permanently(&location)
}

fn if_modified_since<B>(req: &Request<B>) -> Option<SystemTime> {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return None;
    }
    let value = req.headers().get(IF_MODIFIED_SINCE)?.to_str().ok()?;
    httpdate::parse_http_date(value).ok()
}

// HTTP dates carry whole seconds only
fn truncate_to_secs(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => UNIX_EPOCH + Duration::from_secs(elapsed.as_secs()),
        Err(_) => time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        assert_eq!(StaticFileHandler::resolve_path(""), "/index.html");
        assert_eq!(StaticFileHandler::resolve_path("/"), "/index.html");
        assert_eq!(StaticFileHandler::resolve_path("/docs/"), "/docs/index.html");
        assert_eq!(StaticFileHandler::resolve_path("/css/app.css"), "/css/app.css");
    }

    #[test]
    fn test_contains_dot_dot() {
        assert!(contains_dot_dot("/../etc/passwd"));
        assert!(contains_dot_dot("/a/.."));
        assert!(!contains_dot_dot("/a/..b/c"));
        assert!(!contains_dot_dot("/a/b.c"));
    }

    #[test]
    fn test_error_response_status() {
        assert_eq!(error_response(ErrorKind::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(error_response(ErrorKind::NotADirectory).status(), StatusCode::NOT_FOUND);
        assert_eq!(error_response(ErrorKind::InvalidInput).status(), StatusCode::NOT_FOUND);
        assert_eq!(error_response(ErrorKind::PermissionDenied).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            error_response(ErrorKind::Other).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_truncate_to_secs() {
        let time = UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!(truncate_to_secs(time), UNIX_EPOCH + Duration::from_secs(1));
    }
}
