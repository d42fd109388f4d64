use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DNS protocol error: {0}")]
    Dns(#[from] hickory_proto::ProtoError),

    #[error("Not found: {0}")]
    DnsNotFound(String),

    #[error("Unsupported DNS record type {record_type} for {host}")]
    UnsupportedRecord { host: String, record_type: String },

    #[error("DNS query for {0} timed out")]
    DnsTimeout(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("URI error: {0}")]
    Uri(#[from] http::uri::InvalidUri),

    #[error("TLS error: {0}")]
    Tls(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
