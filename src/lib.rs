pub mod config;
pub mod error;
pub mod logging;
pub mod headers;
pub mod resolver;
pub mod static_files;
pub mod forwarder;
pub mod router;
pub mod common;
pub mod server;

pub use config::{MimeTable, RedirectConfig, RedirectEntry, Settings};
pub use error::ProxyError;
pub use router::Router;
pub use server::DualListener;
