use crate::error::ProxyError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_MIMES_FILE: &str = "mimes.json";
pub const DEFAULT_STATIC_ROOT: &str = "/var/www/html";
pub const DEFAULT_CERTIFICATE: &str = "certs/server.crt";
pub const DEFAULT_PRIVATE_KEY: &str = "certs/server.key";
pub const DEFAULT_DNS_SERVER: &str = "8.8.8.8:53";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    #[serde(rename = "Username", alias = "username", default)]
    pub username: String,
    #[serde(rename = "Password", alias = "password", default)]
    pub password: String,
}

/// How to reach the upstream origin for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectEntry {
    #[serde(rename = "Scheme", alias = "scheme")]
    pub scheme: String,
    #[serde(rename = "Auth", alias = "auth", default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<BasicAuth>,
}

impl RedirectEntry {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            auth: None,
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(BasicAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Credentials to attach upstream; both halves must be non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match &self.auth {
            Some(auth) if !auth.username.is_empty() && !auth.password.is_empty() => {
                Some((auth.username.as_str(), auth.password.as_str()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedirectConfig {
    #[serde(rename = "Redirects", alias = "redirects", default)]
    pub redirects: HashMap<String, RedirectEntry>,
    // Adds `Clear-Site-Data: *` to every proxied response
    #[serde(rename = "ClearSiteData", alias = "clear_site_data", default)]
    pub clear_site_data: bool,
}

impl RedirectConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProxyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config: RedirectConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ProxyError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Exact, case-sensitive match on the `Host` value as received.
    pub fn lookup(&self, host: &str) -> Option<&RedirectEntry> {
        self.redirects.get(host)
    }

    pub fn insert(&mut self, host: impl Into<String>, entry: RedirectEntry) {
        self.redirects.insert(host.into(), entry);
    }
}

/// File extension (with leading dot) to MIME type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MimeTable(HashMap<String, String>);

impl MimeTable {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self(entries)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProxyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let table: MimeTable = serde_json::from_str(&content)?;
        Ok(table)
    }

    pub fn get(&self, extension: &str) -> Option<&str> {
        self.0.get(extension).map(String::as_str)
    }

    pub fn for_path(&self, path: &str) -> Option<&str> {
        extension_of(path).and_then(|ext| self.get(ext))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Extension of the last path element, leading dot included.
pub fn extension_of(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rfind('.').map(|idx| &name[idx..])
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub static_root: PathBuf,
    pub http_listen: SocketAddr,
    pub https_listen: SocketAddr,
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    pub dns_server: SocketAddr,
    pub dns_timeout: Duration,
    pub connect_timeout: Duration,
    pub keepalive: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            static_root: PathBuf::from(DEFAULT_STATIC_ROOT),
            http_listen: SocketAddr::from(([0, 0, 0, 0], 80)),
            https_listen: SocketAddr::from(([0, 0, 0, 0], 443)),
            certificate: PathBuf::from(DEFAULT_CERTIFICATE),
            private_key: PathBuf::from(DEFAULT_PRIVATE_KEY),
            dns_server: SocketAddr::from(([8, 8, 8, 8], 53)),
            dns_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(30),
            keepalive: Duration::from_secs(30),
        }
    }
}
