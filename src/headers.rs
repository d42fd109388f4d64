//! Header sanitizing shared by both proxying directions.

use http::header::{self, HeaderMap, HeaderName};
use std::collections::HashSet;

/// Headers never copied between client and upstream.
pub const FORBIDDEN_HEADERS: [&str; 4] = [
    "x-frame-options",
    "access-control-allow-origin",
    "upgrade-insecure-requests",
    "content-security-policy",
];

// Connection-scoped headers; each hop frames its own message.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Clone)]
pub struct ForbiddenHeaderSet {
    names: HashSet<HeaderName>,
}

impl Default for ForbiddenHeaderSet {
    fn default() -> Self {
        Self::new(FORBIDDEN_HEADERS.into_iter().map(HeaderName::from_static))
    }
}

impl ForbiddenHeaderSet {
    pub fn new(names: impl IntoIterator<Item = HeaderName>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }

    pub fn contains(&self, name: &HeaderName) -> bool {
        self.names.contains(name)
    }

    pub fn should_skip(&self, name: &HeaderName) -> bool {
        self.contains(name) || HOP_BY_HOP.contains(name)
    }

    /// Appends every allowed value of `src` to `dst`, keeping repeated headers.
    pub fn copy_filtered(&self, src: &HeaderMap, dst: &mut HeaderMap) {
        for (name, value) in src {
            if self.should_skip(name) {
                continue;
            }
            dst.append(name.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
