//! Content listing seam
//!
//! A [`ContentLister`] enumerates the objects under a prefix with whatever
//! credentials are active and hands back a name and an access link for each.

pub mod filesystem;
pub mod policy;

pub use filesystem::FilesystemContentLister;
pub use policy::{AccessPolicy, Tier};

use std::future::Future;

use serde::Serialize;

use crate::broker::Credentials;
use crate::error::ListError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentEntry {
    pub key: String,
    /// Last path segment of the key.
    pub name: String,
    pub link: String,
    pub size: u64,
    pub content_type: String,
}

pub trait ContentLister: Send + Sync {
    /// List objects under `prefix`, ordered by key.
    ///
    /// The prefix's own marker and sub-directory entries are never returned.
    fn list(
        &self,
        prefix: &str,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Vec<ContentEntry>, ListError>> + Send;
}

/// Whether a raw listing key should be shown for `prefix`.
pub fn is_listable(prefix: &str, key: &str) -> bool {
    key != prefix && !key.ends_with('/')
}

pub fn display_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_listable() {
        assert!(!is_listable("free/", "free/"));
        assert!(!is_listable("free/", "free/sub/"));
        assert!(is_listable("free/", "free/a.txt"));
        assert!(is_listable("free/", "free/sub/b.txt"));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("free/a.txt"), "a.txt");
        assert_eq!(display_name("free/sub/b.txt"), "b.txt");
        assert_eq!(display_name("top.txt"), "top.txt");
    }
}
