//! Filesystem-backed content listing.
//!
//! Objects are files under a root directory, keyed by their relative path
//! with `/` separators. Directories show up as `key/` markers, the way object
//! stores report folder placeholders, and are filtered out of results.
//! Every returned entry carries a link signed with the caller's secret key.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use mime_guess::MimeGuess;
use secret_string::SecretString;
use sha2::Sha256;
use tokio::fs;
use tracing::{debug, warn};

use super::{AccessPolicy, ContentEntry, ContentLister, display_name, is_listable};
use crate::broker::{CredentialRegistry, Credentials, IssuedCredential};
use crate::constants::LINK_LIFETIME;
use crate::error::ListError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
struct RawEntry {
    key: String,
    size: u64,
}

pub struct FilesystemContentLister<R> {
    root_dir: PathBuf,
    policy: AccessPolicy,
    registry: Arc<R>,
    link_base: String,
    link_lifetime: Duration,
}

/// Compute the link signature for `key` expiring at the unix timestamp `expires`.
pub fn sign_link(secret: &SecretString, key: &str, expires: i64) -> Result<String, ListError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose().as_bytes())
        .map_err(|e| ListError::Other(format!("HMAC error: {}", e)))?;
    mac.update(format!("GET\n{}\n{}", key, expires).as_bytes());
    Ok(format!("{:x}", mac.finalize().into_bytes()))
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Keys and prefixes may only name plain segments below the root.
fn is_plain_key(key: &str) -> bool {
    Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

/// Object key for `path`, or `None` when a segment is not valid UTF-8.
fn relative_key(path: &Path, root: &Path) -> Result<Option<String>, ListError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| ListError::Other(e.to_string()))?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .map(|segments| segments.join("/")))
}

impl<R: CredentialRegistry> FilesystemContentLister<R> {
    pub fn new(root_dir: PathBuf, policy: AccessPolicy, registry: Arc<R>, link_base: &str) -> Self {
        Self {
            root_dir,
            policy,
            registry,
            link_base: link_base.trim_end_matches('/').to_string(),
            link_lifetime: *LINK_LIFETIME,
        }
    }

    pub fn with_link_lifetime(mut self, link_lifetime: Duration) -> Self {
        self.link_lifetime = link_lifetime;
        self
    }

    async fn authorize(
        &self,
        prefix: &str,
        credentials: &Credentials,
    ) -> Result<IssuedCredential, ListError> {
        let Some(issued) = self.registry.resolve(&credentials.access_key_id).await else {
            warn!(access_key_id = %credentials.access_key_id, "Unknown or expired access key");
            return Err(ListError::AccessDenied(
                "Invalid or expired access key".to_string(),
            ));
        };
        if !issued
            .secret_access_key
            .ct_eq(credentials.secret_access_key.expose())
        {
            warn!(access_key_id = %credentials.access_key_id, "Secret key mismatch");
            return Err(ListError::AccessDenied(
                "The request signature does not match".to_string(),
            ));
        }
        if !self.policy.allows(&issued.binding, prefix) {
            warn!(access_key_id = %credentials.access_key_id, prefix = %prefix, "Listing denied by policy");
            return Err(ListError::AccessDenied(format!(
                "Not authorized to list '{}'",
                prefix
            )));
        }
        Ok(issued)
    }

    /// Walk the directory tree under the prefix's directory part.
    async fn collect(&self, prefix: &str) -> Result<Vec<RawEntry>, ListError> {
        if !is_plain_key(prefix) {
            return Err(ListError::Other(format!("Invalid prefix '{}'", prefix)));
        }
        if !fs::try_exists(&self.root_dir).await? {
            return Err(ListError::Other(format!(
                "Content root {} does not exist",
                self.root_dir.display()
            )));
        }

        let dir_part = prefix.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let start = self.root_dir.join(dir_part);
        let mut entries = Vec::new();
        if !fs::try_exists(&start).await? {
            debug!(prefix = %prefix, "Prefix directory does not exist");
            return Ok(entries);
        }

        let mut targets = vec![start];
        while let Some(dir) = targets.pop() {
            let mut dir_reader = fs::read_dir(&dir).await?;
            while let Some(entry) = dir_reader.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                let Some(mut key) = relative_key(&path, &self.root_dir)? else {
                    warn!(path = ?path, "Skipping entry with a non UTF-8 name");
                    continue;
                };
                let size = if file_type.is_dir() {
                    key.push('/');
                    targets.push(path);
                    0
                } else {
                    entry.metadata().await?.len()
                };
                if key.starts_with(prefix) {
                    entries.push(RawEntry { key, size });
                }
            }
        }

        // The directory named by the prefix is its own marker
        if !dir_part.is_empty() && prefix.ends_with('/') {
            entries.push(RawEntry {
                key: prefix.to_string(),
                size: 0,
            });
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn build_link(
        &self,
        key: &str,
        access_key_id: &str,
        secret: &SecretString,
        expires: i64,
    ) -> Result<String, ListError> {
        let signature = sign_link(secret, key, expires)?;
        Ok(format!(
            "{}/{}?AccessKeyId={}&Expires={}&Signature={}",
            self.link_base,
            encode_key(key),
            urlencoding::encode(access_key_id),
            expires,
            signature
        ))
    }

    /// Check a link's signature and expiry against the live credentials.
    pub async fn verify_link(
        &self,
        key: &str,
        access_key_id: &str,
        expires: i64,
        signature: &str,
    ) -> Result<(), ListError> {
        if key.is_empty() || !is_plain_key(key) {
            warn!(key = %key, "Rejected link for a key outside the content tree");
            return Err(ListError::AccessDenied(format!("Invalid key '{}'", key)));
        }
        let issued = self
            .registry
            .resolve(access_key_id)
            .await
            .ok_or_else(|| ListError::AccessDenied("Invalid or expired access key".to_string()))?;
        if expires < Utc::now().timestamp() {
            return Err(ListError::AccessDenied("Request has expired".to_string()));
        }
        let expected = SecretString::new(sign_link(&issued.secret_access_key, key, expires)?);
        if !expected.ct_eq(signature) {
            return Err(ListError::AccessDenied(
                "The request signature does not match".to_string(),
            ));
        }
        let prefix = key.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        if !self.policy.allows(&issued.binding, &format!("{}/", prefix)) {
            return Err(ListError::AccessDenied(format!(
                "Not authorized to read '{}'",
                key
            )));
        }
        Ok(())
    }
}

impl<R: CredentialRegistry> ContentLister for FilesystemContentLister<R> {
    async fn list(
        &self,
        prefix: &str,
        credentials: &Credentials,
    ) -> Result<Vec<ContentEntry>, ListError> {
        debug!(prefix = %prefix, access_key_id = %credentials.access_key_id, "Listing content");
        let issued = self.authorize(prefix, credentials).await?;
        let raw = self.collect(prefix).await?;
        let expires = (Utc::now() + self.link_lifetime).timestamp();

        let mut entries = Vec::new();
        for entry in raw.into_iter().filter(|e| is_listable(prefix, &e.key)) {
            let link = self.build_link(
                &entry.key,
                &credentials.access_key_id,
                &issued.secret_access_key,
                expires,
            )?;
            entries.push(ContentEntry {
                name: display_name(&entry.key).to_string(),
                content_type: MimeGuess::from_path(&entry.key)
                    .first_or_octet_stream()
                    .to_string(),
                key: entry.key,
                link,
                size: entry.size,
            });
        }

        debug!(prefix = %prefix, count = entries.len(), "Listed content");
        Ok(entries)
    }
}
