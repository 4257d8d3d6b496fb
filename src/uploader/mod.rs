// backupcron/src/uploader/mod.rs
pub mod s3;
#[cfg(test)]
pub(crate) mod memory;

use sha1::{Digest, Sha1};
use std::fs::File;
use std::io;
use std::path::Path;

use crate::errors::{AppError, Result};

/// Object metadata key holding the hex SHA1 of the uploaded content.
pub const DIGEST_METADATA_KEY: &str = "sha1";

/// Capability over a remote object store.
///
/// `upload` skips the transfer when the remote object already carries the
/// digest of the local file and reports whether anything was sent.
/// `download_if_exists` reports `false` when the remote object is absent;
/// absence is never an error for either call.
#[allow(async_fn_in_trait)]
pub trait Uploader {
    async fn upload(&self, src: &Path, dst: &str) -> Result<bool>;

    async fn download_if_exists(&self, src: &str, dst: &Path) -> Result<bool>;
}

/// A parsed `<scheme>://<bucket>/<key>` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub bucket: String,
    pub key: String,
}

impl RemoteLocation {
    /// The key is taken verbatim: no percent decoding, and `#` or `?` are key characters.
    pub fn parse(uri: &str, scheme: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix(scheme)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| {
                AppError::InvalidDestination(format!("{} does not start with {}://", uri, scheme))
            })?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(AppError::InvalidDestination(format!(
                "{} is missing a bucket",
                uri
            )));
        }
        let bucket = bucket.to_string();
        let key = key.trim_start_matches('/').to_string();
        if key.is_empty() {
            return Err(AppError::InvalidDestination(format!(
                "{} is missing an object key",
                uri
            )));
        }
        Ok(RemoteLocation { bucket, key })
    }
}

/// Joins two remote path segments with exactly one `/` between them.
pub fn join_remote_path(base: &str, name: &str) -> String {
    let mut joined = base.to_string();
    if !joined.ends_with('/') {
        joined.push('/');
    }
    joined.push_str(name);
    joined
}

/// Hex encoded SHA1 of a local file's content.
pub fn sha1_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
