// In-memory uploader used by tests.
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::s3::S3_SCHEME;
use super::{RemoteLocation, Uploader, sha1_file};
use crate::errors::Result;

#[derive(Debug, Clone)]
pub(crate) struct StoredObject {
    pub content: Vec<u8>,
    pub digest: String,
}

#[derive(Default)]
pub(crate) struct MemoryUploader {
    objects: Mutex<HashMap<String, StoredObject>>,
    transfers: AtomicUsize,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of uploads that actually sent content.
    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    pub fn object(&self, uri: &str) -> Option<StoredObject> {
        let location = RemoteLocation::parse(uri, S3_SCHEME).ok()?;
        self.objects
            .lock()
            .unwrap()
            .get(&object_id(&location))
            .cloned()
    }

    /// Stores raw bytes without going through `upload`.
    pub fn insert(&self, uri: &str, content: Vec<u8>) {
        let location = RemoteLocation::parse(uri, S3_SCHEME).unwrap();
        self.objects.lock().unwrap().insert(
            object_id(&location),
            StoredObject {
                content,
                digest: String::new(),
            },
        );
    }
}

fn object_id(location: &RemoteLocation) -> String {
    format!("{}/{}", location.bucket, location.key)
}

impl Uploader for MemoryUploader {
    async fn upload(&self, src: &Path, dst: &str) -> Result<bool> {
        let location = RemoteLocation::parse(dst, S3_SCHEME)?;
        let digest = sha1_file(src)?;

        let mut objects = self.objects.lock().unwrap();
        if objects
            .get(&object_id(&location))
            .is_some_and(|o| o.digest == digest)
        {
            return Ok(false);
        }

        let content = std::fs::read(src)?;
        objects.insert(object_id(&location), StoredObject { content, digest });
        self.transfers.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn download_if_exists(&self, src: &str, dst: &Path) -> Result<bool> {
        let location = RemoteLocation::parse(src, S3_SCHEME)?;
        let content = match self.objects.lock().unwrap().get(&object_id(&location)) {
            Some(object) => object.content.clone(),
            None => return Ok(false),
        };
        std::fs::write(dst, content)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn identical_content_is_uploaded_once() -> anyhow::Result<()> {
        let uploader = MemoryUploader::new();
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"first version")?;
        file.flush()?;

        assert!(uploader.upload(file.path(), "s3://bucket/a").await?);
        assert!(!uploader.upload(file.path(), "s3://bucket/a").await?);
        assert_eq!(uploader.transfers(), 1);

        // one byte differs
        std::fs::write(file.path(), b"first versioN")?;
        assert!(uploader.upload(file.path(), "s3://bucket/a").await?);
        assert_eq!(uploader.transfers(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn missing_object_is_not_an_error() -> anyhow::Result<()> {
        let uploader = MemoryUploader::new();
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("download");

        assert!(!uploader.download_if_exists("s3://bucket/none", &target).await?);
        assert!(!target.exists());
        Ok(())
    }
}
