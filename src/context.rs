// backupcron/src/context.rs
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::errors::Result;
use crate::uploader::Uploader;

pub const DEFAULT_LOG_TARGET: &str = "servermng.backup";

/// State shared by every operation of a run: where to log, where to upload,
/// and where temporary files go.
pub struct BackupContext<U> {
    log_target: String,
    uploader: U,
    temp_dir: Option<PathBuf>,
}

impl<U: Uploader> BackupContext<U> {
    pub fn new(uploader: U) -> Self {
        BackupContext {
            log_target: DEFAULT_LOG_TARGET.to_string(),
            uploader,
            temp_dir: None,
        }
    }

    pub fn with_log_target(mut self, target: impl Into<String>) -> Self {
        self.log_target = target.into();
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn log_target(&self) -> &str {
        &self.log_target
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    /// Creates a temporary file that is removed when the handle is dropped.
    pub fn temp_file(&self, suffix: &str) -> io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("backup-").suffix(suffix);
        match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }

    pub async fn upload_file(&self, src: &Path, dst: &str) -> Result<bool> {
        log::info!(target: self.log_target(), "Uploading to {}", dst);
        let uploaded = self.uploader.upload(src, dst).await?;
        if uploaded {
            log::info!(target: self.log_target(), "Uploaded to {}", dst);
        } else {
            log::info!(target: self.log_target(), "Upload skipped, {} is unchanged", dst);
        }
        Ok(uploaded)
    }

    pub async fn download_file_if_exists(&self, src: &str, dst: &Path) -> Result<bool> {
        log::debug!(target: self.log_target(), "Downloading {} to {}", src, dst.display());
        let found = self.uploader.download_if_exists(src, dst).await?;
        if !found {
            log::debug!(target: self.log_target(), "{} does not exist", src);
        }
        Ok(found)
    }
}
