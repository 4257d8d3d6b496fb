pub mod extract;

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::AppConfig;
use crate::context::BackupContext;
use crate::uploader::Uploader;

pub use extract::{Compression, extract_archive};

/// Downloads the archive at `src` and unpacks it into `dst`.
///
/// Returns `false` without touching `dst` when no archive exists yet. The
/// downloaded file is removed whether or not extraction succeeds.
pub async fn download_and_extract<U: Uploader>(
    ctx: &BackupContext<U>,
    src: &str,
    dst: &Path,
) -> Result<bool> {
    log::info!(target: ctx.log_target(), "Restoring from {} to {}", src, dst.display());

    let download = ctx
        .temp_file("")
        .context("Failed to create temporary download file")?;
    let found = ctx
        .download_file_if_exists(src, download.path())
        .await
        .with_context(|| format!("Failed to download {}", src))?;
    if !found {
        log::info!(target: ctx.log_target(), "No backup is found");
        return Ok(false);
    }

    log::debug!(target: ctx.log_target(), "Extracting to {}", dst.display());
    std::fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create extraction directory: {}", dst.display()))?;
    let compression = extract_archive(download.path(), dst)?;
    log::info!(
        target: ctx.log_target(),
        "Restored {:?} compressed archive {} to {}",
        compression,
        src,
        dst.display()
    );
    Ok(true)
}

/// Restores the configured archive into the configured restore directory.
pub async fn run_restore_flow<U: Uploader>(ctx: &BackupContext<U>, config: &AppConfig) -> Result<bool> {
    let restore_dir = config
        .restore_dir
        .as_deref()
        .context("restore_dir must be set in config.json for restore")?;
    download_and_extract(ctx, &config.archive_destination(), restore_dir).await
}
