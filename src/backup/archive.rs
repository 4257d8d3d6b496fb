// backupcron/src/backup/archive.rs
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tar::Builder;
use xz2::write::XzEncoder;

use crate::context::BackupContext;
use crate::uploader::Uploader;

pub const ARCHIVE_SUFFIX: &str = ".tar.xz";
const XZ_PRESET: u32 = 6;

/// Tar stream handed to archive population callbacks.
pub type TarWriter = Builder<XzEncoder<File>>;

/// Builds an xz compressed tarball in a temporary file and uploads it to `destination`.
///
/// `populate` fills the archive. The archive is finished and flushed before
/// the upload begins, and the temporary file is removed whether or not any
/// step fails. Returns whether the upload actually transferred content.
pub async fn upload_archive<U, F>(
    ctx: &BackupContext<U>,
    destination: &str,
    populate: F,
) -> Result<bool>
where
    U: Uploader,
    F: FnOnce(&BackupContext<U>, &mut TarWriter) -> Result<()>,
{
    let archive_file = ctx
        .temp_file(ARCHIVE_SUFFIX)
        .context("Failed to create temporary archive file")?;
    log::debug!(
        target: ctx.log_target(),
        "Creating archive to {}",
        archive_file.path().display()
    );

    let writer = archive_file.reopen().with_context(|| {
        format!(
            "Failed to open archive file: {}",
            archive_file.path().display()
        )
    })?;
    let mut tar_builder = Builder::new(XzEncoder::new(writer, XZ_PRESET));

    populate(ctx, &mut tar_builder).context("Failed to populate archive")?;

    let encoder = tar_builder.into_inner().with_context(|| {
        format!(
            "Failed to finish tar stream for archive: {}",
            archive_file.path().display()
        )
    })?;
    let mut file = encoder.finish().with_context(|| {
        format!(
            "Failed to finish xz encoding for archive: {}",
            archive_file.path().display()
        )
    })?;
    file.flush()?;
    file.sync_all()?;
    drop(file);

    let changed = ctx
        .upload_file(archive_file.path(), destination)
        .await
        .with_context(|| format!("Failed to upload archive to {}", destination))?;
    Ok(changed)
}

/// Appends a plain file or directory tree under `archive_name`, keeping its metadata.
///
/// A missing source is skipped silently.
pub fn add_file<U, W>(
    ctx: &BackupContext<U>,
    tar: &mut Builder<W>,
    src: &Path,
    archive_name: &str,
) -> Result<()>
where
    U: Uploader,
    W: Write,
{
    if src.is_dir() {
        log::debug!(target: ctx.log_target(), "Adding directory {} as {}", src.display(), archive_name);
        tar.append_dir_all(archive_name, src).with_context(|| {
            format!("Failed to append directory {} to archive", src.display())
        })?;
    } else if src.is_file() {
        log::debug!(target: ctx.log_target(), "Adding file {} as {}", src.display(), archive_name);
        tar.append_path_with_name(src, archive_name).with_context(|| {
            format!(
                "Failed to append file {} as {} to archive",
                src.display(),
                archive_name
            )
        })?;
    } else {
        log::debug!(target: ctx.log_target(), "Skipping missing source {}", src.display());
    }
    Ok(())
}
