// backupcron/src/restore/extract.rs
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use xz2::read::XzDecoder;

const XZ_MAGIC: &[u8] = &[0xFD, b'7', b'z', b'X', b'Z', 0x00];
const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Xz,
    Gzip,
    None,
}

impl Compression {
    pub fn detect(magic: &[u8]) -> Self {
        if magic.starts_with(XZ_MAGIC) {
            Compression::Xz
        } else if magic.starts_with(GZIP_MAGIC) {
            Compression::Gzip
        } else {
            Compression::None
        }
    }
}

fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Unpacks a tarball into `extract_to_dir`, detecting its compression from the leading bytes.
///
/// Permissions and mtimes are restored. Numeric uid/gid from the archive are
/// applied when running as root; owner names are never resolved.
pub fn extract_archive(archive_path: &Path, extract_to_dir: &Path) -> Result<Compression> {
    let mut archive_file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive file: {}", archive_path.display()))?;

    let mut magic = Vec::with_capacity(XZ_MAGIC.len());
    (&mut archive_file)
        .take(XZ_MAGIC.len() as u64)
        .read_to_end(&mut magic)?;
    archive_file.seek(SeekFrom::Start(0))?;

    if magic.is_empty() {
        anyhow::bail!("Archive {} is empty", archive_path.display());
    }

    let compression = Compression::detect(&magic);
    let reader = BufReader::new(archive_file);
    let stream: Box<dyn Read> = match compression {
        Compression::Xz => Box::new(XzDecoder::new(reader)),
        Compression::Gzip => Box::new(GzDecoder::new(reader)),
        Compression::None => Box::new(reader),
    };

    let mut archive = tar::Archive::new(stream);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_preserve_ownerships(running_as_root());

    let unpack_failed = || {
        format!(
            "Failed to unpack {:?} archive {} to {}",
            compression,
            archive_path.display(),
            extract_to_dir.display()
        )
    };
    let dst = extract_to_dir
        .canonicalize()
        .unwrap_or_else(|_| extract_to_dir.to_path_buf());

    // Directories are applied last so their mtimes survive the files written into them.
    let mut directories = Vec::new();
    let mut unpacked = 0usize;
    for entry in archive.entries().with_context(unpack_failed)? {
        let mut entry = entry.with_context(unpack_failed)?;
        unpacked += 1;
        if entry.header().entry_type() == tar::EntryType::Directory {
            directories.push(entry);
        } else {
            entry.unpack_in(&dst).with_context(unpack_failed)?;
        }
    }
    for mut dir in directories.into_iter().rev() {
        dir.unpack_in(&dst).with_context(unpack_failed)?;
    }

    if unpacked == 0 {
        anyhow::bail!(
            "Archive {} contains no entries",
            archive_path.display()
        );
    }
    Ok(compression)
}
