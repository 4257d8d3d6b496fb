// backupcron/src/backup/db_dump.rs
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tar::{Builder, Header};
use which::which;

use crate::context::BackupContext;
use crate::errors::AppError;
use crate::uploader::Uploader;

/// Produces a point-in-time copy of a live database at `destination`.
pub trait DatabaseDump {
    fn dump(&self, source: &Path, destination: &Path) -> Result<()>;
}

impl<F> DatabaseDump for F
where
    F: Fn(&Path, &Path) -> Result<()>,
{
    fn dump(&self, source: &Path, destination: &Path) -> Result<()> {
        self(source, destination)
    }
}

/// Online backup through the `sqlite3` command line shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sqlite3Dump;

// Helper function to find sqlite3 executable
fn find_sqlite3_executable() -> Result<PathBuf> {
    which("sqlite3").context(
        "sqlite3 executable not found in PATH. Please ensure the SQLite command line shell is installed.",
    )
}

/// Quotes a path for a sqlite3 dot-command. Single-quoted arguments are taken
/// literally by the shell, so double quotes with backslash escapes are used.
fn dot_command_arg(path: &Path) -> String {
    let escaped = path
        .to_string_lossy()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

impl DatabaseDump for Sqlite3Dump {
    fn dump(&self, source: &Path, destination: &Path) -> Result<()> {
        let sqlite3_path = find_sqlite3_executable()?;
        let output = Command::new(&sqlite3_path)
            .arg(source)
            .arg(format!(".backup {}", dot_command_arg(destination)))
            .output()
            .with_context(|| format!("Failed to execute sqlite3 for {}", source.display()))?;

        if !output.status.success() {
            return Err(AppError::Command {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
            .with_context(|| format!("sqlite3 backup of {} failed", source.display()));
        }
        Ok(())
    }
}

/// Adds a consistent snapshot of the SQLite database at `src` using the `sqlite3` shell.
pub fn add_sqlite_file<U, W>(
    ctx: &BackupContext<U>,
    tar: &mut Builder<W>,
    src: &Path,
    archive_name: &str,
) -> Result<()>
where
    U: Uploader,
    W: Write,
{
    add_database_file(ctx, tar, src, archive_name, &Sqlite3Dump)
}

/// Dumps the database at `src` and appends the dump as `archive_name`.
///
/// The entry carries the dump's bytes with the mtime, mode, uid and gid of the
/// original file, and blank owner names. A missing `src` is skipped silently.
pub fn add_database_file<U, W, D>(
    ctx: &BackupContext<U>,
    tar: &mut Builder<W>,
    src: &Path,
    archive_name: &str,
    dumper: &D,
) -> Result<()>
where
    U: Uploader,
    W: Write,
    D: DatabaseDump + ?Sized,
{
    if !src.is_file() {
        log::debug!(target: ctx.log_target(), "Skipping missing database {}", src.display());
        return Ok(());
    }

    let dump_file = ctx
        .temp_file(".db")
        .context("Failed to create temporary dump file")?;
    log::debug!(
        target: ctx.log_target(),
        "Dumping database from {} to {}",
        src.display(),
        dump_file.path().display()
    );
    dumper
        .dump(src, dump_file.path())
        .with_context(|| format!("Failed to dump database {}", src.display()))?;

    let src_meta = fs::metadata(src)
        .with_context(|| format!("Failed to read metadata of {}", src.display()))?;
    let dump = fs::File::open(dump_file.path())?;
    let dump_meta = dump.metadata()?;

    let mut header = Header::new_gnu();
    header.set_metadata(&dump_meta);
    header.set_mtime(u64::try_from(src_meta.mtime()).unwrap_or(0));
    header.set_mode(src_meta.mode() & 0o7777);
    header.set_uid(u64::from(src_meta.uid()));
    header.set_gid(u64::from(src_meta.gid()));
    header.set_username("")?;
    header.set_groupname("")?;

    tar.append_data(&mut header, archive_name, dump)
        .with_context(|| format!("Failed to append {} to archive", archive_name))?;
    Ok(())
}
