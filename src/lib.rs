//! Scheduled backups of local files and SQLite databases into xz compressed
//! tarballs on S3-compatible object storage, with content-hash deduplication
//! and restore of the latest archive.

pub mod backup;
pub mod config;
pub mod context;
pub mod cron;
pub mod errors;
pub mod restore;
pub mod uploader;

pub use backup::{add_file, add_sqlite_file, upload_archive};
pub use context::BackupContext;
pub use cron::cron;
pub use restore::download_and_extract;
pub use uploader::{Uploader, join_remote_path, s3::S3Uploader};

use std::env;

/// Initialises logging at info level, or debug when `DEBUG=1`.
///
/// `RUST_LOG` still applies on top of the default level.
pub fn setup() {
    let debug = env::var("DEBUG").is_ok_and(|v| v == "1");
    let mut builder = env_logger::Builder::new();
    builder.filter_level(if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    builder.parse_default_env();
    if let Err(e) = builder.try_init() {
        eprintln!("Logger already initialised: {}", e);
    }
}

/// Context backed by the S3 uploader, with credentials read from the environment.
pub fn create_context() -> errors::Result<BackupContext<S3Uploader>> {
    Ok(BackupContext::new(S3Uploader::from_env()?))
}
