pub mod archive;
pub mod db_dump;

use anyhow::Result;

use crate::config::AppConfig;
use crate::context::BackupContext;
use crate::uploader::Uploader;

pub use archive::{TarWriter, add_file, upload_archive};
pub use db_dump::{DatabaseDump, Sqlite3Dump, add_database_file, add_sqlite_file};

/// One backup run: archives every configured file and SQLite database and
/// uploads the archive to the configured destination.
pub async fn run_backup_flow<U: Uploader>(ctx: &BackupContext<U>, config: &AppConfig) -> Result<bool> {
    upload_archive(ctx, &config.archive_destination(), |ctx, tar| {
        for source in &config.files {
            add_file(ctx, tar, &source.path, &source.archive_name)?;
        }
        for database in &config.sqlite_databases {
            add_sqlite_file(ctx, tar, &database.path, &database.archive_name)?;
        }
        Ok(())
    })
    .await
}
