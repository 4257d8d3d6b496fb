// backupcron/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::AppError;
use crate::uploader::RemoteLocation;
use crate::uploader::s3::S3_SCHEME;

pub const ACCESS_KEY_ID_VAR: &str = "BACKUP_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY_VAR: &str = "BACKUP_SECRET_ACCESS_KEY";
pub const ENDPOINT_VAR: &str = "BACKUP_S3_ENDPOINT";
pub const REGION_VAR: &str = "BACKUP_S3_REGION";

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_ARCHIVE_NAME: &str = "backup.tar.xz";
const DEFAULT_INTERVAL_SECS: f64 = 3600.0;
const MAX_INTERVAL_SECS: f64 = 366.0 * 24.0 * 3600.0;

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonSource {
    pub path: PathBuf,
    pub archive_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub destination: Option<String>,
    pub archive_name: Option<String>,
    pub interval_secs: Option<f64>,
    pub temp_dir: Option<PathBuf>,
    pub restore_dir: Option<PathBuf>,
    #[serde(default)]
    pub files: Vec<JsonSource>,
    #[serde(default)]
    pub sqlite_databases: Vec<JsonSource>,
}

// Application's internal configuration structs
#[derive(Debug, Clone, PartialEq)]
pub struct BackupSource {
    pub path: PathBuf,
    pub archive_name: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub destination: String,
    pub archive_name: String,
    pub interval_secs: f64,
    pub temp_dir: Option<PathBuf>,
    pub restore_dir: Option<PathBuf>,
    pub files: Vec<BackupSource>,
    pub sqlite_databases: Vec<BackupSource>,
}

/// Connection settings for the S3-compatible store.
#[derive(Clone)]
pub struct S3Settings {
    pub endpoint_url: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

impl S3Settings {
    pub fn from_env() -> crate::errors::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> crate::errors::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::Config(format!("{} is empty", name)))
        };
        let access_key_id = required(ACCESS_KEY_ID_VAR)?;
        let secret_access_key = required(SECRET_ACCESS_KEY_VAR)?;

        Ok(S3Settings {
            endpoint_url: lookup(ENDPOINT_VAR).filter(|v| !v.is_empty()),
            region: lookup(REGION_VAR)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key_id,
            secret_access_key,
        })
    }
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        Self::from_json_str(&config_content).with_context(|| {
            format!(
                "Failed to load configuration from {}",
                config_path.display()
            )
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: RawJsonConfig =
            serde_json::from_str(content).map_err(AppError::SerdeJson)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let destination = raw
            .destination
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| AppError::Config("destination must be set in config.json".into()))?;

        let archive_name = raw
            .archive_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string());

        // The archive key must resolve to a valid remote location.
        RemoteLocation::parse(
            &crate::uploader::join_remote_path(&destination, &archive_name),
            S3_SCHEME,
        )?;

        let interval_secs = raw.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS);
        if !(interval_secs > 0.0 && interval_secs <= MAX_INTERVAL_SECS) {
            return Err(AppError::Config(format!(
                "interval_secs must be between 0 and {} seconds, got {}",
                MAX_INTERVAL_SECS, interval_secs
            ))
            .into());
        }

        Ok(AppConfig {
            destination,
            archive_name,
            interval_secs,
            temp_dir: raw.temp_dir,
            restore_dir: raw.restore_dir,
            files: parse_sources(raw.files, "files")?,
            sqlite_databases: parse_sources(raw.sqlite_databases, "sqlite_databases")?,
        })
    }

    /// Full remote key of the archive.
    pub fn archive_destination(&self) -> String {
        crate::uploader::join_remote_path(&self.destination, &self.archive_name)
    }
}

/// Resolves each entry's archive name, defaulting to the source file name.
fn parse_sources(sources: Vec<JsonSource>, field: &str) -> Result<Vec<BackupSource>> {
    sources
        .into_iter()
        .map(|source| {
            let archive_name = match source.archive_name.filter(|n| !n.is_empty()) {
                Some(name) => name,
                None => source
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| {
                        AppError::Config(format!(
                            "{} entry {} has no file name; set archive_name",
                            field,
                            source.path.display()
                        ))
                    })?,
            };
            Ok(BackupSource {
                path: source.path,
                archive_name,
            })
        })
        .collect()
}
