//! Backup/Restore Tool
//!
//! Provides CLI interface for scheduled backups and restores

// backupcron/src/main.rs
use anyhow::{Context, Result};
use backupcron::config::AppConfig;
use backupcron::{BackupContext, S3Uploader, backup, create_context, restore};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

const CONFIG_PATH_VAR: &str = "BACKUP_CONFIG";

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    backupcron::setup();

    match run_app().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let config_path = env::var(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    let mut ctx = create_context().context("Failed to create backup context")?;
    if let Some(temp_dir) = &config.temp_dir {
        ctx = ctx.with_temp_dir(temp_dir);
    }

    match choice.as_str() {
        "1" | "backup" => {
            log::info!(
                "Backing up to {} every {} seconds",
                config.archive_destination(),
                config.interval_secs
            );
            match backupcron::cron(
                &ctx,
                async |ctx: &BackupContext<S3Uploader>| {
                    backup::run_backup_flow(ctx, &config).await.map(|_| ())
                },
                config.interval_secs,
            )
            .await
            {}
        }
        "2" | "backup-once" => {
            backup::run_backup_flow(&ctx, &config)
                .await
                .context("Backup process failed")?;
        }
        "3" | "restore" => {
            if !restore::run_restore_flow(&ctx, &config)
                .await
                .context("Restore process failed")?
            {
                log::warn!("Nothing restored, {} does not exist", config.archive_destination());
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid choice {:?}. Use '1' (backup), '2' (backup-once) or '3' (restore).",
                choice
            );
        }
    }
    Ok(())
}

/// Prompts user to select an operation
///
/// Returns the user's choice as String
fn prompt_choice() -> Result<String> {
    use std::io::{Write, stdin, stdout};

    println!("Select an operation:");
    println!("1. Run scheduled backups (or type 'backup')");
    println!("2. Take a single backup (or type 'backup-once')");
    println!("3. Restore latest backup (or type 'restore')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
