//! Database Backup Tool
//!
//! Dumps a database, archives and optionally encrypts the dump, and ships it
//! to S3 while expiring old remote archives.

// dumpvault/src/main.rs
mod backup;
mod config;
mod errors;
mod utils;

use anyhow::{Context, Result};
use backup::{
    BackupMode, BackupPipeline, BackupRequest, Encryptor, MongoDump, OpenSslCipher, S3Store,
};
use clap::{Args, Parser, Subcommand};
use config::Settings;
use errors::BackupError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "dumpvault", version, about = "Unattended database backups with S3 upload")]
struct Cli {
    /// Configuration file. Defaults to /etc/dumpvault/config.json, then ~/.dumpvault/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Back up a single database
    Backup {
        database: String,
        user: Option<String>,
        password: Option<String>,
        /// Database host [default: 127.0.0.1]
        host: Option<String>,
        #[command(flatten)]
        flags: PipelineFlags,
    },
    /// Back up every database with administrator credentials
    #[command(name = "backup_all")]
    BackupAll {
        /// Falls back to `admin_user` from the configuration
        admin_user: Option<String>,
        /// Falls back to `admin_password` from the configuration
        admin_password: Option<String>,
        #[command(flatten)]
        flags: PipelineFlags,
    },
    /// Decrypt an encrypted archive into <path>.tar.gz
    Decrypt {
        path: PathBuf,
        /// Overrides `password_file` from the configuration
        #[arg(long)]
        passphrase: Option<String>,
    },
}

#[derive(Debug, Args)]
struct PipelineFlags {
    /// Target directory for the dump [default: current directory]
    #[arg(long)]
    path: Option<PathBuf>,

    /// Upload the archive to S3 (Y/N)
    #[arg(long = "upload_s3", default_value = "N")]
    upload_s3: YesNo,

    /// Encrypt the archive (Y/N)
    #[arg(long, default_value = "Y")]
    encrypt: YesNo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct YesNo(bool);

impl FromStr for YesNo {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Ok(YesNo(true)),
            "n" | "no" => Ok(YesNo(false)),
            other => Err(format!("expected Y or N, got '{}'", other)),
        }
    }
}

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dumpvault=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run_app(cli).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<BackupError>() {
                Some(kind) => eprintln!("❌ Error ({}): {:#}", kind.kind(), e),
                None => eprintln!("❌ Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let (config_path, settings) = Settings::discover(cli.config.as_deref())?;
    info!(config = %config_path.display(), "Configuration loaded");

    match cli.command {
        Commands::Backup {
            database,
            user,
            password,
            host,
            flags,
        } => {
            let mode = BackupMode::Single {
                database: Some(database),
                username: user,
                password,
                host,
            };
            run_backup(&settings, mode, flags).await
        }
        Commands::BackupAll {
            admin_user,
            admin_password,
            flags,
        } => {
            let mode = BackupMode::All {
                username: admin_user,
                password: admin_password,
            };
            run_backup(&settings, mode, flags).await
        }
        Commands::Decrypt { path, passphrase } => {
            let encryptor = Encryptor::new(OpenSslCipher, settings.default_passphrase.clone());
            let output = encryptor
                .decrypt(&path, passphrase.as_deref())
                .with_context(|| format!("Failed to decrypt {}", path.display()))?;
            println!("Decrypted archive written to {}", output.display());
            Ok(())
        }
    }
}

async fn run_backup(settings: &Settings, mode: BackupMode, flags: PipelineFlags) -> Result<()> {
    let path = match flags.path {
        Some(path) => path,
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };
    let request = BackupRequest {
        mode,
        path,
        encrypt: flags.encrypt.0,
        upload: flags.upload_s3.0,
    };

    let store = if request.upload {
        Some(S3Store::connect(&settings.storage).await?)
    } else {
        None
    };

    println!("🚀 Starting Backup Process...");
    let pipeline = BackupPipeline::new(settings, MongoDump, OpenSslCipher, store);
    let outcome = pipeline.run(&request).await.context("Backup process failed")?;

    println!(
        "Backup file: {} (last stage: {})",
        outcome.artifact.display(),
        outcome.last_stage
    );
    if let Some(key) = outcome.remote_key {
        println!("Uploaded as: {}", key);
    }
    Ok(())
}
