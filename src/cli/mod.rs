pub mod csi;
pub mod reconcile;
pub mod sources;
pub mod sync;
pub mod validate;

use std::path::{Path, PathBuf};

use chrono::Datelike;
use clap::{Args, Parser, Subcommand};

use crate::context::AppContext;
use crate::descriptor::{get_by_key, SourceDescriptor};
use crate::error::{Result, SyncError};
use crate::pipeline::SyncOptions;
use crate::settings::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "burc-sync",
    version,
    about = "Sync BURC workbook data (pipeline, attrition, CSI ratios) into the dashboard store."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Parse and compute everything, but write nothing
    #[arg(long = "dry-run", global = true)]
    pub dry_run: bool,
    /// Per-record diagnostics
    #[arg(long, short, global = true)]
    pub verbose: bool,
    /// Secrets file with the store credentials (default from settings: .env.local)
    #[arg(long, global = true)]
    pub secrets: Option<PathBuf>,
    /// Use a local SQLite database instead of the hosted store
    #[arg(long, global = true)]
    pub local: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract a source sheet and replace its rows for the fiscal year.
    Sync {
        /// Built-in source key (see `burc-sync sources`)
        #[arg(long, default_value = "burc-pipeline")]
        source: String,
        /// JSON source descriptor; overrides --source
        #[arg(long)]
        descriptor: Option<PathBuf>,
        /// Workbook path (default: the workbook configured for the year)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Fiscal year (default: current year)
        #[arg(long = "fiscal-year")]
        fiscal_year: Option<i32>,
    },
    /// Match workbook pipeline records against the sales pipeline table.
    Reconcile {
        #[arg(long, default_value = "burc-pipeline")]
        source: String,
        #[arg(long)]
        descriptor: Option<PathBuf>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long = "fiscal-year")]
        fiscal_year: Option<i32>,
    },
    /// Extract monthly NR/OPEX and compute CSI operating ratios.
    Csi {
        /// APAC Performance xlsx or monthly BURC xlsb
        #[arg(long)]
        file: Option<PathBuf>,
        /// Fiscal year (default: current year)
        #[arg(long)]
        year: Option<i32>,
        /// Single month 1-12 (required for xlsb files after 2023)
        #[arg(long)]
        month: Option<u32>,
    },
    /// Check stored records for a source. Exits 0 pass, 1 fail, 2 warnings.
    Validate {
        #[arg(long, default_value = "burc-pipeline")]
        source: String,
        #[arg(long)]
        descriptor: Option<PathBuf>,
        #[arg(long = "fiscal-year")]
        fiscal_year: Option<i32>,
    },
    /// List built-in source descriptors.
    Sources,
}

pub(crate) fn current_year() -> i32 {
    chrono::Local::now().year()
}

pub(crate) fn options(global: &GlobalArgs, settings: &Settings) -> SyncOptions {
    SyncOptions {
        dry_run: global.dry_run,
        batch_size: settings.batch_size,
    }
}

pub(crate) fn context(global: &GlobalArgs) -> Result<AppContext> {
    AppContext::init(load_settings(), global.secrets.as_deref(), global.local.as_deref())
}

/// A descriptor file wins over a built-in key.
pub(crate) fn resolve_descriptor(source: &str, descriptor: Option<&Path>) -> Result<SourceDescriptor> {
    if let Some(path) = descriptor {
        return SourceDescriptor::from_json_file(path);
    }
    get_by_key(source)
        .map(|kind| kind.descriptor())
        .ok_or_else(|| SyncError::UnknownSource(source.to_string()))
}

pub(crate) fn resolve_workbook(settings: &Settings, file: Option<PathBuf>, year: i32) -> Result<PathBuf> {
    let path = match file {
        Some(f) => f,
        None => settings
            .workbook_for_year(year)
            .ok_or_else(|| SyncError::Settings(format!("No file configured for year {year}")))?,
    };
    if !path.exists() {
        return Err(SyncError::Other(format!("File not found: {}", path.display())));
    }
    Ok(path)
}
