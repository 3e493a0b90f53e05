mod builder;
mod classifier;
mod cli;
mod context;
mod csi;
mod db;
mod descriptor;
mod error;
mod fmt;
mod matcher;
mod models;
mod normaliser;
mod pipeline;
mod reconcile;
mod report;
#[cfg(feature = "rest")]
mod rest;
mod settings;
mod sheet;
mod sink;
mod store;
mod validate;

use clap::Parser;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let level = if cli.global.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let global = &cli.global;
    let result = match cli.command {
        Commands::Sync {
            source,
            descriptor,
            file,
            fiscal_year,
        } => cli::sync::run(global, &source, descriptor, file, fiscal_year).map(|_| 0),
        Commands::Reconcile {
            source,
            descriptor,
            file,
            fiscal_year,
        } => cli::reconcile::run(global, &source, descriptor, file, fiscal_year).map(|_| 0),
        Commands::Csi { file, year, month } => cli::csi::run(global, file, year, month).map(|_| 0),
        Commands::Validate {
            source,
            descriptor,
            fiscal_year,
        } => cli::validate::run(global, &source, descriptor, fiscal_year),
        Commands::Sources => cli::sources::run().map(|_| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
