// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use ims_load_artifacts::Config;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Log filter: LOG_LEVEL, else RUST_LOG, else warnings only
fn env_filter(config: &Config) -> EnvFilter {
    config
        .log_level
        .as_deref()
        .map(|level| match level.to_lowercase().as_str() {
            "warning" => "warn".to_string(),
            other => other.to_string(),
        })
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

fn init_tracing(config: &Config) {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(config));
    if config.in_release_mode() {
        // The release tool captures plain "LEVEL message" lines
        builder
            .compact()
            .without_time()
            .with_target(false)
            .init();
    } else {
        builder.init();
    }
}

fn run(config: &Config, command: Option<Commands>) -> Result<bool> {
    let command = command.unwrap_or(if config.in_release_mode() {
        Commands::Iuf {
            release_path: None,
            manifest: None,
        }
    } else {
        Commands::Load { manifest: None }
    });

    match command {
        Commands::Load { manifest } => commands::cmd_load(config, manifest),
        Commands::Iuf {
            release_path,
            manifest,
        } => commands::cmd_iuf(config, release_path, manifest),
        Commands::Normalize {
            release_path,
            manifest,
        } => commands::cmd_normalize(config, release_path, manifest).map(|()| true),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_tracing(&config);

    match run(&config, cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
