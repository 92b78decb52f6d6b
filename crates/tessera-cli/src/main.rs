//! Tessera CLI - command-line front end for the derivation and signing engine
//!
//! Seeds and mnemonics are read from flags or the environment and never
//! written anywhere; output is JSON on stdout, logs go to stderr.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Cli;
use crate::config::CliConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(CliConfig::default_path);
    let config = CliConfig::load_or_create(&config_path)?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Using config at {:?}", config_path);

    commands::run(cli.command, &config)
}
