pub mod cli;
pub mod config;
pub mod data;
pub mod detect;
pub mod error;
pub mod format;
pub mod ingest;
pub mod io_utils;
pub mod loader;
pub mod schema;
pub mod sink;
pub mod stage;
pub mod store;
pub mod validate;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("tse_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest(args) => ingest::execute(&args),
        Commands::Detect(args) => detect::execute(&args),
        Commands::Stage(args) => stage::execute(&args),
    }
}
