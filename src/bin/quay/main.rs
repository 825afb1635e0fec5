//! Quay CLI - fetch and cache package sources

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use quay::util::diagnostic::emit;
use quay::{FetchError, GlobalContext};

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color;

    if let Err(e) = run(cli) {
        match e.downcast_ref::<FetchError>() {
            Some(fetch_err) => emit(&fetch_err.to_diagnostic(), color),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut gctx = GlobalContext::new()?;
    gctx.set_verbose(cli.verbose);
    gctx.set_color(!cli.no_color);

    // Set up logging
    let filter = if gctx.is_verbose() {
        EnvFilter::new("quay=debug")
    } else {
        EnvFilter::new("quay=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cache_dir = cli
        .cache_dir
        .unwrap_or_else(|| gctx.cache_dir().to_path_buf());

    match cli.command {
        Commands::Fetch(args) => commands::fetch::execute(args, &gctx, &cache_dir),
        Commands::Cache(args) => commands::cache::execute(args, &gctx, &cache_dir),
    }
}
