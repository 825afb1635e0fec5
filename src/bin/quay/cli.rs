//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Quay - fetch, verify and cache package sources
#[derive(Parser)]
#[command(name = "quay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Cache directory (defaults to the platform cache dir)
    #[arg(long, global = true, env = "QUAY_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch one package into the cache and print where it lives
    Fetch(FetchArgs),

    /// Inspect and maintain the package cache
    Cache(CacheArgs),
}

#[derive(Args)]
pub struct FetchArgs {
    /// Package name
    pub name: String,

    /// Exact package version
    pub version: String,

    /// Source descriptor (e.g. `tarball+https://host/pkg-1.0.0.tgz#sha256:...`)
    pub source: String,

    /// Never touch the network; serve from the cache only
    #[arg(long)]
    pub offline: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show cache directory path
    Path,

    /// List published entries
    List(CacheListArgs),

    /// Remove every entry
    Clean,

    /// Re-hash every entry, evicting corrupt ones
    Verify,
}

#[derive(Args)]
pub struct CacheListArgs {
    /// Print entries as JSON
    #[arg(long)]
    pub json: bool,
}
