//! `quay cache` command
//!
//! Inspect and maintain the shared package cache.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::{CacheArgs, CacheCommands, CacheListArgs};
use quay::ops::list_entries;
use quay::sources::CacheStore;
use quay::util::diagnostic::{emit, suggestions, Diagnostic};
use quay::GlobalContext;

pub fn execute(args: CacheArgs, gctx: &GlobalContext, cache_dir: &Path) -> Result<()> {
    match args.command {
        CacheCommands::Path => {
            println!("{}", cache_dir.display());
            Ok(())
        }
        CacheCommands::List(list_args) => list_cache(list_args, cache_dir),
        CacheCommands::Clean => clean_cache(cache_dir),
        CacheCommands::Verify => verify_cache(gctx, cache_dir),
    }
}

fn open(cache_dir: &Path) -> Result<CacheStore> {
    CacheStore::open(cache_dir)
        .with_context(|| format!("failed to open cache at {}", cache_dir.display()))
}

/// List cached packages.
fn list_cache(args: CacheListArgs, cache_dir: &Path) -> Result<()> {
    let listings = list_entries(&open(cache_dir)?)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    if listings.is_empty() {
        println!("(empty)");
    }
    for listing in &listings {
        println!("{}", listing.summary());
    }
    Ok(())
}

fn clean_cache(cache_dir: &Path) -> Result<()> {
    let removed = open(cache_dir)?.clean()?;
    match removed {
        0 => eprintln!("     Nothing to clean"),
        1 => eprintln!("     Removed 1 entry"),
        n => eprintln!("     Removed {} entries", n),
    }
    Ok(())
}

fn verify_cache(gctx: &GlobalContext, cache_dir: &Path) -> Result<()> {
    let store = open(cache_dir)?;
    let report = store.verify_all()?;

    for (key, reason) in &report.corrupt {
        let diag = Diagnostic::warning(format!("evicted corrupt cache entry `{}`", key))
            .with_location(store.entry_dir(key))
            .with_context(reason.clone())
            .with_suggestion(suggestions::CORRUPT_CACHE);
        emit(&diag, gctx.color());
    }
    eprintln!(
        "     Checked {} entries, {} corrupt",
        report.checked,
        report.corrupt.len()
    );
    Ok(())
}
