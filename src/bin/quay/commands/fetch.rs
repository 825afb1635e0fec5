//! `quay fetch` command

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::FetchArgs;
use quay::core::SourceParseError;
use quay::{FetchCoordinator, FetchError, GlobalContext, PackageReference};

pub fn execute(args: FetchArgs, gctx: &GlobalContext, cache_dir: &Path) -> Result<()> {
    let reference = parse_reference(&args)?;

    let mut config = gctx.load_config();
    if args.offline {
        config.net.offline = true;
    }

    let coordinator = FetchCoordinator::open(cache_dir, config)
        .with_context(|| format!("failed to open cache at {}", cache_dir.display()))?;
    let result = coordinator.request(&reference)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&*result)?);
        return Ok(());
    }

    eprintln!("     Fetched {} ({})", reference, result.integrity);

    // Local sources are not cached; their snapshot does not outlive this run
    let path = match reference.source().local_path() {
        Some(origin) if !result.should_be_cached => origin,
        _ => result.cached_path.as_path(),
    };
    println!("{}", path.display());
    Ok(())
}

/// Parse the command line reference, reporting a bad source string as an
/// unsupported source of the named package.
fn parse_reference(args: &FetchArgs) -> Result<PackageReference> {
    PackageReference::parse(&args.name, &args.version, &args.source).map_err(|e| {
        match e.downcast::<SourceParseError>() {
            Ok(err) => FetchError::unparsable_source(&args.name, &args.version, &err).into(),
            Err(e) => e,
        }
    })
}
