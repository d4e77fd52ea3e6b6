//! `shipwright resolve` — Print a fully resolved application.

use std::path::PathBuf;

use clap::Args;
use shipwright_common::config::ResolverConfig;

use crate::output::{self, Format};

/// Arguments for the `resolve` command.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Path to the definition file.
    pub file: PathBuf,

    /// Name of the application to resolve.
    #[arg(short, long)]
    pub application: String,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Yaml)]
    pub format: Format,
}

/// Executes the `resolve` command.
///
/// # Errors
///
/// Returns an error if loading, resolution, or rendering fails.
pub fn execute(args: &ResolveArgs, config: &ResolverConfig) -> anyhow::Result<()> {
    let app = super::load_resolved(&args.file, &args.application, config)?;
    println!("{}", output::render(&app, args.format)?);
    Ok(())
}
