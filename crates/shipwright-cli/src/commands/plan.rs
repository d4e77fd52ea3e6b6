//! `shipwright plan` — Display the deployment order of an application.

use std::path::PathBuf;

use clap::Args;
use shipwright_common::config::ResolverConfig;
use shipwright_compose::dispatch;

use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the definition file.
    pub file: PathBuf,

    /// Name of the application to plan.
    #[arg(short, long)]
    pub application: String,
}

/// Executes the `plan` command.
///
/// Resolves the application, then lists each top-level service with the
/// driver that would deploy it. Nothing is executed.
///
/// # Errors
///
/// Returns an error if loading, resolution, or ordering fails.
pub fn execute(args: &PlanArgs, config: &ResolverConfig) -> anyhow::Result<()> {
    let app = super::load_resolved(&args.file, &args.application, config)?;
    let steps = dispatch::deployment_order(&app)?;
    print!("{}", output::plan_table(&app.name, &steps));
    Ok(())
}
