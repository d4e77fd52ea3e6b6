//! CLI command definitions and dispatch.

pub mod plan;
pub mod resolve;

use std::path::Path;

use clap::{Args, Parser, Subcommand};
use shipwright_common::config::{MissingBindingPolicy, NestedDeferredPolicy, ResolverConfig};
use shipwright_common::constants::{ENV_FORCE_VARIABLE_DEFINITION, ENV_MISSING_DEFAULT};
use shipwright_compose::model::Application;

/// Shipwright — resolve configuration-as-code application definitions.
#[derive(Parser, Debug)]
#[command(name = "shipwright", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Variable resolution options.
    #[command(flatten)]
    pub resolution: ResolutionArgs,
}

/// Options controlling how unbound names and odd shapes are handled.
#[derive(Args, Debug, Default)]
pub struct ResolutionArgs {
    /// Substitute a default for undefined variables instead of failing.
    #[arg(long, global = true, env = ENV_FORCE_VARIABLE_DEFINITION)]
    pub force_variable_definition: bool,

    /// Text substituted for undefined variables (null if omitted).
    #[arg(long, global = true, env = ENV_MISSING_DEFAULT)]
    pub missing_default: Option<String>,

    /// Do not log a warning for each substituted variable.
    #[arg(long, global = true)]
    pub quiet_missing: bool,

    /// Leave maps of deferred values inside lists unresolved.
    #[arg(long, global = true)]
    pub pass_through_nested: bool,
}

impl ResolutionArgs {
    /// Builds the resolver configuration from the flags.
    #[must_use]
    pub fn config(&self) -> ResolverConfig {
        ResolverConfig {
            force_variable_definition: self.force_variable_definition,
            missing_binding: if self.quiet_missing {
                MissingBindingPolicy::Substitute
            } else {
                MissingBindingPolicy::Warn
            },
            missing_default: self.missing_default.clone(),
            nested_deferred: if self.pass_through_nested {
                NestedDeferredPolicy::PassThrough
            } else {
                NestedDeferredPolicy::Reject
            },
        }
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve all variables and print the resulting application.
    Resolve(resolve::ResolveArgs),
    /// Print the deployment order of a resolved application.
    Plan(plan::PlanArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.resolution.config();
    match cli.command {
        Command::Resolve(args) => resolve::execute(&args, &config),
        Command::Plan(args) => plan::execute(&args, &config),
    }
}

/// Loads `application` from `file` and resolves it.
fn load_resolved(
    file: &Path,
    application: &str,
    config: &ResolverConfig,
) -> anyhow::Result<Application> {
    tracing::debug!(file = %file.display(), application, "loading definition");
    let mut app = shipwright_compose::loader::load_file(file, application)?;
    shipwright_compose::resolver::resolve_application(&mut app, config)?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags_are_strict() {
        assert_eq!(ResolutionArgs::default().config(), ResolverConfig::strict());
    }

    #[test]
    fn flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "shipwright",
            "--force-variable-definition",
            "--missing-default",
            "unset",
            "--quiet-missing",
            "resolve",
            "app.shipwright.yml",
            "--application",
            "web",
        ])
        .expect("should parse");
        let config = cli.resolution.config();
        assert!(config.force_variable_definition);
        assert_eq!(config.missing_default.as_deref(), Some("unset"));
        assert_eq!(config.missing_binding, MissingBindingPolicy::Substitute);
        assert_eq!(config.nested_deferred, NestedDeferredPolicy::Reject);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "shipwright",
            "plan",
            "app.shipwright.yml",
            "-a",
            "web",
            "--pass-through-nested",
        ])
        .expect("should parse");
        assert_eq!(
            cli.resolution.config().nested_deferred,
            NestedDeferredPolicy::PassThrough
        );
        assert!(matches!(cli.command, Command::Plan(_)));
    }
}
