//! Formatted output helpers for CLI commands.

use std::fmt::Write as _;

use clap::ValueEnum;
use shipwright_compose::dispatch::DeploymentStep;
use shipwright_compose::model::Application;

/// Serialization format for resolved applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// YAML document.
    Yaml,
    /// Pretty-printed JSON.
    Json,
}

/// Serializes a resolved application.
///
/// # Errors
///
/// Returns an error if the application still holds deferred values.
pub fn render(app: &Application, format: Format) -> anyhow::Result<String> {
    let text = match format {
        Format::Yaml => serde_yaml::to_string(app)?,
        Format::Json => serde_json::to_string_pretty(app)?,
    };
    Ok(text)
}

/// Renders the deployment plan as text.
#[must_use]
pub fn plan_table(application: &str, steps: &[DeploymentStep]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Deployment Plan for: {application}");
    let _ = writeln!(out, "{}", "\u{2550}".repeat(35));
    let _ = writeln!(out);

    let width = steps.iter().map(|s| s.service.len()).max().unwrap_or(0);
    for step in steps {
        let _ = writeln!(out, "  + {:<width$}  [{}]", step.service, step.driver);
        for member in &step.members {
            let _ = writeln!(out, "      - {member}");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "  {} step(s) will be deployed.", steps.len());
    out
}
