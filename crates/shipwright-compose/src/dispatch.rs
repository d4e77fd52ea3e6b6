//! Driver selection and deployment ordering.
//!
//! Every service names its driver through `_type`. Chart services bundle
//! other services (listed in `_services`); bundled services are deployed as
//! part of their chart and drop out of the top-level order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shipwright_common::constants::CHART_SERVICES_KEY;
use shipwright_common::error::{Result, ShipwrightError};

use crate::model::{Application, Entity};

/// The closed set of deployment drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Helm chart install/upgrade.
    Helm,
    /// Raw manifest apply.
    Apply,
    /// Chart generated from bundled services.
    Chart,
    /// Wait for a condition before continuing.
    Wait,
    /// Label patch on an existing resource.
    Label,
    /// Generic secret materialization.
    SecretGeneric,
    /// Create on install, replace on upgrade.
    CreateReplace,
}

impl DriverKind {
    /// Every driver kind.
    pub const ALL: [Self; 7] = [
        Self::Helm,
        Self::Apply,
        Self::Chart,
        Self::Wait,
        Self::Label,
        Self::SecretGeneric,
        Self::CreateReplace,
    ];

    /// Returns the `_type` spelling of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Helm => "helm",
            Self::Apply => "apply",
            Self::Chart => "chart",
            Self::Wait => "wait",
            Self::Label => "label",
            Self::SecretGeneric => "secret_generic",
            Self::CreateReplace => "create_replace",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = ShipwrightError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ShipwrightError::Config {
                message: format!("unknown service type: \"{s}\""),
            })
    }
}

/// One entry of the deployment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentStep {
    /// Service name.
    pub service: String,
    /// Driver handling the service.
    pub driver: DriverKind,
    /// Services bundled into this step (charts only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
}

/// Returns the driver kind of a service.
///
/// # Errors
///
/// Returns an error if `_type` is missing or unknown.
pub fn driver_kind(service: &Entity) -> Result<DriverKind> {
    service
        .kind
        .as_deref()
        .ok_or_else(|| ShipwrightError::Config {
            message: format!("service \"{}\" has no _type", service.name),
        })?
        .parse()
}

/// Returns the member services listed by a chart.
///
/// # Errors
///
/// Returns an error if `_services` is present but not a list of names.
pub fn chart_members(chart: &Entity) -> Result<Vec<String>> {
    let Some(value) = chart.attribute(CHART_SERVICES_KEY) else {
        return Ok(Vec::new());
    };
    let not_names = || ShipwrightError::Config {
        message: format!(
            "chart \"{}\": {CHART_SERVICES_KEY} must be a list of service names",
            chart.name
        ),
    };
    value
        .as_list()
        .ok_or_else(not_names)?
        .iter()
        .map(|item| item.as_str().map(str::to_owned).ok_or_else(not_names))
        .collect()
}

/// Computes the top-level deployment order of `app`.
///
/// Follows `service_order`; services bundled by a chart are removed from the
/// sequence and reported as that chart's members.
///
/// # Errors
///
/// Returns an error if a referenced service does not exist, a `_type` is
/// missing or unknown, or a chart lists members malformed.
pub fn deployment_order(app: &Application) -> Result<Vec<DeploymentStep>> {
    let mut steps = Vec::with_capacity(app.service_order.len());
    let mut bundled = Vec::new();

    for name in &app.service_order {
        let service = find_service(app, name)?;
        let driver = driver_kind(service)?;
        let members = if driver == DriverKind::Chart {
            chart_members(service)?
        } else {
            Vec::new()
        };
        for member in &members {
            let _ = find_service(app, member)?;
        }
        bundled.extend(members.iter().cloned());
        steps.push(DeploymentStep {
            service: name.clone(),
            driver,
            members,
        });
    }

    steps.retain(|step| !bundled.contains(&step.service));
    tracing::debug!(application = %app.name, steps = steps.len(), "computed deployment order");
    Ok(steps)
}

fn find_service<'a>(app: &'a Application, name: &str) -> Result<&'a Entity> {
    app.service(name).ok_or_else(|| ShipwrightError::NotFound {
        kind: "service",
        id: format!("\"{name}\" in application \"{}\"", app.name),
    })
}
