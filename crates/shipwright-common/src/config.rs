//! Configuration model for variable resolution.

use serde::{Deserialize, Serialize};

/// What happens when an expression references an unbound name while
/// permissive mode is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingBindingPolicy {
    /// Substitute the configured default silently.
    Substitute,
    /// Substitute the configured default and log a warning.
    #[default]
    Warn,
}

/// Treatment of a map inside a list that holds deferred values.
///
/// Only direct list elements are resolved. Lists nested in lists always pass
/// through unresolved; a nested map is a malformed shape unless allowed here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestedDeferredPolicy {
    /// Fail resolution with a malformed-shape error.
    #[default]
    Reject,
    /// Leave the nested map unresolved.
    PassThrough,
}

/// Options consumed by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// When set, unbound names no longer abort resolution.
    pub force_variable_definition: bool,
    /// Policy applied to unbound names in permissive mode.
    pub missing_binding: MissingBindingPolicy,
    /// Text substituted for an unbound name; `None` substitutes null.
    pub missing_default: Option<String>,
    /// Policy for maps of deferred values inside lists.
    pub nested_deferred: NestedDeferredPolicy,
}

impl ResolverConfig {
    /// Returns a strict configuration: every reference must be bound.
    #[must_use]
    pub fn strict() -> Self {
        Self::default()
    }

    /// Returns a permissive configuration substituting `default`.
    #[must_use]
    pub fn permissive(default: Option<String>) -> Self {
        Self {
            force_variable_definition: true,
            missing_default: default,
            ..Self::default()
        }
    }
}
