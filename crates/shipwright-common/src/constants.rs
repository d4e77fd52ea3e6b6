//! System-wide constants.

/// YAML tag marking a node as a deferred expression.
pub const LAZY_TAG: &str = "lazy";

/// Reserved key holding an entity's own name.
pub const NAME_KEY: &str = "name";

/// Reserved key holding an entity's driver discriminator.
pub const TYPE_KEY: &str = "_type";

/// Reserved key holding an entity's variable blocks.
pub const VARIABLES_KEY: &str = "_variables";

/// Reserved key listing the member services of a chart.
pub const CHART_SERVICES_KEY: &str = "_services";

/// Reserved key holding an explicit service ordering.
pub const SERVICE_ORDER_KEY: &str = "_service_order";

/// Escape accessor bound to the raw merged scope layer.
pub const CONTEXT_BINDING: &str = "context";

/// Escape accessor bound to the owning application.
pub const APPLICATION_BINDING: &str = "application";

/// Environment variable enabling permissive variable resolution.
pub const ENV_FORCE_VARIABLE_DEFINITION: &str = "SHIPWRIGHT_FORCE_VARIABLE_DEFINITION";

/// Environment variable overriding the substituted default.
pub const ENV_MISSING_DEFAULT: &str = "SHIPWRIGHT_MISSING_DEFAULT";
