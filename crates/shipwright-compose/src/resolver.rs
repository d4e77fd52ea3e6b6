//! Variable resolution: replaces every deferred value in an application.
//!
//! A root scope is built from the application's variables plus an
//! `application` accessor. Each service and volume then gets its own scope
//! derived from that root (its variables and a `service`/`volume` accessor on
//! top), so nothing one entity binds is visible to the next.

use std::cell::OnceCell;

use shipwright_common::config::{NestedDeferredPolicy, ResolverConfig};
use shipwright_common::constants::APPLICATION_BINDING;
use shipwright_common::error::ShipwrightError;
use thiserror::Error;

use crate::expr::EvalError;
use crate::model::{Application, Deferred, Entity, EntityRole, Mapping, Value};
use crate::scope::Scope;

/// Failure to resolve an application, attributed to an entity and attribute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// An expression referenced a name with no binding.
    #[error("{entity}: attribute `{attribute}` references undefined binding `{name}`")]
    UndefinedBinding {
        /// Entity label, e.g. `service "db"`.
        entity: String,
        /// Dotted attribute path.
        attribute: String,
        /// The unbound name or path.
        name: String,
    },

    /// An expression failed for a reason other than an unbound name.
    #[error("{entity}: attribute `{attribute}` failed to evaluate: {message}")]
    ExpressionEvaluation {
        /// Entity label.
        entity: String,
        /// Dotted attribute path.
        attribute: String,
        /// Failure description.
        message: String,
    },

    /// An attribute holds deferred values where none are resolved.
    #[error("{entity}: attribute `{attribute}` has a malformed shape: {message}")]
    MalformedAttributeShape {
        /// Entity label.
        entity: String,
        /// Dotted attribute path.
        attribute: String,
        /// Shape description.
        message: String,
    },
}

impl From<ResolveError> for ShipwrightError {
    fn from(err: ResolveError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

/// Builds the read-only root scope of `app`.
#[must_use]
pub fn root_scope(app: &Application, config: &ResolverConfig) -> Scope {
    let mut scope = Scope::new(app.variables.merged()).with_config(config);
    scope.bind(APPLICATION_BINDING, app.merged_with_own_variables());
    scope
}

/// Derives the scope an entity's expressions are evaluated against.
#[must_use]
pub fn entity_scope(base: &Scope, role: EntityRole, entity: &Entity) -> Scope {
    let mut scope = base.derive(entity.variables.merged());
    scope.bind(role.binding(), entity.merged_with_own_variables());
    scope
}

/// Resolves every service and volume of `app` in place.
///
/// Services are resolved in declaration order, then volumes. Nothing is
/// written back unless every entity resolves.
///
/// # Errors
///
/// Returns the first [`ResolveError`] encountered; `app` is left unchanged.
pub fn resolve_application(
    app: &mut Application,
    config: &ResolverConfig,
) -> Result<(), ResolveError> {
    tracing::info!(
        application = %app.name,
        services = app.services.len(),
        volumes = app.volumes.len(),
        "resolving application variables"
    );
    let root = root_scope(app, config);

    let services = app
        .services
        .values()
        .map(|service| resolve_entity(&root, EntityRole::Service, service, config))
        .collect::<Result<Vec<_>, _>>()?;
    let volumes = app
        .volumes
        .values()
        .map(|volume| {
            volume
                .as_ref()
                .map(|v| resolve_entity(&root, EntityRole::Volume, v, config))
                .transpose()
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (service, attributes) in app.services.values_mut().zip(services) {
        service.attributes = attributes;
    }
    for (volume, attributes) in app.volumes.values_mut().zip(volumes) {
        if let (Some(volume), Some(attributes)) = (volume.as_mut(), attributes) {
            volume.attributes = attributes;
        }
    }
    Ok(())
}

/// Resolves the attributes of one entity against a scope derived from `base`.
///
/// The entity scope is only built if a deferred value is actually found.
///
/// # Errors
///
/// Returns a [`ResolveError`] naming the entity and attribute path.
pub fn resolve_entity(
    base: &Scope,
    role: EntityRole,
    entity: &Entity,
    config: &ResolverConfig,
) -> Result<Mapping, ResolveError> {
    tracing::debug!(%role, name = %entity.name, "resolving entity");
    let walker = Walker {
        base,
        role,
        entity,
        config,
        label: format!("{role} \"{}\"", entity.name),
        scope: OnceCell::new(),
    };
    entity
        .attributes
        .iter()
        .map(|(key, value)| Ok((key.clone(), walker.resolve_attribute(key, value)?)))
        .collect()
}

struct Walker<'a> {
    base: &'a Scope,
    role: EntityRole,
    entity: &'a Entity,
    config: &'a ResolverConfig,
    label: String,
    scope: OnceCell<Scope>,
}

impl Walker<'_> {
    fn scope(&self) -> &Scope {
        self.scope.get_or_init(|| entity_scope(self.base, self.role, self.entity))
    }

    fn resolve_attribute(&self, path: &str, value: &Value) -> Result<Value, ResolveError> {
        match value {
            Value::Deferred(deferred) => self.evaluate(path, deferred),
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.resolve_element(&format!("{path}[{i}]"), item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Value::Map(map) => map
                .iter()
                .map(|(key, v)| {
                    let resolved = self.resolve_attribute(&format!("{path}.{key}"), v)?;
                    Ok((key.clone(), resolved))
                })
                .collect::<Result<Mapping, ResolveError>>()
                .map(Value::Map),
            other => Ok(other.clone()),
        }
    }

    /// List elements are resolved one level deep only.
    ///
    /// A list inside a list passes through as is. A map inside a list that
    /// holds deferred values is subject to the nested-deferred policy.
    fn resolve_element(&self, path: &str, item: &Value) -> Result<Value, ResolveError> {
        match item {
            Value::Deferred(deferred) => self.evaluate(path, deferred),
            Value::List(_) => {
                if item.contains_deferred() {
                    tracing::debug!(
                        entity = %self.label,
                        attribute = path,
                        "nested list left unresolved"
                    );
                }
                Ok(item.clone())
            }
            Value::Map(_) if item.contains_deferred() => match self.config.nested_deferred {
                NestedDeferredPolicy::Reject => Err(ResolveError::MalformedAttributeShape {
                    entity: self.label.clone(),
                    attribute: path.to_owned(),
                    message: "map inside a list holds deferred values; \
                              only direct list elements are resolved"
                        .into(),
                }),
                NestedDeferredPolicy::PassThrough => {
                    tracing::warn!(
                        entity = %self.label,
                        attribute = path,
                        "leaving nested deferred values unresolved"
                    );
                    Ok(item.clone())
                }
            },
            other => Ok(other.clone()),
        }
    }

    fn evaluate(&self, path: &str, deferred: &Deferred) -> Result<Value, ResolveError> {
        self.scope().evaluate(deferred).map_err(|err| match err {
            EvalError::Undefined(name) => ResolveError::UndefinedBinding {
                entity: self.label.clone(),
                attribute: path.to_owned(),
                name,
            },
            EvalError::Failed(message) => ResolveError::ExpressionEvaluation {
                entity: self.label.clone(),
                attribute: path.to_owned(),
                message,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy(source: &str) -> Value {
        Value::lazy(source).expect("parse")
    }

    fn vars(pairs: &[(&str, Value)]) -> Mapping {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn resolved(app: &Application, service: &str, attribute: &str) -> Value {
        app.service(service)
            .and_then(|s| s.attribute(attribute))
            .cloned()
            .expect("attribute present")
    }

    #[test]
    fn service_variable_shadows_application_variable() {
        let mut app = Application::new("demo").with_variables(vars(&[("x", "app".into())]));
        app.add_service(
            Entity::new("svc")
                .with_variables(vars(&[("x", "svc".into())]))
                .with_attribute("bare", lazy("x"))
                .with_attribute("escaped", lazy("application.x")),
        );

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        assert_eq!(resolved(&app, "svc", "bare"), Value::from("svc"));
        assert_eq!(resolved(&app, "svc", "escaped"), Value::from("app"));
    }

    #[test]
    fn context_accessor_matches_bare_name() {
        let mut app = Application::new("demo");
        app.add_service(
            Entity::new("svc")
                .with_variables(vars(&[("y", "service".into())]))
                .with_attribute("via_context", lazy("context.y"))
                .with_attribute("bare", lazy("y")),
        );

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        assert_eq!(resolved(&app, "svc", "via_context"), Value::from("service"));
        assert_eq!(resolved(&app, "svc", "bare"), Value::from("service"));
    }

    #[test]
    fn repeated_variable_blocks_last_write_wins() {
        let mut app = Application::new("demo");
        app.add_service(
            Entity::new("svc")
                .with_variables(vars(&[("v", "service1".into())]))
                .with_variables(vars(&[("v", "service".into())]))
                .with_attribute("value", lazy("v"))
                .with_attribute("from_self", lazy("service.v")),
        );

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        assert_eq!(resolved(&app, "svc", "value"), Value::from("service"));
        assert_eq!(resolved(&app, "svc", "from_self"), Value::from("service"));
    }

    #[test]
    fn sibling_lazy_variable_sees_neighbour() {
        let mut app = Application::new("demo");
        app.add_service(
            Entity::new("lb")
                .with_variables(vars(&[
                    ("web_port", 2003.into()),
                    ("config", lazy("{ port: web_port, fqdns: ['domain.com'] }")),
                ]))
                .with_attribute("lb_config", lazy("config")),
        );

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        let config = resolved(&app, "lb", "lb_config");
        let map = config.as_map().expect("map");
        assert_eq!(map.get("port"), Some(&Value::Integer(2003)));
        assert_eq!(map.get("fqdns"), Some(&Value::List(vec!["domain.com".into()])));
    }

    #[test]
    fn entity_variables_do_not_leak_into_later_entities() {
        let mut app = Application::new("demo");
        app.add_service(
            Entity::new("a")
                .with_variables(vars(&[("z", "from-a".into())]))
                .with_attribute("z", lazy("z")),
        );
        app.add_service(Entity::new("b").with_attribute("z", lazy("z")));

        let err = resolve_application(&mut app, &ResolverConfig::strict()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UndefinedBinding {
                entity: "service \"b\"".into(),
                attribute: "z".into(),
                name: "z".into(),
            }
        );
    }

    #[test]
    fn later_entity_sees_its_own_service_accessor() {
        let mut app = Application::new("demo");
        app.add_service(
            Entity::new("a")
                .with_variables(vars(&[("v", 1.into())]))
                .with_attribute("me", lazy("service.name")),
        );
        app.add_service(Entity::new("b").with_attribute("me", lazy("service.name")));

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        assert_eq!(resolved(&app, "a", "me"), Value::from("a"));
        assert_eq!(resolved(&app, "b", "me"), Value::from("b"));
    }

    #[test]
    fn literal_application_is_unchanged() {
        let mut labels = Mapping::new();
        let _ = labels.insert("tier".into(), "web".into());
        let mut app = Application::new("demo").with_variables(vars(&[("x", 1.into())]));
        app.add_service(
            Entity::new("web")
                .with_kind("helm")
                .with_attribute("image", "nginx")
                .with_attribute("ports", Value::List(vec![80.into(), 443.into()]))
                .with_attribute("labels", Value::Map(labels)),
        );
        app.add_volume("data", None);
        let before = app.clone();

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        assert_eq!(app, before);
    }

    #[test]
    fn list_resolves_deferred_slot_only() {
        let mut app =
            Application::new("demo").with_variables(vars(&[("extra_host", "db.local".into())]));
        app.add_service(Entity::new("web").with_attribute(
            "extra_hosts",
            Value::List(vec![lazy("extra_host"), "static.local".into()]),
        ));

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        assert_eq!(
            resolved(&app, "web", "extra_hosts"),
            Value::List(vec!["db.local".into(), "static.local".into()])
        );
    }

    #[test]
    fn nested_map_values_resolve() {
        let mut labels = Mapping::new();
        let _ = labels.insert("com.example.db".into(), lazy(r#""${service.image} label""#));
        let mut app = Application::new("demo");
        app.add_service(
            Entity::new("db")
                .with_attribute("image", "postgres:latest")
                .with_attribute("labels", Value::Map(labels)),
        );

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        let labels = resolved(&app, "db", "labels");
        assert_eq!(
            labels.as_map().and_then(|m| m.get("com.example.db")),
            Some(&Value::from("postgres:latest label"))
        );
    }

    #[test]
    fn missing_binding_fails_whole_application() {
        let mut app = Application::new("demo");
        app.add_service(Entity::new("ok").with_attribute("image", lazy("'fine'")));
        app.add_service(Entity::new("web").with_attribute("image", lazy("missing_variable")));
        let before = app.clone();

        let err = resolve_application(&mut app, &ResolverConfig::strict()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("service \"web\""), "got: {msg}");
        assert!(msg.contains("`image`"), "got: {msg}");
        assert!(msg.contains("missing_variable"), "got: {msg}");
        assert_eq!(app, before, "no partial results");
    }

    #[test]
    fn permissive_mode_substitutes_default() {
        let mut app = Application::new("demo");
        app.add_service(Entity::new("web").with_attribute("image", lazy("missing_variable")));

        resolve_application(&mut app, &ResolverConfig::permissive(Some("unset".into())))
            .expect("resolve");
        assert_eq!(resolved(&app, "web", "image"), Value::from("unset"));
    }

    fn listed_map(key: &str, value: Value) -> Value {
        let mut map = Mapping::new();
        let _ = map.insert(key.into(), value);
        Value::List(vec![Value::Map(map)])
    }

    #[test]
    fn nested_list_passes_through_unresolved() {
        let nested = Value::List(vec![Value::List(vec![lazy("x")]), lazy("y")]);
        let mut app = Application::new("demo").with_variables(vars(&[("y", "top".into())]));
        app.add_service(Entity::new("web").with_attribute("matrix", nested));

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        assert_eq!(
            resolved(&app, "web", "matrix"),
            Value::List(vec![Value::List(vec![lazy("x")]), "top".into()])
        );
    }

    #[test]
    fn map_of_deferred_inside_list_is_rejected() {
        let mut app = Application::new("demo");
        app.add_service(Entity::new("web").with_attribute("hosts", listed_map("ip", lazy("x"))));

        let err = resolve_application(&mut app, &ResolverConfig::strict()).unwrap_err();
        match err {
            ResolveError::MalformedAttributeShape { attribute, .. } => {
                assert_eq!(attribute, "hosts[0]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn literal_map_inside_list_is_kept() {
        let hosts = listed_map("ip", "10.0.0.1".into());
        let mut app = Application::new("demo");
        app.add_service(Entity::new("web").with_attribute("hosts", hosts.clone()));

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        assert_eq!(resolved(&app, "web", "hosts"), hosts);
    }

    #[test]
    fn map_inside_list_passes_through_when_configured() {
        let hosts = listed_map("ip", lazy("x"));
        let mut app = Application::new("demo");
        app.add_service(Entity::new("web").with_attribute("hosts", hosts.clone()));
        let config = ResolverConfig {
            nested_deferred: NestedDeferredPolicy::PassThrough,
            ..ResolverConfig::default()
        };

        resolve_application(&mut app, &config).expect("resolve");
        assert_eq!(resolved(&app, "web", "hosts"), hosts);
    }

    #[test]
    fn application_accessor_reaches_other_services() {
        let mut app = Application::new("demo");
        app.add_service(
            Entity::new("db")
                .with_attribute("image", "postgres:latest")
                .with_variables(vars(&[("port", 5432.into())])),
        );
        app.add_service(
            Entity::new("web")
                .with_attribute("db_image", lazy("application.services.db.image"))
                .with_attribute("db_port", lazy("application.services.db.port")),
        );

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        assert_eq!(resolved(&app, "web", "db_image"), Value::from("postgres:latest"));
        assert_eq!(resolved(&app, "web", "db_port"), Value::Integer(5432));
    }

    #[test]
    fn evaluation_failure_names_attribute_path() {
        let mut hosts = Mapping::new();
        let _ = hosts.insert("primary".into(), lazy(r#""${service}""#));
        let mut app = Application::new("demo");
        app.add_service(Entity::new("web").with_attribute("hosts", Value::Map(hosts)));

        let err = resolve_application(&mut app, &ResolverConfig::strict()).unwrap_err();
        match err {
            ResolveError::ExpressionEvaluation { attribute, .. } => {
                assert_eq!(attribute, "hosts.primary");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn volumes_resolve_with_volume_accessor() {
        let mut app = Application::new("demo").with_variables(vars(&[("size", "10Gi".into())]));
        app.add_volume(
            "data",
            Some(
                Entity::new("data")
                    .with_attribute("capacity", lazy("size"))
                    .with_attribute("label", lazy(r#""${volume.name}-vol""#)),
            ),
        );
        app.add_volume("scratch", None);

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        let data = app.volumes.get("data").and_then(Option::as_ref).expect("data");
        assert_eq!(data.attribute("capacity"), Some(&Value::from("10Gi")));
        assert_eq!(data.attribute("label"), Some(&Value::from("data-vol")));
        assert!(app.is_resolved());
    }

    #[test]
    fn native_deferred_resolves() {
        let mut app = Application::new("demo").with_variables(vars(&[("replicas", 2.into())]));
        app.add_service(Entity::new("web").with_attribute(
            "replicas",
            Value::native("double", |scope| match scope.lookup("replicas")? {
                Value::Integer(n) => Ok(Value::Integer(n * 2)),
                _ => Err(EvalError::Failed("replicas must be an integer".into())),
            }),
        ));

        resolve_application(&mut app, &ResolverConfig::strict()).expect("resolve");
        assert_eq!(resolved(&app, "web", "replicas"), Value::Integer(4));
    }

    #[test]
    fn root_scope_is_not_mutated_by_entities() {
        let app = Application::new("demo").with_variables(vars(&[("x", "app".into())]));
        let root = root_scope(&app, &ResolverConfig::strict());
        let snapshot = root.clone();
        let entity = Entity::new("svc").with_variables(vars(&[("x", "svc".into())]));

        let derived = entity_scope(&root, EntityRole::Service, &entity);
        assert_eq!(derived.get("x"), Some(&Value::from("svc")));
        assert_eq!(root, snapshot);
        assert!(!root.is_bound("service"));
    }

    #[test]
    fn converts_into_common_error() {
        let err: ShipwrightError = ResolveError::UndefinedBinding {
            entity: "service \"web\"".into(),
            attribute: "image".into(),
            name: "tag".into(),
        }
        .into();
        assert!(err.to_string().contains("undefined binding `tag`"), "got: {err}");
    }
}
