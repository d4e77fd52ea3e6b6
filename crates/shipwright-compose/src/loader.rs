//! Loading of YAML definition files into the definition tree.
//!
//! A definition holds one or more applications:
//!
//! ```yaml
//! applications:
//!   web-example:
//!     variables:
//!       app_var: app
//!     services:
//!       db:
//!         _type: helm
//!         _variables:
//!           - app_var_overwrite: service1
//!           - app_var_overwrite: service
//!         image: postgres:latest
//!         command: !lazy '"ruby ${context.service.name}"'
//!     volumes:
//!       data: ~
//! ```
//!
//! Nodes tagged `!lazy` carry expression source and become deferred values.
//! `variables`/`_variables` take either one mapping or a list of mappings,
//! one per declaration block. An application may carry both sections; their
//! blocks accumulate in declaration order. Entities may not declare a `name`
//! attribute: the entity key is its name.

use std::path::Path;

use indexmap::IndexMap;
use serde_yaml::Value as Yaml;
use shipwright_common::constants::{LAZY_TAG, NAME_KEY, SERVICE_ORDER_KEY, TYPE_KEY, VARIABLES_KEY};
use shipwright_common::error::{Result, ShipwrightError};

use crate::model::{Application, Deferred, Entity, Mapping, Value, Variables};

fn invalid(message: String) -> ShipwrightError {
    ShipwrightError::Config { message }
}

/// Parses every application in a definition document.
///
/// # Errors
///
/// Returns an error if the document is not valid YAML, does not follow the
/// definition layout, or contains a malformed `!lazy` expression.
pub fn load_definitions(input: &str) -> Result<IndexMap<String, Application>> {
    tracing::info!("loading definition document");
    let document: Yaml = serde_yaml::from_str(input)?;
    let Yaml::Mapping(mut root) = document else {
        return Err(invalid("definition document must be a mapping".into()));
    };
    let applications = match root.remove("applications") {
        Some(Yaml::Mapping(apps)) => apps,
        Some(other) => {
            return Err(invalid(format!(
                "`applications` must be a mapping, got {}",
                yaml_kind(&other)
            )));
        }
        None => return Err(invalid("definition has no `applications` section".into())),
    };

    let mut loaded = IndexMap::new();
    for (key, node) in applications {
        let name = key_string("applications", key)?;
        let app = load_application_node(&name, node)?;
        let _ = loaded.insert(name, app);
    }
    Ok(loaded)
}

/// Parses a definition document and returns the application called `name`.
///
/// # Errors
///
/// Returns an error if the document is invalid or has no such application.
pub fn load_application(input: &str, name: &str) -> Result<Application> {
    load_definitions(input)?
        .swap_remove(name)
        .ok_or_else(|| ShipwrightError::NotFound {
            kind: "application",
            id: name.to_owned(),
        })
}

/// Reads a definition file and returns the application called `name`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is invalid, or has no such
/// application.
pub fn load_file(path: &Path, name: &str) -> Result<Application> {
    tracing::info!(path = %path.display(), application = name, "reading definition file");
    let content = std::fs::read_to_string(path).map_err(|e| ShipwrightError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    load_application(&content, name)
}

fn load_application_node(name: &str, node: Yaml) -> Result<Application> {
    let context = format!("application \"{name}\"");
    let mut app = Application::new(name);
    let fields = match node {
        Yaml::Mapping(fields) => fields,
        Yaml::Null => return Ok(app),
        other => {
            return Err(invalid(format!(
                "{context} must be a mapping, got {}",
                yaml_kind(&other)
            )));
        }
    };

    let mut explicit_order = None;
    for (key, value) in fields {
        let key = key_string(&context, key)?;
        match key.as_str() {
            "variables" | VARIABLES_KEY => {
                app.variables.append(load_variables(&format!("{context}.{key}"), value)?);
            }
            "services" => {
                for (service_name, entity) in entity_nodes(&context, "services", value)? {
                    let service = load_entity(&service_name, entity)?
                        .ok_or_else(|| invalid(format!("service \"{service_name}\" has no body")))?;
                    app.add_service(service);
                }
            }
            "volumes" => {
                for (volume_name, entity) in entity_nodes(&context, "volumes", value)? {
                    let volume = load_entity(&volume_name, entity)?;
                    app.add_volume(volume_name, volume);
                }
            }
            SERVICE_ORDER_KEY => explicit_order = Some(load_service_order(&context, value)?),
            other => {
                return Err(invalid(format!("{context} has unknown section `{other}`")));
            }
        }
    }

    if let Some(order) = explicit_order {
        if let Some(unknown) = order.iter().find(|n| !app.services.contains_key(*n)) {
            return Err(ShipwrightError::NotFound {
                kind: "service",
                id: format!("\"{unknown}\" listed in {SERVICE_ORDER_KEY} of {context}"),
            });
        }
        app.service_order = order;
    }
    Ok(app)
}

fn entity_nodes(context: &str, section: &str, node: Yaml) -> Result<Vec<(String, Yaml)>> {
    match node {
        Yaml::Mapping(entries) => entries
            .into_iter()
            .map(|(k, v)| Ok((key_string(section, k)?, v)))
            .collect(),
        Yaml::Null => Ok(Vec::new()),
        other => Err(invalid(format!(
            "{context}.{section} must be a mapping, got {}",
            yaml_kind(&other)
        ))),
    }
}

fn load_service_order(context: &str, node: Yaml) -> Result<Vec<String>> {
    let Yaml::Sequence(items) = node else {
        return Err(invalid(format!("{context}.{SERVICE_ORDER_KEY} must be a list")));
    };
    items
        .into_iter()
        .map(|item| match item {
            Yaml::String(s) => Ok(s),
            other => Err(invalid(format!(
                "{context}.{SERVICE_ORDER_KEY} entries must be strings, got {}",
                yaml_kind(&other)
            ))),
        })
        .collect()
}

/// Builds an entity; `None` for a body-less declaration such as `data: ~`.
fn load_entity(name: &str, node: Yaml) -> Result<Option<Entity>> {
    let fields = match node {
        Yaml::Mapping(fields) => fields,
        Yaml::Null => return Ok(None),
        other => {
            return Err(invalid(format!(
                "entity \"{name}\" must be a mapping, got {}",
                yaml_kind(&other)
            )));
        }
    };

    let mut entity = Entity::new(name);
    for (key, value) in fields {
        let key = key_string(name, key)?;
        let path = format!("{name}.{key}");
        match key.as_str() {
            TYPE_KEY => match value {
                Yaml::String(kind) => entity.kind = Some(kind),
                other => {
                    return Err(invalid(format!(
                        "{path} must be a string, got {}",
                        yaml_kind(&other)
                    )));
                }
            },
            VARIABLES_KEY => entity.variables.append(load_variables(&path, value)?),
            NAME_KEY => {
                return Err(invalid(format!(
                    "{path}: `{NAME_KEY}` is reserved for the entity's own name"
                )));
            }
            _ => {
                let _ = entity.attributes.insert(key, convert(&path, value)?);
            }
        }
    }
    Ok(Some(entity))
}

fn load_variables(path: &str, node: Yaml) -> Result<Variables> {
    let mut variables = Variables::new();
    match node {
        Yaml::Null => {}
        Yaml::Mapping(_) => variables.push_block(load_block(path, node)?),
        Yaml::Sequence(blocks) => {
            for (i, block) in blocks.into_iter().enumerate() {
                variables.push_block(load_block(&format!("{path}[{i}]"), block)?);
            }
        }
        other => {
            return Err(invalid(format!(
                "{path} must be a mapping or a list of mappings, got {}",
                yaml_kind(&other)
            )));
        }
    }
    Ok(variables)
}

fn load_block(path: &str, node: Yaml) -> Result<Mapping> {
    match convert(path, node)? {
        Value::Map(block) => Ok(block),
        Value::Null => Ok(Mapping::new()),
        other => Err(invalid(format!(
            "{path} must be a mapping of variables, got {}",
            other.type_name()
        ))),
    }
}

/// Converts a YAML node into a [`Value`], parsing `!lazy` nodes.
fn convert(path: &str, node: Yaml) -> Result<Value> {
    match node {
        Yaml::Null => Ok(Value::Null),
        Yaml::Bool(b) => Ok(Value::Bool(b)),
        Yaml::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float))
            .ok_or_else(|| invalid(format!("{path}: number {n} is out of range"))),
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| convert(&format!("{path}[{i}]"), item))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Yaml::Mapping(entries) => entries
            .into_iter()
            .map(|(k, v)| {
                let key = key_string(path, k)?;
                let value = convert(&format!("{path}.{key}"), v)?;
                Ok((key, value))
            })
            .collect::<Result<Mapping>>()
            .map(Value::Map),
        Yaml::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            if tag.trim_start_matches('!') != LAZY_TAG {
                return Err(invalid(format!("{path}: unsupported tag {tag}")));
            }
            match tagged.value {
                Yaml::String(source) => Deferred::parse(&source)
                    .map(Value::Deferred)
                    .map_err(|e| invalid(format!("{path}: {e}"))),
                other => Err(invalid(format!(
                    "{path}: !{LAZY_TAG} expects expression source text, got {}",
                    yaml_kind(&other)
                ))),
            }
        }
    }
}

/// Mapping keys must be scalars; numbers and booleans are stringified.
fn key_string(context: &str, key: Yaml) -> Result<String> {
    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        other => Err(invalid(format!(
            "{context}: mapping keys must be scalars, got {}",
            yaml_kind(&other)
        ))),
    }
}

const fn yaml_kind(node: &Yaml) -> &'static str {
    match node {
        Yaml::Null => "null",
        Yaml::Bool(_) => "bool",
        Yaml::Number(_) => "number",
        Yaml::String(_) => "string",
        Yaml::Sequence(_) => "list",
        Yaml::Mapping(_) => "mapping",
        Yaml::Tagged(_) => "tagged value",
    }
}
