//! Definition tree: applications, services, volumes, and attribute values.
//!
//! The tree is built once by a loader and handed to the resolver, which
//! replaces every [`Value::Deferred`] leaf with a concrete value.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use shipwright_common::constants::{NAME_KEY, TYPE_KEY};
use shipwright_common::error::Result;

use crate::expr::{self, EvalError, Expr};
use crate::scope::Scope;

/// Ordered mapping of attribute or binding names to values.
pub type Mapping = IndexMap<String, Value>;

/// Signature of a host callback evaluated against a scope.
pub type NativeCallback = dyn Fn(&Scope) -> std::result::Result<Value, EvalError> + Send + Sync;

/// A callback registered by the embedding program in place of an expression.
#[derive(Clone)]
pub struct NativeFn {
    label: String,
    callback: Arc<NativeCallback>,
}

impl NativeFn {
    /// Wraps `callback` under a label used in diagnostics.
    pub fn new<F>(label: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Scope) -> std::result::Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            callback: Arc::new(callback),
        }
    }

    /// Returns the diagnostic label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Invokes the callback.
    ///
    /// # Errors
    ///
    /// Returns whatever error the callback reports.
    pub fn call(&self, scope: &Scope) -> std::result::Result<Value, EvalError> {
        (self.callback)(scope)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeFn").field(&self.label).finish()
    }
}

impl PartialEq for NativeFn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

/// A computation evaluated later against an explicit [`Scope`].
#[derive(Debug, Clone, PartialEq)]
pub enum Deferred {
    /// An expression in the restricted expression language.
    Expr(Expr),
    /// A host callback.
    Native(NativeFn),
}

impl Deferred {
    /// Parses expression source into a deferred value.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is not a valid expression.
    pub fn parse(source: &str) -> Result<Self> {
        expr::parse(source).map(Self::Expr)
    }
}

impl fmt::Display for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(e) => write!(f, "{e}"),
            Self::Native(n) => write!(f, "<native {}>", n.label),
        }
    }
}

/// An attribute value in the definition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Integer(i64),
    /// Floating-point literal.
    Float(f64),
    /// String literal.
    String(String),
    /// Ordered list.
    List(Vec<Value>),
    /// Nested mapping.
    Map(Mapping),
    /// Not yet evaluated.
    Deferred(Deferred),
}

impl Value {
    /// Parses expression source into a deferred value.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is not a valid expression.
    pub fn lazy(source: &str) -> Result<Self> {
        Deferred::parse(source).map(Self::Deferred)
    }

    /// Wraps a host callback as a deferred value.
    pub fn native<F>(label: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Scope) -> std::result::Result<Self, EvalError> + Send + Sync + 'static,
    {
        Self::Deferred(Deferred::Native(NativeFn::new(label, callback)))
    }

    /// Returns `true` if this value is itself deferred.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// Returns `true` if a deferred value appears anywhere inside.
    #[must_use]
    pub fn contains_deferred(&self) -> bool {
        match self {
            Self::Deferred(_) => true,
            Self::List(items) => items.iter().any(Self::contains_deferred),
            Self::Map(map) => map.values().any(Self::contains_deferred),
            _ => false,
        }
    }

    /// Returns the string contents, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the mapping, if this is a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&Mapping> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the list elements, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the value kind, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Deferred(_) => "deferred expression",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::List(items)
    }
}

impl From<Mapping> for Value {
    fn from(map: Mapping) -> Self {
        Self::Map(map)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Float(n) => serializer.serialize_f64(*n),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Self::Deferred(d) => Err(S::Error::custom(format!(
                "unresolved deferred expression `{d}`"
            ))),
        }
    }
}

/// Variable declarations of one entity, kept block by block.
///
/// Later blocks override earlier ones on lookup; every block is retained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    blocks: Vec<Mapping>,
}

impl Variables {
    /// Creates an empty declaration list.
    #[must_use]
    pub const fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Appends a `variables` block.
    pub fn push_block(&mut self, block: Mapping) {
        self.blocks.push(block);
    }

    /// Appends every block of `other` after the existing ones.
    pub fn append(&mut self, other: Self) {
        self.blocks.extend(other.blocks);
    }

    /// Returns the declared blocks in order.
    #[must_use]
    pub fn blocks(&self) -> &[Mapping] {
        &self.blocks
    }

    /// Returns `true` if no variable is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(IndexMap::is_empty)
    }

    /// Flattens all blocks, the last declaration of a name winning.
    #[must_use]
    pub fn merged(&self) -> Mapping {
        let mut merged = Mapping::new();
        for block in &self.blocks {
            for (name, value) in block {
                let _ = merged.insert(name.clone(), value.clone());
            }
        }
        merged
    }

    /// Returns the effective value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.blocks.iter().rev().find_map(|b| b.get(name))
    }

    /// Returns every declaration of `name`, oldest first.
    #[must_use]
    pub fn declarations(&self, name: &str) -> Vec<&Value> {
        self.blocks.iter().filter_map(|b| b.get(name)).collect()
    }
}

impl From<Mapping> for Variables {
    fn from(block: Mapping) -> Self {
        Self {
            blocks: vec![block],
        }
    }
}

/// Binding name under which an entity sees itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRole {
    /// A deployable service.
    Service,
    /// A volume.
    Volume,
}

impl EntityRole {
    /// Returns the scope binding for this role.
    #[must_use]
    pub const fn binding(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Volume => "volume",
        }
    }
}

impl fmt::Display for EntityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binding())
    }
}

/// A service or volume node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Entity {
    /// Entity name.
    pub name: String,
    /// Driver discriminator (`_type`).
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Entity-scoped variables (`_variables`).
    #[serde(skip)]
    pub variables: Variables,
    /// Remaining attributes in declaration order.
    #[serde(flatten)]
    pub attributes: Mapping,
}

impl Entity {
    /// Creates an entity with no attributes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the driver discriminator.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Appends a `variables` block.
    #[must_use]
    pub fn with_variables(mut self, block: Mapping) -> Self {
        self.variables.push_block(block);
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns an attribute by name.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// The entity as a map, its own variables overriding same-named attributes.
    ///
    /// `name` and `_type` always come from the entity itself, never from an
    /// attribute of the same name.
    #[must_use]
    pub fn merged_with_own_variables(&self) -> Value {
        let mut view = Mapping::new();
        let _ = view.insert(NAME_KEY.into(), Value::String(self.name.clone()));
        if let Some(kind) = &self.kind {
            let _ = view.insert(TYPE_KEY.into(), Value::String(kind.clone()));
        }
        for (k, v) in &self.attributes {
            if k != NAME_KEY && k != TYPE_KEY {
                let _ = view.insert(k.clone(), v.clone());
            }
        }
        for (k, v) in self.variables.merged() {
            let _ = view.insert(k, v);
        }
        Value::Map(view)
    }
}

/// Root of a definition: one deployable application.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Application {
    /// Application name.
    pub name: String,
    /// Application-level variables.
    #[serde(skip)]
    pub variables: Variables,
    /// Services keyed by name.
    pub services: IndexMap<String, Entity>,
    /// Volumes keyed by name; a volume may be declared without a body.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub volumes: IndexMap<String, Option<Entity>>,
    /// Authoritative output ordering of services.
    #[serde(rename = "_service_order")]
    pub service_order: Vec<String>,
}

impl Application {
    /// Creates an empty application.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends a `variables` block.
    #[must_use]
    pub fn with_variables(mut self, block: Mapping) -> Self {
        self.variables.push_block(block);
        self
    }

    /// Adds a service, appending it to the service order.
    ///
    /// Re-adding a name replaces the service and keeps its position.
    pub fn add_service(&mut self, service: Entity) {
        if !self.service_order.contains(&service.name) {
            self.service_order.push(service.name.clone());
        }
        let _ = self.services.insert(service.name.clone(), service);
    }

    /// Adds a volume, possibly without a body.
    pub fn add_volume(&mut self, name: impl Into<String>, volume: Option<Entity>) {
        let _ = self.volumes.insert(name.into(), volume);
    }

    /// Returns a service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Entity> {
        self.services.get(name)
    }

    /// The application as a map: its name, its services and volumes (each
    /// as its own entity view), then its effective variables on top.
    #[must_use]
    pub fn merged_with_own_variables(&self) -> Value {
        let services: Mapping = self
            .services
            .iter()
            .map(|(name, service)| (name.clone(), service.merged_with_own_variables()))
            .collect();
        let volumes: Mapping = self
            .volumes
            .iter()
            .map(|(name, volume)| {
                let view = volume
                    .as_ref()
                    .map_or(Value::Null, Entity::merged_with_own_variables);
                (name.clone(), view)
            })
            .collect();

        let mut view = Mapping::new();
        let _ = view.insert(NAME_KEY.into(), Value::String(self.name.clone()));
        let _ = view.insert("services".into(), Value::Map(services));
        let _ = view.insert("volumes".into(), Value::Map(volumes));
        for (k, v) in self.variables.merged() {
            let _ = view.insert(k, v);
        }
        Value::Map(view)
    }

    /// Returns `true` if no deferred value remains in any service or volume.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        let entities = self
            .services
            .values()
            .chain(self.volumes.values().flatten());
        entities
            .flat_map(|e| e.attributes.values())
            .all(|v| !v.contains_deferred())
    }
}
