//! Binding environments for deferred evaluation.
//!
//! A [`Scope`] is one flattened layer of name to value bindings. Layering
//! happens by copy-on-merge: [`Scope::derive`] returns a new scope with extra
//! bindings on top and leaves the original untouched, so a root scope can be
//! shared read-only by every entity of an application.

use shipwright_common::config::{MissingBindingPolicy, ResolverConfig};

use crate::expr::{self, EvalError};
use crate::model::{Deferred, Mapping, Value};

/// Value substituted for unbound names in permissive mode.
#[derive(Debug, Clone, PartialEq)]
struct Fallback {
    value: Value,
    warn: bool,
}

/// A binding environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    bindings: Mapping,
    fallback: Option<Fallback>,
}

impl Scope {
    /// Creates a strict scope seeded with `bindings`.
    #[must_use]
    pub const fn new(bindings: Mapping) -> Self {
        Self {
            bindings,
            fallback: None,
        }
    }

    /// Applies the missing-binding settings of `config`.
    #[must_use]
    pub fn with_config(mut self, config: &ResolverConfig) -> Self {
        self.fallback = config.force_variable_definition.then(|| Fallback {
            value: config
                .missing_default
                .clone()
                .map_or(Value::Null, Value::String),
            warn: config.missing_binding == MissingBindingPolicy::Warn,
        });
        self
    }

    /// Merges `bindings` into this layer; incoming values win on collision.
    pub fn merge<I>(&mut self, bindings: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (name, value) in bindings {
            let _ = self.bindings.insert(name, value);
        }
    }

    /// Binds a single name in this layer.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        let _ = self.bindings.insert(name.into(), value);
    }

    /// Returns a copy of this scope with `bindings` merged on top.
    #[must_use]
    pub fn derive<I>(&self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut derived = self.clone();
        derived.merge(bindings);
        derived
    }

    /// Looks up a bound value.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::Undefined`] if `name` is not bound.
    pub fn lookup(&self, name: &str) -> Result<&Value, EvalError> {
        self.bindings
            .get(name)
            .ok_or_else(|| EvalError::Undefined(name.to_owned()))
    }

    /// Returns the bound value, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Returns `true` if `name` is bound in this layer.
    #[must_use]
    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Returns the merged layer.
    #[must_use]
    pub const fn bindings(&self) -> &Mapping {
        &self.bindings
    }

    /// Returns `true` if unbound names are substituted instead of failing.
    #[must_use]
    pub const fn is_permissive(&self) -> bool {
        self.fallback.is_some()
    }

    /// Evaluates `deferred` against this scope.
    ///
    /// # Errors
    ///
    /// See [`expr::evaluate`].
    pub fn evaluate(&self, deferred: &Deferred) -> Result<Value, EvalError> {
        expr::evaluate(deferred, self)
    }

    pub(crate) fn fallback(&self, name: &str) -> Option<Value> {
        let fallback = self.fallback.as_ref()?;
        if fallback.warn {
            tracing::warn!(binding = name, "undefined binding, substituting default");
        }
        Some(fallback.value.clone())
    }
}
