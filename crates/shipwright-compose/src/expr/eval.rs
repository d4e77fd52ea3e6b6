//! Interpreter evaluating deferred values against a [`Scope`].

use std::fmt::Write as _;

use shipwright_common::constants::CONTEXT_BINDING;
use thiserror::Error;

use super::{Expr, Segment};
use crate::model::{Deferred, Mapping, Value};
use crate::scope::Scope;

/// Maximum nesting of deferred values evaluated on behalf of one another.
const MAX_EVAL_DEPTH: usize = 64;

/// Failure while evaluating a deferred value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A name has no binding in the scope.
    #[error("undefined binding `{0}`")]
    Undefined(String),
    /// The computation itself failed.
    #[error("{0}")]
    Failed(String),
}

/// Evaluates `deferred` against `scope`.
///
/// Bound values that are themselves deferred are evaluated against the same
/// scope when reached, and the result is forced so that it holds no deferred
/// value anywhere inside.
///
/// # Errors
///
/// Returns [`EvalError::Undefined`] for an unbound name (unless the scope is
/// permissive) and [`EvalError::Failed`] for any other failure, including
/// cyclic references between bindings.
pub fn evaluate(deferred: &Deferred, scope: &Scope) -> Result<Value, EvalError> {
    Evaluator::new(scope).force_deferred(deferred)
}

struct Evaluator<'a> {
    scope: &'a Scope,
    active: Vec<String>,
}

impl<'a> Evaluator<'a> {
    const fn new(scope: &'a Scope) -> Self {
        Self {
            scope,
            active: Vec::new(),
        }
    }

    fn force_deferred(&mut self, deferred: &Deferred) -> Result<Value, EvalError> {
        match deferred {
            Deferred::Expr(expr) => self.eval(expr),
            Deferred::Native(native) => {
                let value = native.call(self.scope)?;
                self.force(native.label(), value)
            }
        }
    }

    /// Evaluates a value reached under `key`, guarding against cycles.
    fn force(&mut self, key: &str, value: Value) -> Result<Value, EvalError> {
        match value {
            Value::Deferred(deferred) => {
                if self.active.iter().any(|k| k == key) {
                    return Err(EvalError::Failed(format!("cyclic reference to `{key}`")));
                }
                if self.active.len() >= MAX_EVAL_DEPTH {
                    return Err(EvalError::Failed(format!(
                        "evaluation nested deeper than {MAX_EVAL_DEPTH} levels at `{key}`"
                    )));
                }
                self.active.push(key.to_owned());
                let result = self.force_deferred(&deferred);
                let _ = self.active.pop();
                result
            }
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| self.force(&format!("{key}[{i}]"), item))
                .collect::<Result<Vec<_>, EvalError>>()
                .map(Value::List),
            Value::Map(map) => map
                .into_iter()
                .map(|(k, v)| {
                    let v = self.force(&format!("{key}.{k}"), v)?;
                    Ok((k, v))
                })
                .collect::<Result<Mapping, EvalError>>()
                .map(Value::Map),
            other => Ok(other),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Integer(n) => Ok(Value::Integer(*n)),
            Expr::Float(n) => Ok(Value::Float(*n)),
            Expr::Str(segments) => self.interpolate(segments).map(Value::String),
            Expr::Path(segments) => self.resolve_path(segments),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, EvalError>>()
                .map(Value::List),
            Expr::Map(entries) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.eval(v)?)))
                .collect::<Result<Mapping, EvalError>>()
                .map(Value::Map),
        }
    }

    fn interpolate(&mut self, segments: &[Segment]) -> Result<String, EvalError> {
        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Interpolation(expr) => match self.eval(expr)? {
                    Value::Null => {}
                    Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
                    Value::Integer(n) => {
                        let _ = write!(out, "{n}");
                    }
                    Value::Float(n) => {
                        let _ = write!(out, "{n}");
                    }
                    Value::String(s) => out.push_str(&s),
                    other => {
                        return Err(EvalError::Failed(format!(
                            "cannot interpolate a {} from `{expr}` into a string",
                            other.type_name()
                        )));
                    }
                },
            }
        }
        Ok(out)
    }

    /// Substitutes the scope's fallback for an unbound path, if permissive.
    fn missing(&self, path: &str) -> Result<Value, EvalError> {
        self.scope
            .fallback(path)
            .ok_or_else(|| EvalError::Undefined(path.to_owned()))
    }

    fn resolve_path(&mut self, segments: &[String]) -> Result<Value, EvalError> {
        let Some((head, rest)) = segments.split_first() else {
            return Err(EvalError::Failed("empty path".into()));
        };

        let escapes = head == CONTEXT_BINDING && !self.scope.is_bound(CONTEXT_BINDING);
        let (mut current, mut path, rest) = match (escapes, rest.split_first()) {
            (true, None) => return self.force(head, Value::Map(self.scope.bindings().clone())),
            (true, Some((name, rest))) => {
                let path = format!("{head}.{name}");
                match self.scope.get(name) {
                    Some(value) => (value.clone(), path, rest),
                    None => return self.missing(&path),
                }
            }
            (false, _) => match self.scope.get(head) {
                Some(value) => (value.clone(), head.clone(), rest),
                None => return self.missing(head),
            },
        };

        for segment in rest {
            if current.is_deferred() {
                current = self.force(&path, current)?;
            }
            let next = match &current {
                Value::Map(map) => map.get(segment).cloned(),
                other => {
                    return Err(EvalError::Failed(format!(
                        "cannot read `{segment}` from {} `{path}`",
                        other.type_name()
                    )));
                }
            };
            path.push('.');
            path.push_str(segment);
            match next {
                Some(value) => current = value,
                None => return self.missing(&path),
            }
        }

        self.force(&path, current)
    }
}
