//! # shipwright-compose
//!
//! Definition model and variable resolution for Shipwright applications.
//!
//! Handles:
//! - **Model**: Applications, services, volumes, and their attribute values.
//! - **Expr**: The restricted expression language carried by deferred values.
//! - **Scope**: Layered binding environments with escape accessors.
//! - **Resolver**: Replacement of every deferred value with its result.
//! - **Loader**: YAML definitions marked up with `!lazy` expressions.
//! - **Dispatch**: Driver selection and deployment ordering.

pub mod dispatch;
pub mod expr;
pub mod loader;
pub mod model;
pub mod resolver;
pub mod scope;
