//! swagfuzz-core: schema-to-strategy compiler and value model
//!
//! This crate turns Swagger v2 parameter/schema definitions into composable
//! random-value strategies, and provides the drawn-value model whose JSON
//! encoding renders temporal values as ISO-8601 strings.

pub mod config;
pub mod spec;
pub mod strategy;
pub mod value;

pub use config::{ConfigError, Settings};
pub use spec::{SpecError, SwaggerSpec, resolve};
pub use strategy::{Primitive, Shape, StrategyBuilder, StrategyError, classify, fixed_dictionary};
pub use value::Drawn;
