//! # Autoplay Config
//!
//! Configuration management for the Autoplay scheduler: TOML schema, loader with
//! `${VAR}` substitution and `AUTOPLAY_*` environment toggles, and a validator.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::{ConfigLoader, ENV_PREFIX};
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
