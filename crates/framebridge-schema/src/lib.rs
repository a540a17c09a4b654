//! Optional JSON Schema validation of request arguments.
//!
//! A host can attach a registry keyed by command name; requests whose
//! positional arguments fail their command's schema are rejected before
//! any handler runs.

pub mod config;
pub mod error;
pub mod registry;
pub mod validator;

pub use config::RegistryConfig;
pub use error::{Result, SchemaError};
pub use registry::SchemaRegistry;
