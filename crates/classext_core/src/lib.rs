//! Type-graph extension dispatch.
//!
//! Associates declared types (classes and interfaces) with per-family
//! extension objects, resolving through interfaces before superclasses and
//! memoizing one bound copy per concrete type.

pub mod config;
pub mod extension;
pub mod logging;
pub mod types;

pub use config::{CatalogConfig, ConfigError, MAX_MRU_CAPACITY};
pub use extension::capability::{Binding, DynExtension, Extension, ExtensionError};
pub use extension::catalog::{CatalogError, ExtensionCatalog};
pub use extension::kernel::{
    ExtensionCollision, ExtensionRegistry, RegistryError, DEFAULT_MRU_CAPACITY,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use types::graph::{
    TypeDescriptor, TypeGraph, TypeGraphError, TypeKey, TypeKind, Typed, OBJECT_TYPE_NAME,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
