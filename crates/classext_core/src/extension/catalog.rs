//! Registry-of-registries owned by the composition root.
//!
//! # Responsibility
//! - Create one `ExtensionRegistry` per capability family.
//! - Answer "every extension for this type" across all families.
//!
//! # Invariants
//! - Family names are unique within a catalog.
//! - Cross-family results follow registry creation order.

use crate::config::CatalogConfig;
use crate::extension::capability::{DynExtension, Extension};
use crate::extension::kernel::{ExtensionRegistry, RegistryError};
use crate::types::graph::{TypeGraph, TypeKey, Typed};
use log::info;
use parking_lot::RwLock;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Type-erased registry handle used for cross-family queries.
trait FamilyRegistry: Send + Sync {
    fn family(&self) -> &str;

    fn lookup(&self, key: TypeKey) -> Result<Option<Arc<dyn DynExtension>>, RegistryError>;
}

impl<E: Extension> FamilyRegistry for ExtensionRegistry<E> {
    fn family(&self) -> &str {
        ExtensionRegistry::family(self)
    }

    fn lookup(&self, key: TypeKey) -> Result<Option<Arc<dyn DynExtension>>, RegistryError> {
        Ok(self.get(key)?.map(|found| found as Arc<dyn DynExtension>))
    }
}

/// All capability families of one process, sharing one type graph.
pub struct ExtensionCatalog {
    graph: Arc<TypeGraph>,
    config: CatalogConfig,
    registries: RwLock<Vec<Arc<dyn FamilyRegistry>>>,
}

impl ExtensionCatalog {
    pub fn new(graph: Arc<TypeGraph>) -> Self {
        Self {
            graph,
            config: CatalogConfig::default(),
            registries: RwLock::new(Vec::new()),
        }
    }

    /// Creates a catalog after validating `config`.
    pub fn with_config(graph: Arc<TypeGraph>, config: CatalogConfig) -> Result<Self, CatalogError> {
        config
            .validate()
            .map_err(|err| CatalogError::InvalidConfig(err.to_string()))?;
        Ok(Self {
            graph,
            config,
            registries: RwLock::new(Vec::new()),
        })
    }

    pub fn graph(&self) -> &Arc<TypeGraph> {
        &self.graph
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Creates and tracks the registry for a new capability family.
    pub fn create_registry<E: Extension>(
        &self,
        family: &str,
    ) -> Result<Arc<ExtensionRegistry<E>>, CatalogError> {
        let family = family.trim();
        if !is_valid_family_name(family) {
            return Err(CatalogError::InvalidFamily(family.to_string()));
        }

        let mut registries = self.registries.write();
        if registries.iter().any(|existing| existing.family() == family) {
            return Err(CatalogError::DuplicateFamily(family.to_string()));
        }

        let registry = Arc::new(ExtensionRegistry::<E>::with_mru_capacity(
            family,
            Arc::clone(&self.graph),
            self.config.mru_capacity,
        ));
        registries.push(Arc::clone(&registry) as Arc<dyn FamilyRegistry>);
        info!(
            "event=family_create module=catalog status=ok family={} registry_id={} position={}",
            family,
            registry.id(),
            registries.len() - 1
        );
        Ok(registry)
    }

    /// Family names in creation order.
    pub fn registry_names(&self) -> Vec<String> {
        self.registries
            .read()
            .iter()
            .map(|registry| registry.family().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.read().is_empty()
    }

    /// Every family's extension for `key`, in registry creation order.
    ///
    /// Families with nothing reachable from `key` are skipped.
    ///
    /// # Errors
    /// The first family whose lookup fails aborts the query with its
    /// `RegistryError`.
    pub fn all_extensions(&self, key: TypeKey) -> Result<Vec<Arc<dyn DynExtension>>, RegistryError> {
        let registries: Vec<Arc<dyn FamilyRegistry>> = self.registries.read().clone();
        let mut found = Vec::new();
        for registry in &registries {
            if let Some(extension) = registry.lookup(key)? {
                found.push(extension);
            }
        }
        Ok(found)
    }

    /// Same as [`ExtensionCatalog::all_extensions`] for the runtime type of
    /// `value`.
    pub fn all_extensions_for<T: Typed + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Vec<Arc<dyn DynExtension>>, RegistryError> {
        self.all_extensions(value.dispatch_type())
    }
}

fn is_valid_family_name(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return false;
    }

    let mut prev_separator = false;
    for c in chars {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            prev_separator = false;
        } else if matches!(c, '.' | '_' | '-') && !prev_separator {
            prev_separator = true;
        } else {
            return false;
        }
    }
    !prev_separator
}

/// Catalog setup errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    InvalidFamily(String),
    DuplicateFamily(String),
    InvalidConfig(String),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFamily(value) => write!(f, "family name is invalid: `{value}`"),
            Self::DuplicateFamily(value) => write!(f, "family already registered: {value}"),
            Self::InvalidConfig(reason) => write!(f, "catalog config is invalid: {reason}"),
        }
    }
}

impl Error for CatalogError {}
