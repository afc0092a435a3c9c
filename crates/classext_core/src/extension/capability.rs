//! Capability contract implemented by every extension family.
//!
//! # Responsibility
//! - Define the `Extension` trait registries store and clone.
//! - Track which type an extension instance serves via `Binding`.
//!
//! # Invariants
//! - A `Binding` moves `Unbound -> Bound(T)` exactly once.
//! - Cloning a `Binding` yields an unbound copy, so every duplicate is
//!   freshly bindable and the original stays bound to its own type.

use crate::types::graph::TypeKey;
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Binding state of one extension instance.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Binding {
    for_type: Option<TypeKey>,
}

impl Binding {
    pub fn unbound() -> Self {
        Self::default()
    }

    pub fn for_type(&self) -> Option<TypeKey> {
        self.for_type
    }

    pub fn is_bound(&self) -> bool {
        self.for_type.is_some()
    }

    /// Binds to `key`. Binding again to the same key is a no-op.
    pub fn bind(&mut self, key: TypeKey) -> Result<(), ExtensionError> {
        match self.for_type {
            None => {
                self.for_type = Some(key);
                Ok(())
            }
            Some(current) if current == key => Ok(()),
            Some(current) => Err(ExtensionError::AlreadyBound {
                bound: current,
                requested: key,
            }),
        }
    }
}

impl Clone for Binding {
    fn clone(&self) -> Self {
        Self::unbound()
    }
}

/// One capability family's behavior for one type.
///
/// Implementors embed a [`Binding`] and expose it through `binding` /
/// `binding_mut`. Types without owned mutable state only need `Clone`; types
/// that own mutable collections override [`Extension::duplicate`] to
/// deep-copy them.
pub trait Extension: Clone + Send + Sync + 'static {
    fn binding(&self) -> &Binding;

    fn binding_mut(&mut self) -> &mut Binding;

    /// Type this instance serves, `None` until a registry installs it.
    fn for_type(&self) -> Option<TypeKey> {
        self.binding().for_type()
    }

    /// Copies this instance for installation under another type.
    fn duplicate(&self) -> Result<Self, ExtensionError> {
        Ok(self.clone())
    }

    /// Names of the behaviors this extension provides.
    fn operations(&self) -> &[&'static str] {
        &[]
    }
}

/// Object-safe view of an installed extension, used for cross-family queries.
pub trait DynExtension: Send + Sync {
    fn bound_type(&self) -> Option<TypeKey>;

    fn provided_operations(&self) -> &[&'static str];

    fn as_any(&self) -> &dyn Any;
}

impl<E: Extension> DynExtension for E {
    fn bound_type(&self) -> Option<TypeKey> {
        self.binding().for_type()
    }

    fn provided_operations(&self) -> &[&'static str] {
        Extension::operations(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn DynExtension {
    /// Downcasts to the concrete extension type of one family.
    pub fn downcast_ref<E: Extension>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}

/// Extension duplication and binding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    AlreadyBound { bound: TypeKey, requested: TypeKey },
    DuplicateFailed(String),
}

impl Display for ExtensionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyBound { bound, requested } => write!(
                f,
                "extension is bound to {bound}; refusing to rebind to {requested}"
            ),
            Self::DuplicateFailed(reason) => write!(f, "extension cannot be duplicated: {reason}"),
        }
    }
}

impl Error for ExtensionError {}
