//! Type declarations and supertype traversal.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Name of the pre-declared root class.
pub const OBJECT_TYPE_NAME: &str = "Object";

static TYPE_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("type name pattern must compile")
});

/// Graph ids start at 1; 0 is reserved for the shared `Object` key.
static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(1);

/// Opaque handle for one declared type.
///
/// Keys carry the id of the graph that issued them, and a graph treats keys
/// from any other graph as undeclared. `TypeKey::OBJECT` is the one key every
/// graph accepts. Equality is identity: two keys are equal exactly when they
/// name the same declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeKey {
    graph: u32,
    index: u32,
}

impl TypeKey {
    /// Root class every other class derives from.
    pub const OBJECT: TypeKey = TypeKey { graph: 0, index: 0 };

    /// Declaration index inside the issuing graph.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl Display for TypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "type#{}.{}", self.graph, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    Interface,
}

/// One declared type and its direct supertypes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub key: TypeKey,
    pub name: String,
    pub kind: TypeKind,
    /// Direct superclass. `None` for interfaces and for `Object`.
    pub superclass: Option<TypeKey>,
    /// Directly implemented (or extended) interfaces, in declaration order.
    pub interfaces: Vec<TypeKey>,
}

impl TypeDescriptor {
    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }
}

/// Values that know which declared type they are an instance of.
pub trait Typed {
    /// The declared type of this value.
    fn type_key(&self) -> TypeKey;

    /// The type this value stands in for, when it is a proxy-like wrapper.
    fn represented_type(&self) -> Option<TypeKey> {
        None
    }

    /// Type used for dispatch: the represented type when present.
    fn dispatch_type(&self) -> TypeKey {
        self.represented_type().unwrap_or_else(|| self.type_key())
    }
}

/// Append-only declaration table for classes and interfaces.
///
/// # Invariants
/// - `Object` is always declared as `TypeKey::OBJECT`.
/// - Every supertype referenced by a declaration already exists.
/// - Names are unique.
#[derive(Debug)]
pub struct TypeGraph {
    state: RwLock<GraphState>,
}

#[derive(Debug)]
struct GraphState {
    id: u32,
    descriptors: Vec<Arc<TypeDescriptor>>,
    by_name: HashMap<String, TypeKey>,
    rust_types: HashMap<TypeId, TypeKey>,
}

impl Default for TypeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeGraph {
    /// Creates a graph holding only the root `Object` class.
    pub fn new() -> Self {
        let mut state = GraphState {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            descriptors: Vec::new(),
            by_name: HashMap::new(),
            rust_types: HashMap::new(),
        };
        state.descriptors.push(Arc::new(TypeDescriptor {
            key: TypeKey::OBJECT,
            name: OBJECT_TYPE_NAME.to_string(),
            kind: TypeKind::Class,
            superclass: None,
            interfaces: Vec::new(),
        }));
        state
            .by_name
            .insert(OBJECT_TYPE_NAME.to_string(), TypeKey::OBJECT);
        Self {
            state: RwLock::new(state),
        }
    }

    /// Declares a class.
    ///
    /// `superclass` defaults to `Object` and must itself be a class. Every
    /// entry of `interfaces` must be a declared interface, listed once.
    pub fn declare_class(
        &self,
        name: &str,
        superclass: Option<TypeKey>,
        interfaces: &[TypeKey],
    ) -> Result<TypeKey, TypeGraphError> {
        let mut state = self.state.write();
        let superclass = superclass.unwrap_or(TypeKey::OBJECT);
        match state.get(superclass) {
            None => return Err(TypeGraphError::UnknownType(superclass)),
            Some(descriptor) if descriptor.is_interface() => {
                return Err(TypeGraphError::SuperclassIsInterface {
                    name: name.to_string(),
                    superclass: descriptor.name.clone(),
                });
            }
            Some(_) => {}
        }
        state.declare(name, TypeKind::Class, Some(superclass), interfaces)
    }

    /// Declares an interface extending `extends` in order.
    pub fn declare_interface(
        &self,
        name: &str,
        extends: &[TypeKey],
    ) -> Result<TypeKey, TypeGraphError> {
        self.state
            .write()
            .declare(name, TypeKind::Interface, None, extends)
    }

    pub fn lookup(&self, name: &str) -> Option<TypeKey> {
        self.state.read().by_name.get(name).copied()
    }

    pub fn descriptor(&self, key: TypeKey) -> Option<Arc<TypeDescriptor>> {
        self.state.read().get(key).cloned()
    }

    pub fn name_of(&self, key: TypeKey) -> Option<String> {
        self.state.read().get(key).map(|d| d.name.clone())
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.state.read().get(key).is_some()
    }

    pub fn is_interface(&self, key: TypeKey) -> bool {
        self.state
            .read()
            .get(key)
            .is_some_and(|descriptor| descriptor.is_interface())
    }

    pub fn len(&self) -> usize {
        self.state.read().descriptors.len()
    }

    /// Always false: `Object` is declared on construction.
    pub fn is_empty(&self) -> bool {
        self.state.read().descriptors.is_empty()
    }

    /// All declared keys in declaration order.
    pub fn keys(&self) -> Vec<TypeKey> {
        self.state.read().descriptors.iter().map(|d| d.key).collect()
    }

    /// Supertypes of `key` in resolution order, starting with `key` itself.
    ///
    /// Interfaces are walked depth-first in declaration order before the
    /// superclass; each type appears once. Unknown keys yield an empty list.
    pub fn ancestors(&self, key: TypeKey) -> Vec<TypeKey> {
        let state = self.state.read();
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        state.collect_ancestors(key, &mut seen, &mut order);
        order
    }

    /// Reflexive subtype test.
    pub fn is_subtype(&self, sub: TypeKey, sup: TypeKey) -> bool {
        if sub == sup {
            return self.contains(sub);
        }
        self.ancestors(sub).contains(&sup)
    }

    /// Maps a Rust type onto a declared key so values can be dispatched by
    /// their static type.
    ///
    /// Rebinding a Rust type to the same key is a no-op; to another key it is
    /// rejected.
    pub fn bind_rust_type<T: 'static>(&self, key: TypeKey) -> Result<(), TypeGraphError> {
        let mut state = self.state.write();
        if state.get(key).is_none() {
            return Err(TypeGraphError::UnknownType(key));
        }
        match state.rust_types.get(&TypeId::of::<T>()) {
            Some(existing) if *existing == key => Ok(()),
            Some(_) => Err(TypeGraphError::RustTypeAlreadyBound(
                std::any::type_name::<T>(),
            )),
            None => {
                state.rust_types.insert(TypeId::of::<T>(), key);
                Ok(())
            }
        }
    }

    /// Declared key for a Rust type bound via [`TypeGraph::bind_rust_type`].
    pub fn key_of<T: 'static>(&self) -> Option<TypeKey> {
        self.state.read().rust_types.get(&TypeId::of::<T>()).copied()
    }
}

impl GraphState {
    fn get(&self, key: TypeKey) -> Option<&Arc<TypeDescriptor>> {
        let issued_here = key == TypeKey::OBJECT || (key.graph == self.id && key.index != 0);
        if !issued_here {
            return None;
        }
        self.descriptors.get(key.index())
    }

    fn declare(
        &mut self,
        name: &str,
        kind: TypeKind,
        superclass: Option<TypeKey>,
        interfaces: &[TypeKey],
    ) -> Result<TypeKey, TypeGraphError> {
        let name = name.trim();
        if !TYPE_NAME_PATTERN.is_match(name) {
            return Err(TypeGraphError::InvalidName(name.to_string()));
        }
        if self.by_name.contains_key(name) {
            return Err(TypeGraphError::DuplicateName(name.to_string()));
        }

        let mut listed = HashSet::new();
        for interface in interfaces {
            let Some(descriptor) = self.get(*interface) else {
                return Err(TypeGraphError::UnknownType(*interface));
            };
            if !descriptor.is_interface() {
                return Err(TypeGraphError::NotAnInterface {
                    name: name.to_string(),
                    supertype: descriptor.name.clone(),
                });
            }
            if !listed.insert(*interface) {
                return Err(TypeGraphError::DuplicateInterface {
                    name: name.to_string(),
                    interface: descriptor.name.clone(),
                });
            }
        }

        let index = u32::try_from(self.descriptors.len())
            .map_err(|_| TypeGraphError::CapacityExceeded)?;
        let key = TypeKey {
            graph: self.id,
            index,
        };
        self.descriptors.push(Arc::new(TypeDescriptor {
            key,
            name: name.to_string(),
            kind,
            superclass,
            interfaces: interfaces.to_vec(),
        }));
        self.by_name.insert(name.to_string(), key);
        Ok(key)
    }

    fn collect_ancestors(
        &self,
        key: TypeKey,
        seen: &mut HashSet<TypeKey>,
        order: &mut Vec<TypeKey>,
    ) {
        let Some(descriptor) = self.get(key) else {
            return;
        };
        if !seen.insert(key) {
            return;
        }
        order.push(key);
        for interface in &descriptor.interfaces {
            self.collect_ancestors(*interface, seen, order);
        }
        if let Some(superclass) = descriptor.superclass {
            self.collect_ancestors(superclass, seen, order);
        }
    }
}

/// Type declaration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeGraphError {
    InvalidName(String),
    DuplicateName(String),
    UnknownType(TypeKey),
    SuperclassIsInterface { name: String, superclass: String },
    NotAnInterface { name: String, supertype: String },
    DuplicateInterface { name: String, interface: String },
    RustTypeAlreadyBound(&'static str),
    CapacityExceeded,
}

impl Display for TypeGraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(value) => write!(f, "type name is invalid: `{value}`"),
            Self::DuplicateName(value) => write!(f, "type already declared: {value}"),
            Self::UnknownType(key) => write!(f, "type is not declared: {key}"),
            Self::SuperclassIsInterface { name, superclass } => write!(
                f,
                "class {name} cannot use interface {superclass} as its superclass"
            ),
            Self::NotAnInterface { name, supertype } => write!(
                f,
                "{name} lists {supertype} as an interface, but it is a class"
            ),
            Self::DuplicateInterface { name, interface } => {
                write!(f, "{name} lists interface {interface} more than once")
            }
            Self::RustTypeAlreadyBound(rust_type) => {
                write!(f, "rust type is already bound to another key: {rust_type}")
            }
            Self::CapacityExceeded => write!(f, "type graph is full"),
        }
    }
}

impl Error for TypeGraphError {}
