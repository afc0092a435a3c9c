//! Per-family extension registry with type-graph resolution.

use crate::extension::capability::{Extension, ExtensionError};
use crate::extension::mru::MruRing;
use crate::types::graph::{TypeGraph, TypeKey, Typed};
use log::{debug, error, trace};
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Default number of MRU slots per registry.
pub const DEFAULT_MRU_CAPACITY: usize = 8;

/// Extension registry for one capability family.
///
/// Maps each declared type to the extension instance that serves it. Entries
/// for types without an explicit registration are derived on first lookup by
/// duplicating the extension found through the type graph and binding the
/// copy to the queried type.
///
/// # Invariants
/// - The map only grows. `register` may replace the entry for exactly the
///   registered type; derived entries are never replaced.
/// - Every stored extension is bound to the key it is stored under.
/// - The MRU ring only caches values present in the map.
pub struct ExtensionRegistry<E: Extension> {
    id: Uuid,
    family: String,
    graph: Arc<TypeGraph>,
    entries: RwLock<HashMap<TypeKey, Arc<E>>>,
    registered: RwLock<Vec<TypeKey>>,
    mru: Mutex<MruRing<E>>,
}

impl<E: Extension> ExtensionRegistry<E> {
    pub fn new(family: impl Into<String>, graph: Arc<TypeGraph>) -> Self {
        Self::with_mru_capacity(family, graph, DEFAULT_MRU_CAPACITY)
    }

    pub fn with_mru_capacity(
        family: impl Into<String>,
        graph: Arc<TypeGraph>,
        mru_capacity: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            family: family.into(),
            graph,
            entries: RwLock::new(HashMap::new()),
            registered: RwLock::new(Vec::new()),
            mru: Mutex::new(MruRing::new(mru_capacity)),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Identity of this registry instance, stable for its lifetime.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn graph(&self) -> &Arc<TypeGraph> {
        &self.graph
    }

    pub fn mru_capacity(&self) -> usize {
        self.mru.lock().capacity()
    }

    /// Installs a bound copy of `extension` for exactly `key`.
    ///
    /// Replaces an earlier entry for `key`. Types that already resolved
    /// through `key` keep their existing copies.
    ///
    /// # Errors
    /// - `UnknownType` when `key` was not issued by this registry's graph.
    /// - `Extension` when the extension cannot be duplicated or bound; callers
    ///   should treat this as a fatal setup error.
    pub fn register(&self, key: TypeKey, extension: &E) -> Result<Arc<E>, RegistryError> {
        if !self.graph.contains(key) {
            return Err(RegistryError::UnknownType(key));
        }
        let bound = Arc::new(self.instantiate(extension, key)?);

        // Lock order is mru, then entries. Holding the ring across the insert
        // keeps a concurrent lookup from caching the replaced value.
        let replaced = {
            let mut mru = self.mru.lock();
            let replaced = self
                .entries
                .write()
                .insert(key, Arc::clone(&bound))
                .is_some();
            mru.evict(key);
            replaced
        };
        {
            let mut registered = self.registered.write();
            if !registered.contains(&key) {
                registered.push(key);
            }
        }

        debug!(
            "event=extension_register module=registry family={} type={} replaced={}",
            self.family,
            self.type_label(key),
            replaced
        );
        Ok(bound)
    }

    /// Returns the extension serving `key`, or `Ok(None)` when nothing in the
    /// type graph above `key` is registered. Keys from another graph resolve
    /// to `Ok(None)`.
    ///
    /// # Errors
    /// - `Extension` when deriving the entry for `key` fails to duplicate or
    ///   bind the inherited extension. Nothing is cached in that case.
    pub fn get(&self, key: TypeKey) -> Result<Option<Arc<E>>, RegistryError> {
        if let Some(hit) = self.mru.lock().probe(key) {
            return Ok(Some(hit));
        }
        let found = match self.resolve(key) {
            Ok(Some(found)) => found,
            Ok(None) => return Ok(None),
            Err(err) => {
                error!(
                    "event=extension_resolve module=registry status=error family={} type={} error={}",
                    self.family,
                    self.type_label(key),
                    err
                );
                return Err(err);
            }
        };

        let mut mru = self.mru.lock();
        let current = self
            .entries
            .read()
            .get(&key)
            .is_some_and(|stored| Arc::ptr_eq(stored, &found));
        if current {
            mru.push(key, Arc::clone(&found));
        }
        Ok(Some(found))
    }

    /// Resolves by the runtime type of `value`, following proxy indirection.
    pub fn get_for<T: Typed + ?Sized>(&self, value: &T) -> Result<Option<Arc<E>>, RegistryError> {
        self.get(value.dispatch_type())
    }

    /// Whether the map holds an entry for exactly `key`. Does not resolve.
    pub fn contains(&self, key: TypeKey) -> bool {
        self.entries.read().contains_key(&key)
    }

    /// Number of map entries, explicit and derived.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Explicitly registered types in first-registration order.
    pub fn registered_types(&self) -> Vec<TypeKey> {
        self.registered.read().clone()
    }

    /// Fails when two registrations can serve a common subtype without one
    /// overriding the other and both declare the same operation.
    pub fn check_collisions(&self) -> Result<(), RegistryError> {
        let collisions = self.find_collisions();
        if collisions.is_empty() {
            return Ok(());
        }
        for collision in &collisions {
            error!(
                "event=extension_collision module=registry status=error {}",
                collision
            );
        }
        Err(RegistryError::Collisions(collisions))
    }

    /// Lists ambiguous operation overlaps between explicit registrations.
    pub fn find_collisions(&self) -> Vec<ExtensionCollision> {
        let explicit: Vec<(TypeKey, Arc<E>)> = {
            let registered = self.registered.read();
            let entries = self.entries.read();
            registered
                .iter()
                .filter_map(|key| entries.get(key).map(|ext| (*key, Arc::clone(ext))))
                .collect()
        };

        let mut checked = BTreeSet::new();
        let mut collisions = Vec::new();
        for subject in self.graph.keys() {
            let ancestors = self.graph.ancestors(subject);
            let applicable: Vec<&(TypeKey, Arc<E>)> = explicit
                .iter()
                .filter(|(key, _)| ancestors.contains(key))
                .collect();

            for (index, (first, first_ext)) in applicable.iter().copied().enumerate() {
                for (second, second_ext) in applicable[index + 1..].iter().copied() {
                    let (first, second) = (*first, *second);
                    if self.graph.is_subtype(first, second) || self.graph.is_subtype(second, first)
                    {
                        continue;
                    }
                    if !checked.insert((first.min(second), first.max(second))) {
                        continue;
                    }
                    let second_ops = second_ext.operations();
                    for operation in first_ext.operations() {
                        if second_ops.contains(operation) {
                            collisions.push(ExtensionCollision {
                                family: self.family.clone(),
                                first: self.type_label(first),
                                second: self.type_label(second),
                                operation: *operation,
                                subject: self.type_label(subject),
                            });
                        }
                    }
                }
            }
        }
        collisions
    }

    fn resolve(&self, key: TypeKey) -> Result<Option<Arc<E>>, RegistryError> {
        if let Some(existing) = self.entries.read().get(&key) {
            return Ok(Some(Arc::clone(existing)));
        }
        let Some(descriptor) = self.graph.descriptor(key) else {
            return Ok(None);
        };

        for interface in &descriptor.interfaces {
            if let Some(found) = self.resolve(*interface)? {
                return self.install_derived(key, &found).map(Some);
            }
        }
        if descriptor.is_interface() {
            return Ok(None);
        }
        let Some(superclass) = descriptor.superclass else {
            return Ok(None);
        };
        match self.resolve(superclass)? {
            Some(found) => self.install_derived(key, &found).map(Some),
            None => Ok(None),
        }
    }

    fn install_derived(&self, key: TypeKey, template: &E) -> Result<Arc<E>, RegistryError> {
        let copy = Arc::new(self.instantiate(template, key)?);
        let mut entries = self.entries.write();
        match entries.entry(key) {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                trace!(
                    "event=extension_derive module=registry family={} type={} source={}",
                    self.family,
                    self.type_label(key),
                    template
                        .for_type()
                        .map(|source| self.type_label(source))
                        .unwrap_or_else(|| "unbound".to_string())
                );
                Ok(Arc::clone(slot.insert(copy)))
            }
        }
    }

    fn instantiate(&self, template: &E, key: TypeKey) -> Result<E, RegistryError> {
        let mut copy = template.duplicate().map_err(RegistryError::Extension)?;
        copy.binding_mut()
            .bind(key)
            .map_err(RegistryError::Extension)?;
        Ok(copy)
    }

    fn type_label(&self, key: TypeKey) -> String {
        self.graph
            .name_of(key)
            .unwrap_or_else(|| key.to_string())
    }
}

impl<E: Extension> Debug for ExtensionRegistry<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("entries", &self.len())
            .field("registered", &self.registered.read().len())
            .finish()
    }
}

/// Two registrations that can both serve `subject` and declare `operation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionCollision {
    pub family: String,
    pub first: String,
    pub second: String,
    pub operation: &'static str,
    /// A type that inherits from both registrations.
    pub subject: String,
}

impl Display for ExtensionCollision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "family={} operation={} first={} second={} subject={}",
            self.family, self.operation, self.first, self.second, self.subject
        )
    }
}

/// Registry registration and resolution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    UnknownType(TypeKey),
    Extension(ExtensionError),
    Collisions(Vec<ExtensionCollision>),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownType(key) => write!(f, "type is not declared: {key}"),
            Self::Extension(err) => write!(f, "extension setup failed: {err}"),
            Self::Collisions(collisions) => {
                write!(f, "{} extension collision(s)", collisions.len())?;
                if let Some(first) = collisions.first() {
                    write!(f, "; first: {first}")?;
                }
                Ok(())
            }
        }
    }
}

impl Error for RegistryError {}

#[cfg(test)]
mod tests {
    use super::{ExtensionRegistry, RegistryError, DEFAULT_MRU_CAPACITY};
    use crate::extension::capability::{Binding, Extension, ExtensionError};
    use crate::types::graph::{TypeGraph, TypeKey};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct Label {
        binding: Binding,
        text: &'static str,
    }

    impl Label {
        fn new(text: &'static str) -> Self {
            Self {
                binding: Binding::unbound(),
                text,
            }
        }
    }

    impl Extension for Label {
        fn binding(&self) -> &Binding {
            &self.binding
        }

        fn binding_mut(&mut self) -> &mut Binding {
            &mut self.binding
        }
    }

    #[derive(Debug, Clone)]
    struct Unclonable {
        binding: Binding,
    }

    impl Extension for Unclonable {
        fn binding(&self) -> &Binding {
            &self.binding
        }

        fn binding_mut(&mut self) -> &mut Binding {
            &mut self.binding
        }

        fn duplicate(&self) -> Result<Self, ExtensionError> {
            Err(ExtensionError::DuplicateFailed("owns a socket".to_string()))
        }
    }

    /// Duplicates freely until bound, then refuses to be copied again.
    #[derive(Debug, Clone)]
    struct OneShot {
        binding: Binding,
    }

    impl Extension for OneShot {
        fn binding(&self) -> &Binding {
            &self.binding
        }

        fn binding_mut(&mut self) -> &mut Binding {
            &mut self.binding
        }

        fn duplicate(&self) -> Result<Self, ExtensionError> {
            if self.binding.is_bound() {
                return Err(ExtensionError::DuplicateFailed("bound copy".to_string()));
            }
            Ok(self.clone())
        }
    }

    #[test]
    fn new_registry_is_empty_with_default_capacity() {
        let registry = ExtensionRegistry::<Label>::new("labels", Arc::new(TypeGraph::new()));
        assert!(registry.is_empty());
        assert_eq!(registry.family(), "labels");
        assert_eq!(registry.mru_capacity(), DEFAULT_MRU_CAPACITY);
        assert!(registry.get(TypeKey::OBJECT).expect("lookup").is_none());
    }

    #[test]
    fn register_returns_bound_copy() {
        let registry = ExtensionRegistry::new("labels", Arc::new(TypeGraph::new()));
        let template = Label::new("object");
        let installed = registry
            .register(TypeKey::OBJECT, &template)
            .expect("register object default");

        assert_eq!(installed.for_type(), Some(TypeKey::OBJECT));
        assert_eq!(template.for_type(), None);
        assert_eq!(installed.text, "object");
        assert_eq!(registry.registered_types(), vec![TypeKey::OBJECT]);
    }

    #[test]
    fn register_rejects_undeclared_type() {
        let other = TypeGraph::new();
        let stray = other.declare_class("Stray", None, &[]).expect("declare");
        let registry = ExtensionRegistry::new("labels", Arc::new(TypeGraph::new()));
        let err = registry
            .register(stray, &Label::new("stray"))
            .expect_err("undeclared key must fail");
        assert_eq!(err, RegistryError::UnknownType(stray));
    }

    #[test]
    fn keys_from_another_graph_never_alias_local_types() {
        let graph = Arc::new(TypeGraph::new());
        let local = graph.declare_class("Local", None, &[]).expect("local");
        let other = TypeGraph::new();
        let foreign = other.declare_class("Foreign", None, &[]).expect("foreign");
        assert_eq!(local.index(), foreign.index());

        let registry = ExtensionRegistry::new("labels", Arc::clone(&graph));
        registry
            .register(local, &Label::new("local"))
            .expect("register local");

        let err = registry
            .register(foreign, &Label::new("foreign"))
            .expect_err("foreign key must be rejected");
        assert_eq!(err, RegistryError::UnknownType(foreign));
        assert!(registry.get(foreign).expect("lookup").is_none());
        assert_eq!(registry.registered_types(), vec![local]);
    }

    #[test]
    fn re_registering_same_type_replaces_entry_and_cache() {
        let registry = ExtensionRegistry::new("labels", Arc::new(TypeGraph::new()));
        registry
            .register(TypeKey::OBJECT, &Label::new("first"))
            .expect("first");
        assert_eq!(registry.get(TypeKey::OBJECT).expect("lookup").expect("first hit").text, "first");

        registry
            .register(TypeKey::OBJECT, &Label::new("second"))
            .expect("second");
        assert_eq!(registry.get(TypeKey::OBJECT).expect("lookup").expect("second hit").text, "second");
        assert_eq!(registry.registered_types(), vec![TypeKey::OBJECT]);
    }

    #[test]
    fn duplicate_failure_is_reported() {
        let registry = ExtensionRegistry::new("sockets", Arc::new(TypeGraph::new()));
        let err = registry
            .register(
                TypeKey::OBJECT,
                &Unclonable {
                    binding: Binding::unbound(),
                },
            )
            .expect_err("duplicate failure must surface");
        assert!(matches!(
            err,
            RegistryError::Extension(ExtensionError::DuplicateFailed(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn derive_failure_surfaces_from_get() {
        let graph = Arc::new(TypeGraph::new());
        let leaf = graph.declare_class("Leaf", None, &[]).expect("leaf");
        let registry = ExtensionRegistry::new("one-shot", Arc::clone(&graph));
        registry
            .register(
                TypeKey::OBJECT,
                &OneShot {
                    binding: Binding::unbound(),
                },
            )
            .expect("unbound template duplicates");

        let err = registry
            .get(leaf)
            .expect_err("derive failure must not read as a miss");
        assert!(matches!(
            err,
            RegistryError::Extension(ExtensionError::DuplicateFailed(_))
        ));
        assert!(!registry.contains(leaf));
        assert!(registry.get(leaf).is_err());
        assert!(registry
            .get(TypeKey::OBJECT)
            .expect("object entry is intact")
            .is_some());
    }

    #[test]
    fn contains_does_not_resolve() {
        let graph = Arc::new(TypeGraph::new());
        let shape = graph.declare_class("Shape", None, &[]).expect("shape");
        let registry = ExtensionRegistry::new("labels", Arc::clone(&graph));
        registry
            .register(TypeKey::OBJECT, &Label::new("object"))
            .expect("register");

        assert!(!registry.contains(shape));
        registry
            .get(shape)
            .expect("lookup")
            .expect("derived from object");
        assert!(registry.contains(shape));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.registered_types(), vec![TypeKey::OBJECT]);
    }
}
