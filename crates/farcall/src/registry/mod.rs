//! Member registry: discovery, indexing, and name resolution.
//!
//! This module provides:
//! - `MEMBER_TABLES`, the distributed slice the attribute macros populate
//!   with one compile-time table per annotated item
//! - `Container`, the trait every annotated container type implements
//! - `RegistryBuilder` for registering live instances and running the scan
//! - `Registry`, the frozen canonical/alias indices with `resolve`
//! - `init` / `global` / `try_global` for the process-wide registry
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use farcall::registry::{self, RegistryBuilder};
//!
//! let registry = RegistryBuilder::default()
//!     .register(Arc::new(Greeter))
//!     .register(Arc::new(Build::default()))
//!     .scan();
//!
//! // Freeze it process-wide (optional; the gRPC server also accepts an
//! // explicit Arc<Registry>).
//! registry::init(registry);
//! let hit = registry::global().resolve("Greeter", "hi", &[]);
//! ```

use std::any::{Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use linkme::distributed_slice;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::member::{MemberDef, MemberKind};

/// Shared handle to a registered container instance.
pub type ArcAny = Arc<dyn Any + Send + Sync>;

/// Orders tables within one container: datum tables are scanned before
/// callable tables so plain-key entries land first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TableRank {
    Datums,
    Callables,
}

/// One compile-time member table emitted by `#[container]` or `#[members]`.
pub struct MemberTable {
    /// Identifies the container type this table belongs to.
    pub type_id: fn() -> TypeId,
    pub rank: TableRank,
    /// Builds the member definitions, binding handlers to the instance.
    pub members: fn(&ArcAny) -> Vec<MemberDef>,
}

/// Distributed slice of all member tables in the binary.
#[distributed_slice]
pub static MEMBER_TABLES: [MemberTable];

/// Implemented (via `#[container]`) by every type that exposes members.
pub trait Container: Send + Sync + 'static {
    /// Stable container identifier: the concrete type's short name unless
    /// overridden.
    fn container_name(&self) -> &'static str;

    /// Full paths of the abstract types this container is aliased under.
    fn alias_paths(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Alias paths under these prefixes belong to the platform or framework
/// and are never registered.
const RESERVED_ALIAS_PREFIXES: &[&str] =
    &["std::", "core::", "alloc::", "tokio::", "serde::", "farcall::"];

fn is_reserved_alias(path: &str) -> bool {
    RESERVED_ALIAS_PREFIXES.iter().any(|p| path.starts_with(p))
}

fn alias_short_name(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

struct Registered {
    type_id: TypeId,
    name: &'static str,
    aliases: &'static [&'static str],
    instance: ArcAny,
}

/// Collects container instances and produces a frozen [`Registry`].
///
/// Scanning is a pure function of the registered instances, so calling
/// [`RegistryBuilder::scan`] twice yields registries equal by content.
#[derive(Default)]
pub struct RegistryBuilder {
    containers: Vec<Registered>,
}

impl RegistryBuilder {
    pub fn register<C: Container>(mut self, instance: Arc<C>) -> Self {
        let name = instance.container_name();
        let aliases = instance.alias_paths();
        self.containers.push(Registered {
            type_id: TypeId::of::<C>(),
            name,
            aliases,
            instance: instance as ArcAny,
        });
        self
    }

    /// Walk the member tables of every registered container and build the
    /// canonical and alias indices. First writer wins on key collisions.
    pub fn scan(&self) -> Registry {
        info!("farcall: scanning registered containers for exposed members...");
        let mut registry = Registry::default();
        let mut count = 0usize;

        for registered in &self.containers {
            let mut tables: Vec<&MemberTable> = MEMBER_TABLES
                .iter()
                .filter(|t| (t.type_id)() == registered.type_id)
                .collect();
            tables.sort_by_key(|t| t.rank);

            // Keys this container actually owns, for alias re-keying below.
            let mut container_keys: Vec<String> = Vec::new();

            for table in tables {
                for def in (table.members)(&registered.instance) {
                    let def = Arc::new(def);
                    let key = def.full_key();
                    match registry.canonical.entry(key.clone()) {
                        Entry::Occupied(_) => continue,
                        Entry::Vacant(slot) => {
                            slot.insert(def.clone());
                        }
                    }
                    if def.kind == MemberKind::Callable {
                        registry
                            .canonical_by_base
                            .entry(def.base_key())
                            .or_default()
                            .push(def.clone());
                    }
                    match def.kind {
                        MemberKind::Callable => info!(
                            "  [callable] {} -> {} | family={:?} | static={}",
                            key,
                            if def.secured { "SECURED" } else { "PUBLIC" },
                            def.credential_family,
                            def.is_static,
                        ),
                        MemberKind::Datum => info!(
                            "  [datum]    {} -> {} | family={:?} | static={} | writeable={}",
                            key,
                            if def.secured { "SECURED" } else { "PUBLIC" },
                            def.credential_family,
                            def.is_static,
                            def.writeable(),
                        ),
                    }
                    registry.scan_order.push(def);
                    container_keys.push(key);
                    count += 1;
                }
            }

            for alias_path in registered.aliases {
                if is_reserved_alias(alias_path) {
                    debug!("  skipping reserved alias {alias_path}");
                    continue;
                }
                let alias_name = alias_short_name(alias_path);
                if alias_name == registered.name {
                    continue;
                }
                let mut alias_count = 0usize;
                for key in &container_keys {
                    let suffix = &key[registered.name.len() + 1..];
                    let alias_key = format!("{alias_name}.{suffix}");
                    let Some(def) = registry.canonical.get(key).cloned() else {
                        continue;
                    };
                    if let Entry::Vacant(slot) = registry.aliases.entry(alias_key) {
                        slot.insert(def.clone());
                        alias_count += 1;
                        if def.kind == MemberKind::Callable {
                            registry
                                .aliases_by_base
                                .entry(format!("{alias_name}.{}", def.member_name))
                                .or_default()
                                .push(def);
                        }
                    }
                }
                if alias_count > 0 {
                    info!(
                        "  [alias]    {} -> {} ({} member(s))",
                        alias_name, registered.name, alias_count
                    );
                }
            }
        }

        info!("farcall: scan complete - {count} member(s) registered");
        registry
    }
}

/// Outcome of a registry lookup.
pub enum Lookup {
    /// Exactly one member matched.
    Member(Arc<MemberDef>),
    /// Several same-named callables matched and no parameter types were
    /// supplied; the dispatcher may narrow further by argument shape.
    Ambiguous(Vec<Arc<MemberDef>>),
    NotFound,
}

/// Frozen member indices. Populated once by the scan, read-only afterwards;
/// readers take no locks.
#[derive(Default)]
pub struct Registry {
    canonical: HashMap<String, Arc<MemberDef>>,
    canonical_by_base: HashMap<String, Vec<Arc<MemberDef>>>,
    aliases: HashMap<String, Arc<MemberDef>>,
    aliases_by_base: HashMap<String, Vec<Arc<MemberDef>>>,
    scan_order: Vec<Arc<MemberDef>>,
}

impl Registry {
    /// Looks up a member by container name, member name, and optional
    /// parameter type names.
    ///
    /// - Datums: always found by the plain `Container.member` key
    /// - Callables with parameter types: exact `Container.member(T1,T2)` key
    /// - Callables without parameter types: unambiguous base-name lookup;
    ///   returns [`Lookup::Ambiguous`] when several overloads exist
    ///
    /// Both the concrete container name and any registered alias are
    /// accepted; aliases are only consulted when the canonical lookup
    /// misses.
    pub fn resolve(&self, container: &str, member: &str, parameter_types: &[String]) -> Lookup {
        let base_key = format!("{container}.{member}");

        // 1. Direct lookup - hits datums (no parens) and aliased datums.
        if let Some(def) = self
            .canonical
            .get(&base_key)
            .or_else(|| self.aliases.get(&base_key))
        {
            return Lookup::Member(def.clone());
        }

        // 2. Exact callable lookup when the caller supplies parameter types.
        if !parameter_types.is_empty() {
            let full_key = format!("{base_key}({})", parameter_types.join(","));
            return match self
                .canonical
                .get(&full_key)
                .or_else(|| self.aliases.get(&full_key))
            {
                Some(def) => Lookup::Member(def.clone()),
                None => Lookup::NotFound,
            };
        }

        // 3. Unambiguous base-name lookup.
        let candidates = self
            .canonical_by_base
            .get(&base_key)
            .filter(|set| !set.is_empty())
            .or_else(|| self.aliases_by_base.get(&base_key));
        match candidates {
            Some(set) if set.len() == 1 => Lookup::Member(set[0].clone()),
            Some(set) if set.len() > 1 => Lookup::Ambiguous(set.clone()),
            _ => Lookup::NotFound,
        }
    }

    /// Canonical members in scan order. Aliases are never listed.
    pub fn members(&self) -> impl Iterator<Item = &Arc<MemberDef>> {
        self.scan_order.iter()
    }

    pub fn len(&self) -> usize {
        self.scan_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scan_order.is_empty()
    }

    /// Sorted content lines covering both indices; two scans of the same
    /// builder produce identical fingerprints.
    pub fn fingerprint(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .canonical
            .values()
            .map(|def| def.descriptor_line())
            .collect();
        lines.extend(
            self.aliases
                .iter()
                .map(|(key, def)| format!("alias:{key}=>{}", def.full_key())),
        );
        lines.sort();
        lines
    }
}

// ============================================================================
// Global registry
// ============================================================================

static REGISTRY: RwLock<Option<Arc<Registry>>> = RwLock::new(None);

/// Freeze the given registry as the process-wide instance.
///
/// Idempotent: subsequent calls are no-ops if already initialized.
pub fn init(registry: Registry) {
    let mut guard = REGISTRY.write();
    if guard.is_none() {
        *guard = Some(Arc::new(registry));
    }
}

/// Get the global registry.
///
/// # Panics
///
/// Panics if the registry has not been initialized.
pub fn global() -> Arc<Registry> {
    match REGISTRY.read().as_ref() {
        Some(registry) => registry.clone(),
        None => panic!("member registry not initialized - call registry::init() first"),
    }
}

/// Try to get the global registry (non-panicking).
pub fn try_global() -> Option<Arc<Registry>> {
    REGISTRY.read().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{CallFault, Handler, Outcome, ParameterSpec, ValueShape};
    use parking_lot::Mutex;

    // Serialize tests that touch the global registry.
    static TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn reset_registry() {
        *REGISTRY.write() = None;
    }

    struct Widget {
        label: String,
    }

    impl Container for Widget {
        fn container_name(&self) -> &'static str {
            "Widget"
        }

        fn alias_paths(&self) -> &'static [&'static str] {
            &["api::Labeled", "std::fmt::Display", "Widget"]
        }
    }

    fn widget_members(instance: &ArcAny) -> Vec<MemberDef> {
        let Ok(this) = instance.clone().downcast::<Widget>() else {
            return Vec::new();
        };
        let label = this.label.clone();
        vec![
            MemberDef {
                container_name: "Widget".to_owned(),
                member_name: "label".to_owned(),
                kind: MemberKind::Datum,
                secured: false,
                credential_family: None,
                immutable: true,
                is_static: false,
                parameters: Vec::new(),
                return_type_name: "String".to_owned(),
                description: String::new(),
                handler: Handler::Datum {
                    read: Arc::new(move || {
                        serde_json::to_value(&label).map_err(CallFault::marshal)
                    }),
                    write: None,
                },
            },
            callable_def("resize", &[("width", "i64", ValueShape::Num)]),
            callable_def("resize", &[("spec", "String", ValueShape::Str)]),
            callable_def("refresh", &[]),
        ]
    }

    fn callable_def(name: &str, params: &[(&str, &str, ValueShape)]) -> MemberDef {
        MemberDef {
            container_name: "Widget".to_owned(),
            member_name: name.to_owned(),
            kind: MemberKind::Callable,
            secured: false,
            credential_family: None,
            immutable: true,
            is_static: false,
            parameters: params
                .iter()
                .enumerate()
                .map(|(i, (n, t, s))| ParameterSpec {
                    name: (*n).to_owned(),
                    type_name: (*t).to_owned(),
                    index: i as u32,
                    shape: *s,
                    nullable: false,
                })
                .collect(),
            return_type_name: "void".to_owned(),
            description: String::new(),
            handler: Handler::Callable {
                invoke: Arc::new(|_| Box::pin(async { Ok(Outcome::Accepted) })),
            },
        }
    }

    #[distributed_slice(MEMBER_TABLES)]
    static WIDGET_TABLE: MemberTable = MemberTable {
        type_id: || TypeId::of::<Widget>(),
        rank: TableRank::Callables,
        members: widget_members,
    };

    fn widget_registry() -> Registry {
        RegistryBuilder::default()
            .register(Arc::new(Widget { label: "w1".to_owned() }))
            .scan()
    }

    #[test]
    fn test_resolve_datum_by_plain_key() {
        let registry = widget_registry();
        match registry.resolve("Widget", "label", &[]) {
            Lookup::Member(def) => assert_eq!(def.kind, MemberKind::Datum),
            _ => panic!("expected datum hit"),
        }
    }

    #[test]
    fn test_resolve_exact_overload() {
        let registry = widget_registry();
        match registry.resolve("Widget", "resize", &["String".to_owned()]) {
            Lookup::Member(def) => assert_eq!(def.full_key(), "Widget.resize(String)"),
            _ => panic!("expected exact overload hit"),
        }
    }

    #[test]
    fn test_resolve_unambiguous_base_name() {
        let registry = widget_registry();
        match registry.resolve("Widget", "refresh", &[]) {
            Lookup::Member(def) => assert_eq!(def.full_key(), "Widget.refresh()"),
            _ => panic!("expected single candidate"),
        }
    }

    #[test]
    fn test_resolve_ambiguous_overloads() {
        let registry = widget_registry();
        match registry.resolve("Widget", "resize", &[]) {
            Lookup::Ambiguous(candidates) => assert_eq!(candidates.len(), 2),
            _ => panic!("expected ambiguity"),
        }
    }

    #[test]
    fn test_resolve_not_found() {
        let registry = widget_registry();
        assert!(matches!(
            registry.resolve("Widget", "missing", &[]),
            Lookup::NotFound
        ));
        assert!(matches!(
            registry.resolve("Nowhere", "label", &[]),
            Lookup::NotFound
        ));
    }

    #[test]
    fn test_round_trip_every_member() {
        let registry = widget_registry();
        for def in registry.members() {
            let types: Vec<String> =
                def.parameters.iter().map(|p| p.type_name.clone()).collect();
            match registry.resolve(&def.container_name, &def.member_name, &types) {
                Lookup::Member(found) => assert_eq!(found.full_key(), def.full_key()),
                _ => panic!("round trip failed for {}", def.full_key()),
            }
        }
    }

    #[test]
    fn test_alias_transparency() {
        let registry = widget_registry();
        let canonical = match registry.resolve("Widget", "label", &[]) {
            Lookup::Member(def) => def,
            _ => panic!("canonical lookup failed"),
        };
        let aliased = match registry.resolve("Labeled", "label", &[]) {
            Lookup::Member(def) => def,
            _ => panic!("alias lookup failed"),
        };
        assert!(Arc::ptr_eq(&canonical, &aliased));
    }

    #[test]
    fn test_alias_overload_set() {
        let registry = widget_registry();
        assert!(matches!(
            registry.resolve("Labeled", "resize", &[]),
            Lookup::Ambiguous(_)
        ));
    }

    #[test]
    fn test_reserved_alias_never_registered() {
        let registry = widget_registry();
        assert!(matches!(
            registry.resolve("Display", "label", &[]),
            Lookup::NotFound
        ));
    }

    #[test]
    fn test_aliases_not_listed_by_introspection() {
        let registry = widget_registry();
        assert_eq!(registry.len(), 4);
        assert!(registry
            .members()
            .all(|def| def.container_name == "Widget"));
    }

    #[test]
    fn test_canonical_keys_distinct() {
        let registry = widget_registry();
        let mut keys: Vec<String> = registry.members().map(|d| d.full_key()).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_scan_idempotent() {
        let builder = RegistryBuilder::default()
            .register(Arc::new(Widget { label: "w1".to_owned() }));
        let first = builder.scan();
        let second = builder.scan();
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_double_registration_first_wins() {
        let registry = RegistryBuilder::default()
            .register(Arc::new(Widget { label: "first".to_owned() }))
            .register(Arc::new(Widget { label: "second".to_owned() }))
            .scan();
        // Same keys, no duplicates.
        assert_eq!(registry.len(), 4);
        let def = match registry.resolve("Widget", "label", &[]) {
            Lookup::Member(def) => def,
            _ => panic!("datum lookup failed"),
        };
        let Handler::Datum { read, .. } = &def.handler else {
            panic!("expected datum handler");
        };
        assert_eq!(read().unwrap(), serde_json::json!("first"));
    }

    #[test]
    fn test_global_lifecycle() {
        let _lock = TEST_MUTEX.lock();
        reset_registry();
        assert!(try_global().is_none());
        init(widget_registry());
        assert_eq!(global().len(), 4);
        // Second init is a no-op.
        init(RegistryBuilder::default().scan());
        assert_eq!(global().len(), 4);
        reset_registry();
    }
}
