//! Namespaces and vars.
//!
//! A `Namespace` maps simple symbols to vars; an `Env` owns the var table
//! and the namespace registry and tracks the current namespace. Vars and
//! namespaces are infrastructure: allocated with the ordinary allocator,
//! alive for the whole process, never swept. The values a var holds (root
//! and dynamic bindings) are GC roots, as are protocol implementations.
//!
//! Resolution order for unqualified symbols: current namespace's own
//! mappings, then its referred vars, then the implicit `clove.core`
//! namespace. Qualified symbols hit the named namespace directly.

use clove_core::value::Tag;
use clove_core::{intern, ObjRef, SymId, Value, VarId};
use std::collections::HashMap;

pub const CORE_NS: &str = "clove.core";
pub const USER_NS: &str = "user";

/// Var metadata, populated by `def` forms and `defn` doc strings.
#[derive(Debug, Clone, Default)]
pub struct VarMeta {
    pub is_macro: bool,
    pub is_private: bool,
    pub is_dynamic: bool,
    pub doc: Option<Box<str>>,
    /// Printed arglists, e.g. "([x] [x y])".
    pub arglists: Option<Box<str>>,
}

/// A named mutable indirection cell owned by a namespace.
#[derive(Debug)]
pub struct Var {
    /// Fully qualified name (ns/name).
    pub name: SymId,
    pub root: Option<Value>,
    pub meta: VarMeta,
    /// Dynamic rebinding stack; only pushed for `:dynamic` vars.
    pub dyn_stack: Vec<Value>,
    /// Watchers, run as (key var old new) on root mutation.
    pub watchers: Vec<(Value, Value)>,
}

impl Var {
    fn new(name: SymId) -> Self {
        Var {
            name,
            root: None,
            meta: VarMeta::default(),
            dyn_stack: Vec::new(),
            watchers: Vec::new(),
        }
    }

    /// The value seen by deref: innermost dynamic binding, else the root.
    pub fn value(&self) -> Option<Value> {
        self.dyn_stack.last().copied().or(self.root)
    }
}

#[derive(Debug, Default)]
pub struct Namespace {
    pub name: SymId,
    mappings: HashMap<SymId, VarId>,
    refers: HashMap<SymId, VarId>,
}

impl Namespace {
    fn new(name: SymId) -> Self {
        Namespace {
            name,
            mappings: HashMap::new(),
            refers: HashMap::new(),
        }
    }

    pub fn lookup(&self, sym: SymId) -> Option<VarId> {
        self.mappings.get(&sym).copied()
    }
}

pub struct Env {
    vars: Vec<Var>,
    namespaces: HashMap<SymId, Namespace>,
    pub current_ns: SymId,
    core_ns: SymId,
    /// Protocol implementations: (protocol object, concrete tag) ->
    /// method name -> function value.
    protocol_impls: HashMap<(ObjRef, Tag), HashMap<SymId, Value>>,
}

impl Env {
    pub fn new() -> Self {
        let core = intern::intern_name(CORE_NS);
        let user = intern::intern_name(USER_NS);
        let mut env = Env {
            vars: Vec::new(),
            namespaces: HashMap::new(),
            current_ns: user,
            core_ns: core,
            protocol_impls: HashMap::new(),
        };
        env.namespaces.insert(core, Namespace::new(core));
        env.namespaces.insert(user, Namespace::new(user));
        env
    }

    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.0 as usize]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Var {
        &mut self.vars[id.0 as usize]
    }

    pub fn core_ns(&self) -> SymId {
        self.core_ns
    }

    /// Ensure a namespace exists and return its name id.
    pub fn ensure_ns(&mut self, name: SymId) -> SymId {
        self.namespaces
            .entry(name)
            .or_insert_with(|| Namespace::new(name));
        name
    }

    /// Switch the current namespace, creating it if needed.
    pub fn set_current_ns(&mut self, name: SymId) {
        self.ensure_ns(name);
        self.current_ns = name;
    }

    /// Intern a var named by an unqualified symbol into the given namespace,
    /// creating it without a root if absent.
    pub fn intern_var(&mut self, ns: SymId, sym: SymId) -> VarId {
        self.ensure_ns(ns);
        if let Some(id) = self.namespaces[&ns].mappings.get(&sym) {
            return *id;
        }
        let qualified = intern::intern(Some(intern::full_name(ns)), intern::name_of(sym));
        let id = VarId(self.vars.len() as u32);
        self.vars.push(Var::new(qualified));
        if let Some(namespace) = self.namespaces.get_mut(&ns) {
            namespace.mappings.insert(sym, id);
        }
        id
    }

    /// Intern into the current namespace.
    pub fn intern_current(&mut self, sym: SymId) -> VarId {
        let ns = self.current_ns;
        self.intern_var(ns, sym)
    }

    /// Make `sym -> var` visible in `ns` as a referred mapping.
    pub fn refer(&mut self, ns: SymId, sym: SymId, var: VarId) {
        self.ensure_ns(ns);
        if let Some(namespace) = self.namespaces.get_mut(&ns) {
            namespace.refers.insert(sym, var);
        }
    }

    /// Direct lookup in one namespace's own mappings (no refers, no core
    /// fallback).
    pub fn lookup_ns(&self, ns: SymId, sym: SymId) -> Option<VarId> {
        self.namespaces.get(&ns)?.lookup(sym)
    }

    /// Resolve a symbol against the current namespace.
    pub fn resolve(&self, sym: SymId) -> Option<VarId> {
        match intern::ns_of(sym) {
            Some(ns_name) => {
                let ns = intern::intern_name(ns_name);
                let simple = intern::intern_name(intern::name_of(sym));
                self.namespaces.get(&ns)?.lookup(simple)
            }
            None => {
                let current = self.namespaces.get(&self.current_ns);
                if let Some(ns) = current {
                    if let Some(id) = ns.mappings.get(&sym) {
                        return Some(*id);
                    }
                    if let Some(id) = ns.refers.get(&sym) {
                        return Some(*id);
                    }
                }
                self.namespaces.get(&self.core_ns)?.lookup(sym)
            }
        }
    }

    // Protocol registry.

    pub fn extend_protocol(
        &mut self,
        proto: ObjRef,
        tag: Tag,
        methods: impl IntoIterator<Item = (SymId, Value)>,
    ) {
        let table = self.protocol_impls.entry((proto, tag)).or_default();
        for (name, f) in methods {
            table.insert(name, f);
        }
    }

    pub fn protocol_method(&self, proto: ObjRef, tag: Tag, method: SymId) -> Option<Value> {
        self.protocol_impls
            .get(&(proto, tag))
            .and_then(|t| t.get(&method))
            .copied()
    }

    pub fn protocol_extends(&self, proto: ObjRef, tag: Tag) -> bool {
        self.protocol_impls.contains_key(&(proto, tag))
    }

    /// Every value the environment keeps alive: var roots, dynamic binding
    /// stacks, var watchers, and protocol implementations.
    pub fn gc_roots(&self, out: &mut Vec<Value>) {
        for var in &self.vars {
            if let Some(v) = var.root {
                out.push(v);
            }
            out.extend_from_slice(&var.dyn_stack);
            for &(k, w) in &var.watchers {
                out.push(k);
                out.push(w);
            }
        }
        for table in self.protocol_impls.values() {
            out.extend(table.values().copied());
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Env::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clove_core::intern;

    #[test]
    fn test_intern_and_resolve_current() {
        let mut env = Env::new();
        let sym = intern::intern_name("x");
        let id = env.intern_current(sym);
        env.var_mut(id).root = Some(Value::Int(42));
        assert_eq!(env.resolve(sym), Some(id));
        assert_eq!(env.var(id).value(), Some(Value::Int(42)));
    }

    #[test]
    fn test_core_fallback() {
        let mut env = Env::new();
        let core = env.core_ns();
        let sym = intern::intern_name("map");
        let id = env.intern_var(core, sym);
        // Unqualified lookup from `user` falls through to clove.core.
        assert_eq!(env.resolve(sym), Some(id));
    }

    #[test]
    fn test_qualified_resolution() {
        let mut env = Env::new();
        let other = intern::intern_name("other.ns");
        env.ensure_ns(other);
        let sym = intern::intern_name("thing");
        let id = env.intern_var(other, sym);
        let qualified = intern::intern(Some("other.ns"), "thing");
        assert_eq!(env.resolve(qualified), Some(id));
        // Unqualified does not leak across namespaces.
        assert_eq!(env.resolve(sym), None);
    }

    #[test]
    fn test_shadowing_core_with_local_def() {
        let mut env = Env::new();
        let sym = intern::intern_name("inc");
        let core_id = env.intern_var(env.core_ns(), sym);
        let user_id = env.intern_current(sym);
        assert_ne!(core_id, user_id);
        assert_eq!(env.resolve(sym), Some(user_id));
    }

    #[test]
    fn test_dynamic_binding_stack() {
        let mut env = Env::new();
        let sym = intern::intern_name("*depth*");
        let id = env.intern_current(sym);
        env.var_mut(id).root = Some(Value::Int(0));
        env.var_mut(id).dyn_stack.push(Value::Int(1));
        assert_eq!(env.var(id).value(), Some(Value::Int(1)));
        env.var_mut(id).dyn_stack.pop();
        assert_eq!(env.var(id).value(), Some(Value::Int(0)));
    }
}
