//! The managed heap.
//!
//! Every heap-resident value payload lives in a slot table addressed by
//! `ObjRef(u32)`. Collection is mark-sweep over the slots: handles never
//! move, so they stay valid across collections and there is no forwarding
//! fixup to get wrong. Reclaimed slots go on a free list and are reused.
//!
//! Two allocation classes exist:
//!
//! - `alloc`: ordinary values, swept when unreachable
//! - `alloc_perm`: permanent values (node and chunk constants). These live
//!   as long as the process and are treated as additional roots, so a
//!   constant may freely reference ordinary values it was folded from.
//!
//! Collection runs only at safe points (function entry and `recur`
//! back-edges); the caller gathers every root into one slice. Built-ins
//! that hold values across a nested invocation must root them explicitly —
//! the runtime keeps a temp-root array for exactly that.
//!
//! The tracer (`trace_children`) is a single match that is statically total
//! over `Obj` and the lazy generator states. Adding a variant without
//! extending it is a compile error, not a use-after-free.

use crate::intern::SymId;
use crate::value::{FnDefId, Value};
use std::collections::HashMap;

/// Handle to a heap slot. Plain index; never dangles while the object is
/// reachable from a root at every safe point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(pub u32);

/// Kind tag for runtime exceptions. Compare mode asserts these match across
/// backends when both throw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrKind {
    Arity,
    Type,
    Arithmetic,
    IndexOutOfBounds,
    UnboundVar,
    NoMatchingMethod,
    NoProtocolImpl,
    AssertionFailed,
    IllegalArgument,
    IllegalState,
    StackOverflow,
    User,
}

impl ErrKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrKind::Arity => "arity-error",
            ErrKind::Type => "type-error",
            ErrKind::Arithmetic => "arithmetic-error",
            ErrKind::IndexOutOfBounds => "index-out-of-bounds",
            ErrKind::UnboundVar => "unbound-var",
            ErrKind::NoMatchingMethod => "no-matching-method",
            ErrKind::NoProtocolImpl => "no-protocol-impl",
            ErrKind::AssertionFailed => "assertion-failed",
            ErrKind::IllegalArgument => "illegal-argument",
            ErrKind::IllegalState => "illegal-state",
            ErrKind::StackOverflow => "stack-overflow",
            ErrKind::User => "error",
        }
    }
}

/// Map payload: insertion-ordered entries plus a lazily built hash index.
/// The index maps structural hash -> entry indices (collision chain).
/// Derived copies drop the index; it is rebuilt on first keyed lookup.
#[derive(Debug, Clone, Default)]
pub struct MapData {
    pub entries: Vec<(Value, Value)>,
    pub index: Option<HashMap<u64, Vec<u32>>>,
}

impl MapData {
    pub fn new(entries: Vec<(Value, Value)>) -> Self {
        MapData {
            entries,
            index: None,
        }
    }
}

/// Set payload, same shape as `MapData` with entries only.
#[derive(Debug, Clone, Default)]
pub struct SetData {
    pub entries: Vec<Value>,
    pub index: Option<HashMap<u64, Vec<u32>>>,
}

impl SetData {
    pub fn new(entries: Vec<Value>) -> Self {
        SetData {
            entries,
            index: None,
        }
    }
}

/// A user function: a handle to its static definition (arities, bodies,
/// compiled chunks) plus the values captured at closure creation.
#[derive(Debug, Clone)]
pub struct ClosureObj {
    pub def: FnDefId,
    pub name: Option<SymId>,
    pub captures: Vec<Value>,
}

/// A built-in function: index into the runtime's builtin table.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinObj {
    pub name: SymId,
    pub id: u16,
}

/// Result of `partial`: held as its own variant to preserve printability.
#[derive(Debug, Clone)]
pub struct PartialObj {
    pub f: Value,
    pub args: Vec<Value>,
}

/// Result of `comp`: functions right-to-left.
#[derive(Debug, Clone)]
pub struct CompObj {
    pub fns: Vec<Value>,
}

/// A multimethod: dispatch function plus dispatch-value -> method table.
/// Methods are compared to the dispatch value with structural `=`.
#[derive(Debug, Clone)]
pub struct MultiFnObj {
    pub name: SymId,
    pub dispatch: Value,
    pub methods: Vec<(Value, Value)>,
    pub default: Option<Value>,
}

/// A protocol: method signatures only. Implementations live in the
/// environment's (protocol, tag) registry.
#[derive(Debug, Clone)]
pub struct ProtocolObj {
    pub name: SymId,
    pub sigs: Vec<SymId>,
}

/// A protocol method as a value: dispatches on its first argument's tag.
#[derive(Debug, Clone)]
pub struct ProtocolFnObj {
    pub proto: Value,
    pub method: SymId,
}

/// A mutable cell with optional validator and watchers.
/// Watchers run as `(key atom old new)` after successful updates.
#[derive(Debug, Clone)]
pub struct AtomObj {
    pub value: Value,
    pub validator: Option<Value>,
    pub watchers: Vec<(Value, Value)>,
}

/// Unforced lazy sequence generators. Forcing lives in the runtime (it may
/// invoke user functions); the data lives here so the tracer sees every
/// captured value.
#[derive(Debug, Clone)]
pub enum LazyGen {
    /// Numeric range. `end == None` is the infinite `(range)`.
    Range {
        next: i64,
        end: Option<i64>,
        step: i64,
    },
    /// `(iterate f seed)`: seed, (f seed), ...
    Iterate { f: Value, next: Value },
    /// `(repeat x)` / `(repeat n x)`.
    Repeat { remaining: Option<i64>, x: Value },
    /// `(cycle coll)`: `pos` walks the source, rewinding to `src`.
    Cycle { src: Value, pos: Value },
    Take { n: i64, src: Value },
    Drop { n: i64, src: Value },
    TakeWhile { pred: Value, src: Value },
    DropWhile { pred: Value, src: Value },
    /// N-ary map; stops at the shortest source.
    Map { f: Value, srcs: Vec<Value> },
    MapIndexed { f: Value, idx: i64, src: Value },
    /// `keep == true` keeps matching elements (filter); `false` drops them
    /// (remove).
    Filter {
        pred: Value,
        src: Value,
        keep: bool,
    },
    Keep { f: Value, src: Value },
    KeepIndexed { f: Value, idx: i64, src: Value },
    /// Concatenation: current sequence, then a seq of remaining seqs.
    Concat { cur: Value, rest: Value },
    Interleave { srcs: Vec<Value> },
    Interpose {
        sep: Value,
        src: Value,
        pending_sep: bool,
    },
    Partition {
        n: i64,
        step: i64,
        src: Value,
        all: bool,
    },
    Distinct { src: Value, seen: Vec<Value> },
    /// `(lazy-seq body)`: a zero-arity thunk invoked at most once.
    Thunk { f: Value },
}

/// Lazy sequence cell. Realization is monotonic: once `Cons` or `Empty`,
/// the cell never changes again.
#[derive(Debug, Clone)]
pub enum LazyState {
    Unforced(LazyGen),
    Cons { head: Value, tail: Value },
    Empty,
}

/// The generator stays in `state` while it is being stepped (so its captured
/// values remain traced); `forcing` guards against re-entrant realization.
#[derive(Debug, Clone)]
pub struct LazyObj {
    pub state: LazyState,
    pub forcing: bool,
}

/// Compiled regex literal. The pattern source round-trips through print.
#[derive(Debug, Clone)]
pub struct RegexObj {
    pub source: Box<str>,
}

/// A runtime exception value (`ex-info` record or wrapped builtin failure).
#[derive(Debug, Clone)]
pub struct ErrorObj {
    pub kind: ErrKind,
    pub message: Box<str>,
    pub data: Value,
}

/// Heap-resident payloads.
#[derive(Debug, Clone)]
pub enum Obj {
    Str(Box<str>),
    List(Vec<Value>),
    Vector(Vec<Value>),
    Map(MapData),
    Set(SetData),
    Closure(ClosureObj),
    Builtin(BuiltinObj),
    Partial(PartialObj),
    Comp(CompObj),
    MultiFn(MultiFnObj),
    Protocol(ProtocolObj),
    ProtocolFn(ProtocolFnObj),
    Atom(AtomObj),
    Lazy(LazyObj),
    Regex(RegexObj),
    Error(ErrorObj),
}

/// Push every child handle of `obj` onto the worklist. Statically total:
/// no wildcard arm, so a new variant will not silently leak or dangle.
fn trace_children(obj: &Obj, out: &mut Vec<ObjRef>) {
    let mut push = |v: Value| {
        if let Value::Obj(r) = v {
            out.push(r);
        }
    };
    match obj {
        Obj::Str(_) => {}
        Obj::List(items) | Obj::Vector(items) => {
            for &v in items {
                push(v);
            }
        }
        Obj::Map(m) => {
            for &(k, v) in &m.entries {
                push(k);
                push(v);
            }
        }
        Obj::Set(s) => {
            for &v in &s.entries {
                push(v);
            }
        }
        Obj::Closure(c) => {
            for &v in &c.captures {
                push(v);
            }
        }
        Obj::Builtin(_) => {}
        Obj::Partial(p) => {
            push(p.f);
            for &v in &p.args {
                push(v);
            }
        }
        Obj::Comp(c) => {
            for &v in &c.fns {
                push(v);
            }
        }
        Obj::MultiFn(m) => {
            push(m.dispatch);
            for &(dv, f) in &m.methods {
                push(dv);
                push(f);
            }
            if let Some(d) = m.default {
                push(d);
            }
        }
        Obj::Protocol(_) => {}
        Obj::ProtocolFn(p) => push(p.proto),
        Obj::Atom(a) => {
            push(a.value);
            if let Some(v) = a.validator {
                push(v);
            }
            for &(k, w) in &a.watchers {
                push(k);
                push(w);
            }
        }
        Obj::Lazy(l) => match &l.state {
            LazyState::Unforced(generator) => match generator {
                LazyGen::Range { .. } => {}
                LazyGen::Iterate { f, next } => {
                    push(*f);
                    push(*next);
                }
                LazyGen::Repeat { remaining: _, x } => push(*x),
                LazyGen::Cycle { src, pos } => {
                    push(*src);
                    push(*pos);
                }
                LazyGen::Take { n: _, src } | LazyGen::Drop { n: _, src } => push(*src),
                LazyGen::TakeWhile { pred, src } | LazyGen::DropWhile { pred, src } => {
                    push(*pred);
                    push(*src);
                }
                LazyGen::Map { f, srcs } => {
                    push(*f);
                    for &s in srcs {
                        push(s);
                    }
                }
                LazyGen::MapIndexed { f, idx: _, src } => {
                    push(*f);
                    push(*src);
                }
                LazyGen::Filter { pred, src, keep: _ } => {
                    push(*pred);
                    push(*src);
                }
                LazyGen::Keep { f, src } => {
                    push(*f);
                    push(*src);
                }
                LazyGen::KeepIndexed { f, idx: _, src } => {
                    push(*f);
                    push(*src);
                }
                LazyGen::Concat { cur, rest } => {
                    push(*cur);
                    push(*rest);
                }
                LazyGen::Interleave { srcs } => {
                    for &s in srcs {
                        push(s);
                    }
                }
                LazyGen::Interpose {
                    sep,
                    src,
                    pending_sep: _,
                } => {
                    push(*sep);
                    push(*src);
                }
                LazyGen::Partition { src, .. } => push(*src),
                LazyGen::Distinct { src, seen } => {
                    push(*src);
                    for &v in seen {
                        push(v);
                    }
                }
                LazyGen::Thunk { f } => push(*f),
            },
            LazyState::Cons { head, tail } => {
                push(*head);
                push(*tail);
            }
            LazyState::Empty => {}
        },
        Obj::Regex(_) => {}
        Obj::Error(e) => push(e.data),
    }
}

struct Slot {
    obj: Option<Obj>,
    mark: bool,
    perm: bool,
}

/// Statistics for one collection, reported through `tracing`.
#[derive(Debug, Clone, Copy)]
pub struct GcStats {
    pub live_before: usize,
    pub freed: usize,
    pub live_after: usize,
}

const INITIAL_GC_THRESHOLD: usize = 16 * 1024;

pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    threshold: usize,
    collections: u64,
}

impl Heap {
    pub fn new() -> Self {
        Heap::with_threshold(INITIAL_GC_THRESHOLD)
    }

    pub fn with_threshold(threshold: usize) -> Self {
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            threshold: threshold.max(64),
            collections: 0,
        }
    }

    fn alloc_slot(&mut self, obj: Obj, perm: bool) -> ObjRef {
        self.live += 1;
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.obj = Some(obj);
            slot.mark = false;
            slot.perm = perm;
            ObjRef(idx)
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot {
                obj: Some(obj),
                mark: false,
                perm,
            });
            ObjRef(idx)
        }
    }

    /// Allocate an ordinary (collectable) object.
    pub fn alloc(&mut self, obj: Obj) -> ObjRef {
        self.alloc_slot(obj, false)
    }

    /// Allocate a permanent object (node/chunk constants). Never swept, and
    /// traced as a root so it may reference ordinary objects.
    pub fn alloc_perm(&mut self, obj: Obj) -> ObjRef {
        self.alloc_slot(obj, true)
    }

    pub fn get(&self, r: ObjRef) -> &Obj {
        match self.slots.get(r.0 as usize).and_then(|s| s.obj.as_ref()) {
            Some(obj) => obj,
            None => panic!("heap: dangling handle {:?} (missed root?)", r),
        }
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        match self.slots.get_mut(r.0 as usize).and_then(|s| s.obj.as_mut()) {
            Some(obj) => obj,
            None => panic!("heap: dangling handle {:?} (missed root?)", r),
        }
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    /// True once allocation has crossed the collection threshold. The caller
    /// decides when it is at a safe point.
    pub fn wants_gc(&self) -> bool {
        self.live >= self.threshold
    }

    /// Mark from the given roots (plus all permanent slots), then sweep.
    pub fn collect(&mut self, roots: &[Value]) -> GcStats {
        let live_before = self.live;
        let mut worklist: Vec<ObjRef> = roots
            .iter()
            .filter_map(|v| match v {
                Value::Obj(r) => Some(*r),
                _ => None,
            })
            .collect();
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot.perm && slot.obj.is_some() {
                worklist.push(ObjRef(idx as u32));
            }
        }

        while let Some(r) = worklist.pop() {
            let idx = r.0 as usize;
            if self.slots[idx].mark {
                continue;
            }
            self.slots[idx].mark = true;
            if let Some(obj) = &self.slots[idx].obj {
                trace_children(obj, &mut worklist);
            }
        }

        let mut freed = 0usize;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.obj.is_some() && !slot.mark && !slot.perm {
                slot.obj = None;
                self.free.push(idx as u32);
                freed += 1;
            }
            slot.mark = false;
        }
        self.live -= freed;
        self.threshold = (self.live * 2).max(INITIAL_GC_THRESHOLD);
        self.collections += 1;

        let stats = GcStats {
            live_before,
            freed,
            live_after: self.live,
        };
        tracing::debug!(
            collection = self.collections,
            live_before = stats.live_before,
            freed = stats.freed,
            live_after = stats.live_after,
            "heap collection"
        );
        stats
    }

    // Convenience constructors used throughout the runtime.

    pub fn str_value(&mut self, s: &str) -> Value {
        Value::Obj(self.alloc(Obj::Str(s.into())))
    }

    pub fn string_value(&mut self, s: String) -> Value {
        Value::Obj(self.alloc(Obj::Str(s.into_boxed_str())))
    }

    pub fn list_value(&mut self, items: Vec<Value>) -> Value {
        Value::Obj(self.alloc(Obj::List(items)))
    }

    pub fn vector_value(&mut self, items: Vec<Value>) -> Value {
        Value::Obj(self.alloc(Obj::Vector(items)))
    }

    pub fn map_value(&mut self, entries: Vec<(Value, Value)>) -> Value {
        Value::Obj(self.alloc(Obj::Map(MapData::new(entries))))
    }

    pub fn set_value(&mut self, entries: Vec<Value>) -> Value {
        Value::Obj(self.alloc(Obj::Set(SetData::new(entries))))
    }

    pub fn lazy_value(&mut self, generator: LazyGen) -> Value {
        Value::Obj(self.alloc(Obj::Lazy(LazyObj {
            state: LazyState::Unforced(generator),
            forcing: false,
        })))
    }

    /// A realized cons cell (head + possibly-lazy tail), as produced by
    /// forcing or by `cons` onto a non-materializable tail.
    pub fn cons_value(&mut self, head: Value, tail: Value) -> Value {
        Value::Obj(self.alloc(Obj::Lazy(LazyObj {
            state: LazyState::Cons { head, tail },
            forcing: false,
        })))
    }

    pub fn error_value(&mut self, kind: ErrKind, message: &str, data: Value) -> Value {
        Value::Obj(self.alloc(Obj::Error(ErrorObj {
            kind,
            message: message.into(),
            data,
        })))
    }

    // Typed views. Callers that have already checked the tag use these to
    // avoid re-matching.

    pub fn try_str(&self, v: Value) -> Option<&str> {
        match v {
            Value::Obj(r) => match self.get(r) {
                Obj::Str(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn try_slice(&self, v: Value) -> Option<&[Value]> {
        match v {
            Value::Obj(r) => match self.get(r) {
                Obj::List(items) | Obj::Vector(items) => Some(items),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn try_vector(&self, v: Value) -> Option<&[Value]> {
        match v {
            Value::Obj(r) => match self.get(r) {
                Obj::Vector(items) => Some(items),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn try_map(&self, v: Value) -> Option<&MapData> {
        match v {
            Value::Obj(r) => match self.get(r) {
                Obj::Map(m) => Some(m),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn try_set(&self, v: Value) -> Option<&SetData> {
        match v {
            Value::Obj(r) => match self.get(r) {
                Obj::Set(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn try_error(&self, v: Value) -> Option<&ErrorObj> {
        match v {
            Value::Obj(r) => match self.get(r) {
                Obj::Error(e) => Some(e),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_get() {
        let mut heap = Heap::new();
        let r = heap.alloc(Obj::Str("hello".into()));
        match heap.get(r) {
            Obj::Str(s) => assert_eq!(&**s, "hello"),
            other => panic!("expected string, got {:?}", other),
        }
        assert_eq!(heap.live_count(), 1);
    }

    #[test]
    fn test_collect_frees_garbage_keeps_roots() {
        let mut heap = Heap::with_threshold(64);
        let kept = heap.alloc(Obj::Str("kept".into()));
        for i in 0..100 {
            heap.alloc(Obj::Str(format!("garbage-{}", i).into_boxed_str()));
        }
        let stats = heap.collect(&[Value::Obj(kept)]);
        assert_eq!(stats.freed, 100);
        assert_eq!(heap.live_count(), 1);
        match heap.get(kept) {
            Obj::Str(s) => assert_eq!(&**s, "kept"),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_collect_traces_through_collections() {
        let mut heap = Heap::new();
        let inner = heap.str_value("inner");
        let vec_val = heap.vector_value(vec![inner, Value::Int(1)]);
        let map_val = heap.map_value(vec![(Value::Keyword(crate::intern::intern_name("k")), vec_val)]);
        heap.collect(&[map_val]);
        // Nothing reachable was freed.
        assert_eq!(heap.live_count(), 3);
        assert_eq!(heap.try_str(inner), Some("inner"));
    }

    #[test]
    fn test_perm_objects_survive_without_roots() {
        let mut heap = Heap::new();
        let ordinary = heap.str_value("child");
        let perm = heap.alloc_perm(Obj::Vector(vec![ordinary]));
        heap.collect(&[]);
        // The perm vector acts as a root for its ordinary child.
        assert_eq!(heap.try_str(ordinary), Some("child"));
        match heap.get(perm) {
            Obj::Vector(items) => assert_eq!(items.len(), 1),
            other => panic!("expected vector, got {:?}", other),
        }
    }

    #[test]
    fn test_slot_reuse_after_sweep() {
        let mut heap = Heap::new();
        let a = heap.alloc(Obj::Str("a".into()));
        heap.collect(&[]);
        let b = heap.alloc(Obj::Str("b".into()));
        // The freed slot is recycled.
        assert_eq!(a.0, b.0);
        assert_eq!(heap.try_str(Value::Obj(b)), Some("b"));
    }

    #[test]
    fn test_wants_gc_threshold_grows() {
        let mut heap = Heap::with_threshold(64);
        for _ in 0..64 {
            heap.alloc(Obj::Str("x".into()));
        }
        assert!(heap.wants_gc());
        heap.collect(&[]);
        assert!(!heap.wants_gc());
    }

    #[test]
    fn test_atom_children_traced() {
        let mut heap = Heap::new();
        let held = heap.str_value("held");
        let atom = Value::Obj(heap.alloc(Obj::Atom(AtomObj {
            value: held,
            validator: None,
            watchers: vec![],
        })));
        heap.collect(&[atom]);
        assert_eq!(heap.try_str(held), Some("held"));
    }
}
