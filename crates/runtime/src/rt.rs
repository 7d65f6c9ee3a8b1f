//! Shared execution state.
//!
//! `Rt` is the single mutable context threaded through analysis and both
//! backends: the managed heap, the environment, the shared lexical binding
//! stack used by the evaluator, the VM operand stack, the function
//! definition table, and a temp-root array.
//!
//! # Rooting discipline
//!
//! Collection runs only at safe points (`maybe_gc`), which both backends
//! hit at function entry and loop back-edges. At a safe point the roots
//! are: the binding stack, the operand stack, the environment, and the
//! temp-root array. Any built-in that creates values and holds them only
//! in Rust locals across a nested `invoke` must park them in the temp-root
//! array first (`push_temp` / `truncate_temps`), or they will be swept.

use clove_core::heap::Heap;
use clove_core::{FnDefId, Value};
use std::rc::Rc;

use crate::env::Env;
use crate::node::FnDef;

/// Which backend runs user function bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Treewalk,
    Vm,
}

/// Resource limits, loadable from the driver's TOML config.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum reader nesting depth.
    pub reader_depth: usize,
    /// Maximum total forms per read unit.
    pub reader_forms: usize,
    /// Maximum evaluator/VM call depth.
    pub max_call_depth: usize,
    /// Initial GC threshold (live objects before first collection).
    pub gc_threshold: usize,
    /// Macro expansion fixed-point bound.
    pub macro_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        // The call depth bounds native stack growth in the tree walker;
        // deep iteration belongs to recur, which stays flat.
        Limits {
            reader_depth: 256,
            reader_forms: 1_000_000,
            max_call_depth: 400,
            gc_threshold: 16 * 1024,
            macro_depth: 1024,
        }
    }
}

pub struct Rt {
    pub heap: Heap,
    pub env: Env,
    pub fndefs: Vec<Rc<FnDef>>,
    /// The evaluator's flat lexical binding stack (frames are contiguous
    /// `[captures... slots...]` regions).
    pub locals: Vec<Value>,
    /// The VM's operand stack.
    pub stack: Vec<Value>,
    /// Dedicated root array for in-flight built-in temporaries.
    pub temp_roots: Vec<Value>,
    pub backend: Backend,
    pub limits: Limits,
    /// Current evaluator recursion depth (stack-overflow guard).
    pub call_depth: usize,
}

impl Rt {
    /// Bare state with no built-ins installed; `clove-compiler` calls
    /// `boot` to get a usable core namespace.
    pub fn new(limits: Limits) -> Self {
        let mut rt = Rt {
            heap: Heap::with_threshold(limits.gc_threshold),
            env: Env::new(),
            fndefs: Vec::new(),
            locals: Vec::new(),
            stack: Vec::new(),
            temp_roots: Vec::new(),
            backend: Backend::Treewalk,
            limits,
            call_depth: 0,
        };
        crate::builtins::install(&mut rt);
        rt
    }

    pub fn register_fndef(&mut self, def: FnDef) -> FnDefId {
        let id = FnDefId(self.fndefs.len() as u32);
        self.fndefs.push(Rc::new(def));
        id
    }

    pub fn fndef(&self, id: FnDefId) -> Rc<FnDef> {
        Rc::clone(&self.fndefs[id.0 as usize])
    }

    // Temp roots.

    pub fn temp_mark(&self) -> usize {
        self.temp_roots.len()
    }

    pub fn push_temp(&mut self, v: Value) {
        self.temp_roots.push(v);
    }

    /// Overwrite a parked root in place (accumulator pattern).
    pub fn set_temp(&mut self, idx: usize, v: Value) {
        self.temp_roots[idx] = v;
    }

    pub fn truncate_temps(&mut self, mark: usize) {
        self.temp_roots.truncate(mark);
    }

    /// Collect if the heap asks for it. Callers guarantee this is a safe
    /// point: every live value is reachable from the stacks, the
    /// environment, or the temp roots.
    pub fn maybe_gc(&mut self) {
        if !self.heap.wants_gc() {
            return;
        }
        self.gc_now();
    }

    pub fn gc_now(&mut self) -> clove_core::GcStats {
        let mut roots: Vec<Value> =
            Vec::with_capacity(self.locals.len() + self.stack.len() + self.temp_roots.len() + 64);
        roots.extend_from_slice(&self.locals);
        roots.extend_from_slice(&self.stack);
        roots.extend_from_slice(&self.temp_roots);
        self.env.gc_roots(&mut roots);
        self.heap.collect(&roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clove_core::Obj;

    #[test]
    fn test_gc_keeps_binding_stack_values() {
        let mut rt = Rt::new(Limits::default());
        let v = rt.heap.str_value("local");
        rt.locals.push(v);
        rt.gc_now();
        assert_eq!(rt.heap.try_str(v), Some("local"));
        rt.locals.pop();
    }

    #[test]
    fn test_gc_frees_unrooted() {
        let mut rt = Rt::new(Limits::default());
        let before = rt.heap.live_count();
        for _ in 0..32 {
            rt.heap.alloc(Obj::Str("junk".into()));
        }
        rt.gc_now();
        assert_eq!(rt.heap.live_count(), before);
    }

    #[test]
    fn test_temp_roots_protect_and_release() {
        let mut rt = Rt::new(Limits::default());
        let mark = rt.temp_mark();
        let v = rt.heap.str_value("pinned");
        rt.push_temp(v);
        rt.gc_now();
        assert_eq!(rt.heap.try_str(v), Some("pinned"));
        rt.truncate_temps(mark);
    }
}
