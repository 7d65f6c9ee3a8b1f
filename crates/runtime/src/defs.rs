//! Shared execution helpers for closures and the def-family forms.
//!
//! Both backends funnel through these functions so that `def`, `defmulti`,
//! `defmethod`, `defprotocol`, and `extend-type` behave identically under
//! the evaluator and the VM.

use clove_core::value::{Tag, tag_of};
use clove_core::{
    ClosureObj, ErrKind, FnDefId, LazyGen, MultiFnObj, Obj, ProtocolFnObj, ProtocolObj, SymId,
    Value, VarId, intern,
};

use crate::error::{EvalResult, Thrown, raise};
use crate::eq::value_eq;
use crate::node::{CaptureSrc, ProtoSig};
use crate::rt::Rt;

/// A view of the creating frame: `vm` selects the VM operand stack over the
/// evaluator's binding stack.
#[derive(Debug, Clone, Copy)]
pub struct FrameRef {
    pub base: usize,
    pub ncap: usize,
    pub vm: bool,
}

fn read_capture(rt: &Rt, fr: FrameRef, src: CaptureSrc) -> Option<Value> {
    let stack = if fr.vm { &rt.stack } else { &rt.locals };
    match src {
        CaptureSrc::Slot(s) => Some(stack[fr.base + fr.ncap + s as usize]),
        CaptureSrc::Capture(c) => Some(stack[fr.base + c as usize]),
        CaptureSrc::SelfRef => None,
    }
}

/// Create a closure over the current frame. Self-references are filled in
/// after allocation so a named fn can call itself.
pub fn make_closure(rt: &mut Rt, def_id: FnDefId, fr: FrameRef) -> Value {
    let def = rt.fndef(def_id);
    let mut captures = Vec::with_capacity(def.captures.len());
    let mut self_idxs = Vec::new();
    for (i, src) in def.captures.iter().enumerate() {
        match read_capture(rt, fr, *src) {
            Some(v) => captures.push(v),
            None => {
                captures.push(Value::Nil);
                self_idxs.push(i);
            }
        }
    }
    let r = rt.heap.alloc(Obj::Closure(ClosureObj {
        def: def_id,
        name: def.name,
        captures,
    }));
    for i in self_idxs {
        if let Obj::Closure(c) = rt.heap.get_mut(r) {
            c.captures[i] = Value::Obj(r);
        }
    }
    Value::Obj(r)
}

/// Re-snapshot a closure's captures from the current frame. This is the
/// fill half of letfn's install-then-fill: every binding is stored into its
/// slot first, then each closure re-reads the (now populated) slots.
pub fn refill_captures(rt: &mut Rt, closure: Value, fr: FrameRef) {
    let r = match closure.as_obj() {
        Some(r) => r,
        None => return,
    };
    let def_id = match rt.heap.get(r) {
        Obj::Closure(c) => c.def,
        _ => return,
    };
    let def = rt.fndef(def_id);
    let mut captures = Vec::with_capacity(def.captures.len());
    for src in def.captures.iter() {
        match read_capture(rt, fr, *src) {
            Some(v) => captures.push(v),
            None => captures.push(closure),
        }
    }
    if let Obj::Closure(c) = rt.heap.get_mut(r) {
        c.captures = captures;
    }
}

/// `(lazy-seq body)`: a thunk closure over the current frame wrapped in an
/// unforced cell.
pub fn make_lazy(rt: &mut Rt, def_id: FnDefId, fr: FrameRef) -> Value {
    let f = make_closure(rt, def_id, fr);
    rt.heap.lazy_value(LazyGen::Thunk { f })
}

/// Set a var's root (and macro flag / doc). Returns the var value.
pub fn do_def(
    rt: &mut Rt,
    var: VarId,
    init: Option<Value>,
    is_macro: bool,
    doc: Option<Box<str>>,
) -> Value {
    let v = rt.env.var_mut(var);
    if let Some(value) = init {
        v.root = Some(value);
    }
    if is_macro {
        v.meta.is_macro = true;
    }
    if doc.is_some() {
        v.meta.doc = doc;
    }
    Value::Var(var)
}

/// `defmulti`: creates the dispatch table once; re-evaluation leaves an
/// existing multimethod in place (so reloading a file keeps its methods).
pub fn do_defmulti(rt: &mut Rt, var: VarId, name: SymId, dispatch: Value) -> Value {
    let existing = rt.env.var(var).root;
    if let Some(Value::Obj(r)) = existing {
        if matches!(rt.heap.get(r), Obj::MultiFn(_)) {
            return Value::Var(var);
        }
    }
    let mf = Value::Obj(rt.heap.alloc(Obj::MultiFn(MultiFnObj {
        name,
        dispatch,
        methods: Vec::new(),
        default: None,
    })));
    rt.env.var_mut(var).root = Some(mf);
    Value::Var(var)
}

/// `defmethod`: insert or replace the method for a dispatch value.
/// `:default` installs the fallback.
pub fn do_defmethod(rt: &mut Rt, var: VarId, dispatch_val: Value, method: Value) -> EvalResult {
    let mfr = match rt.env.var(var).root {
        Some(Value::Obj(r)) if matches!(rt.heap.get(r), Obj::MultiFn(_)) => r,
        _ => {
            let name = intern::full_name(rt.env.var(var).name);
            return Err(raise(
                &mut rt.heap,
                ErrKind::IllegalState,
                format!("defmethod: {} is not a multimethod", name),
            ));
        }
    };
    let default_kw = Value::Keyword(intern::intern_name("default"));
    if dispatch_val == default_kw {
        if let Obj::MultiFn(m) = rt.heap.get_mut(mfr) {
            m.default = Some(method);
        }
        return Ok(Value::Var(var));
    }
    let count = match rt.heap.get(mfr) {
        Obj::MultiFn(m) => m.methods.len(),
        _ => 0,
    };
    for i in 0..count {
        let existing = match rt.heap.get(mfr) {
            Obj::MultiFn(m) => m.methods[i].0,
            _ => break,
        };
        if value_eq(rt, existing, dispatch_val)? {
            if let Obj::MultiFn(m) = rt.heap.get_mut(mfr) {
                m.methods[i] = (dispatch_val, method);
            }
            return Ok(Value::Var(var));
        }
    }
    if let Obj::MultiFn(m) = rt.heap.get_mut(mfr) {
        m.methods.push((dispatch_val, method));
    }
    Ok(Value::Var(var))
}

/// `defprotocol`: the protocol value plus one protocol-fn var per method.
pub fn do_defprotocol(rt: &mut Rt, var: VarId, name: SymId, sigs: &[ProtoSig]) -> Value {
    let proto = Value::Obj(rt.heap.alloc(Obj::Protocol(ProtocolObj {
        name,
        sigs: sigs.iter().map(|s| s.method).collect(),
    })));
    rt.env.var_mut(var).root = Some(proto);
    for sig in sigs {
        let pf = Value::Obj(rt.heap.alloc(Obj::ProtocolFn(ProtocolFnObj {
            proto,
            method: sig.method,
        })));
        rt.env.var_mut(sig.var).root = Some(pf);
    }
    Value::Var(var)
}

/// `extend-type`: record (protocol, tag) -> method functions.
pub fn do_extend_type(
    rt: &mut Rt,
    tag: Tag,
    proto: Value,
    methods: &[(SymId, Value)],
) -> EvalResult {
    let pr = match proto.as_obj() {
        Some(r) if matches!(rt.heap.get(r), Obj::Protocol(_)) => r,
        _ => {
            return Err({
                let msg = format!( "extend-type expects a protocol, got {}", tag_of(&rt.heap, proto).name() );
                raise(&mut rt.heap, ErrKind::Type, msg)
            });
        }
    };
    rt.env
        .extend_protocol(pr, tag, methods.iter().copied());
    Ok(Value::Nil)
}

/// Look up the tag named by an `extend-type` target symbol.
pub fn tag_for_type_name(name: &str) -> Option<Tag> {
    let tag = match name {
        "Nil" => Tag::Nil,
        "Boolean" => Tag::Bool,
        "Long" | "Integer" => Tag::Int,
        "Double" | "Float" => Tag::Float,
        "Character" => Tag::Char,
        "String" => Tag::String,
        "Symbol" => Tag::Symbol,
        "Keyword" => Tag::Keyword,
        "List" | "PersistentList" => Tag::List,
        "Vector" | "PersistentVector" => Tag::Vector,
        "Map" | "PersistentMap" => Tag::Map,
        "Set" | "PersistentSet" => Tag::Set,
        "Fn" => Tag::Fn,
        "MultiFn" => Tag::MultiFn,
        "Atom" => Tag::Atom,
        "LazySeq" => Tag::LazySeq,
        "Var" => Tag::Var,
        "Regex" | "Pattern" => Tag::Regex,
        "ExceptionInfo" | "Exception" => Tag::Error,
        _ => return None,
    };
    Some(tag)
}

pub fn do_in_ns(rt: &mut Rt, name: SymId) -> Value {
    rt.env.set_current_ns(name);
    Value::Nil
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::Limits;

    #[test]
    fn test_defmulti_is_idempotent() {
        let mut rt = Rt::new(Limits::default());
        let sym = intern::intern_name("area");
        let var = rt.env.intern_current(sym);
        let name = sym;
        do_defmulti(&mut rt, var, name, Value::Nil);
        let first = rt.env.var(var).root;
        do_defmulti(&mut rt, var, name, Value::Bool(true));
        assert_eq!(rt.env.var(var).root, first);
    }

    #[test]
    fn test_defmethod_replaces_equal_dispatch() {
        let mut rt = Rt::new(Limits::default());
        let sym = intern::intern_name("area");
        let var = rt.env.intern_current(sym);
        do_defmulti(&mut rt, var, sym, Value::Nil);
        let k = Value::Keyword(intern::intern_name("square"));
        do_defmethod(&mut rt, var, k, Value::Int(1)).unwrap();
        do_defmethod(&mut rt, var, k, Value::Int(2)).unwrap();
        let mfr = rt.env.var(var).root.unwrap().as_obj().unwrap();
        match rt.heap.get(mfr) {
            Obj::MultiFn(m) => {
                assert_eq!(m.methods.len(), 1);
                assert_eq!(m.methods[0].1, Value::Int(2));
            }
            other => panic!("expected multifn, got {:?}", other),
        }
    }

    #[test]
    fn test_type_name_lookup() {
        assert_eq!(tag_for_type_name("String"), Some(Tag::String));
        assert_eq!(tag_for_type_name("Long"), Some(Tag::Int));
        assert_eq!(tag_for_type_name("NoSuch"), None);
    }
}
