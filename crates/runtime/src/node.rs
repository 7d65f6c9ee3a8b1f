//! Node: the executable tree.
//!
//! The analyzer lowers Forms into Nodes; both backends (tree walker and
//! bytecode VM) consume the same tree. Lexical addressing is resolved here:
//! a frame is laid out as `[captures... slots...]` where slots cover the
//! parameters followed by `let` temporaries. `LocalRef` carries a slot
//! index, `CaptureRef` an index into the closure's capture array.
//!
//! Function definitions (`FnDef`) are infrastructure: registered once per
//! `fn` expression in the runtime's definition table and shared by every
//! closure created from that expression. Their constant values are
//! allocated permanently, so nodes are never traced by the collector.

use clove_core::value::Tag;
use clove_core::{FnDefId, Pos, SymId, Value, VarId};
use std::cell::OnceCell;
use std::rc::Rc;

use crate::chunk::Chunk;

/// Where a captured value comes from at closure-creation time, relative to
/// the frame that creates the closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSrc {
    /// A slot of the creating frame.
    Slot(u16),
    /// A capture of the creating frame (capture threaded through).
    Capture(u16),
    /// The closure itself (named `fn` self-reference), filled after
    /// allocation.
    SelfRef,
}

/// One (parameters, body) pair of a function.
#[derive(Debug)]
pub struct FnArity {
    pub params: Vec<SymId>,
    /// When set, the last parameter collects the argument tail as a list.
    pub variadic: bool,
    pub body: Vec<Node>,
    /// Total slot count for this arity's frame: parameters + let
    /// temporaries. Captures are counted separately on the definition.
    pub n_slots: u16,
    /// Lazily compiled bytecode for the VM backend.
    pub chunk: OnceCell<Rc<Chunk>>,
}

impl FnArity {
    pub fn fixed_arity(&self) -> usize {
        if self.variadic {
            self.params.len() - 1
        } else {
            self.params.len()
        }
    }
}

/// A function definition: shared, immutable analyzer output.
#[derive(Debug)]
pub struct FnDef {
    pub name: Option<SymId>,
    pub arities: Vec<FnArity>,
    pub captures: Vec<CaptureSrc>,
    pub pos: Pos,
}

impl FnDef {
    /// Select the arity for a call of `n` arguments: exact match first,
    /// else the variadic arity that can absorb the tail.
    pub fn select_arity(&self, n: usize) -> Option<&FnArity> {
        self.arities
            .iter()
            .find(|a| !a.variadic && a.params.len() == n)
            .or_else(|| {
                self.arities
                    .iter()
                    .find(|a| a.variadic && n >= a.fixed_arity())
            })
    }
}

/// First-class sequence operations recognized by the analyzer so both
/// backends can fuse pipelines instead of going through generic calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqOpKind {
    Reduce,
    Map,
    Filter,
    TakeWhile,
    DropWhile,
    MapIndexed,
    SortBy,
    GroupBy,
}

impl SeqOpKind {
    pub fn name(self) -> &'static str {
        match self {
            SeqOpKind::Reduce => "reduce",
            SeqOpKind::Map => "map",
            SeqOpKind::Filter => "filter",
            SeqOpKind::TakeWhile => "take-while",
            SeqOpKind::DropWhile => "drop-while",
            SeqOpKind::MapIndexed => "map-indexed",
            SeqOpKind::SortBy => "sort-by",
            SeqOpKind::GroupBy => "group-by",
        }
    }
}

#[derive(Debug)]
pub struct CatchClause {
    /// Slot the thrown value is bound to.
    pub slot: u16,
    pub body: Vec<Node>,
}

/// One protocol method signature: method symbol plus the var it interns.
#[derive(Debug, Clone, Copy)]
pub struct ProtoSig {
    pub method: SymId,
    pub var: VarId,
}

#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub pos: Pos,
}

impl Node {
    pub fn new(kind: NodeKind, pos: Pos) -> Self {
        Node { kind, pos }
    }
}

#[derive(Debug)]
pub enum NodeKind {
    /// Literal or quoted value; allocated permanently.
    Const(Value),
    VarRef(VarId),
    LocalRef { slot: u16 },
    CaptureRef { idx: u16 },
    If {
        test: Box<Node>,
        then: Box<Node>,
        els: Option<Box<Node>>,
    },
    Do(Vec<Node>),
    /// `let` and `loop` share a shape; `is_loop` marks a `recur` target.
    Let {
        bindings: Vec<(SymId, u16, Node)>,
        body: Vec<Node>,
        is_loop: bool,
    },
    Recur(Vec<Node>),
    Fn { def: FnDefId },
    /// Mutually recursive local functions: installed into their slots
    /// before any capture array is filled.
    LetFn {
        bindings: Vec<(SymId, u16, FnDefId)>,
        body: Vec<Node>,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    Def {
        var: VarId,
        init: Option<Box<Node>>,
        is_macro: bool,
        doc: Option<Box<str>>,
    },
    Throw(Box<Node>),
    Try {
        body: Vec<Node>,
        catch: Option<CatchClause>,
        finally: Option<Vec<Node>>,
    },
    /// `(apply f a b coll)`: args, with the final node supplying the tail.
    Apply {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    Partial {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    Comp(Vec<Node>),
    SeqOp {
        op: SeqOpKind,
        args: Vec<Node>,
    },
    /// `(swap! atom f args...)`.
    Swap(Vec<Node>),
    DefMulti {
        var: VarId,
        name: SymId,
        dispatch: Box<Node>,
    },
    DefMethod {
        var: VarId,
        dispatch_val: Box<Node>,
        method: Box<Node>,
    },
    DefProtocol {
        var: VarId,
        name: SymId,
        sigs: Vec<ProtoSig>,
    },
    ExtendType {
        tag: Tag,
        impls: Vec<(Box<Node>, Vec<(SymId, Node)>)>,
    },
    /// Dynamic var rebinding with guaranteed restore.
    Binding {
        pairs: Vec<(VarId, Node)>,
        body: Vec<Node>,
    },
    /// `(lazy-seq body)`: the body is a zero-arity thunk definition.
    LazySeq { def: FnDefId },
    /// `(in-ns 'name)` / `(ns name ...)`: switch the current namespace.
    InNs { name: SymId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clove_core::intern;

    fn arity(n: usize, variadic: bool) -> FnArity {
        FnArity {
            params: (0..n).map(|i| intern::intern_name(&format!("p{}", i))).collect(),
            variadic,
            body: vec![],
            n_slots: n as u16,
            chunk: OnceCell::new(),
        }
    }

    #[test]
    fn test_select_exact_arity() {
        let def = FnDef {
            name: None,
            arities: vec![arity(1, false), arity(2, false)],
            captures: vec![],
            pos: Pos::synthetic(),
        };
        assert_eq!(def.select_arity(2).map(|a| a.params.len()), Some(2));
        assert!(def.select_arity(3).is_none());
    }

    #[test]
    fn test_select_variadic_tail() {
        // (fn ([x] ...) ([x & ys] ...))
        let def = FnDef {
            name: None,
            arities: vec![arity(1, false), arity(2, true)],
            captures: vec![],
            pos: Pos::synthetic(),
        };
        // Exact match wins over variadic.
        let picked = def.select_arity(1).map(|a| a.variadic);
        assert_eq!(picked, Some(false));
        // Anything >= 1 extra goes to the variadic arity.
        assert_eq!(def.select_arity(4).map(|a| a.variadic), Some(true));
        // The variadic arity also accepts an empty tail.
        assert_eq!(def.select_arity(1).map(|a| a.params.len()), Some(1));
    }
}
