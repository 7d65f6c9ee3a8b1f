//! Clove Core: the value foundation for the Clove language.
//!
//! This crate is deliberately free of execution machinery. It provides:
//!
//! - `value`: the `Value` tagged sum and the `Tag` type model
//! - `intern`: the symbol/keyword interner (bump-arena backed)
//! - `heap`: the managed mark-sweep heap holding every value payload
//! - `pos`: source positions shared by the reader, analyzer, and errors
//!
//! Execution (evaluator, VM, built-ins) lives in `clove-runtime`; reading
//! and analysis live in `clove-compiler`.

pub mod heap;
pub mod intern;
pub mod pos;
pub mod value;

pub use heap::{
    AtomObj, BuiltinObj, ClosureObj, CompObj, ErrKind, ErrorObj, GcStats, Heap, LazyGen, LazyObj,
    LazyState, MapData, MultiFnObj, Obj, ObjRef, PartialObj, ProtocolFnObj, ProtocolObj, RegexObj,
    SetData,
};
pub use intern::SymId;
pub use pos::Pos;
pub use value::{FnDefId, Tag, Value, VarId, tag_of};
