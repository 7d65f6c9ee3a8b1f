//! Clove Runtime: execution engine for the Clove language.
//!
//! Everything downstream of analysis lives here. The same `Node` tree runs
//! on two backends that must agree on observable results:
//!
//! - `eval`: the tree-walking reference interpreter
//! - `emit` + `vm`: the bytecode compiler and framed stack VM
//!
//! Shared machinery:
//!
//! - `rt`: the single mutable execution state (heap, env, stacks, roots)
//! - `env`: namespaces, vars, dynamic bindings, protocol registry
//! - `node`: the executable tree produced by `clove-compiler`
//! - `invoke`: the one dispatch funnel for every callable tag
//! - `seq`: lazy sequences, the seq protocol, fused reduce pipelines
//! - `eq` / `print`: structural equality+hashing and the printer
//! - `builtins`: the `clove.core` function table

pub mod builtins;
pub mod chunk;
pub mod colls;
pub mod defs;
pub mod emit;
pub mod env;
pub mod eq;
pub mod error;
pub mod eval;
pub mod invoke;
pub mod node;
pub mod print;
pub mod rt;
pub mod seq;
pub mod vm;

pub use chunk::{Chunk, Op, disassemble};
pub use env::{CORE_NS, Env, Namespace, USER_NS, Var, VarMeta};
pub use error::{EvalResult, Thrown};
pub use invoke::invoke;
pub use node::{CaptureSrc, CatchClause, FnArity, FnDef, Node, NodeKind, ProtoSig, SeqOpKind};
pub use rt::{Backend, Limits, Rt};
