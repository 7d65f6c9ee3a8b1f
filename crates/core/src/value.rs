//! Value: what the language talks about.
//!
//! `Value` is a `Copy` tagged sum. Scalars (nil, booleans, numbers, chars)
//! and interned symbols/keywords are carried by value; everything with a
//! payload lives in the managed heap behind an `ObjRef` handle. Var handles
//! are infrastructure references and carry a `VarId` into the environment's
//! var table.
//!
//! Because `Value` is `Copy`, pushing values on binding stacks and operand
//! stacks is a plain memcpy and the collector only ever needs to chase
//! `ObjRef` handles.

use crate::heap::{Heap, Obj, ObjRef};
use crate::intern::SymId;

/// Handle into the environment's var table. Vars are infrastructure: never
/// collected, never traced; the values they hold are GC roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub u32);

/// Handle into the runtime's function-definition table (analyzer output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FnDefId(pub u32);

/// A runtime value.
///
/// Note: the derived `PartialEq` compares `Obj` handles by identity. That is
/// a valid fast path (identical handles are always `=`), but structural
/// equality requires the heap and lives in the runtime crate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Sym(SymId),
    Keyword(SymId),
    Obj(ObjRef),
    Var(VarId),
}

impl Value {
    /// Only `nil` and `false` are falsey. `0`, `""`, and empty collections
    /// are all truthy.
    pub fn is_truthy(self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_float(self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Numeric view: ints widen to floats.
    pub fn as_number(self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(n as f64),
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_obj(self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_sym(self) -> Option<SymId> {
        match self {
            Value::Sym(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_keyword(self) -> Option<SymId> {
        match self {
            Value::Keyword(id) => Some(id),
            _ => None,
        }
    }
}

/// The observable type of a value. Drives `type` introspection, protocol
/// dispatch on the first argument, and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Nil,
    Bool,
    Int,
    Float,
    Char,
    String,
    Symbol,
    Keyword,
    List,
    Vector,
    Map,
    Set,
    Fn,
    MultiFn,
    Protocol,
    Atom,
    LazySeq,
    Var,
    Regex,
    Error,
}

impl Tag {
    /// Lowercase name used in error messages ("expected a map, got string").
    pub fn name(self) -> &'static str {
        match self {
            Tag::Nil => "nil",
            Tag::Bool => "boolean",
            Tag::Int => "integer",
            Tag::Float => "float",
            Tag::Char => "character",
            Tag::String => "string",
            Tag::Symbol => "symbol",
            Tag::Keyword => "keyword",
            Tag::List => "list",
            Tag::Vector => "vector",
            Tag::Map => "map",
            Tag::Set => "set",
            Tag::Fn => "function",
            Tag::MultiFn => "multimethod",
            Tag::Protocol => "protocol",
            Tag::Atom => "atom",
            Tag::LazySeq => "lazy sequence",
            Tag::Var => "var",
            Tag::Regex => "regex",
            Tag::Error => "error",
        }
    }

    /// Type name as written in `extend-type` forms and returned by `type`.
    pub fn type_symbol(self) -> &'static str {
        match self {
            Tag::Nil => "Nil",
            Tag::Bool => "Boolean",
            Tag::Int => "Long",
            Tag::Float => "Double",
            Tag::Char => "Character",
            Tag::String => "String",
            Tag::Symbol => "Symbol",
            Tag::Keyword => "Keyword",
            Tag::List => "List",
            Tag::Vector => "Vector",
            Tag::Map => "Map",
            Tag::Set => "Set",
            Tag::Fn => "Fn",
            Tag::MultiFn => "MultiFn",
            Tag::Protocol => "Protocol",
            Tag::Atom => "Atom",
            Tag::LazySeq => "LazySeq",
            Tag::Var => "Var",
            Tag::Regex => "Regex",
            Tag::Error => "ExceptionInfo",
        }
    }
}

/// The tag of a value, consulting the heap for handle payloads.
pub fn tag_of(heap: &Heap, v: Value) -> Tag {
    match v {
        Value::Nil => Tag::Nil,
        Value::Bool(_) => Tag::Bool,
        Value::Int(_) => Tag::Int,
        Value::Float(_) => Tag::Float,
        Value::Char(_) => Tag::Char,
        Value::Sym(_) => Tag::Symbol,
        Value::Keyword(_) => Tag::Keyword,
        Value::Var(_) => Tag::Var,
        Value::Obj(r) => match heap.get(r) {
            Obj::Str(_) => Tag::String,
            Obj::List(_) => Tag::List,
            Obj::Vector(_) => Tag::Vector,
            Obj::Map(_) => Tag::Map,
            Obj::Set(_) => Tag::Set,
            Obj::Closure(_) | Obj::Builtin(_) | Obj::Partial(_) | Obj::Comp(_) => Tag::Fn,
            Obj::MultiFn(_) => Tag::MultiFn,
            Obj::Protocol(_) => Tag::Protocol,
            Obj::ProtocolFn(_) => Tag::Fn,
            Obj::Atom(_) => Tag::Atom,
            Obj::Lazy(_) => Tag::LazySeq,
            Obj::Regex(_) => Tag::Regex,
            Obj::Error(_) => Tag::Error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Float(0.0).is_truthy());
        assert!(Value::Char('\0').is_truthy());
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::Int(3).as_number(), Some(3.0));
        assert_eq!(Value::Float(2.5).as_number(), Some(2.5));
        assert_eq!(Value::Nil.as_number(), None);
        assert_eq!(Value::Int(3).as_float(), None);
    }

    #[test]
    fn test_scalar_tags() {
        let heap = Heap::new();
        assert_eq!(tag_of(&heap, Value::Nil), Tag::Nil);
        assert_eq!(tag_of(&heap, Value::Int(1)), Tag::Int);
        let sym = Value::Sym(intern::intern_name("x"));
        assert_eq!(tag_of(&heap, sym), Tag::Symbol);
    }

    #[test]
    fn test_heap_tags() {
        let mut heap = Heap::new();
        let s = heap.alloc(Obj::Str("hi".into()));
        assert_eq!(tag_of(&heap, Value::Obj(s)), Tag::String);
        let v = heap.alloc(Obj::Vector(vec![Value::Int(1)]));
        assert_eq!(tag_of(&heap, Value::Obj(v)), Tag::Vector);
    }
}
