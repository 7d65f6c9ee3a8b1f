//! Runtime exceptions.
//!
//! Runtime errors are Clove-level values: a thrown exception carries the
//! value that was thrown (usually an error record allocated by `ex-info` or
//! by a failing built-in) plus the source position of the innermost throw
//! point. They unwind through the `try` machinery of whichever backend is
//! running and are catchable from user code.
//!
//! Reader and analyzer errors are a different domain entirely (they live in
//! `clove-compiler` and never become catchable exceptions).

use clove_core::heap::Heap;
use clove_core::{ErrKind, Pos, Value};

/// An exception in flight.
#[derive(Debug, Clone, Copy)]
pub struct Thrown {
    pub value: Value,
    pub pos: Pos,
}

pub type EvalResult = Result<Value, Thrown>;

impl Thrown {
    pub fn new(value: Value) -> Self {
        Thrown {
            value,
            pos: Pos::synthetic(),
        }
    }

    pub fn at(value: Value, pos: Pos) -> Self {
        Thrown { value, pos }
    }

    /// Attach a position if none was recorded closer to the throw point.
    pub fn with_pos(mut self, pos: Pos) -> Self {
        if !self.pos.is_known() {
            self.pos = pos;
        }
        self
    }

    /// The kind tag used by compare mode. Thrown non-error values count as
    /// plain user errors.
    pub fn kind(&self, heap: &Heap) -> ErrKind {
        heap.try_error(self.value).map(|e| e.kind).unwrap_or(ErrKind::User)
    }
}

/// Allocate an error record and wrap it for throwing.
pub fn raise(heap: &mut Heap, kind: ErrKind, message: impl AsRef<str>) -> Thrown {
    let value = heap.error_value(kind, message.as_ref(), Value::Nil);
    Thrown::new(value)
}

pub fn raise_with_data(
    heap: &mut Heap,
    kind: ErrKind,
    message: impl AsRef<str>,
    data: Value,
) -> Thrown {
    let value = heap.error_value(kind, message.as_ref(), data);
    Thrown::new(value)
}

/// Arity failure for a named callable.
pub fn arity_error(heap: &mut Heap, name: &str, got: usize) -> Thrown {
    raise(
        heap,
        ErrKind::Arity,
        format!("wrong number of args ({}) passed to {}", got, name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clove_core::heap::Heap;

    #[test]
    fn test_kind_of_error_value() {
        let mut heap = Heap::new();
        let t = raise(&mut heap, ErrKind::Arity, "boom");
        assert_eq!(t.kind(&heap), ErrKind::Arity);
    }

    #[test]
    fn test_kind_of_plain_value() {
        let mut heap = Heap::new();
        let t = Thrown::new(Value::Int(7));
        assert_eq!(t.kind(&heap), ErrKind::User);
    }

    #[test]
    fn test_with_pos_keeps_closest() {
        let mut heap = Heap::new();
        let inner = Pos::new(2, 3);
        let t = raise(&mut heap, ErrKind::Type, "x").with_pos(inner);
        assert_eq!(t.pos, inner);
        // A later, outer position does not overwrite.
        let t = t.with_pos(Pos::new(9, 9));
        assert_eq!(t.pos, inner);
    }
}
