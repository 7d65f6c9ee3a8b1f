//! String and character built-ins.

use clove_core::value::tag_of;
use clove_core::{ErrKind, Value};

use crate::error::{EvalResult, arity_error, raise};
use crate::rt::Rt;

pub fn subs(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let (s, from, to) = match args.len() {
        2 => (args[0], args[1], None),
        3 => (args[0], args[1], Some(args[2])),
        n => return Err(arity_error(&mut rt.heap, "subs", n)),
    };
    let text = match rt.heap.try_str(s) {
        Some(t) => t.to_string(),
        None => {
            return Err({
                let msg = format!("subs expects a string, got {}", tag_of(&rt.heap, s).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            });
        }
    };
    let chars: Vec<char> = text.chars().collect();
    let start = from.as_int().unwrap_or(-1);
    let end = match to {
        Some(t) => t.as_int().unwrap_or(-1),
        None => chars.len() as i64,
    };
    if start < 0 || end < start || end > chars.len() as i64 {
        return Err(raise(
            &mut rt.heap,
            ErrKind::IndexOutOfBounds,
            format!("subs range {}..{} out of bounds for length {}", start, end, chars.len()),
        ));
    }
    let out: String = chars[start as usize..end as usize].iter().collect();
    Ok(rt.heap.string_value(out))
}

/// Coerce to integer: truncates floats, takes a char's code point.
pub fn int_fn(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "int", args.len()));
    }
    match args[0] {
        Value::Int(n) => Ok(Value::Int(n)),
        Value::Float(f) => Ok(Value::Int(f as i64)),
        Value::Char(c) => Ok(Value::Int(c as i64)),
        v => Err({
                let msg = format!("int expects a number or character, got {}", tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

pub fn char_fn(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "char", args.len()));
    }
    match args[0] {
        Value::Char(c) => Ok(Value::Char(c)),
        Value::Int(n) => match u32::try_from(n).ok().and_then(char::from_u32) {
            Some(c) => Ok(Value::Char(c)),
            None => Err(raise(
                &mut rt.heap,
                ErrKind::IllegalArgument,
                format!("char: {} is not a valid code point", n),
            )),
        },
        v => Err({
                let msg = format!("char expects an integer or character, got {}", tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::Limits;

    fn rt() -> Rt {
        Rt::new(Limits::default())
    }

    #[test]
    fn test_subs_ranges() {
        let mut rt = rt();
        let s = rt.heap.str_value("hello");
        let out = subs(&mut rt, &[s, Value::Int(1), Value::Int(3)]).unwrap();
        assert_eq!(rt.heap.try_str(out), Some("el"));
        let tail = subs(&mut rt, &[s, Value::Int(2)]).unwrap();
        assert_eq!(rt.heap.try_str(tail), Some("llo"));
        let err = subs(&mut rt, &[s, Value::Int(9)]).unwrap_err();
        assert_eq!(err.kind(&rt.heap), ErrKind::IndexOutOfBounds);
    }

    #[test]
    fn test_char_int_round_trip() {
        let mut rt = rt();
        let i = int_fn(&mut rt, &[Value::Char('A')]).unwrap();
        assert_eq!(i, Value::Int(65));
        let c = char_fn(&mut rt, &[Value::Int(65)]).unwrap();
        assert_eq!(c, Value::Char('A'));
    }
}
