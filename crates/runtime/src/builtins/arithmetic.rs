//! Numeric built-ins.
//!
//! Integers are 64-bit and checked: overflow raises an arithmetic error
//! rather than wrapping. Mixed int/float arithmetic widens to float.
//! Integer division returns an integer when it divides evenly, else a
//! float (there is no ratio type).

use clove_core::value::tag_of;
use clove_core::{ErrKind, Value};
use std::cmp::Ordering;

use crate::eq::compare_values;
use crate::error::{EvalResult, Thrown, arity_error, raise};
use crate::rt::Rt;

enum Num {
    Int(i64),
    Float(f64),
}

fn num(rt: &mut Rt, op: &str, v: Value) -> Result<Num, Thrown> {
    match v {
        Value::Int(n) => Ok(Num::Int(n)),
        Value::Float(f) => Ok(Num::Float(f)),
        other => Err({
                let msg = format!("{} expects a number, got {}", op, tag_of(&rt.heap, other).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

fn int_arg(rt: &mut Rt, op: &str, v: Value) -> Result<i64, Thrown> {
    match v {
        Value::Int(n) => Ok(n),
        other => Err({
                let msg = format!( "{} expects an integer, got {}", op, tag_of(&rt.heap, other).name() );
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

fn overflow(rt: &mut Rt, op: &str) -> Thrown {
    raise(
        &mut rt.heap,
        ErrKind::Arithmetic,
        format!("integer overflow in {}", op),
    )
}

fn fold2(
    rt: &mut Rt,
    op: &str,
    a: Value,
    b: Value,
    ints: fn(i64, i64) -> Option<i64>,
    floats: fn(f64, f64) -> f64,
) -> EvalResult {
    let x = num(rt, op, a)?;
    let y = num(rt, op, b)?;
    match (x, y) {
        (Num::Int(x), Num::Int(y)) => match ints(x, y) {
            Some(n) => Ok(Value::Int(n)),
            None => Err(overflow(rt, op)),
        },
        (Num::Int(x), Num::Float(y)) => Ok(Value::Float(floats(x as f64, y))),
        (Num::Float(x), Num::Int(y)) => Ok(Value::Float(floats(x, y as f64))),
        (Num::Float(x), Num::Float(y)) => Ok(Value::Float(floats(x, y))),
    }
}

pub fn add(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let mut acc = Value::Int(0);
    for &a in args {
        acc = fold2(rt, "+", acc, a, i64::checked_add, |x, y| x + y)?;
    }
    Ok(acc)
}

pub fn sub(rt: &mut Rt, args: &[Value]) -> EvalResult {
    match args {
        [] => Err(arity_error(&mut rt.heap, "-", 0)),
        [x] => fold2(rt, "-", Value::Int(0), *x, i64::checked_sub, |a, b| a - b),
        [first, rest @ ..] => {
            let mut acc = *first;
            for &a in rest {
                acc = fold2(rt, "-", acc, a, i64::checked_sub, |x, y| x - y)?;
            }
            Ok(acc)
        }
    }
}

pub fn mul(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let mut acc = Value::Int(1);
    for &a in args {
        acc = fold2(rt, "*", acc, a, i64::checked_mul, |x, y| x * y)?;
    }
    Ok(acc)
}

fn div2(rt: &mut Rt, a: Value, b: Value) -> EvalResult {
    let x = num(rt, "/", a)?;
    let y = num(rt, "/", b)?;
    match (x, y) {
        (Num::Int(_), Num::Int(0)) => Err(raise(
            &mut rt.heap,
            ErrKind::Arithmetic,
            "divide by zero".to_string(),
        )),
        (Num::Int(x), Num::Int(y)) => {
            if x % y == 0 {
                Ok(Value::Int(x / y))
            } else {
                Ok(Value::Float(x as f64 / y as f64))
            }
        }
        (Num::Int(x), Num::Float(y)) => Ok(Value::Float(x as f64 / y)),
        (Num::Float(x), Num::Int(y)) => Ok(Value::Float(x / y as f64)),
        (Num::Float(x), Num::Float(y)) => Ok(Value::Float(x / y)),
    }
}

pub fn div(rt: &mut Rt, args: &[Value]) -> EvalResult {
    match args {
        [] => Err(arity_error(&mut rt.heap, "/", 0)),
        [x] => div2(rt, Value::Int(1), *x),
        [first, rest @ ..] => {
            let mut acc = *first;
            for &a in rest {
                acc = div2(rt, acc, a)?;
            }
            Ok(acc)
        }
    }
}

pub fn quot(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "quot", args.len()));
    }
    let x = int_arg(rt, "quot", args[0])?;
    let y = int_arg(rt, "quot", args[1])?;
    if y == 0 {
        return Err(raise(&mut rt.heap, ErrKind::Arithmetic, "divide by zero".to_string()));
    }
    match x.checked_div(y) {
        Some(n) => Ok(Value::Int(n)),
        None => Err(overflow(rt, "quot")),
    }
}

pub fn rem_(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "rem", args.len()));
    }
    let x = int_arg(rt, "rem", args[0])?;
    let y = int_arg(rt, "rem", args[1])?;
    if y == 0 {
        return Err(raise(&mut rt.heap, ErrKind::Arithmetic, "divide by zero".to_string()));
    }
    Ok(Value::Int(x.wrapping_rem(y)))
}

pub fn mod_(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "mod", args.len()));
    }
    let x = int_arg(rt, "mod", args[0])?;
    let y = int_arg(rt, "mod", args[1])?;
    if y == 0 {
        return Err(raise(&mut rt.heap, ErrKind::Arithmetic, "divide by zero".to_string()));
    }
    // Result takes the divisor's sign (floored division).
    let r = x.wrapping_rem(y);
    let m = if r != 0 && (r < 0) != (y < 0) { r + y } else { r };
    Ok(Value::Int(m))
}

pub fn inc(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "inc", args.len()));
    }
    fold2(rt, "inc", args[0], Value::Int(1), i64::checked_add, |x, y| x + y)
}

pub fn dec(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "dec", args.len()));
    }
    fold2(rt, "dec", args[0], Value::Int(1), i64::checked_sub, |x, y| x - y)
}

pub fn abs_(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "abs", args.len()));
    }
    match num(rt, "abs", args[0])? {
        Num::Int(n) => match n.checked_abs() {
            Some(n) => Ok(Value::Int(n)),
            None => Err(overflow(rt, "abs")),
        },
        Num::Float(f) => Ok(Value::Float(f.abs())),
    }
}

fn extreme(rt: &mut Rt, name: &str, args: &[Value], want: Ordering) -> EvalResult {
    match args.split_first() {
        None => Err(arity_error(&mut rt.heap, name, 0)),
        Some((first, rest)) => {
            num(rt, name, *first)?;
            let mut best = *first;
            for &a in rest {
                num(rt, name, a)?;
                if compare_values(rt, a, best)? == want {
                    best = a;
                }
            }
            Ok(best)
        }
    }
}

pub fn max_(rt: &mut Rt, args: &[Value]) -> EvalResult {
    extreme(rt, "max", args, Ordering::Greater)
}

pub fn min_(rt: &mut Rt, args: &[Value]) -> EvalResult {
    extreme(rt, "min", args, Ordering::Less)
}

fn chain_compare(
    rt: &mut Rt,
    name: &str,
    args: &[Value],
    accept: fn(Ordering) -> bool,
) -> EvalResult {
    if args.is_empty() {
        return Err(arity_error(&mut rt.heap, name, 0));
    }
    for &a in args {
        num(rt, name, a)?;
    }
    for pair in args.windows(2) {
        if !accept(compare_values(rt, pair[0], pair[1])?) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

pub fn lt(rt: &mut Rt, args: &[Value]) -> EvalResult {
    chain_compare(rt, "<", args, |o| o == Ordering::Less)
}

pub fn le(rt: &mut Rt, args: &[Value]) -> EvalResult {
    chain_compare(rt, "<=", args, |o| o != Ordering::Greater)
}

pub fn gt(rt: &mut Rt, args: &[Value]) -> EvalResult {
    chain_compare(rt, ">", args, |o| o == Ordering::Greater)
}

pub fn ge(rt: &mut Rt, args: &[Value]) -> EvalResult {
    chain_compare(rt, ">=", args, |o| o != Ordering::Less)
}

pub fn num_eq(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.is_empty() {
        return Err(arity_error(&mut rt.heap, "==", 0));
    }
    for pair in args.windows(2) {
        match crate::eq::num_eq(rt, pair[0], pair[1])? {
            Value::Bool(true) => continue,
            _ => return Ok(Value::Bool(false)),
        }
    }
    Ok(Value::Bool(true))
}

pub fn compare(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "compare", args.len()));
    }
    let ord = compare_values(rt, args[0], args[1])?;
    Ok(Value::Int(match ord {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }))
}

fn int_pred(rt: &mut Rt, name: &str, args: &[Value], f: fn(i64) -> bool) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, name, args.len()));
    }
    match num(rt, name, args[0])? {
        Num::Int(n) => Ok(Value::Bool(f(n))),
        Num::Float(x) => Ok(Value::Bool(x.fract() == 0.0 && f(x as i64))),
    }
}

pub fn zero_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "zero?", args.len()));
    }
    match num(rt, "zero?", args[0])? {
        Num::Int(n) => Ok(Value::Bool(n == 0)),
        Num::Float(f) => Ok(Value::Bool(f == 0.0)),
    }
}

pub fn pos_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "pos?", args.len()));
    }
    match num(rt, "pos?", args[0])? {
        Num::Int(n) => Ok(Value::Bool(n > 0)),
        Num::Float(f) => Ok(Value::Bool(f > 0.0)),
    }
}

pub fn neg_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "neg?", args.len()));
    }
    match num(rt, "neg?", args[0])? {
        Num::Int(n) => Ok(Value::Bool(n < 0)),
        Num::Float(f) => Ok(Value::Bool(f < 0.0)),
    }
}

pub fn even_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    int_pred(rt, "even?", args, |n| n % 2 == 0)
}

pub fn odd_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    int_pred(rt, "odd?", args, |n| n % 2 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::Limits;

    fn rt() -> Rt {
        Rt::new(Limits::default())
    }

    #[test]
    fn test_add_identity_and_mixed() {
        let mut rt = rt();
        assert_eq!(add(&mut rt, &[]).unwrap(), Value::Int(0));
        assert_eq!(
            add(&mut rt, &[Value::Int(1), Value::Float(2.5)]).unwrap(),
            Value::Float(3.5)
        );
    }

    #[test]
    fn test_sub_unary_negates() {
        let mut rt = rt();
        assert_eq!(sub(&mut rt, &[Value::Int(5)]).unwrap(), Value::Int(-5));
    }

    #[test]
    fn test_div_exact_vs_inexact() {
        let mut rt = rt();
        assert_eq!(div(&mut rt, &[Value::Int(6), Value::Int(3)]).unwrap(), Value::Int(2));
        assert_eq!(div(&mut rt, &[Value::Int(7), Value::Int(2)]).unwrap(), Value::Float(3.5));
        let err = div(&mut rt, &[Value::Int(1), Value::Int(0)]).unwrap_err();
        assert_eq!(err.kind(&rt.heap), ErrKind::Arithmetic);
    }

    #[test]
    fn test_overflow_raises() {
        let mut rt = rt();
        let err = add(&mut rt, &[Value::Int(i64::MAX), Value::Int(1)]).unwrap_err();
        assert_eq!(err.kind(&rt.heap), ErrKind::Arithmetic);
    }

    #[test]
    fn test_comparison_chains() {
        let mut rt = rt();
        let t = lt(&mut rt, &[Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(t, Value::Bool(true));
        let f = lt(&mut rt, &[Value::Int(1), Value::Int(3), Value::Int(2)]).unwrap();
        assert_eq!(f, Value::Bool(false));
    }

    #[test]
    fn test_parity_predicates() {
        let mut rt = rt();
        assert_eq!(even_p(&mut rt, &[Value::Int(4)]).unwrap(), Value::Bool(true));
        assert_eq!(odd_p(&mut rt, &[Value::Int(4)]).unwrap(), Value::Bool(false));
        let err = even_p(&mut rt, &[Value::Bool(true)]).unwrap_err();
        assert_eq!(err.kind(&rt.heap), ErrKind::Type);
    }
}
