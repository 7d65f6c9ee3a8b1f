//! Atoms: single-threaded mutable cells with validators and watchers.
//!
//! `swap!` computes `(f current args...)`, runs the validator if present,
//! installs the new value, then notifies each watcher as
//! `(watch-fn key atom old new)`. There is no retry loop: the core is
//! single-threaded, but holders still must not rely on pointer stability
//! across an update.

use clove_core::value::{Tag, tag_of};
use clove_core::{AtomObj, ErrKind, Obj, ObjRef, Value};

use crate::error::{EvalResult, Thrown, arity_error, raise};
use crate::invoke::invoke;
use crate::rt::Rt;

fn atom_ref(rt: &mut Rt, v: Value) -> Result<ObjRef, Thrown> {
    match v.as_obj() {
        Some(r) if matches!(rt.heap.get(r), Obj::Atom(_)) => Ok(r),
        _ => Err({
                let msg = format!("expected an atom, got {}", tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

pub fn atom(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "atom", args.len()));
    }
    Ok(Value::Obj(rt.heap.alloc(Obj::Atom(AtomObj {
        value: args[0],
        validator: None,
        watchers: Vec::new(),
    }))))
}

pub fn deref(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "deref", args.len()));
    }
    match args[0] {
        Value::Var(id) => match rt.env.var(id).value() {
            Some(v) => Ok(v),
            None => {
                let name = clove_core::intern::full_name(rt.env.var(id).name);
                Err(raise(
                    &mut rt.heap,
                    ErrKind::UnboundVar,
                    format!("unbound var: {}", name),
                ))
            }
        },
        v => {
            let r = atom_ref(rt, v)?;
            match rt.heap.get(r) {
                Obj::Atom(a) => Ok(a.value),
                _ => Ok(Value::Nil),
            }
        }
    }
}

/// Validate, install, and notify. `old` must already be read out.
fn commit(rt: &mut Rt, atom_val: Value, r: ObjRef, old: Value, new: Value) -> EvalResult {
    let validator = match rt.heap.get(r) {
        Obj::Atom(a) => a.validator,
        _ => None,
    };
    if let Some(vf) = validator {
        let ok = invoke(rt, vf, &[new])?;
        if !ok.is_truthy() {
            return Err(raise(
                &mut rt.heap,
                ErrKind::IllegalState,
                "invalid reference state".to_string(),
            ));
        }
    }
    if let Obj::Atom(a) = rt.heap.get_mut(r) {
        a.value = new;
    }
    let watchers = match rt.heap.get(r) {
        Obj::Atom(a) => a.watchers.clone(),
        _ => Vec::new(),
    };
    if !watchers.is_empty() {
        let mark = rt.temp_mark();
        rt.push_temp(old);
        rt.push_temp(new);
        let result = (|| -> Result<(), Thrown> {
            for (key, watcher) in watchers {
                invoke(rt, watcher, &[key, atom_val, old, new])?;
            }
            Ok(())
        })();
        rt.truncate_temps(mark);
        result?;
    }
    Ok(new)
}

/// `swap!`; also the implementation behind the Swap node in both backends.
pub fn swap_in_place(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() < 2 {
        return Err(arity_error(&mut rt.heap, "swap!", args.len()));
    }
    let r = atom_ref(rt, args[0])?;
    let f = args[1];
    let old = match rt.heap.get(r) {
        Obj::Atom(a) => a.value,
        _ => Value::Nil,
    };
    let mut call_args = Vec::with_capacity(args.len() - 1);
    call_args.push(old);
    call_args.extend_from_slice(&args[2..]);
    let new = invoke(rt, f, &call_args)?;
    let mark = rt.temp_mark();
    rt.push_temp(new);
    let result = commit(rt, args[0], r, old, new);
    rt.truncate_temps(mark);
    result
}

pub fn reset_bang(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "reset!", args.len()));
    }
    let r = atom_ref(rt, args[0])?;
    let old = match rt.heap.get(r) {
        Obj::Atom(a) => a.value,
        _ => Value::Nil,
    };
    commit(rt, args[0], r, old, args[1])
}

pub fn compare_and_set(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 3 {
        return Err(arity_error(&mut rt.heap, "compare-and-set!", args.len()));
    }
    let r = atom_ref(rt, args[0])?;
    let current = match rt.heap.get(r) {
        Obj::Atom(a) => a.value,
        _ => Value::Nil,
    };
    if !crate::eq::value_eq(rt, current, args[1])? {
        return Ok(Value::Bool(false));
    }
    commit(rt, args[0], r, current, args[2])?;
    Ok(Value::Bool(true))
}

pub fn set_validator(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "set-validator!", args.len()));
    }
    let r = atom_ref(rt, args[0])?;
    let validator = if args[1].is_nil() { None } else { Some(args[1]) };
    // The new validator must accept the current value.
    if let Some(vf) = validator {
        let current = match rt.heap.get(r) {
            Obj::Atom(a) => a.value,
            _ => Value::Nil,
        };
        let ok = invoke(rt, vf, &[current])?;
        if !ok.is_truthy() {
            return Err(raise(
                &mut rt.heap,
                ErrKind::IllegalState,
                "invalid reference state".to_string(),
            ));
        }
    }
    if let Obj::Atom(a) = rt.heap.get_mut(r) {
        a.validator = validator;
    }
    Ok(Value::Nil)
}

pub fn add_watch(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 3 {
        return Err(arity_error(&mut rt.heap, "add-watch", args.len()));
    }
    let (target, key, f) = (args[0], args[1], args[2]);
    match target {
        Value::Var(id) => {
            let watchers = &mut rt.env.var_mut(id).watchers;
            watchers.retain(|(k, _)| *k != key);
            watchers.push((key, f));
            Ok(target)
        }
        _ => {
            let r = atom_ref(rt, target)?;
            if let Obj::Atom(a) = rt.heap.get_mut(r) {
                a.watchers.retain(|(k, _)| *k != key);
                a.watchers.push((key, f));
            }
            Ok(target)
        }
    }
}

pub fn remove_watch(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "remove-watch", args.len()));
    }
    let (target, key) = (args[0], args[1]);
    match target {
        Value::Var(id) => {
            rt.env.var_mut(id).watchers.retain(|(k, _)| *k != key);
            Ok(target)
        }
        _ => {
            let r = atom_ref(rt, target)?;
            if let Obj::Atom(a) = rt.heap.get_mut(r) {
                a.watchers.retain(|(k, _)| *k != key);
            }
            Ok(target)
        }
    }
}

pub fn atom_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "atom?", args.len()));
    }
    Ok(Value::Bool(tag_of(&rt.heap, args[0]) == Tag::Atom))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::Limits;

    fn rt() -> Rt {
        Rt::new(Limits::default())
    }

    #[test]
    fn test_atom_reset_deref() {
        let mut rt = rt();
        let a = atom(&mut rt, &[Value::Int(1)]).unwrap();
        assert_eq!(deref(&mut rt, &[a]).unwrap(), Value::Int(1));
        reset_bang(&mut rt, &[a, Value::Int(9)]).unwrap();
        assert_eq!(deref(&mut rt, &[a]).unwrap(), Value::Int(9));
    }

    #[test]
    fn test_compare_and_set_checks_expected() {
        let mut rt = rt();
        let a = atom(&mut rt, &[Value::Int(1)]).unwrap();
        let miss = compare_and_set(&mut rt, &[a, Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(miss, Value::Bool(false));
        assert_eq!(deref(&mut rt, &[a]).unwrap(), Value::Int(1));
        let hit = compare_and_set(&mut rt, &[a, Value::Int(1), Value::Int(3)]).unwrap();
        assert_eq!(hit, Value::Bool(true));
        assert_eq!(deref(&mut rt, &[a]).unwrap(), Value::Int(3));
    }
}
