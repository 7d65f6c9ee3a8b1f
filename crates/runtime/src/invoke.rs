//! The single call funnel.
//!
//! Every callable tag goes through `invoke`: built-ins, user closures,
//! partial/comp wrappers, keywords and collections acting as lookup
//! functions, symbols, multimethods, protocol methods, and vars. Both
//! backends and every higher-order built-in dispatch here, so adding a
//! callable tag is a one-place change.
//!
//! Rooting contract: the caller keeps `callee` and `args` alive in a rooted
//! location (binding stack, operand stack, or temp roots) for the duration
//! of the call; `invoke` may allocate and cross GC safe points.

use clove_core::value::tag_of;
use clove_core::{ErrKind, Obj, ObjRef, SymId, Value, intern};

use crate::error::{EvalResult, arity_error, raise};
use crate::eq::value_eq;
use crate::rt::{Backend, Rt};
use crate::{builtins, colls, eval, vm};

pub fn invoke(rt: &mut Rt, callee: Value, args: &[Value]) -> EvalResult {
    match callee {
        Value::Obj(r) => invoke_obj(rt, r, callee, args),
        Value::Keyword(_) | Value::Sym(_) => lookup_call(rt, callee, args),
        Value::Var(id) => {
            let held = match rt.env.var(id).value() {
                Some(v) => v,
                None => {
                    let name = intern::full_name(rt.env.var(id).name);
                    return Err(raise(
                        &mut rt.heap,
                        ErrKind::UnboundVar,
                        format!("unbound var: {}", name),
                    ));
                }
            };
            invoke(rt, held, args)
        }
        other => Err({
                let msg = format!("not callable: {}", tag_of(&rt.heap, other).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

fn invoke_obj(rt: &mut Rt, r: ObjRef, callee: Value, args: &[Value]) -> EvalResult {
    enum Plan {
        Builtin(u16, SymId),
        Closure,
        Partial(Value, Vec<Value>),
        Comp(Vec<Value>),
        Multi,
        Protocol(Value, SymId),
        Lookup,
        VectorIndex,
        NotCallable,
    }
    let plan = match rt.heap.get(r) {
        Obj::Builtin(b) => Plan::Builtin(b.id, b.name),
        Obj::Closure(_) => Plan::Closure,
        Obj::Partial(p) => Plan::Partial(p.f, p.args.clone()),
        Obj::Comp(c) => Plan::Comp(c.fns.clone()),
        Obj::MultiFn(_) => Plan::Multi,
        Obj::ProtocolFn(p) => Plan::Protocol(p.proto, p.method),
        Obj::Map(_) | Obj::Set(_) => Plan::Lookup,
        Obj::Vector(_) => Plan::VectorIndex,
        _ => Plan::NotCallable,
    };
    match plan {
        Plan::Builtin(id, name) => builtins::call(rt, id, name, args),
        Plan::Closure => call_closure(rt, callee, args),
        Plan::Partial(f, mut fixed) => {
            fixed.extend_from_slice(args);
            invoke(rt, f, &fixed)
        }
        Plan::Comp(fns) => call_comp(rt, &fns, args),
        Plan::Multi => call_multi(rt, r, args),
        Plan::Protocol(proto, method) => call_protocol(rt, proto, method, args),
        Plan::Lookup => lookup_call(rt, callee, args),
        Plan::VectorIndex => vector_index_call(rt, callee, args),
        Plan::NotCallable => Err({
                let msg = format!("not callable: {}", tag_of(&rt.heap, callee).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

/// Route a user closure to the active backend.
pub fn call_closure(rt: &mut Rt, callee: Value, args: &[Value]) -> EvalResult {
    match rt.backend {
        Backend::Treewalk => eval::call_closure_eval(rt, callee, args),
        Backend::Vm => vm::call_closure_vm(rt, callee, args),
    }
}

/// Keywords, symbols, maps, and sets act as lookup functions.
fn lookup_call(rt: &mut Rt, callee: Value, args: &[Value]) -> EvalResult {
    let not_found = match args.len() {
        1 => Value::Nil,
        2 => args[1],
        n => {
            let name = pr_callable_name(rt, callee);
            return Err(arity_error(&mut rt.heap, &name, n));
        }
    };
    match callee {
        Value::Keyword(_) | Value::Sym(_) => colls::get_value(rt, args[0], callee, not_found),
        _ => colls::get_value(rt, callee, args[0], not_found),
    }
}

fn vector_index_call(rt: &mut Rt, vector: Value, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "vector", args.len()));
    }
    let i = match args[0].as_int() {
        Some(i) => i,
        None => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::Type,
                "vector lookup expects an integer index".to_string(),
            ));
        }
    };
    colls::nth_value(rt, vector, i, None)
}

fn call_comp(rt: &mut Rt, fns: &[Value], args: &[Value]) -> EvalResult {
    // (comp) is identity.
    if fns.is_empty() {
        return match args {
            [x] => Ok(*x),
            _ => Err(arity_error(&mut rt.heap, "identity", args.len())),
        };
    }
    // Rightmost function sees the original arguments; the rest fold left.
    let mark = rt.temp_mark();
    let acc_idx = rt.temp_mark();
    rt.push_temp(Value::Nil);
    let result = (|| -> EvalResult {
        let mut acc = invoke(rt, fns[fns.len() - 1], args)?;
        rt.set_temp(acc_idx, acc);
        for f in fns[..fns.len() - 1].iter().rev() {
            acc = invoke(rt, *f, &[acc])?;
            rt.set_temp(acc_idx, acc);
        }
        Ok(acc)
    })();
    rt.truncate_temps(mark);
    result
}

fn call_multi(rt: &mut Rt, r: ObjRef, args: &[Value]) -> EvalResult {
    let (name, dispatch) = match rt.heap.get(r) {
        Obj::MultiFn(m) => (m.name, m.dispatch),
        _ => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::IllegalState,
                "multimethod invoked on a non-multifn".to_string(),
            ));
        }
    };
    let dv = invoke(rt, dispatch, args)?;
    let mark = rt.temp_mark();
    rt.push_temp(dv);
    let picked = (|| -> Result<Option<Value>, crate::error::Thrown> {
        // Re-read per iteration: a dispatch fn may legally add methods.
        let mut i = 0;
        loop {
            let entry = match rt.heap.get(r) {
                Obj::MultiFn(m) => m.methods.get(i).copied(),
                _ => None,
            };
            let (mk, mf) = match entry {
                Some(e) => e,
                None => break,
            };
            if value_eq(rt, mk, dv)? {
                return Ok(Some(mf));
            }
            i += 1;
        }
        let default = match rt.heap.get(r) {
            Obj::MultiFn(m) => m.default,
            _ => None,
        };
        Ok(default)
    })();
    rt.truncate_temps(mark);
    match picked? {
        Some(method) => invoke(rt, method, args),
        None => {
            let shown = crate::print::pr_str(rt, dv).unwrap_or_else(|_| "?".to_string());
            Err(raise(
                &mut rt.heap,
                ErrKind::NoMatchingMethod,
                format!(
                    "no method in multimethod '{}' for dispatch value: {}",
                    intern::name_of(name),
                    shown
                ),
            ))
        }
    }
}

fn call_protocol(rt: &mut Rt, proto: Value, method: SymId, args: &[Value]) -> EvalResult {
    if args.is_empty() {
        let name = intern::name_of(method).to_string();
        return Err(arity_error(&mut rt.heap, &name, 0));
    }
    let pr = match proto.as_obj() {
        Some(p) => p,
        None => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::IllegalState,
                "protocol method without a protocol".to_string(),
            ));
        }
    };
    let tag = tag_of(&rt.heap, args[0]);
    match rt.env.protocol_method(pr, tag, method) {
        Some(f) => invoke(rt, f, args),
        None => {
            let proto_name = match rt.heap.get(pr) {
                Obj::Protocol(p) => intern::name_of(p.name),
                _ => "?",
            };
            Err(raise(
                &mut rt.heap,
                ErrKind::NoProtocolImpl,
                format!(
                    "no implementation of method {} of protocol {} for type {}",
                    intern::name_of(method),
                    proto_name,
                    tag.type_symbol()
                ),
            ))
        }
    }
}

fn pr_callable_name(rt: &Rt, callee: Value) -> String {
    match callee {
        Value::Keyword(id) => format!(":{}", intern::full_name(id)),
        Value::Sym(id) => intern::full_name(id).to_string(),
        _ => tag_of(&rt.heap, callee).name().to_string(),
    }
}
