//! General-purpose built-ins: equality, predicates, type introspection,
//! printing, exceptions, and var plumbing.

use clove_core::value::{Tag, tag_of};
use clove_core::{ErrKind, ErrorObj, Obj, Value, intern};

use crate::error::{EvalResult, Thrown, arity_error, raise};
use crate::eq::{value_eq, value_hash};
use crate::invoke::invoke;
use crate::print::{display_str, pr_str};
use crate::rt::Rt;

pub fn eq(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.is_empty() {
        return Err(arity_error(&mut rt.heap, "=", 0));
    }
    for pair in args.windows(2) {
        if !value_eq(rt, pair[0], pair[1])? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

pub fn not_eq(rt: &mut Rt, args: &[Value]) -> EvalResult {
    match eq(rt, args)? {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        _ => Ok(Value::Bool(false)),
    }
}

pub fn not(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "not", args.len()));
    }
    Ok(Value::Bool(!args[0].is_truthy()))
}

pub fn boolean(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "boolean", args.len()));
    }
    Ok(Value::Bool(args[0].is_truthy()))
}

pub fn identity(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "identity", args.len()));
    }
    Ok(args[0])
}

pub fn type_(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "type", args.len()));
    }
    let tag = tag_of(&rt.heap, args[0]);
    Ok(Value::Sym(intern::intern_name(tag.type_symbol())))
}

pub fn hash(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "hash", args.len()));
    }
    let h = value_hash(rt, args[0])?;
    Ok(Value::Int(h as i64))
}

fn tag_pred(rt: &mut Rt, name: &str, args: &[Value], f: fn(Tag) -> bool) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, name, args.len()));
    }
    Ok(Value::Bool(f(tag_of(&rt.heap, args[0]))))
}

pub fn nil_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "nil?", args, |t| t == Tag::Nil)
}

pub fn some_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "some?", args, |t| t != Tag::Nil)
}

pub fn true_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "true?", args.len()));
    }
    Ok(Value::Bool(args[0] == Value::Bool(true)))
}

pub fn false_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "false?", args.len()));
    }
    Ok(Value::Bool(args[0] == Value::Bool(false)))
}

pub fn number_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "number?", args, |t| t == Tag::Int || t == Tag::Float)
}

pub fn int_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "int?", args, |t| t == Tag::Int)
}

pub fn float_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "float?", args, |t| t == Tag::Float)
}

pub fn string_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "string?", args, |t| t == Tag::String)
}

pub fn char_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "char?", args, |t| t == Tag::Char)
}

pub fn symbol_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "symbol?", args, |t| t == Tag::Symbol)
}

pub fn keyword_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "keyword?", args, |t| t == Tag::Keyword)
}

pub fn boolean_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "boolean?", args, |t| t == Tag::Bool)
}

pub fn coll_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "coll?", args, |t| {
        matches!(t, Tag::List | Tag::Vector | Tag::Map | Tag::Set | Tag::LazySeq)
    })
}

pub fn list_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "list?", args, |t| t == Tag::List)
}

pub fn vector_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "vector?", args, |t| t == Tag::Vector)
}

pub fn map_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "map?", args, |t| t == Tag::Map)
}

pub fn set_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "set?", args, |t| t == Tag::Set)
}

pub fn seq_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "seq?", args, |t| t == Tag::List || t == Tag::LazySeq)
}

pub fn seqable_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "seqable?", args.len()));
    }
    Ok(Value::Bool(crate::seq::is_seqable(rt, args[0])))
}

pub fn fn_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "fn?", args, |t| t == Tag::Fn || t == Tag::MultiFn)
}

pub fn ifn_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    tag_pred(rt, "ifn?", args, |t| {
        matches!(
            t,
            Tag::Fn | Tag::MultiFn | Tag::Keyword | Tag::Symbol | Tag::Map | Tag::Set | Tag::Vector | Tag::Var
        )
    })
}

pub fn distinct_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.is_empty() {
        return Err(arity_error(&mut rt.heap, "distinct?", 0));
    }
    for i in 0..args.len() {
        for j in (i + 1)..args.len() {
            if value_eq(rt, args[i], args[j])? {
                return Ok(Value::Bool(false));
            }
        }
    }
    Ok(Value::Bool(true))
}

// Printing.

fn join_args(rt: &mut Rt, args: &[Value], readable: bool) -> Result<String, Thrown> {
    let mut out = String::new();
    for (i, &a) in args.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let s = if readable {
            pr_str(rt, a)?
        } else {
            display_str(rt, a)?
        };
        out.push_str(&s);
    }
    Ok(out)
}

pub fn println_(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let s = join_args(rt, args, false)?;
    println!("{}", s);
    Ok(Value::Nil)
}

pub fn print_(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let s = join_args(rt, args, false)?;
    print!("{}", s);
    Ok(Value::Nil)
}

pub fn prn(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let s = join_args(rt, args, true)?;
    println!("{}", s);
    Ok(Value::Nil)
}

pub fn pr(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let s = join_args(rt, args, true)?;
    print!("{}", s);
    Ok(Value::Nil)
}

pub fn pr_str_fn(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let s = join_args(rt, args, true)?;
    Ok(rt.heap.string_value(s))
}

pub fn str_fn(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let mut out = String::new();
    for &a in args {
        out.push_str(&display_str(rt, a)?);
    }
    Ok(rt.heap.string_value(out))
}

// Exceptions.

pub fn ex_info(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let (msg, data) = match args.len() {
        1 => (args[0], Value::Nil),
        2 => (args[0], args[1]),
        n => return Err(arity_error(&mut rt.heap, "ex-info", n)),
    };
    let message = match rt.heap.try_str(msg) {
        Some(s) => s.to_string(),
        None => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::Type,
                "ex-info expects a string message".to_string(),
            ));
        }
    };
    Ok(Value::Obj(rt.heap.alloc(Obj::Error(ErrorObj {
        kind: ErrKind::User,
        message: message.into_boxed_str(),
        data,
    }))))
}

pub fn ex_data(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "ex-data", args.len()));
    }
    Ok(rt.heap.try_error(args[0]).map(|e| e.data).unwrap_or(Value::Nil))
}

pub fn ex_message(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "ex-message", args.len()));
    }
    match rt.heap.try_error(args[0]) {
        Some(e) => {
            let msg = e.message.to_string();
            Ok(rt.heap.string_value(msg))
        }
        None => Ok(Value::Nil),
    }
}

/// Target of the `assert` macro expansion.
pub fn assert_failed(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let detail = match args.first() {
        Some(v) => display_str(rt, *v)?,
        None => String::new(),
    };
    Err(raise(
        &mut rt.heap,
        ErrKind::AssertionFailed,
        format!("assert failed: {}", detail),
    ))
}

/// Target of the `case` macro's no-match branch.
pub fn case_failed(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let shown = match args.first() {
        Some(v) => pr_str(rt, *v)?,
        None => String::new(),
    };
    Err(raise(
        &mut rt.heap,
        ErrKind::IllegalArgument,
        format!("no matching clause: {}", shown),
    ))
}

// Names and symbols.

pub fn name_fn(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "name", args.len()));
    }
    match args[0] {
        Value::Sym(id) | Value::Keyword(id) => {
            let n = intern::name_of(id);
            Ok(rt.heap.str_value(n))
        }
        v => {
            if rt.heap.try_str(v).is_some() {
                Ok(v)
            } else {
                Err({
                let msg = format!("name expects a symbol, keyword, or string, got {}", tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            })
            }
        }
    }
}

pub fn namespace_fn(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "namespace", args.len()));
    }
    match args[0] {
        Value::Sym(id) | Value::Keyword(id) => match intern::ns_of(id) {
            Some(ns) => Ok(rt.heap.str_value(ns)),
            None => Ok(Value::Nil),
        },
        v => Err({
                let msg = format!("namespace expects a symbol or keyword, got {}", tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

fn as_name(rt: &mut Rt, what: &str, v: Value) -> Result<String, Thrown> {
    match v {
        Value::Sym(id) | Value::Keyword(id) => Ok(intern::name_of(id).to_string()),
        other => match rt.heap.try_str(other) {
            Some(s) => Ok(s.to_string()),
            None => Err({
                let msg = format!("{} expects a name, got {}", what, tag_of(&rt.heap, other).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
        },
    }
}

pub fn keyword_fn(rt: &mut Rt, args: &[Value]) -> EvalResult {
    match args.len() {
        1 => {
            if let Value::Keyword(id) = args[0] {
                return Ok(Value::Keyword(id));
            }
            let name = as_name(rt, "keyword", args[0])?;
            Ok(Value::Keyword(intern::intern_qualified(&name)))
        }
        2 => {
            let ns = as_name(rt, "keyword", args[0])?;
            let name = as_name(rt, "keyword", args[1])?;
            Ok(Value::Keyword(intern::intern(Some(&ns), &name)))
        }
        n => Err(arity_error(&mut rt.heap, "keyword", n)),
    }
}

pub fn symbol_fn(rt: &mut Rt, args: &[Value]) -> EvalResult {
    match args.len() {
        1 => {
            if let Value::Sym(id) = args[0] {
                return Ok(Value::Sym(id));
            }
            let name = as_name(rt, "symbol", args[0])?;
            Ok(Value::Sym(intern::intern_qualified(&name)))
        }
        2 => {
            let ns = as_name(rt, "symbol", args[0])?;
            let name = as_name(rt, "symbol", args[1])?;
            Ok(Value::Sym(intern::intern(Some(&ns), &name)))
        }
        n => Err(arity_error(&mut rt.heap, "symbol", n)),
    }
}

pub fn gensym_fn(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let prefix = match args.len() {
        0 => "G".to_string(),
        1 => as_name(rt, "gensym", args[0])?,
        n => return Err(arity_error(&mut rt.heap, "gensym", n)),
    };
    Ok(Value::Sym(intern::gensym(&prefix)))
}

// Vars.

pub fn var_get(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "var-get", args.len()));
    }
    match args[0] {
        Value::Var(id) => match rt.env.var(id).value() {
            Some(v) => Ok(v),
            None => {
                let name = intern::full_name(rt.env.var(id).name);
                Err(raise(&mut rt.heap, ErrKind::UnboundVar, format!("unbound var: {}", name)))
            }
        },
        v => Err({
                let msg = format!("var-get expects a var, got {}", tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

pub fn alter_var_root(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() < 2 {
        return Err(arity_error(&mut rt.heap, "alter-var-root", args.len()));
    }
    let id = match args[0] {
        Value::Var(id) => id,
        v => {
            return Err({
                let msg = format!("alter-var-root expects a var, got {}", tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            });
        }
    };
    let old = rt.env.var(id).root.unwrap_or(Value::Nil);
    let mut call_args = Vec::with_capacity(args.len() - 1);
    call_args.push(old);
    call_args.extend_from_slice(&args[2..]);
    let new = invoke(rt, args[1], &call_args)?;
    rt.env.var_mut(id).root = Some(new);
    let watchers = rt.env.var(id).watchers.clone();
    if !watchers.is_empty() {
        let mark = rt.temp_mark();
        rt.push_temp(old);
        rt.push_temp(new);
        let result = (|| -> Result<(), Thrown> {
            for (key, watcher) in watchers {
                invoke(rt, watcher, &[key, args[0], old, new])?;
            }
            Ok(())
        })();
        rt.truncate_temps(mark);
        result?;
    }
    Ok(new)
}

/// `satisfies?`: does the value's type extend the protocol?
pub fn satisfies_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "satisfies?", args.len()));
    }
    let pr = match args[0].as_obj() {
        Some(r) if matches!(rt.heap.get(r), Obj::Protocol(_)) => r,
        _ => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::Type,
                "satisfies? expects a protocol".to_string(),
            ));
        }
    };
    let tag = tag_of(&rt.heap, args[1]);
    Ok(Value::Bool(rt.env.protocol_extends(pr, tag)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::Limits;

    fn rt() -> Rt {
        Rt::new(Limits::default())
    }

    #[test]
    fn test_eq_chain() {
        let mut rt = rt();
        let t = eq(&mut rt, &[Value::Int(1), Value::Float(1.0), Value::Int(1)]).unwrap();
        assert_eq!(t, Value::Bool(true));
        let f = eq(&mut rt, &[Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(f, Value::Bool(false));
    }

    #[test]
    fn test_type_names() {
        let mut rt = rt();
        let t = type_(&mut rt, &[Value::Int(1)]).unwrap();
        assert_eq!(t, Value::Sym(intern::intern_name("Long")));
        let s = rt.heap.str_value("x");
        let t = type_(&mut rt, &[s]).unwrap();
        assert_eq!(t, Value::Sym(intern::intern_name("String")));
    }

    #[test]
    fn test_ex_info_round_trip() {
        let mut rt = rt();
        let msg = rt.heap.str_value("bad");
        let k = Value::Keyword(intern::intern_name("x"));
        let data = rt.heap.map_value(vec![(k, Value::Int(1))]);
        let err = ex_info(&mut rt, &[msg, data]).unwrap();
        assert_eq!(ex_data(&mut rt, &[err]).unwrap(), data);
        let m = ex_message(&mut rt, &[err]).unwrap();
        assert_eq!(rt.heap.try_str(m), Some("bad"));
    }

    #[test]
    fn test_str_concatenates_display_forms() {
        let mut rt = rt();
        let s = rt.heap.str_value("x=");
        let out = str_fn(&mut rt, &[s, Value::Int(3), Value::Nil]).unwrap();
        assert_eq!(rt.heap.try_str(out), Some("x=3"));
    }

    #[test]
    fn test_keyword_coercions() {
        let mut rt = rt();
        let s = rt.heap.str_value("a");
        let k = keyword_fn(&mut rt, &[s]).unwrap();
        assert_eq!(k, Value::Keyword(intern::intern_name("a")));
        let sym = Value::Sym(intern::intern_name("b"));
        let k2 = keyword_fn(&mut rt, &[sym]).unwrap();
        assert_eq!(k2, Value::Keyword(intern::intern_name("b")));
    }
}
