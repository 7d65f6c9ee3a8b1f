//! Collection built-ins: constructors, accessors, and persistent updates.

use clove_core::value::{Tag, tag_of};
use clove_core::{ErrKind, Obj, Value};

use crate::colls;
use crate::error::{EvalResult, Thrown, arity_error, raise};
use crate::rt::Rt;
use crate::seq;

pub fn list(rt: &mut Rt, args: &[Value]) -> EvalResult {
    Ok(rt.heap.list_value(args.to_vec()))
}

pub fn vector(rt: &mut Rt, args: &[Value]) -> EvalResult {
    Ok(rt.heap.vector_value(args.to_vec()))
}

pub fn vec(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "vec", args.len()));
    }
    let mark = rt.temp_mark();
    let items = seq::seq_to_vec(rt, args[0])?;
    let result = rt.heap.vector_value(items);
    rt.truncate_temps(mark);
    Ok(result)
}

pub fn hash_map(rt: &mut Rt, args: &[Value]) -> EvalResult {
    colls::map_from_pairs(rt, args)
}

pub fn hash_set(rt: &mut Rt, args: &[Value]) -> EvalResult {
    colls::set_from(rt, args)
}

pub fn set(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "set", args.len()));
    }
    let mark = rt.temp_mark();
    let items = seq::seq_to_vec(rt, args[0])?;
    let result = colls::set_from(rt, &items);
    rt.truncate_temps(mark);
    result
}

pub fn conj(rt: &mut Rt, args: &[Value]) -> EvalResult {
    match args.split_first() {
        None => Ok(rt.heap.vector_value(vec![])),
        Some((coll, items)) => {
            let mark = rt.temp_mark();
            let acc_idx = rt.temp_mark();
            rt.push_temp(*coll);
            let mut acc = *coll;
            for &item in items {
                match colls::conj_value(rt, acc, item) {
                    Ok(v) => {
                        acc = v;
                        rt.set_temp(acc_idx, acc);
                    }
                    Err(t) => {
                        rt.truncate_temps(mark);
                        return Err(t);
                    }
                }
            }
            rt.truncate_temps(mark);
            Ok(acc)
        }
    }
}

pub fn cons(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "cons", args.len()));
    }
    let (head, tail) = (args[0], args[1]);
    match tag_of(&rt.heap, tail) {
        Tag::Nil => Ok(rt.heap.list_value(vec![head])),
        Tag::List => {
            let mut items = vec![head];
            if let Some(existing) = rt.heap.try_slice(tail) {
                items.extend_from_slice(existing);
            }
            Ok(rt.heap.list_value(items))
        }
        _ => {
            if !seq::is_seqable(rt, tail) {
                return Err({
                let msg = format!("cons expects a seqable tail, got {}", tag_of(&rt.heap, tail).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            });
            }
            Ok(rt.heap.cons_value(head, tail))
        }
    }
}

pub fn assoc(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() < 3 || args.len() % 2 == 0 {
        return Err(arity_error(&mut rt.heap, "assoc", args.len()));
    }
    let mark = rt.temp_mark();
    let acc_idx = rt.temp_mark();
    rt.push_temp(args[0]);
    let mut acc = args[0];
    for pair in args[1..].chunks(2) {
        match colls::assoc_value(rt, acc, pair[0], pair[1]) {
            Ok(v) => {
                acc = v;
                rt.set_temp(acc_idx, acc);
            }
            Err(t) => {
                rt.truncate_temps(mark);
                return Err(t);
            }
        }
    }
    rt.truncate_temps(mark);
    Ok(acc)
}

pub fn dissoc(rt: &mut Rt, args: &[Value]) -> EvalResult {
    match args.split_first() {
        None => Err(arity_error(&mut rt.heap, "dissoc", 0)),
        Some((coll, keys)) => {
            let mark = rt.temp_mark();
            let acc_idx = rt.temp_mark();
            rt.push_temp(*coll);
            let mut acc = *coll;
            for &k in keys {
                match colls::map_dissoc(rt, acc, k) {
                    Ok(v) => {
                        acc = v;
                        rt.set_temp(acc_idx, acc);
                    }
                    Err(t) => {
                        rt.truncate_temps(mark);
                        return Err(t);
                    }
                }
            }
            rt.truncate_temps(mark);
            Ok(acc)
        }
    }
}

pub fn disj(rt: &mut Rt, args: &[Value]) -> EvalResult {
    match args.split_first() {
        None => Err(arity_error(&mut rt.heap, "disj", 0)),
        Some((coll, items)) => {
            let mark = rt.temp_mark();
            let acc_idx = rt.temp_mark();
            rt.push_temp(*coll);
            let mut acc = *coll;
            for &v in items {
                match colls::set_disj(rt, acc, v) {
                    Ok(next) => {
                        acc = next;
                        rt.set_temp(acc_idx, acc);
                    }
                    Err(t) => {
                        rt.truncate_temps(mark);
                        return Err(t);
                    }
                }
            }
            rt.truncate_temps(mark);
            Ok(acc)
        }
    }
}

pub fn get(rt: &mut Rt, args: &[Value]) -> EvalResult {
    match args.len() {
        2 => colls::get_value(rt, args[0], args[1], Value::Nil),
        3 => colls::get_value(rt, args[0], args[1], args[2]),
        n => Err(arity_error(&mut rt.heap, "get", n)),
    }
}

pub fn get_in(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let (coll, path, default) = match args.len() {
        2 => (args[0], args[1], Value::Nil),
        3 => (args[0], args[1], args[2]),
        n => return Err(arity_error(&mut rt.heap, "get-in", n)),
    };
    // A gensym'd keyword cannot collide with any stored value.
    let sentinel = Value::Keyword(clove_core::intern::gensym("get-in-miss"));
    let mark = rt.temp_mark();
    let keys = seq::seq_to_vec(rt, path)?;
    let mut cur = coll;
    let cur_idx = rt.temp_mark();
    rt.push_temp(cur);
    for k in keys {
        match colls::get_value(rt, cur, k, sentinel) {
            Ok(v) if v == sentinel => {
                rt.truncate_temps(mark);
                return Ok(default);
            }
            Ok(v) => {
                cur = v;
                rt.set_temp(cur_idx, cur);
            }
            Err(t) => {
                rt.truncate_temps(mark);
                return Err(t);
            }
        }
    }
    rt.truncate_temps(mark);
    Ok(cur)
}

pub fn assoc_in(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 3 {
        return Err(arity_error(&mut rt.heap, "assoc-in", args.len()));
    }
    let mark = rt.temp_mark();
    let keys = seq::seq_to_vec(rt, args[1])?;
    let result = assoc_in_path(rt, args[0], &keys, args[2]);
    rt.truncate_temps(mark);
    result
}

fn assoc_in_path(rt: &mut Rt, coll: Value, path: &[Value], v: Value) -> EvalResult {
    match path {
        [] => Err(raise(
            &mut rt.heap,
            ErrKind::IllegalArgument,
            "assoc-in expects a non-empty path".to_string(),
        )),
        [k] => colls::assoc_value(rt, coll, *k, v),
        [k, rest @ ..] => {
            let inner = colls::get_value(rt, coll, *k, Value::Nil)?;
            let mark = rt.temp_mark();
            rt.push_temp(inner);
            let updated = assoc_in_path(rt, inner, rest, v);
            rt.truncate_temps(mark);
            let updated = updated?;
            let mark = rt.temp_mark();
            rt.push_temp(updated);
            let result = colls::assoc_value(rt, coll, *k, updated);
            rt.truncate_temps(mark);
            result
        }
    }
}

pub fn contains_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "contains?", args.len()));
    }
    let (coll, k) = (args[0], args[1]);
    match tag_of(&rt.heap, coll) {
        Tag::Map => Ok(Value::Bool(colls::map_contains(rt, coll, k)?)),
        Tag::Set => Ok(Value::Bool(colls::set_contains(rt, coll, k)?)),
        Tag::Vector => {
            let len = rt.heap.try_vector(coll).map(<[Value]>::len).unwrap_or(0);
            Ok(Value::Bool(matches!(k.as_int(), Some(i) if i >= 0 && (i as usize) < len)))
        }
        Tag::String => {
            let len = rt
                .heap
                .try_str(coll)
                .map(|s| s.chars().count())
                .unwrap_or(0);
            Ok(Value::Bool(matches!(k.as_int(), Some(i) if i >= 0 && (i as usize) < len)))
        }
        Tag::Nil => Ok(Value::Bool(false)),
        other => Err(raise(
            &mut rt.heap,
            ErrKind::Type,
            format!("contains? not supported on {}", other.name()),
        )),
    }
}

pub fn count(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "count", args.len()));
    }
    Ok(Value::Int(colls::count_value(rt, args[0])?))
}

pub fn empty_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "empty?", args.len()));
    }
    Ok(Value::Bool(seq::seq_next(rt, args[0])?.is_none()))
}

pub fn not_empty(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "not-empty", args.len()));
    }
    if seq::seq_next(rt, args[0])?.is_none() {
        Ok(Value::Nil)
    } else {
        Ok(args[0])
    }
}

pub fn first(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "first", args.len()));
    }
    Ok(seq::seq_next(rt, args[0])?.map(|(h, _)| h).unwrap_or(Value::Nil))
}

pub fn rest(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "rest", args.len()));
    }
    match seq::seq_next(rt, args[0])? {
        Some((_, tail)) => Ok(tail),
        None => Ok(rt.heap.list_value(vec![])),
    }
}

pub fn next_(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "next", args.len()));
    }
    match seq::seq_next(rt, args[0])? {
        Some((_, tail)) => {
            if seq::seq_next(rt, tail)?.is_none() {
                Ok(Value::Nil)
            } else {
                Ok(tail)
            }
        }
        None => Ok(Value::Nil),
    }
}

pub fn second(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "second", args.len()));
    }
    match seq::seq_next(rt, args[0])? {
        Some((_, tail)) => Ok(seq::seq_next(rt, tail)?.map(|(h, _)| h).unwrap_or(Value::Nil)),
        None => Ok(Value::Nil),
    }
}

pub fn last(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "last", args.len()));
    }
    let mut out = Value::Nil;
    let mut cur = args[0];
    while let Some((h, t)) = seq::seq_next(rt, cur)? {
        out = h;
        cur = t;
    }
    Ok(out)
}

pub fn butlast(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "butlast", args.len()));
    }
    let mark = rt.temp_mark();
    let mut items = seq::seq_to_vec(rt, args[0])?;
    let result = if items.len() <= 1 {
        Value::Nil
    } else {
        items.pop();
        rt.heap.list_value(items)
    };
    rt.truncate_temps(mark);
    Ok(result)
}

pub fn nth(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let (coll, n, default) = match args.len() {
        2 => (args[0], args[1], None),
        3 => (args[0], args[1], Some(args[2])),
        n => return Err(arity_error(&mut rt.heap, "nth", n)),
    };
    let i = match n.as_int() {
        Some(i) => i,
        None => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::Type,
                "nth expects an integer index".to_string(),
            ));
        }
    };
    colls::nth_value(rt, coll, i, default)
}

pub fn seq_fn(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "seq", args.len()));
    }
    match seq::seq_next(rt, args[0])? {
        Some((h, t)) => Ok(rt.heap.cons_value(h, t)),
        None => Ok(Value::Nil),
    }
}

pub fn keys(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "keys", args.len()));
    }
    match rt.heap.try_map(args[0]) {
        Some(m) => {
            let ks: Vec<Value> = m.entries.iter().map(|(k, _)| *k).collect();
            Ok(rt.heap.list_value(ks))
        }
        None => Ok(Value::Nil),
    }
}

pub fn vals(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "vals", args.len()));
    }
    match rt.heap.try_map(args[0]) {
        Some(m) => {
            let vs: Vec<Value> = m.entries.iter().map(|(_, v)| *v).collect();
            Ok(rt.heap.list_value(vs))
        }
        None => Ok(Value::Nil),
    }
}

pub fn merge(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let non_nil: Vec<Value> = args.iter().copied().filter(|v| !v.is_nil()).collect();
    match non_nil.split_first() {
        None => Ok(Value::Nil),
        Some((first, rest)) => {
            let mark = rt.temp_mark();
            let acc_idx = rt.temp_mark();
            rt.push_temp(*first);
            let mut acc = *first;
            let result = (|| -> EvalResult {
                for &m in rest {
                    let entries = match rt.heap.try_map(m) {
                        Some(md) => md.entries.clone(),
                        None => {
                            return Err({
                let msg = format!("merge expects maps, got {}", tag_of(&rt.heap, m).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            });
                        }
                    };
                    for (k, v) in entries {
                        acc = colls::map_assoc(rt, acc, k, v)?;
                        rt.set_temp(acc_idx, acc);
                    }
                }
                Ok(acc)
            })();
            rt.truncate_temps(mark);
            result
        }
    }
}

pub fn merge_with(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() < 2 {
        return Err(arity_error(&mut rt.heap, "merge-with", args.len()));
    }
    let f = args[0];
    let maps: Vec<Value> = args[1..].iter().copied().filter(|v| !v.is_nil()).collect();
    match maps.split_first() {
        None => Ok(Value::Nil),
        Some((first, rest)) => {
            let mark = rt.temp_mark();
            let acc_idx = rt.temp_mark();
            rt.push_temp(*first);
            let mut acc = *first;
            let result = (|| -> EvalResult {
                for &m in rest {
                    let entries = match rt.heap.try_map(m) {
                        Some(md) => md.entries.clone(),
                        None => {
                            return Err(raise(
                                &mut rt.heap,
                                ErrKind::Type,
                                "merge-with expects maps".to_string(),
                            ));
                        }
                    };
                    for (k, v) in entries {
                        let merged = match colls::map_get(rt, acc, k)? {
                            Some(existing) => crate::invoke::invoke(rt, f, &[existing, v])?,
                            None => v,
                        };
                        acc = colls::map_assoc(rt, acc, k, merged)?;
                        rt.set_temp(acc_idx, acc);
                    }
                }
                Ok(acc)
            })();
            rt.truncate_temps(mark);
            result
        }
    }
}

pub fn select_keys(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "select-keys", args.len()));
    }
    let mark = rt.temp_mark();
    let wanted = seq::seq_to_vec(rt, args[1])?;
    let result = (|| -> EvalResult {
        let mut entries: Vec<(Value, Value)> = Vec::new();
        for k in wanted {
            if let Some(v) = colls::map_get(rt, args[0], k)? {
                entries.push((k, v));
            }
        }
        Ok(rt.heap.map_value(entries))
    })();
    rt.truncate_temps(mark);
    result
}

pub fn zipmap(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "zipmap", args.len()));
    }
    let mark = rt.temp_mark();
    let ks = seq::seq_to_vec(rt, args[0])?;
    let vs = seq::seq_to_vec(rt, args[1])?;
    let entries: Vec<(Value, Value)> = ks.into_iter().zip(vs).collect();
    let result = rt.heap.map_value(entries);
    rt.truncate_temps(mark);
    Ok(result)
}

pub fn peek(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "peek", args.len()));
    }
    match tag_of(&rt.heap, args[0]) {
        Tag::Vector => Ok(rt
            .heap
            .try_vector(args[0])
            .and_then(|v| v.last().copied())
            .unwrap_or(Value::Nil)),
        Tag::List => Ok(rt
            .heap
            .try_slice(args[0])
            .and_then(|v| v.first().copied())
            .unwrap_or(Value::Nil)),
        Tag::Nil => Ok(Value::Nil),
        other => Err(raise(
            &mut rt.heap,
            ErrKind::Type,
            format!("peek not supported on {}", other.name()),
        )),
    }
}

pub fn pop(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "pop", args.len()));
    }
    match tag_of(&rt.heap, args[0]) {
        Tag::Vector => {
            let mut items = rt.heap.try_vector(args[0]).map(<[Value]>::to_vec).unwrap_or_default();
            if items.is_empty() {
                return Err(raise(
                    &mut rt.heap,
                    ErrKind::IllegalState,
                    "pop on an empty vector".to_string(),
                ));
            }
            items.pop();
            Ok(rt.heap.vector_value(items))
        }
        Tag::List => {
            let items = rt.heap.try_slice(args[0]).map(<[Value]>::to_vec).unwrap_or_default();
            if items.is_empty() {
                return Err(raise(
                    &mut rt.heap,
                    ErrKind::IllegalState,
                    "pop on an empty list".to_string(),
                ));
            }
            Ok(rt.heap.list_value(items[1..].to_vec()))
        }
        other => Err(raise(
            &mut rt.heap,
            ErrKind::Type,
            format!("pop not supported on {}", other.name()),
        )),
    }
}

pub fn subvec(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let (v, from, to) = match args.len() {
        2 => (args[0], args[1], None),
        3 => (args[0], args[1], Some(args[2])),
        n => return Err(arity_error(&mut rt.heap, "subvec", n)),
    };
    let items = match rt.heap.try_vector(v) {
        Some(items) => items.to_vec(),
        None => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::Type,
                "subvec expects a vector".to_string(),
            ));
        }
    };
    let start = from.as_int().unwrap_or(-1);
    let end = match to {
        Some(t) => t.as_int().unwrap_or(-1),
        None => items.len() as i64,
    };
    if start < 0 || end < start || end > items.len() as i64 {
        return Err(raise(
            &mut rt.heap,
            ErrKind::IndexOutOfBounds,
            "subvec indices out of bounds".to_string(),
        ));
    }
    Ok(rt.heap.vector_value(items[start as usize..end as usize].to_vec()))
}

pub fn reverse(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "reverse", args.len()));
    }
    let mark = rt.temp_mark();
    let mut items = seq::seq_to_vec(rt, args[0])?;
    items.reverse();
    let result = rt.heap.list_value(items);
    rt.truncate_temps(mark);
    Ok(result)
}

pub fn into(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "into", args.len()));
    }
    let mark = rt.temp_mark();
    let items = seq::seq_to_vec(rt, args[1])?;
    let acc_idx = rt.temp_mark();
    rt.push_temp(args[0]);
    let mut acc = args[0];
    let result = (|| -> EvalResult {
        for item in items {
            acc = colls::conj_value(rt, acc, item)?;
            rt.set_temp(acc_idx, acc);
        }
        Ok(acc)
    })();
    rt.truncate_temps(mark);
    result
}

pub fn empty(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "empty", args.len()));
    }
    match tag_of(&rt.heap, args[0]) {
        Tag::List | Tag::LazySeq => Ok(rt.heap.list_value(vec![])),
        Tag::Vector => Ok(rt.heap.vector_value(vec![])),
        Tag::Map => Ok(rt.heap.map_value(vec![])),
        Tag::Set => Ok(rt.heap.set_value(vec![])),
        _ => Ok(Value::Nil),
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
    fn test_first_rest_next() {
        let mut rt = rt();
        let l = rt.heap.list_value(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(first(&mut rt, &[l]).unwrap(), Value::Int(1));
        let r = rest(&mut rt, &[l]).unwrap();
        assert_eq!(first(&mut rt, &[r]).unwrap(), Value::Int(2));
        let single = rt.heap.list_value(vec![Value::Int(1)]);
        assert_eq!(next_(&mut rt, &[single]).unwrap(), Value::Nil);
    }

    #[test]
    fn test_rest_of_empty_is_empty_list() {
        let mut rt = rt();
        let e = rt.heap.list_value(vec![]);
        let r = rest(&mut rt, &[e]).unwrap();
        assert_eq!(colls::count_value(&mut rt, r).unwrap(), 0);
        assert!(!r.is_nil());
    }

    #[test]
    fn test_zipmap_pairs() {
        let mut rt = rt();
        let ks = rt.heap.vector_value(vec![Value::Int(1), Value::Int(2)]);
        let vs = rt.heap.vector_value(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        let m = zipmap(&mut rt, &[ks, vs]).unwrap();
        assert_eq!(colls::count_value(&mut rt, m).unwrap(), 2);
        assert_eq!(colls::map_get(&mut rt, m, Value::Int(2)).unwrap(), Some(Value::Int(20)));
    }

    #[test]
    fn test_into_vector_from_list() {
        let mut rt = rt();
        let v = rt.heap.vector_value(vec![Value::Int(1)]);
        let l = rt.heap.list_value(vec![Value::Int(2), Value::Int(3)]);
        let out = into(&mut rt, &[v, l]).unwrap();
        assert_eq!(rt.heap.try_vector(out).map(<[Value]>::len), Some(3));
    }

    #[test]
    fn test_get_in_path() {
        let mut rt = rt();
        let inner_k = Value::Keyword(clove_core::intern::intern_name("b"));
        let inner = rt.heap.map_value(vec![(inner_k, Value::Int(5))]);
        let outer_k = Value::Keyword(clove_core::intern::intern_name("a"));
        let outer = rt.heap.map_value(vec![(outer_k, inner)]);
        let path = rt.heap.vector_value(vec![outer_k, inner_k]);
        assert_eq!(get_in(&mut rt, &[outer, path]).unwrap(), Value::Int(5));
    }
}
