//! The sequence library.
//!
//! Producers build unforced generator cells; consumers walk through
//! `seq_next`. `reduce` routes through the fused-pipeline engine in
//! `crate::seq`. The first-class SeqOp nodes from the analyzer dispatch
//! into the same functions, so both backends and higher-order use of these
//! names behave identically.

use clove_core::value::tag_of;
use clove_core::{ErrKind, LazyGen, Value};
use std::cmp::Ordering;

use crate::colls;
use crate::eq::compare_values;
use crate::error::{EvalResult, Thrown, arity_error, raise};
use crate::invoke::invoke;
use crate::node::SeqOpKind;
use crate::rt::Rt;
use crate::seq;

/// Entry point for SeqOp nodes (both backends).
pub fn dispatch_seq_op(rt: &mut Rt, op: SeqOpKind, args: &[Value]) -> EvalResult {
    match op {
        SeqOpKind::Reduce => reduce(rt, args),
        SeqOpKind::Map => map(rt, args),
        SeqOpKind::Filter => filter(rt, args),
        SeqOpKind::TakeWhile => take_while(rt, args),
        SeqOpKind::DropWhile => drop_while(rt, args),
        SeqOpKind::MapIndexed => map_indexed(rt, args),
        SeqOpKind::SortBy => sort_by(rt, args),
        SeqOpKind::GroupBy => group_by(rt, args),
    }
}

fn int_arg(rt: &mut Rt, name: &str, v: Value) -> Result<i64, Thrown> {
    match v.as_int() {
        Some(n) => Ok(n),
        None => Err({
                let msg = format!("{} expects an integer, got {}", name, tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

pub fn range(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let (next, end, step) = match args.len() {
        0 => (0, None, 1),
        1 => (0, Some(int_arg(rt, "range", args[0])?), 1),
        2 => (
            int_arg(rt, "range", args[0])?,
            Some(int_arg(rt, "range", args[1])?),
            1,
        ),
        3 => (
            int_arg(rt, "range", args[0])?,
            Some(int_arg(rt, "range", args[1])?),
            int_arg(rt, "range", args[2])?,
        ),
        n => return Err(arity_error(&mut rt.heap, "range", n)),
    };
    Ok(rt.heap.lazy_value(LazyGen::Range { next, end, step }))
}

pub fn repeat(rt: &mut Rt, args: &[Value]) -> EvalResult {
    match args.len() {
        1 => Ok(rt.heap.lazy_value(LazyGen::Repeat {
            remaining: None,
            x: args[0],
        })),
        2 => {
            let n = int_arg(rt, "repeat", args[0])?;
            Ok(rt.heap.lazy_value(LazyGen::Repeat {
                remaining: Some(n),
                x: args[1],
            }))
        }
        n => Err(arity_error(&mut rt.heap, "repeat", n)),
    }
}

pub fn iterate(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "iterate", args.len()));
    }
    Ok(rt.heap.lazy_value(LazyGen::Iterate {
        f: args[0],
        next: args[1],
    }))
}

pub fn cycle(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "cycle", args.len()));
    }
    Ok(rt.heap.lazy_value(LazyGen::Cycle {
        src: args[0],
        pos: args[0],
    }))
}

pub fn concat(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let seqs = rt.heap.list_value(args.to_vec());
    Ok(rt.heap.lazy_value(LazyGen::Concat {
        cur: Value::Nil,
        rest: seqs,
    }))
}

pub fn take(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "take", args.len()));
    }
    let n = int_arg(rt, "take", args[0])?;
    Ok(rt.heap.lazy_value(LazyGen::Take { n, src: args[1] }))
}

pub fn drop(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "drop", args.len()));
    }
    let n = int_arg(rt, "drop", args[0])?;
    Ok(rt.heap.lazy_value(LazyGen::Drop { n, src: args[1] }))
}

pub fn take_while(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "take-while", args.len()));
    }
    Ok(rt.heap.lazy_value(LazyGen::TakeWhile {
        pred: args[0],
        src: args[1],
    }))
}

pub fn drop_while(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "drop-while", args.len()));
    }
    Ok(rt.heap.lazy_value(LazyGen::DropWhile {
        pred: args[0],
        src: args[1],
    }))
}

pub fn map(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() < 2 {
        return Err(arity_error(&mut rt.heap, "map", args.len()));
    }
    Ok(rt.heap.lazy_value(LazyGen::Map {
        f: args[0],
        srcs: args[1..].to_vec(),
    }))
}

pub fn map_indexed(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "map-indexed", args.len()));
    }
    Ok(rt.heap.lazy_value(LazyGen::MapIndexed {
        f: args[0],
        idx: 0,
        src: args[1],
    }))
}

pub fn filter(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "filter", args.len()));
    }
    Ok(rt.heap.lazy_value(LazyGen::Filter {
        pred: args[0],
        src: args[1],
        keep: true,
    }))
}

pub fn remove(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "remove", args.len()));
    }
    Ok(rt.heap.lazy_value(LazyGen::Filter {
        pred: args[0],
        src: args[1],
        keep: false,
    }))
}

pub fn keep(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "keep", args.len()));
    }
    Ok(rt.heap.lazy_value(LazyGen::Keep {
        f: args[0],
        src: args[1],
    }))
}

pub fn keep_indexed(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "keep-indexed", args.len()));
    }
    Ok(rt.heap.lazy_value(LazyGen::KeepIndexed {
        f: args[0],
        idx: 0,
        src: args[1],
    }))
}

pub fn mapcat(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() < 2 {
        return Err(arity_error(&mut rt.heap, "mapcat", args.len()));
    }
    let mapped = map(rt, args)?;
    Ok(rt.heap.lazy_value(LazyGen::Concat {
        cur: Value::Nil,
        rest: mapped,
    }))
}

pub fn interleave(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.is_empty() {
        return Ok(rt.heap.list_value(vec![]));
    }
    Ok(rt.heap.lazy_value(LazyGen::Interleave {
        srcs: args.to_vec(),
    }))
}

pub fn interpose(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "interpose", args.len()));
    }
    Ok(rt.heap.lazy_value(LazyGen::Interpose {
        sep: args[0],
        src: args[1],
        pending_sep: false,
    }))
}

pub fn partition(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let (n, step, src) = match args.len() {
        2 => (int_arg(rt, "partition", args[0])?, None, args[1]),
        3 => (
            int_arg(rt, "partition", args[0])?,
            Some(int_arg(rt, "partition", args[1])?),
            args[2],
        ),
        len => return Err(arity_error(&mut rt.heap, "partition", len)),
    };
    Ok(rt.heap.lazy_value(LazyGen::Partition {
        n,
        step: step.unwrap_or(n),
        src,
        all: false,
    }))
}

pub fn partition_all(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let (n, step, src) = match args.len() {
        2 => (int_arg(rt, "partition-all", args[0])?, None, args[1]),
        3 => (
            int_arg(rt, "partition-all", args[0])?,
            Some(int_arg(rt, "partition-all", args[1])?),
            args[2],
        ),
        len => return Err(arity_error(&mut rt.heap, "partition-all", len)),
    };
    Ok(rt.heap.lazy_value(LazyGen::Partition {
        n,
        step: step.unwrap_or(n),
        src,
        all: true,
    }))
}

pub fn distinct(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "distinct", args.len()));
    }
    Ok(rt.heap.lazy_value(LazyGen::Distinct {
        src: args[0],
        seen: Vec::new(),
    }))
}

pub fn reduce(rt: &mut Rt, args: &[Value]) -> EvalResult {
    match args.len() {
        2 => seq::reduce_seq(rt, args[0], None, args[1]),
        3 => seq::reduce_seq(rt, args[0], Some(args[1]), args[2]),
        n => Err(arity_error(&mut rt.heap, "reduce", n)),
    }
}

/// Comparator adapter: user comparators may return an int or a boolean.
fn cmp_result(rt: &mut Rt, f: Value, a: Value, b: Value) -> Result<Ordering, Thrown> {
    let r = invoke(rt, f, &[a, b])?;
    match r {
        Value::Int(n) => Ok(n.cmp(&0)),
        Value::Bool(true) => Ok(Ordering::Less),
        Value::Bool(false) => {
            // Flip to decide between equal and greater.
            let r2 = invoke(rt, f, &[b, a])?;
            if r2.is_truthy() {
                Ok(Ordering::Greater)
            } else {
                Ok(Ordering::Equal)
            }
        }
        other => Err({
                let msg = format!( "comparator must return an integer or boolean, got {}", tag_of(&rt.heap, other).name() );
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

fn sort_items(
    rt: &mut Rt,
    mut items: Vec<Value>,
    cmp: Option<Value>,
) -> Result<Vec<Value>, Thrown> {
    // Insertion sort: stable, and comparisons may run user code or throw.
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 {
            let ord = match cmp {
                Some(f) => cmp_result(rt, f, items[j], items[j - 1])?,
                None => compare_values(rt, items[j], items[j - 1])?,
            };
            if ord == Ordering::Less {
                items.swap(j, j - 1);
                j -= 1;
            } else {
                break;
            }
        }
    }
    Ok(items)
}

pub fn sort(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let (cmp, coll) = match args.len() {
        1 => (None, args[0]),
        2 => (Some(args[0]), args[1]),
        n => return Err(arity_error(&mut rt.heap, "sort", n)),
    };
    let mark = rt.temp_mark();
    let items = seq::seq_to_vec(rt, coll)?;
    let result = sort_items(rt, items, cmp).map(|sorted| rt.heap.list_value(sorted));
    rt.truncate_temps(mark);
    result
}

pub fn sort_by(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let (keyfn, cmp, coll) = match args.len() {
        2 => (args[0], None, args[1]),
        3 => (args[0], Some(args[1]), args[2]),
        n => return Err(arity_error(&mut rt.heap, "sort-by", n)),
    };
    let mark = rt.temp_mark();
    let result = (|| -> EvalResult {
        let items = seq::seq_to_vec(rt, coll)?;
        let mut keyed: Vec<(Value, Value)> = Vec::with_capacity(items.len());
        for item in items {
            let k = invoke(rt, keyfn, &[item])?;
            rt.push_temp(k);
            keyed.push((k, item));
        }
        // Insertion sort on the keys, carrying the items.
        for i in 1..keyed.len() {
            let mut j = i;
            while j > 0 {
                let ord = match cmp {
                    Some(f) => cmp_result(rt, f, keyed[j].0, keyed[j - 1].0)?,
                    None => compare_values(rt, keyed[j].0, keyed[j - 1].0)?,
                };
                if ord == Ordering::Less {
                    keyed.swap(j, j - 1);
                    j -= 1;
                } else {
                    break;
                }
            }
        }
        let sorted: Vec<Value> = keyed.into_iter().map(|(_, v)| v).collect();
        Ok(rt.heap.list_value(sorted))
    })();
    rt.truncate_temps(mark);
    result
}

pub fn group_by(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "group-by", args.len()));
    }
    let (f, coll) = (args[0], args[1]);
    let mark = rt.temp_mark();
    let result = (|| -> EvalResult {
        let items = seq::seq_to_vec(rt, coll)?;
        let acc_idx = rt.temp_mark();
        rt.push_temp(Value::Nil);
        let mut acc = rt.heap.map_value(vec![]);
        rt.set_temp(acc_idx, acc);
        for item in items {
            let k = invoke(rt, f, &[item])?;
            rt.push_temp(k);
            let bucket = match colls::map_get(rt, acc, k)? {
                Some(b) => b,
                None => rt.heap.vector_value(vec![]),
            };
            rt.push_temp(bucket);
            let bucket = colls::conj_value(rt, bucket, item)?;
            rt.push_temp(bucket);
            acc = colls::map_assoc(rt, acc, k, bucket)?;
            rt.set_temp(acc_idx, acc);
        }
        Ok(acc)
    })();
    rt.truncate_temps(mark);
    result
}

pub fn frequencies(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "frequencies", args.len()));
    }
    let mark = rt.temp_mark();
    let result = (|| -> EvalResult {
        let items = seq::seq_to_vec(rt, args[0])?;
        let acc_idx = rt.temp_mark();
        rt.push_temp(Value::Nil);
        let mut acc = rt.heap.map_value(vec![]);
        rt.set_temp(acc_idx, acc);
        for item in items {
            let n = match colls::map_get(rt, acc, item)? {
                Some(Value::Int(n)) => n,
                _ => 0,
            };
            acc = colls::map_assoc(rt, acc, item, Value::Int(n + 1))?;
            rt.set_temp(acc_idx, acc);
        }
        Ok(acc)
    })();
    rt.truncate_temps(mark);
    result
}

pub fn doall(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "doall", args.len()));
    }
    let mark = rt.temp_mark();
    seq::seq_to_vec(rt, args[0])?;
    rt.truncate_temps(mark);
    Ok(args[0])
}

pub fn dorun(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "dorun", args.len()));
    }
    let mark = rt.temp_mark();
    seq::seq_to_vec(rt, args[0])?;
    rt.truncate_temps(mark);
    Ok(Value::Nil)
}

pub fn run_bang(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "run!", args.len()));
    }
    let (proc, coll) = (args[0], args[1]);
    let mut cur = coll;
    let mark = rt.temp_mark();
    let cur_idx = rt.temp_mark();
    rt.push_temp(cur);
    let result = (|| -> EvalResult {
        while let Some((head, tail)) = seq::seq_next(rt, cur)? {
            rt.set_temp(cur_idx, tail);
            invoke(rt, proc, &[head])?;
            cur = tail;
        }
        Ok(Value::Nil)
    })();
    rt.truncate_temps(mark);
    result
}

fn walk_pred(
    rt: &mut Rt,
    name: &str,
    args: &[Value],
    short_circuit_on: bool,
) -> Result<Option<Value>, Thrown> {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, name, args.len()));
    }
    let (pred, coll) = (args[0], args[1]);
    let mut cur = coll;
    let mark = rt.temp_mark();
    let cur_idx = rt.temp_mark();
    rt.push_temp(cur);
    let result = (|| -> Result<Option<Value>, Thrown> {
        while let Some((head, tail)) = seq::seq_next(rt, cur)? {
            rt.set_temp(cur_idx, tail);
            let r = invoke(rt, pred, &[head])?;
            if r.is_truthy() == short_circuit_on {
                return Ok(Some(r));
            }
            cur = tail;
        }
        Ok(None)
    })();
    rt.truncate_temps(mark);
    result
}

pub fn every_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    Ok(Value::Bool(walk_pred(rt, "every?", args, false)?.is_none()))
}

pub fn not_every_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    Ok(Value::Bool(walk_pred(rt, "not-every?", args, false)?.is_some()))
}

pub fn some(rt: &mut Rt, args: &[Value]) -> EvalResult {
    Ok(walk_pred(rt, "some", args, true)?.unwrap_or(Value::Nil))
}

pub fn not_any_p(rt: &mut Rt, args: &[Value]) -> EvalResult {
    Ok(Value::Bool(walk_pred(rt, "not-any?", args, true)?.is_none()))
}

pub fn mapv(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let lazy = map(rt, args)?;
    let mark = rt.temp_mark();
    rt.push_temp(lazy);
    let items = seq::seq_to_vec(rt, lazy)?;
    let result = rt.heap.vector_value(items);
    rt.truncate_temps(mark);
    Ok(result)
}

pub fn filterv(rt: &mut Rt, args: &[Value]) -> EvalResult {
    let lazy = filter(rt, args)?;
    let mark = rt.temp_mark();
    rt.push_temp(lazy);
    let items = seq::seq_to_vec(rt, lazy)?;
    let result = rt.heap.vector_value(items);
    rt.truncate_temps(mark);
    Ok(result)
}

pub fn apply(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() < 2 {
        return Err(arity_error(&mut rt.heap, "apply", args.len()));
    }
    let f = args[0];
    let fixed = &args[1..args.len() - 1];
    let tail = args[args.len() - 1];
    let mark = rt.temp_mark();
    let spread = seq::seq_to_vec(rt, tail)?;
    let mut full = fixed.to_vec();
    full.extend_from_slice(&spread);
    let result = invoke(rt, f, &full);
    rt.truncate_temps(mark);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::Limits;

    fn rt() -> Rt {
        Rt::new(Limits::default())
    }

    fn ints(rt: &mut Rt, xs: &[i64]) -> Value {
        let items: Vec<Value> = xs.iter().map(|&n| Value::Int(n)).collect();
        rt.heap.vector_value(items)
    }

    #[test]
    fn test_range_materializes() {
        let mut rt = rt();
        let r = range(&mut rt, &[Value::Int(1), Value::Int(4)]).unwrap();
        let mark = rt.temp_mark();
        let items = seq::seq_to_vec(&mut rt, r).unwrap();
        rt.truncate_temps(mark);
        assert_eq!(items, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_sort_default_ordering() {
        let mut rt = rt();
        let coll = ints(&mut rt, &[3, 1, 2]);
        let sorted = sort(&mut rt, &[coll]).unwrap();
        let mark = rt.temp_mark();
        let items = seq::seq_to_vec(&mut rt, sorted).unwrap();
        rt.truncate_temps(mark);
        assert_eq!(items, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_frequencies_counts() {
        let mut rt = rt();
        let coll = ints(&mut rt, &[1, 2, 1, 1]);
        let m = frequencies(&mut rt, &[coll]).unwrap();
        assert_eq!(
            colls::map_get(&mut rt, m, Value::Int(1)).unwrap(),
            Some(Value::Int(3))
        );
        assert_eq!(
            colls::map_get(&mut rt, m, Value::Int(2)).unwrap(),
            Some(Value::Int(1))
        );
    }

    #[test]
    fn test_concat_empty_is_empty() {
        let mut rt = rt();
        let c = concat(&mut rt, &[]).unwrap();
        assert!(seq::seq_next(&mut rt, c).unwrap().is_none());
    }
}
