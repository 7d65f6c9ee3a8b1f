//! The sequence protocol.
//!
//! `seq_next` is the single way to walk anything seqable: lists, vectors,
//! maps (as [k v] pairs), sets, strings, lazy sequences, and nil. Forcing a
//! lazy cell is idempotent and memoized: the generator runs at most once
//! per cell, after which the cell holds its head and tail forever.
//!
//! `reduce_seq` carries the fused-pipeline engine: a reduce over an
//! unrealized chain of take/drop/map/filter stages on a known generator
//! runs as one loop with no intermediate cells, observationally identical
//! to the naive walk (left-to-right, one production per element, take over
//! infinite sources terminates).
//!
//! Rooting: stepping can invoke user functions, which crosses GC safe
//! points. Callers keep the sequence value rooted; everything reachable
//! from the head cell stays alive because forced cells link to their tails.
//! Fresh values that live only in Rust locals are parked on the temp-root
//! stack.

use clove_core::value::{Tag, tag_of};
use clove_core::{ErrKind, LazyGen, LazyState, Obj, ObjRef, Value};

use crate::error::{EvalResult, Thrown, raise};
use crate::invoke::invoke;
use crate::rt::Rt;

/// One step: `Some((first, rest))` or `None` for an exhausted sequence.
pub fn seq_next(rt: &mut Rt, v: Value) -> Result<Option<(Value, Value)>, Thrown> {
    match v {
        Value::Nil => Ok(None),
        Value::Obj(r) => step_obj(rt, r, v),
        other => Err({
                let msg = format!("not seqable: {}", tag_of(&rt.heap, other).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

fn step_obj(rt: &mut Rt, r: ObjRef, v: Value) -> Result<Option<(Value, Value)>, Thrown> {
    enum Plan {
        Empty,
        Slice(Value, Vec<Value>),
        MapEntries(Vec<(Value, Value)>),
        Chars(char, String),
        Lazy,
        NotSeqable,
    }
    let plan = match rt.heap.get(r) {
        Obj::List(items) | Obj::Vector(items) => {
            if items.is_empty() {
                Plan::Empty
            } else {
                Plan::Slice(items[0], items[1..].to_vec())
            }
        }
        Obj::Set(s) => {
            if s.entries.is_empty() {
                Plan::Empty
            } else {
                Plan::Slice(s.entries[0], s.entries[1..].to_vec())
            }
        }
        Obj::Map(m) => {
            if m.entries.is_empty() {
                Plan::Empty
            } else {
                Plan::MapEntries(m.entries.clone())
            }
        }
        Obj::Str(s) => {
            let mut chars = s.chars();
            match chars.next() {
                Some(c) => Plan::Chars(c, chars.collect()),
                None => Plan::Empty,
            }
        }
        Obj::Lazy(_) => Plan::Lazy,
        _ => Plan::NotSeqable,
    };
    match plan {
        Plan::Empty => Ok(None),
        Plan::Slice(head, rest) => {
            let tail = rt.heap.list_value(rest);
            Ok(Some((head, tail)))
        }
        Plan::MapEntries(entries) => {
            let mut pairs: Vec<Value> = Vec::with_capacity(entries.len());
            for (k, val) in entries {
                pairs.push(rt.heap.vector_value(vec![k, val]));
            }
            let head = pairs[0];
            let tail = rt.heap.list_value(pairs[1..].to_vec());
            Ok(Some((head, tail)))
        }
        Plan::Chars(c, rest) => {
            let tail = rt.heap.string_value(rest);
            Ok(Some((Value::Char(c), tail)))
        }
        Plan::Lazy => force(rt, r),
        Plan::NotSeqable => Err({
                let msg = format!("not seqable: {}", tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

pub fn is_seqable(rt: &Rt, v: Value) -> bool {
    matches!(
        tag_of(&rt.heap, v),
        Tag::Nil | Tag::List | Tag::Vector | Tag::Map | Tag::Set | Tag::String | Tag::LazySeq
    )
}

/// Force a lazy cell. Idempotent: subsequent calls return the cached head
/// and tail without re-running the generator.
pub fn force(rt: &mut Rt, r: ObjRef) -> Result<Option<(Value, Value)>, Thrown> {
    enum Cell {
        Done(Option<(Value, Value)>),
        Busy,
        Step(LazyGen),
        NotLazy,
    }
    let cell = match rt.heap.get_mut(r) {
        Obj::Lazy(l) => match &l.state {
            LazyState::Cons { head, tail } => Cell::Done(Some((*head, *tail))),
            LazyState::Empty => Cell::Done(None),
            LazyState::Unforced(g) => {
                if l.forcing {
                    Cell::Busy
                } else {
                    let g = g.clone();
                    l.forcing = true;
                    Cell::Step(g)
                }
            }
        },
        _ => Cell::NotLazy,
    };
    let generator = match cell {
        Cell::Done(result) => return Ok(result),
        Cell::Busy => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::IllegalState,
                "re-entrant lazy-seq realization".to_string(),
            ));
        }
        Cell::NotLazy => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::IllegalState,
                "force on a non-lazy value".to_string(),
            ));
        }
        Cell::Step(g) => g,
    };

    // The cell still holds the generator, so its captured values stay
    // rooted while stepping runs user code.
    let stepped = step_gen(rt, generator);
    match stepped {
        Ok(result) => {
            let state = match result {
                Some((head, tail)) => LazyState::Cons { head, tail },
                None => LazyState::Empty,
            };
            if let Obj::Lazy(l) = rt.heap.get_mut(r) {
                l.state = state;
                l.forcing = false;
            }
            Ok(result)
        }
        Err(t) => {
            if let Obj::Lazy(l) = rt.heap.get_mut(r) {
                l.forcing = false;
            }
            Err(t)
        }
    }
}

fn truthy_call(rt: &mut Rt, f: Value, args: &[Value]) -> Result<bool, Thrown> {
    Ok(invoke(rt, f, args)?.is_truthy())
}

/// Run one generator step, producing the realized head and the tail value.
fn step_gen(rt: &mut Rt, generator: LazyGen) -> Result<Option<(Value, Value)>, Thrown> {
    match generator {
        LazyGen::Range { next, end, step } => {
            let done = match end {
                Some(end) => {
                    if step >= 0 {
                        next >= end
                    } else {
                        next <= end
                    }
                }
                None => false,
            };
            if done || (step == 0 && end.is_some()) {
                return Ok(None);
            }
            let tail = rt.heap.lazy_value(LazyGen::Range {
                next: next.wrapping_add(step),
                end,
                step,
            });
            Ok(Some((Value::Int(next), tail)))
        }
        LazyGen::Iterate { f, next } => {
            let following = invoke(rt, f, &[next])?;
            let tail = rt.heap.lazy_value(LazyGen::Iterate { f, next: following });
            Ok(Some((next, tail)))
        }
        LazyGen::Repeat { remaining, x } => match remaining {
            Some(n) if n <= 0 => Ok(None),
            Some(n) => {
                let tail = rt.heap.lazy_value(LazyGen::Repeat {
                    remaining: Some(n - 1),
                    x,
                });
                Ok(Some((x, tail)))
            }
            None => {
                let tail = rt.heap.lazy_value(LazyGen::Repeat { remaining: None, x });
                Ok(Some((x, tail)))
            }
        },
        LazyGen::Cycle { src, pos } => {
            match seq_next(rt, pos)? {
                Some((head, tail)) => {
                    let next = rt.heap.lazy_value(LazyGen::Cycle { src, pos: tail });
                    Ok(Some((head, next)))
                }
                None => {
                    // Rewind; an empty source cycles to nothing.
                    match seq_next(rt, src)? {
                        Some((head, tail)) => {
                            let next = rt.heap.lazy_value(LazyGen::Cycle { src, pos: tail });
                            Ok(Some((head, next)))
                        }
                        None => Ok(None),
                    }
                }
            }
        }
        LazyGen::Take { n, src } => {
            if n <= 0 {
                return Ok(None);
            }
            match seq_next(rt, src)? {
                Some((head, tail)) => {
                    let next = rt.heap.lazy_value(LazyGen::Take { n: n - 1, src: tail });
                    Ok(Some((head, next)))
                }
                None => Ok(None),
            }
        }
        LazyGen::Drop { n, src } => {
            let mut cur = src;
            let mut left = n;
            while left > 0 {
                match seq_next(rt, cur)? {
                    Some((_, tail)) => {
                        cur = tail;
                        left -= 1;
                    }
                    None => return Ok(None),
                }
            }
            seq_next(rt, cur)
        }
        LazyGen::TakeWhile { pred, src } => match seq_next(rt, src)? {
            Some((head, tail)) => {
                if truthy_call(rt, pred, &[head])? {
                    let next = rt.heap.lazy_value(LazyGen::TakeWhile { pred, src: tail });
                    Ok(Some((head, next)))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        },
        LazyGen::DropWhile { pred, src } => {
            let mut cur = src;
            loop {
                match seq_next(rt, cur)? {
                    Some((head, tail)) => {
                        if truthy_call(rt, pred, &[head])? {
                            cur = tail;
                        } else {
                            return Ok(Some((head, tail)));
                        }
                    }
                    None => return Ok(None),
                }
            }
        }
        LazyGen::Map { f, srcs } => {
            let mut heads = Vec::with_capacity(srcs.len());
            let mut tails = Vec::with_capacity(srcs.len());
            for src in &srcs {
                match seq_next(rt, *src)? {
                    Some((h, t)) => {
                        heads.push(h);
                        tails.push(t);
                    }
                    None => return Ok(None),
                }
            }
            let head = invoke(rt, f, &heads)?;
            let tail = rt.heap.lazy_value(LazyGen::Map { f, srcs: tails });
            Ok(Some((head, tail)))
        }
        LazyGen::MapIndexed { f, idx, src } => match seq_next(rt, src)? {
            Some((h, t)) => {
                let head = invoke(rt, f, &[Value::Int(idx), h])?;
                let tail = rt.heap.lazy_value(LazyGen::MapIndexed {
                    f,
                    idx: idx + 1,
                    src: t,
                });
                Ok(Some((head, tail)))
            }
            None => Ok(None),
        },
        LazyGen::Filter { pred, src, keep } => {
            let mut cur = src;
            loop {
                match seq_next(rt, cur)? {
                    Some((head, tail)) => {
                        if truthy_call(rt, pred, &[head])? == keep {
                            let next = rt.heap.lazy_value(LazyGen::Filter {
                                pred,
                                src: tail,
                                keep,
                            });
                            return Ok(Some((head, next)));
                        }
                        cur = tail;
                    }
                    None => return Ok(None),
                }
            }
        }
        LazyGen::Keep { f, src } => {
            let mut cur = src;
            loop {
                match seq_next(rt, cur)? {
                    Some((head, tail)) => {
                        let mapped = invoke(rt, f, &[head])?;
                        if !mapped.is_nil() {
                            let next = rt.heap.lazy_value(LazyGen::Keep { f, src: tail });
                            return Ok(Some((mapped, next)));
                        }
                        cur = tail;
                    }
                    None => return Ok(None),
                }
            }
        }
        LazyGen::KeepIndexed { f, idx, src } => {
            let mut cur = src;
            let mut i = idx;
            loop {
                match seq_next(rt, cur)? {
                    Some((head, tail)) => {
                        let mapped = invoke(rt, f, &[Value::Int(i), head])?;
                        i += 1;
                        if !mapped.is_nil() {
                            let next = rt.heap.lazy_value(LazyGen::KeepIndexed {
                                f,
                                idx: i,
                                src: tail,
                            });
                            return Ok(Some((mapped, next)));
                        }
                        cur = tail;
                    }
                    None => return Ok(None),
                }
            }
        }
        LazyGen::Concat { cur, rest } => {
            let mut cur = cur;
            let mut rest = rest;
            loop {
                match seq_next(rt, cur)? {
                    Some((head, tail)) => {
                        let next = rt.heap.lazy_value(LazyGen::Concat { cur: tail, rest });
                        return Ok(Some((head, next)));
                    }
                    None => match seq_next(rt, rest)? {
                        Some((next_seq, more)) => {
                            cur = next_seq;
                            rest = more;
                        }
                        None => return Ok(None),
                    },
                }
            }
        }
        LazyGen::Interleave { srcs } => {
            if srcs.is_empty() {
                return Ok(None);
            }
            let mut heads = Vec::with_capacity(srcs.len());
            let mut tails = Vec::with_capacity(srcs.len());
            for src in &srcs {
                match seq_next(rt, *src)? {
                    Some((h, t)) => {
                        heads.push(h);
                        tails.push(t);
                    }
                    None => return Ok(None),
                }
            }
            // Emit this round as a cons chain ending in the next round.
            let mut tail = rt.heap.lazy_value(LazyGen::Interleave { srcs: tails });
            for &h in heads.iter().skip(1).rev() {
                tail = rt.heap.cons_value(h, tail);
            }
            Ok(Some((heads[0], tail)))
        }
        LazyGen::Interpose {
            sep,
            src,
            pending_sep,
        } => {
            if pending_sep {
                // Peek: no trailing separator after the last element.
                if seq_next(rt, src)?.is_none() {
                    return Ok(None);
                }
                let tail = rt.heap.lazy_value(LazyGen::Interpose {
                    sep,
                    src,
                    pending_sep: false,
                });
                return Ok(Some((sep, tail)));
            }
            match seq_next(rt, src)? {
                Some((head, tail)) => {
                    let next = rt.heap.lazy_value(LazyGen::Interpose {
                        sep,
                        src: tail,
                        pending_sep: true,
                    });
                    Ok(Some((head, next)))
                }
                None => Ok(None),
            }
        }
        LazyGen::Partition { n, step, src, all } => {
            if n <= 0 {
                return Ok(None);
            }
            let mut group = Vec::with_capacity(n as usize);
            let mut cur = src;
            while (group.len() as i64) < n {
                match seq_next(rt, cur)? {
                    Some((head, tail)) => {
                        group.push(head);
                        cur = tail;
                    }
                    None => break,
                }
            }
            if group.is_empty() || (!all && (group.len() as i64) < n) {
                return Ok(None);
            }
            // Advance the source by `step` from its start for the next group.
            let mut advanced = src;
            let mut left = step;
            while left > 0 {
                match seq_next(rt, advanced)? {
                    Some((_, tail)) => {
                        advanced = tail;
                        left -= 1;
                    }
                    None => {
                        advanced = Value::Nil;
                        break;
                    }
                }
            }
            let head = rt.heap.list_value(group);
            let tail = rt.heap.lazy_value(LazyGen::Partition {
                n,
                step,
                src: advanced,
                all,
            });
            Ok(Some((head, tail)))
        }
        LazyGen::Distinct { src, seen } => {
            let mut cur = src;
            let mut seen = seen;
            loop {
                match seq_next(rt, cur)? {
                    Some((head, tail)) => {
                        let mut dup = false;
                        for &s in &seen {
                            if crate::eq::value_eq(rt, s, head)? {
                                dup = true;
                                break;
                            }
                        }
                        if dup {
                            cur = tail;
                            continue;
                        }
                        seen.push(head);
                        let next = rt.heap.lazy_value(LazyGen::Distinct { src: tail, seen });
                        return Ok(Some((head, next)));
                    }
                    None => return Ok(None),
                }
            }
        }
        LazyGen::Thunk { f } => {
            let produced = invoke(rt, f, &[])?;
            let mark = rt.temp_mark();
            rt.push_temp(produced);
            let result = seq_next(rt, produced);
            rt.truncate_temps(mark);
            result
        }
    }
}

/// Materialize a sequence. The collected items are parked on the temp-root
/// stack; the caller truncates to its own mark when done with them.
pub fn seq_to_vec(rt: &mut Rt, v: Value) -> Result<Vec<Value>, Thrown> {
    // Realized collections copy straight out.
    if let Value::Obj(r) = v {
        enum Fast {
            Items(Vec<Value>),
            Pairs(Vec<(Value, Value)>),
            Chars(Vec<Value>),
            No,
        }
        let fast = match rt.heap.get(r) {
            Obj::List(items) | Obj::Vector(items) => Fast::Items(items.clone()),
            Obj::Set(s) => Fast::Items(s.entries.clone()),
            Obj::Map(m) => Fast::Pairs(m.entries.clone()),
            Obj::Str(s) => Fast::Chars(s.chars().map(Value::Char).collect()),
            _ => Fast::No,
        };
        match fast {
            Fast::Items(items) => {
                rt.temp_roots.extend_from_slice(&items);
                return Ok(items);
            }
            Fast::Pairs(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, val) in entries {
                    let pair = rt.heap.vector_value(vec![k, val]);
                    rt.push_temp(pair);
                    out.push(pair);
                }
                return Ok(out);
            }
            Fast::Chars(chars) => return Ok(chars),
            Fast::No => {}
        }
    }
    if v.is_nil() {
        return Ok(Vec::new());
    }
    let cur_idx = rt.temp_mark();
    rt.push_temp(v);
    let mut out = Vec::new();
    let mut cur = v;
    loop {
        match seq_next(rt, cur) {
            Ok(Some((head, tail))) => {
                out.push(head);
                rt.push_temp(head);
                rt.set_temp(cur_idx, tail);
                cur = tail;
            }
            Ok(None) => break,
            Err(t) => return Err(t),
        }
    }
    Ok(out)
}

// Fused pipelines.

enum FusedSource {
    Range { next: i64, end: Option<i64>, step: i64 },
    Items(Vec<Value>),
    Repeat { remaining: Option<i64>, x: Value },
    Iterate { f: Value, next: Value },
}

enum FusedStage {
    Map(Value),
    MapIndexed { f: Value, idx: i64 },
    Filter { pred: Value, keep: bool },
    Take(i64),
    Drop(i64),
    TakeWhile(Value),
    DropWhile { pred: Value, done: bool },
}

/// Recognize an unrealized single-source pipeline ending in a known
/// generator. Returns stages ordered source-side first.
fn decompose_pipeline(rt: &Rt, coll: Value) -> Option<(FusedSource, Vec<FusedStage>)> {
    let mut stages: Vec<FusedStage> = Vec::new();
    let mut cur = coll;
    loop {
        let r = match cur {
            Value::Obj(r) => r,
            _ => return None,
        };
        match rt.heap.get(r) {
            Obj::List(items) | Obj::Vector(items) => {
                stages.reverse();
                return Some((FusedSource::Items(items.clone()), stages));
            }
            Obj::Lazy(l) => {
                if l.forcing {
                    return None;
                }
                match &l.state {
                    LazyState::Unforced(generator) => match generator {
                        LazyGen::Range { next, end, step } => {
                            stages.reverse();
                            return Some((
                                FusedSource::Range {
                                    next: *next,
                                    end: *end,
                                    step: *step,
                                },
                                stages,
                            ));
                        }
                        LazyGen::Repeat { remaining, x } => {
                            stages.reverse();
                            return Some((
                                FusedSource::Repeat {
                                    remaining: *remaining,
                                    x: *x,
                                },
                                stages,
                            ));
                        }
                        LazyGen::Iterate { f, next } => {
                            stages.reverse();
                            return Some((FusedSource::Iterate { f: *f, next: *next }, stages));
                        }
                        LazyGen::Take { n, src } => {
                            stages.push(FusedStage::Take(*n));
                            cur = *src;
                        }
                        LazyGen::Drop { n, src } => {
                            stages.push(FusedStage::Drop(*n));
                            cur = *src;
                        }
                        LazyGen::TakeWhile { pred, src } => {
                            stages.push(FusedStage::TakeWhile(*pred));
                            cur = *src;
                        }
                        LazyGen::DropWhile { pred, src } => {
                            stages.push(FusedStage::DropWhile {
                                pred: *pred,
                                done: false,
                            });
                            cur = *src;
                        }
                        LazyGen::Map { f, srcs } if srcs.len() == 1 => {
                            stages.push(FusedStage::Map(*f));
                            cur = srcs[0];
                        }
                        LazyGen::MapIndexed { f, idx, src } => {
                            stages.push(FusedStage::MapIndexed { f: *f, idx: *idx });
                            cur = *src;
                        }
                        LazyGen::Filter { pred, src, keep } => {
                            stages.push(FusedStage::Filter {
                                pred: *pred,
                                keep: *keep,
                            });
                            cur = *src;
                        }
                        _ => return None,
                    },
                    // Partially realized chains fall back to the generic walk
                    // so memoized cells are observed, not recomputed.
                    _ => return None,
                }
            }
            _ => return None,
        }
    }
}

/// `reduce` over any seqable, fusing recognized pipelines.
pub fn reduce_seq(rt: &mut Rt, f: Value, init: Option<Value>, coll: Value) -> EvalResult {
    let mark = rt.temp_mark();
    rt.push_temp(f);
    rt.push_temp(coll);
    if let Some(v) = init {
        rt.push_temp(v);
    }
    let result = if let Some((source, stages)) = decompose_pipeline(rt, coll) {
        reduce_fused(rt, f, init, source, stages)
    } else {
        reduce_walk(rt, f, init, coll)
    };
    rt.truncate_temps(mark);
    result
}

fn reduce_fused(
    rt: &mut Rt,
    f: Value,
    init: Option<Value>,
    mut source: FusedSource,
    mut stages: Vec<FusedStage>,
) -> EvalResult {
    // Stage functions are reachable through the (rooted) pipeline chain;
    // the accumulator, the current element, and iterate's cursor are not,
    // so they get dedicated root slots.
    let acc_idx = rt.temp_mark();
    rt.push_temp(Value::Nil);
    let val_idx = rt.temp_mark();
    rt.push_temp(Value::Nil);
    let cursor_idx = rt.temp_mark();
    rt.push_temp(Value::Nil);
    if let FusedSource::Items(items) = &source {
        rt.temp_roots.extend_from_slice(items);
    }

    let mut acc = init;
    let mut item_pos = 0usize;
    'source: loop {
        // Produce the next source element. Iterate advances outside the
        // match so the source is not borrowed across the invoke.
        enum SourceStep {
            Done,
            Plain(Value),
            Advance { f: Value, x: Value },
        }
        let step_plan = match &mut source {
            FusedSource::Range { next, end, step } => {
                let done = match end {
                    Some(e) => {
                        if *step >= 0 {
                            *next >= *e
                        } else {
                            *next <= *e
                        }
                    }
                    None => false,
                };
                if done {
                    SourceStep::Done
                } else {
                    let x = Value::Int(*next);
                    *next = next.wrapping_add(*step);
                    SourceStep::Plain(x)
                }
            }
            FusedSource::Items(items) => {
                if item_pos >= items.len() {
                    SourceStep::Done
                } else {
                    let x = items[item_pos];
                    item_pos += 1;
                    SourceStep::Plain(x)
                }
            }
            FusedSource::Repeat { remaining, x } => match remaining {
                Some(n) if *n <= 0 => SourceStep::Done,
                Some(n) => {
                    *n -= 1;
                    SourceStep::Plain(*x)
                }
                None => SourceStep::Plain(*x),
            },
            FusedSource::Iterate { f, next } => SourceStep::Advance {
                f: *f,
                x: *next,
            },
        };
        let x = match step_plan {
            SourceStep::Done => break 'source,
            SourceStep::Plain(x) => x,
            SourceStep::Advance { f: it, x } => {
                rt.set_temp(cursor_idx, x);
                let following = invoke(rt, it, &[x])?;
                if let FusedSource::Iterate { next, .. } = &mut source {
                    *next = following;
                }
                rt.set_temp(cursor_idx, following);
                x
            }
        };

        // Thread the element through the stages, source-side first.
        let mut val = x;
        rt.set_temp(val_idx, val);
        for stage in stages.iter_mut() {
            match stage {
                FusedStage::Map(mf) => {
                    let mf = *mf;
                    val = invoke(rt, mf, &[val])?;
                    rt.set_temp(val_idx, val);
                }
                FusedStage::MapIndexed { f: mf, idx } => {
                    let args = [Value::Int(*idx), val];
                    *idx += 1;
                    let mf = *mf;
                    val = invoke(rt, mf, &args)?;
                    rt.set_temp(val_idx, val);
                }
                FusedStage::Filter { pred, keep } => {
                    let (pred, keep) = (*pred, *keep);
                    if truthy_call(rt, pred, &[val])? != keep {
                        continue 'source;
                    }
                }
                FusedStage::Take(n) => {
                    if *n <= 0 {
                        break 'source;
                    }
                    *n -= 1;
                }
                FusedStage::Drop(n) => {
                    if *n > 0 {
                        *n -= 1;
                        continue 'source;
                    }
                }
                FusedStage::TakeWhile(pred) => {
                    let pred = *pred;
                    if !truthy_call(rt, pred, &[val])? {
                        break 'source;
                    }
                }
                FusedStage::DropWhile { pred, done } => {
                    if !*done {
                        let pred = *pred;
                        if truthy_call(rt, pred, &[val])? {
                            continue 'source;
                        }
                        *done = true;
                    }
                }
            }
        }

        acc = Some(match acc {
            None => val,
            Some(a) => invoke(rt, f, &[a, val])?,
        });
        if let Some(a) = acc {
            rt.set_temp(acc_idx, a);
        }
    }
    match acc {
        Some(a) => Ok(a),
        None => invoke(rt, f, &[]),
    }
}

fn reduce_walk(rt: &mut Rt, f: Value, init: Option<Value>, coll: Value) -> EvalResult {
    let cur_idx = rt.temp_mark();
    rt.push_temp(coll);
    let acc_idx = rt.temp_mark();
    rt.push_temp(Value::Nil);
    let val_idx = rt.temp_mark();
    rt.push_temp(Value::Nil);

    let mut acc = init;
    let mut cur = coll;
    loop {
        match seq_next(rt, cur)? {
            Some((head, tail)) => {
                rt.set_temp(cur_idx, tail);
                rt.set_temp(val_idx, head);
                acc = Some(match acc {
                    None => head,
                    Some(a) => {
                        let r = invoke(rt, f, &[a, head])?;
                        rt.set_temp(acc_idx, r);
                        r
                    }
                });
                cur = tail;
            }
            None => break,
        }
    }
    match acc {
        Some(a) => Ok(a),
        None => invoke(rt, f, &[]),
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
    fn test_range_steps() {
        let mut rt = rt();
        let r = rt.heap.lazy_value(LazyGen::Range {
            next: 0,
            end: Some(3),
            step: 1,
        });
        let items = seq_to_vec(&mut rt, r).unwrap();
        assert_eq!(items, vec![Value::Int(0), Value::Int(1), Value::Int(2)]);
        rt.truncate_temps(0);
    }

    #[test]
    fn test_force_is_memoized() {
        let mut rt = rt();
        let r = rt.heap.lazy_value(LazyGen::Range {
            next: 5,
            end: Some(10),
            step: 1,
        });
        let obj = r.as_obj().unwrap();
        let first = force(&mut rt, obj).unwrap();
        let second = force(&mut rt, obj).unwrap();
        // Identical cached head and tail (same handle, not just equal).
        assert_eq!(first, second);
    }

    #[test]
    fn test_take_bounds_infinite_range() {
        let mut rt = rt();
        let inf = rt.heap.lazy_value(LazyGen::Range {
            next: 0,
            end: None,
            step: 1,
        });
        let take = rt.heap.lazy_value(LazyGen::Take { n: 4, src: inf });
        let items = seq_to_vec(&mut rt, take).unwrap();
        assert_eq!(items.len(), 4);
        rt.truncate_temps(0);
    }

    #[test]
    fn test_concat_walks_all_sources() {
        let mut rt = rt();
        let a = rt.heap.list_value(vec![Value::Int(1)]);
        let b = rt.heap.list_value(vec![Value::Int(2), Value::Int(3)]);
        let seqs = rt.heap.list_value(vec![b]);
        let cat = rt.heap.lazy_value(LazyGen::Concat { cur: a, rest: seqs });
        let items = seq_to_vec(&mut rt, cat).unwrap();
        assert_eq!(items, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        rt.truncate_temps(0);
    }

    #[test]
    fn test_seq_over_string() {
        let mut rt = rt();
        let s = rt.heap.str_value("ab");
        let (h, t) = seq_next(&mut rt, s).unwrap().unwrap();
        assert_eq!(h, Value::Char('a'));
        let (h2, t2) = seq_next(&mut rt, t).unwrap().unwrap();
        assert_eq!(h2, Value::Char('b'));
        assert!(seq_next(&mut rt, t2).unwrap().is_none());
    }

    #[test]
    fn test_partition_drops_partial_tail() {
        let mut rt = rt();
        let src = rt.heap.list_value(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Int(4),
            Value::Int(5),
        ]);
        let parts = rt.heap.lazy_value(LazyGen::Partition {
            n: 2,
            step: 2,
            src,
            all: false,
        });
        let groups = seq_to_vec(&mut rt, parts).unwrap();
        assert_eq!(groups.len(), 2);
        let first = rt.heap.try_slice(groups[0]).unwrap().to_vec();
        assert_eq!(first, vec![Value::Int(1), Value::Int(2)]);
        rt.truncate_temps(0);
    }

    #[test]
    fn test_interpose_no_trailing_separator() {
        let mut rt = rt();
        let src = rt.heap.list_value(vec![Value::Int(1), Value::Int(2)]);
        let sep = Value::Keyword(clove_core::intern::intern_name("sep"));
        let lazy = rt.heap.lazy_value(LazyGen::Interpose {
            sep,
            src,
            pending_sep: false,
        });
        let items = seq_to_vec(&mut rt, lazy).unwrap();
        assert_eq!(items, vec![Value::Int(1), sep, Value::Int(2)]);
        rt.truncate_temps(0);
    }
}
