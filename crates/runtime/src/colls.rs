//! Persistent collection operations.
//!
//! Every update copies: `assoc`, `conj`, `dissoc`, `disj` build a fresh
//! entry vector and drop the hash index; the index is rebuilt lazily on the
//! first keyed lookup of the new value. Holders of the old value keep
//! seeing the old contents.

use clove_core::value::{Tag, tag_of};
use clove_core::{ErrKind, MapData, Obj, ObjRef, SetData, Value};
use std::collections::HashMap;

use crate::error::{EvalResult, Thrown, raise};
use crate::eq::{value_eq, value_hash};
use crate::rt::Rt;
use crate::seq;

/// Maps at or below this size are scanned linearly; no index is built.
const SMALL_SCAN: usize = 8;

fn map_ref(rt: &Rt, m: Value) -> Option<ObjRef> {
    match m.as_obj() {
        Some(r) => match rt.heap.get(r) {
            Obj::Map(_) => Some(r),
            _ => None,
        },
        None => None,
    }
}

fn set_ref(rt: &Rt, s: Value) -> Option<ObjRef> {
    match s.as_obj() {
        Some(r) => match rt.heap.get(r) {
            Obj::Set(_) => Some(r),
            _ => None,
        },
        None => None,
    }
}

fn build_map_index(rt: &mut Rt, mr: ObjRef) -> Result<(), Thrown> {
    let keys: Vec<Value> = match rt.heap.get(mr) {
        Obj::Map(md) => {
            if md.index.is_some() {
                return Ok(());
            }
            md.entries.iter().map(|(k, _)| *k).collect()
        }
        _ => return Ok(()),
    };
    let mut index: HashMap<u64, Vec<u32>> = HashMap::with_capacity(keys.len());
    for (i, k) in keys.into_iter().enumerate() {
        let h = value_hash(rt, k)?;
        index.entry(h).or_default().push(i as u32);
    }
    if let Obj::Map(md) = rt.heap.get_mut(mr) {
        md.index = Some(index);
    }
    Ok(())
}

fn build_set_index(rt: &mut Rt, sr: ObjRef) -> Result<(), Thrown> {
    let entries: Vec<Value> = match rt.heap.get(sr) {
        Obj::Set(sd) => {
            if sd.index.is_some() {
                return Ok(());
            }
            sd.entries.clone()
        }
        _ => return Ok(()),
    };
    let mut index: HashMap<u64, Vec<u32>> = HashMap::with_capacity(entries.len());
    for (i, e) in entries.into_iter().enumerate() {
        let h = value_hash(rt, e)?;
        index.entry(h).or_default().push(i as u32);
    }
    if let Obj::Set(sd) = rt.heap.get_mut(sr) {
        sd.index = Some(index);
    }
    Ok(())
}

/// Index of the entry whose key is `=` to `k`, or None.
fn map_find(rt: &mut Rt, mr: ObjRef, k: Value) -> Result<Option<usize>, Thrown> {
    let len = match rt.heap.get(mr) {
        Obj::Map(md) => md.entries.len(),
        _ => return Ok(None),
    };
    if len <= SMALL_SCAN {
        for i in 0..len {
            let ek = match rt.heap.get(mr) {
                Obj::Map(md) => md.entries[i].0,
                _ => return Ok(None),
            };
            if value_eq(rt, ek, k)? {
                return Ok(Some(i));
            }
        }
        return Ok(None);
    }
    build_map_index(rt, mr)?;
    let h = value_hash(rt, k)?;
    let candidates: Vec<u32> = match rt.heap.get(mr) {
        Obj::Map(md) => md
            .index
            .as_ref()
            .and_then(|ix| ix.get(&h).cloned())
            .unwrap_or_default(),
        _ => return Ok(None),
    };
    for i in candidates {
        let ek = match rt.heap.get(mr) {
            Obj::Map(md) => md.entries[i as usize].0,
            _ => return Ok(None),
        };
        if value_eq(rt, ek, k)? {
            return Ok(Some(i as usize));
        }
    }
    Ok(None)
}

pub fn map_get(rt: &mut Rt, m: Value, k: Value) -> Result<Option<Value>, Thrown> {
    let mr = match map_ref(rt, m) {
        Some(r) => r,
        None => return Ok(None),
    };
    match map_find(rt, mr, k)? {
        Some(i) => match rt.heap.get(mr) {
            Obj::Map(md) => Ok(Some(md.entries[i].1)),
            _ => Ok(None),
        },
        None => Ok(None),
    }
}

pub fn map_contains(rt: &mut Rt, m: Value, k: Value) -> Result<bool, Thrown> {
    let mr = match map_ref(rt, m) {
        Some(r) => r,
        None => return Ok(false),
    };
    Ok(map_find(rt, mr, k)?.is_some())
}

pub fn map_assoc(rt: &mut Rt, m: Value, k: Value, v: Value) -> EvalResult {
    let mr = match map_ref(rt, m) {
        Some(r) => r,
        None => {
            return Err({
                let msg = format!("assoc expects a map or vector, got {}", tag_of(&rt.heap, m).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            });
        }
    };
    let found = map_find(rt, mr, k)?;
    let mut entries = match rt.heap.get(mr) {
        Obj::Map(md) => md.entries.clone(),
        _ => Vec::new(),
    };
    match found {
        Some(i) => entries[i] = (k, v),
        None => entries.push((k, v)),
    }
    Ok(rt.heap.map_value(entries))
}

pub fn map_dissoc(rt: &mut Rt, m: Value, k: Value) -> EvalResult {
    let mr = match map_ref(rt, m) {
        Some(r) => r,
        None => return Ok(m),
    };
    match map_find(rt, mr, k)? {
        Some(i) => {
            let mut entries = match rt.heap.get(mr) {
                Obj::Map(md) => md.entries.clone(),
                _ => Vec::new(),
            };
            entries.remove(i);
            Ok(rt.heap.map_value(entries))
        }
        None => Ok(m),
    }
}

fn set_find(rt: &mut Rt, sr: ObjRef, v: Value) -> Result<Option<usize>, Thrown> {
    let len = match rt.heap.get(sr) {
        Obj::Set(sd) => sd.entries.len(),
        _ => return Ok(None),
    };
    if len <= SMALL_SCAN {
        for i in 0..len {
            let e = match rt.heap.get(sr) {
                Obj::Set(sd) => sd.entries[i],
                _ => return Ok(None),
            };
            if value_eq(rt, e, v)? {
                return Ok(Some(i));
            }
        }
        return Ok(None);
    }
    build_set_index(rt, sr)?;
    let h = value_hash(rt, v)?;
    let candidates: Vec<u32> = match rt.heap.get(sr) {
        Obj::Set(sd) => sd
            .index
            .as_ref()
            .and_then(|ix| ix.get(&h).cloned())
            .unwrap_or_default(),
        _ => return Ok(None),
    };
    for i in candidates {
        let e = match rt.heap.get(sr) {
            Obj::Set(sd) => sd.entries[i as usize],
            _ => return Ok(None),
        };
        if value_eq(rt, e, v)? {
            return Ok(Some(i as usize));
        }
    }
    Ok(None)
}

pub fn set_contains(rt: &mut Rt, s: Value, v: Value) -> Result<bool, Thrown> {
    let sr = match set_ref(rt, s) {
        Some(r) => r,
        None => return Ok(false),
    };
    Ok(set_find(rt, sr, v)?.is_some())
}

pub fn set_conj(rt: &mut Rt, s: Value, v: Value) -> EvalResult {
    let sr = match set_ref(rt, s) {
        Some(r) => r,
        None => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::Type,
                "conj expects a set".to_string(),
            ));
        }
    };
    if set_find(rt, sr, v)?.is_some() {
        return Ok(s);
    }
    let mut entries = match rt.heap.get(sr) {
        Obj::Set(sd) => sd.entries.clone(),
        _ => Vec::new(),
    };
    entries.push(v);
    Ok(rt.heap.set_value(entries))
}

pub fn set_disj(rt: &mut Rt, s: Value, v: Value) -> EvalResult {
    let sr = match set_ref(rt, s) {
        Some(r) => r,
        None => return Ok(s),
    };
    match set_find(rt, sr, v)? {
        Some(i) => {
            let mut entries = match rt.heap.get(sr) {
                Obj::Set(sd) => sd.entries.clone(),
                _ => Vec::new(),
            };
            entries.remove(i);
            Ok(rt.heap.set_value(entries))
        }
        None => Ok(s),
    }
}

/// Deduplicating constructor for set literals and `set`/`hash-set`.
pub fn set_from(rt: &mut Rt, items: &[Value]) -> EvalResult {
    let mut entries: Vec<Value> = Vec::with_capacity(items.len());
    for &item in items {
        let mut dup = false;
        for &have in &entries {
            if value_eq(rt, have, item)? {
                dup = true;
                break;
            }
        }
        if !dup {
            entries.push(item);
        }
    }
    Ok(rt.heap.set_value(entries))
}

/// Entry-pair constructor for map literals and `hash-map`; later keys win.
pub fn map_from_pairs(rt: &mut Rt, pairs: &[Value]) -> EvalResult {
    if pairs.len() % 2 != 0 {
        return Err(raise(
            &mut rt.heap,
            ErrKind::IllegalArgument,
            "hash-map expects an even number of forms".to_string(),
        ));
    }
    let mut entries: Vec<(Value, Value)> = Vec::with_capacity(pairs.len() / 2);
    for chunk in pairs.chunks(2) {
        let (k, v) = (chunk[0], chunk[1]);
        let mut replaced = false;
        for entry in entries.iter_mut() {
            if value_eq_pair(rt, entry.0, k)? {
                *entry = (k, v);
                replaced = true;
                break;
            }
        }
        if !replaced {
            entries.push((k, v));
        }
    }
    Ok(rt.heap.map_value(entries))
}

fn value_eq_pair(rt: &mut Rt, a: Value, b: Value) -> Result<bool, Thrown> {
    value_eq(rt, a, b)
}

/// `get` over maps, sets, vectors, and strings; nil otherwise.
pub fn get_value(rt: &mut Rt, coll: Value, k: Value, not_found: Value) -> EvalResult {
    match tag_of(&rt.heap, coll) {
        Tag::Map => Ok(map_get(rt, coll, k)?.unwrap_or(not_found)),
        Tag::Set => {
            if set_contains(rt, coll, k)? {
                Ok(k)
            } else {
                Ok(not_found)
            }
        }
        Tag::Vector => {
            if let (Some(items), Some(i)) = (rt.heap.try_vector(coll), k.as_int()) {
                if i >= 0 && (i as usize) < items.len() {
                    return Ok(items[i as usize]);
                }
            }
            Ok(not_found)
        }
        Tag::String => {
            if let (Some(s), Some(i)) = (rt.heap.try_str(coll), k.as_int()) {
                if i >= 0 {
                    if let Some(c) = s.chars().nth(i as usize) {
                        return Ok(Value::Char(c));
                    }
                }
            }
            Ok(not_found)
        }
        _ => Ok(not_found),
    }
}

/// `conj`: list prepends, vector appends, set adds, map merges an entry.
pub fn conj_value(rt: &mut Rt, coll: Value, v: Value) -> EvalResult {
    match tag_of(&rt.heap, coll) {
        Tag::Nil => Ok(rt.heap.list_value(vec![v])),
        Tag::List => {
            let mut items = vec![v];
            if let Some(existing) = rt.heap.try_slice(coll) {
                items.extend_from_slice(existing);
            }
            Ok(rt.heap.list_value(items))
        }
        Tag::Vector => {
            let mut items: Vec<Value> =
                rt.heap.try_vector(coll).map(<[Value]>::to_vec).unwrap_or_default();
            items.push(v);
            Ok(rt.heap.vector_value(items))
        }
        Tag::Set => set_conj(rt, coll, v),
        Tag::Map => {
            if let Some(pair) = rt.heap.try_vector(v) {
                if pair.len() == 2 {
                    let (k, val) = (pair[0], pair[1]);
                    return map_assoc(rt, coll, k, val);
                }
            }
            if let Some(m2) = rt.heap.try_map(v) {
                let extra = m2.entries.clone();
                let mut acc = coll;
                let mark = rt.temp_mark();
                rt.push_temp(acc);
                for (k, val) in extra {
                    acc = map_assoc(rt, acc, k, val)?;
                    rt.set_temp(mark, acc);
                }
                rt.truncate_temps(mark);
                return Ok(acc);
            }
            Err(raise(
                &mut rt.heap,
                ErrKind::Type,
                "conj on a map expects a [k v] entry or a map".to_string(),
            ))
        }
        Tag::LazySeq => {
            // conj on a seq prepends, like a list.
            Ok(rt.heap.cons_value(v, coll))
        }
        other => Err(raise(
            &mut rt.heap,
            ErrKind::Type,
            format!("conj not supported on {}", other.name()),
        )),
    }
}

/// `assoc` over maps and vectors (index within bounds or one past the end).
pub fn assoc_value(rt: &mut Rt, coll: Value, k: Value, v: Value) -> EvalResult {
    match tag_of(&rt.heap, coll) {
        Tag::Nil => {
            let entries = vec![(k, v)];
            Ok(rt.heap.map_value(entries))
        }
        Tag::Map => map_assoc(rt, coll, k, v),
        Tag::Vector => {
            let items: Vec<Value> =
                rt.heap.try_vector(coll).map(<[Value]>::to_vec).unwrap_or_default();
            let i = match k.as_int() {
                Some(i) if i >= 0 && (i as usize) <= items.len() => i as usize,
                _ => {
                    return Err(raise(
                        &mut rt.heap,
                        ErrKind::IndexOutOfBounds,
                        "assoc index out of bounds for vector".to_string(),
                    ));
                }
            };
            let mut items = items;
            if i == items.len() {
                items.push(v);
            } else {
                items[i] = v;
            }
            Ok(rt.heap.vector_value(items))
        }
        other => Err(raise(
            &mut rt.heap,
            ErrKind::Type,
            format!("assoc not supported on {}", other.name()),
        )),
    }
}

/// `count`: O(1) for realized collections, walks lazy seqs.
pub fn count_value(rt: &mut Rt, v: Value) -> Result<i64, Thrown> {
    match v {
        Value::Nil => Ok(0),
        Value::Obj(r) => match rt.heap.get(r) {
            Obj::Str(s) => Ok(s.chars().count() as i64),
            Obj::List(items) | Obj::Vector(items) => Ok(items.len() as i64),
            Obj::Map(m) => Ok(m.entries.len() as i64),
            Obj::Set(s) => Ok(s.entries.len() as i64),
            Obj::Lazy(_) => {
                let mut n = 0i64;
                let mut cur = v;
                while let Some((_, tail)) = seq::seq_next(rt, cur)? {
                    n += 1;
                    cur = tail;
                }
                Ok(n)
            }
            _ => Err({
                let msg = format!("count not supported on {}", tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
        },
        _ => Err({
                let msg = format!("count not supported on {}", tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

/// `nth` with optional default; throws IndexOutOfBounds without one.
pub fn nth_value(rt: &mut Rt, coll: Value, n: i64, default: Option<Value>) -> EvalResult {
    let miss = |rt: &mut Rt| match default {
        Some(d) => Ok(d),
        None => Err(raise(
            &mut rt.heap,
            ErrKind::IndexOutOfBounds,
            format!("nth: index {} out of bounds", n),
        )),
    };
    if n < 0 {
        return miss(rt);
    }
    match tag_of(&rt.heap, coll) {
        Tag::Vector | Tag::List => {
            let items = rt.heap.try_slice(coll).map(<[Value]>::to_vec).unwrap_or_default();
            match items.get(n as usize) {
                Some(v) => Ok(*v),
                None => miss(rt),
            }
        }
        Tag::String => {
            let c = rt
                .heap
                .try_str(coll)
                .and_then(|s| s.chars().nth(n as usize));
            match c {
                Some(c) => Ok(Value::Char(c)),
                None => miss(rt),
            }
        }
        Tag::Nil => miss(rt),
        Tag::LazySeq => {
            let mut cur = coll;
            let mut i = n;
            loop {
                match seq::seq_next(rt, cur)? {
                    Some((head, tail)) => {
                        if i == 0 {
                            return Ok(head);
                        }
                        i -= 1;
                        cur = tail;
                    }
                    None => return miss(rt),
                }
            }
        }
        other => Err(raise(
            &mut rt.heap,
            ErrKind::Type,
            format!("nth not supported on {}", other.name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::Limits;
    use clove_core::intern;

    fn rt() -> Rt {
        Rt::new(Limits::default())
    }

    fn kw(name: &str) -> Value {
        Value::Keyword(intern::intern_name(name))
    }

    #[test]
    fn test_assoc_is_persistent() {
        let mut rt = rt();
        let m0 = rt.heap.map_value(vec![(kw("a"), Value::Int(1))]);
        let m1 = map_assoc(&mut rt, m0, kw("b"), Value::Int(2)).unwrap();
        assert_eq!(map_get(&mut rt, m0, kw("b")).unwrap(), None);
        assert_eq!(map_get(&mut rt, m1, kw("b")).unwrap(), Some(Value::Int(2)));
        assert_eq!(map_get(&mut rt, m1, kw("a")).unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn test_assoc_replaces_existing_key() {
        let mut rt = rt();
        let m0 = rt.heap.map_value(vec![(kw("a"), Value::Int(1))]);
        let m1 = map_assoc(&mut rt, m0, kw("a"), Value::Int(9)).unwrap();
        assert_eq!(map_get(&mut rt, m1, kw("a")).unwrap(), Some(Value::Int(9)));
        assert_eq!(count_value(&mut rt, m1).unwrap(), 1);
    }

    #[test]
    fn test_large_map_uses_index() {
        let mut rt = rt();
        let entries: Vec<(Value, Value)> =
            (0..64).map(|i| (Value::Int(i), Value::Int(i * 10))).collect();
        let m = rt.heap.map_value(entries);
        assert_eq!(map_get(&mut rt, m, Value::Int(33)).unwrap(), Some(Value::Int(330)));
        // Numeric-compatible lookup through the index.
        assert_eq!(
            map_get(&mut rt, m, Value::Float(33.0)).unwrap(),
            Some(Value::Int(330))
        );
        assert_eq!(map_get(&mut rt, m, Value::Int(64)).unwrap(), None);
    }

    #[test]
    fn test_dissoc_and_disj() {
        let mut rt = rt();
        let m = rt.heap.map_value(vec![(kw("a"), Value::Int(1)), (kw("b"), Value::Int(2))]);
        let m2 = map_dissoc(&mut rt, m, kw("a")).unwrap();
        assert_eq!(count_value(&mut rt, m2).unwrap(), 1);
        assert_eq!(count_value(&mut rt, m).unwrap(), 2);

        let s = rt.heap.set_value(vec![Value::Int(1), Value::Int(2)]);
        let s2 = set_disj(&mut rt, s, Value::Int(1)).unwrap();
        assert!(!set_contains(&mut rt, s2, Value::Int(1)).unwrap());
        assert!(set_contains(&mut rt, s, Value::Int(1)).unwrap());
    }

    #[test]
    fn test_conj_shapes() {
        let mut rt = rt();
        let l = rt.heap.list_value(vec![Value::Int(2), Value::Int(3)]);
        let l2 = conj_value(&mut rt, l, Value::Int(1)).unwrap();
        assert_eq!(rt.heap.try_slice(l2).map(|s| s[0]), Some(Value::Int(1)));

        let v = rt.heap.vector_value(vec![Value::Int(1)]);
        let v2 = conj_value(&mut rt, v, Value::Int(2)).unwrap();
        assert_eq!(rt.heap.try_vector(v2).map(<[Value]>::len), Some(2));

        // conj on nil makes a list.
        let from_nil = conj_value(&mut rt, Value::Nil, Value::Int(5)).unwrap();
        assert_eq!(rt.heap.try_slice(from_nil).map(<[Value]>::len), Some(1));
    }

    #[test]
    fn test_vector_assoc_bounds() {
        let mut rt = rt();
        let v = rt.heap.vector_value(vec![Value::Int(0)]);
        // One past the end appends.
        let v2 = assoc_value(&mut rt, v, Value::Int(1), Value::Int(9)).unwrap();
        assert_eq!(rt.heap.try_vector(v2).map(<[Value]>::len), Some(2));
        let err = assoc_value(&mut rt, v, Value::Int(5), Value::Int(9)).unwrap_err();
        assert_eq!(err.kind(&rt.heap), clove_core::ErrKind::IndexOutOfBounds);
    }

    #[test]
    fn test_set_from_dedupes() {
        let mut rt = rt();
        let s = set_from(&mut rt, &[Value::Int(1), Value::Float(1.0), Value::Int(2)]).unwrap();
        assert_eq!(count_value(&mut rt, s).unwrap(), 2);
    }
}
