//! Structural equality, hashing, and ordering.
//!
//! `=` is structural: integers and floats compare numerically, sequential
//! collections (lists, vectors, seqs) compare element-wise with each other,
//! maps and sets compare as unordered entry collections, everything else
//! needs matching tags. Hashing is compatible: `a = b` implies
//! `hash(a) = hash(b)` — in particular an integral float hashes as its
//! integer value.
//!
//! Comparing may force lazy sequences, so everything here threads the
//! runtime and can throw.

use clove_core::value::{Tag, tag_of};
use clove_core::{ErrKind, Obj, Value};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{EvalResult, Thrown, raise};
use crate::rt::Rt;
use crate::seq;

/// Is the value a sequential collection for `=` purposes?
fn is_sequential(rt: &Rt, v: Value) -> bool {
    matches!(
        tag_of(&rt.heap, v),
        Tag::List | Tag::Vector | Tag::LazySeq
    )
}

pub fn value_eq(rt: &mut Rt, a: Value, b: Value) -> Result<bool, Thrown> {
    // Identity fast path; covers interned symbols/keywords and identical
    // handles.
    if a == b {
        return Ok(true);
    }
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
            Ok((x as f64) == y)
        }
        _ => {
            let (ta, tb) = (tag_of(&rt.heap, a), tag_of(&rt.heap, b));
            if is_sequential(rt, a) && is_sequential(rt, b) {
                return seq_eq(rt, a, b);
            }
            if ta != tb {
                return Ok(false);
            }
            match ta {
                Tag::String => Ok(rt.heap.try_str(a) == rt.heap.try_str(b)),
                Tag::Map => map_eq(rt, a, b),
                Tag::Set => set_eq(rt, a, b),
                Tag::Regex => {
                    let sa = regex_source(rt, a);
                    let sb = regex_source(rt, b);
                    Ok(sa == sb)
                }
                // Functions, atoms, multimethods, protocols, errors: identity
                // only, and identity already failed above.
                _ => Ok(false),
            }
        }
    }
}

fn regex_source(rt: &Rt, v: Value) -> Option<String> {
    match v.as_obj().map(|r| rt.heap.get(r)) {
        Some(Obj::Regex(re)) => Some(re.source.to_string()),
        _ => None,
    }
}

fn seq_eq(rt: &mut Rt, a: Value, b: Value) -> Result<bool, Thrown> {
    let mut xa = a;
    let mut xb = b;
    loop {
        let na = seq::seq_next(rt, xa)?;
        let nb = seq::seq_next(rt, xb)?;
        match (na, nb) {
            (None, None) => return Ok(true),
            (None, _) | (_, None) => return Ok(false),
            (Some((ha, ta)), Some((hb, tb))) => {
                if !value_eq(rt, ha, hb)? {
                    return Ok(false);
                }
                xa = ta;
                xb = tb;
            }
        }
    }
}

fn map_eq(rt: &mut Rt, a: Value, b: Value) -> Result<bool, Thrown> {
    let (len_a, len_b) = match (rt.heap.try_map(a), rt.heap.try_map(b)) {
        (Some(ma), Some(mb)) => (ma.entries.len(), mb.entries.len()),
        _ => return Ok(false),
    };
    if len_a != len_b {
        return Ok(false);
    }
    // Entries are copied out so lookups may rebuild the index freely.
    let entries: Vec<(Value, Value)> = match rt.heap.try_map(a) {
        Some(m) => m.entries.clone(),
        None => return Ok(false),
    };
    for (k, v) in entries {
        match crate::colls::map_get(rt, b, k)? {
            Some(other) => {
                if !value_eq(rt, v, other)? {
                    return Ok(false);
                }
            }
            None => return Ok(false),
        }
    }
    Ok(true)
}

fn set_eq(rt: &mut Rt, a: Value, b: Value) -> Result<bool, Thrown> {
    let (len_a, len_b) = match (rt.heap.try_set(a), rt.heap.try_set(b)) {
        (Some(sa), Some(sb)) => (sa.entries.len(), sb.entries.len()),
        _ => return Ok(false),
    };
    if len_a != len_b {
        return Ok(false);
    }
    let entries: Vec<Value> = match rt.heap.try_set(a) {
        Some(s) => s.entries.clone(),
        None => return Ok(false),
    };
    for v in entries {
        if !crate::colls::set_contains(rt, b, v)? {
            return Ok(false);
        }
    }
    Ok(true)
}

// Hashing.

const NIL_HASH: u64 = 0x5f3f_92c3_66bb_11d7;

fn hash_one<T: Hash>(salt: u8, x: T) -> u64 {
    let mut h = DefaultHasher::new();
    salt.hash(&mut h);
    x.hash(&mut h);
    h.finish()
}

pub fn value_hash(rt: &mut Rt, v: Value) -> Result<u64, Thrown> {
    match v {
        Value::Nil => Ok(NIL_HASH),
        Value::Bool(b) => Ok(hash_one(1, b)),
        Value::Int(n) => Ok(hash_one(2, n)),
        Value::Float(f) => {
            // Equality-compatible: 1.0 hashes like 1.
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Ok(hash_one(2, f as i64))
            } else {
                Ok(hash_one(3, f.to_bits()))
            }
        }
        Value::Char(c) => Ok(hash_one(4, c)),
        Value::Sym(id) => Ok(hash_one(5, clove_core::intern::full_name(id))),
        Value::Keyword(id) => Ok(hash_one(6, clove_core::intern::full_name(id))),
        Value::Var(id) => Ok(hash_one(7, id.0)),
        Value::Obj(r) => match rt.heap.get(r) {
            Obj::Str(s) => Ok(hash_one(8, &**s)),
            Obj::List(_) | Obj::Vector(_) | Obj::Lazy(_) => hash_seq(rt, v),
            Obj::Map(_) => hash_map_value(rt, v),
            Obj::Set(_) => hash_set_value(rt, v),
            Obj::Regex(re) => Ok(hash_one(9, &*re.source)),
            // Identity-compared values hash by identity.
            Obj::Closure(_)
            | Obj::Builtin(_)
            | Obj::Partial(_)
            | Obj::Comp(_)
            | Obj::MultiFn(_)
            | Obj::Protocol(_)
            | Obj::ProtocolFn(_)
            | Obj::Atom(_)
            | Obj::Error(_) => Ok(hash_one(10, r.0)),
        },
    }
}

fn hash_seq(rt: &mut Rt, v: Value) -> Result<u64, Thrown> {
    // Ordered combination shared by lists, vectors, and seqs so that
    // `(= [1 2] '(1 2))` implies equal hashes.
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    let mut cur = v;
    while let Some((head, tail)) = seq::seq_next(rt, cur)? {
        let eh = value_hash(rt, head)?;
        h = h.rotate_left(5) ^ eh;
        h = h.wrapping_mul(0x1000_0000_01b3);
        cur = tail;
    }
    Ok(h)
}

fn hash_map_value(rt: &mut Rt, v: Value) -> Result<u64, Thrown> {
    let entries: Vec<(Value, Value)> = match rt.heap.try_map(v) {
        Some(m) => m.entries.clone(),
        None => return Ok(NIL_HASH),
    };
    // Unordered: xor of entry hashes.
    let mut h: u64 = 0x9747_b28c_a2b3_61e5;
    for (k, val) in entries {
        let kh = value_hash(rt, k)?;
        let vh = value_hash(rt, val)?;
        h ^= kh.wrapping_add(vh.rotate_left(17));
    }
    Ok(h)
}

fn hash_set_value(rt: &mut Rt, v: Value) -> Result<u64, Thrown> {
    let entries: Vec<Value> = match rt.heap.try_set(v) {
        Some(s) => s.entries.clone(),
        None => return Ok(NIL_HASH),
    };
    let mut h: u64 = 0x7fb5_d329_728e_a185;
    for e in entries {
        h ^= value_hash(rt, e)?;
    }
    Ok(h)
}

// Ordering for sort/compare.

pub fn compare_values(rt: &mut Rt, a: Value, b: Value) -> Result<Ordering, Thrown> {
    match (a, b) {
        (Value::Nil, Value::Nil) => Ok(Ordering::Equal),
        (Value::Nil, _) => Ok(Ordering::Less),
        (_, Value::Nil) => Ok(Ordering::Greater),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(&y)),
        (Value::Char(x), Value::Char(y)) => Ok(x.cmp(&y)),
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(&y)),
        _ => {
            if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
                return Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal));
            }
            if let (Value::Sym(x), Value::Sym(y)) = (a, b) {
                return Ok(clove_core::intern::full_name(x).cmp(clove_core::intern::full_name(y)));
            }
            if let (Value::Keyword(x), Value::Keyword(y)) = (a, b) {
                return Ok(clove_core::intern::full_name(x).cmp(clove_core::intern::full_name(y)));
            }
            if let (Some(x), Some(y)) = (rt.heap.try_str(a), rt.heap.try_str(b)) {
                return Ok(x.cmp(y));
            }
            let (ta, tb) = (tag_of(&rt.heap, a), tag_of(&rt.heap, b));
            if ta == Tag::Vector && tb == Tag::Vector {
                return compare_vectors(rt, a, b);
            }
            Err(raise(
                &mut rt.heap,
                ErrKind::Type,
                format!("cannot compare {} with {}", ta.name(), tb.name()),
            ))
        }
    }
}

fn compare_vectors(rt: &mut Rt, a: Value, b: Value) -> Result<Ordering, Thrown> {
    let xa: Vec<Value> = rt.heap.try_vector(a).map(<[Value]>::to_vec).unwrap_or_default();
    let xb: Vec<Value> = rt.heap.try_vector(b).map(<[Value]>::to_vec).unwrap_or_default();
    for (x, y) in xa.iter().zip(xb.iter()) {
        match compare_values(rt, *x, *y)? {
            Ordering::Equal => continue,
            other => return Ok(other),
        }
    }
    Ok(xa.len().cmp(&xb.len()))
}

/// `==`: numeric equality only; non-numbers throw.
pub fn num_eq(rt: &mut Rt, a: Value, b: Value) -> EvalResult {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => Ok(Value::Bool(x == y)),
        _ => Err({
                let msg = format!( "== expects numbers, got {} and {}", tag_of(&rt.heap, a).name(), tag_of(&rt.heap, b).name() );
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
    fn test_numeric_cross_tag_equality() {
        let mut rt = rt();
        assert!(value_eq(&mut rt, Value::Int(1), Value::Float(1.0)).unwrap());
        assert!(!value_eq(&mut rt, Value::Int(1), Value::Float(1.5)).unwrap());
    }

    #[test]
    fn test_hash_compatible_across_numeric_tags() {
        let mut rt = rt();
        let hi = value_hash(&mut rt, Value::Int(7)).unwrap();
        let hf = value_hash(&mut rt, Value::Float(7.0)).unwrap();
        assert_eq!(hi, hf);
    }

    #[test]
    fn test_vector_equals_list() {
        let mut rt = rt();
        let v = rt.heap.vector_value(vec![Value::Int(1), Value::Int(2)]);
        let l = rt.heap.list_value(vec![Value::Int(1), Value::Int(2)]);
        assert!(value_eq(&mut rt, v, l).unwrap());
        let hv = value_hash(&mut rt, v).unwrap();
        let hl = value_hash(&mut rt, l).unwrap();
        assert_eq!(hv, hl);
    }

    #[test]
    fn test_string_equality_is_structural() {
        let mut rt = rt();
        let a = rt.heap.str_value("abc");
        let b = rt.heap.str_value("abc");
        assert_ne!(a, b); // distinct handles
        assert!(value_eq(&mut rt, a, b).unwrap());
    }

    #[test]
    fn test_map_equality_unordered() {
        let mut rt = rt();
        let k1 = Value::Keyword(clove_core::intern::intern_name("a"));
        let k2 = Value::Keyword(clove_core::intern::intern_name("b"));
        let m1 = rt.heap.map_value(vec![(k1, Value::Int(1)), (k2, Value::Int(2))]);
        let m2 = rt.heap.map_value(vec![(k2, Value::Int(2)), (k1, Value::Int(1))]);
        assert!(value_eq(&mut rt, m1, m2).unwrap());
        let h1 = value_hash(&mut rt, m1).unwrap();
        let h2 = value_hash(&mut rt, m2).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_compare_orders_mixed_numbers() {
        let mut rt = rt();
        assert_eq!(
            compare_values(&mut rt, Value::Int(1), Value::Float(1.5)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&mut rt, Value::Nil, Value::Int(0)).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_compare_incompatible_throws() {
        let mut rt = rt();
        let s = rt.heap.str_value("x");
        let err = compare_values(&mut rt, s, Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(&rt.heap), ErrKind::Type);
    }
}
