//! Regex built-ins backing the `#"..."` reader literal.
//!
//! Patterns are held by source and compiled on use; the engine is the
//! `regex` crate. A match with capture groups yields a vector
//! `[whole g1 g2 ...]` with nil for unmatched groups, matching the
//! mainstream contract.

use clove_core::value::tag_of;
use clove_core::{ErrKind, Obj, RegexObj, Value};
use regex::Regex;

use crate::error::{EvalResult, Thrown, arity_error, raise};
use crate::rt::Rt;

/// Validate a pattern; used by the analyzer when folding `#"..."` literals.
pub fn compile_pattern(source: &str) -> Result<Regex, String> {
    Regex::new(source).map_err(|e| e.to_string())
}

fn pattern_of(rt: &mut Rt, v: Value) -> Result<Regex, Thrown> {
    let source = match v.as_obj() {
        Some(r) => match rt.heap.get(r) {
            Obj::Regex(re) => re.source.to_string(),
            _ => {
                return Err({
                let msg = format!("expected a regex, got {}", tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            });
            }
        },
        None => {
            return Err({
                let msg = format!("expected a regex, got {}", tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            });
        }
    };
    match compile_pattern(&source) {
        Ok(re) => Ok(re),
        Err(e) => Err(raise(
            &mut rt.heap,
            ErrKind::IllegalArgument,
            format!("invalid regex: {}", e),
        )),
    }
}

fn str_arg(rt: &mut Rt, name: &str, v: Value) -> Result<String, Thrown> {
    match rt.heap.try_str(v) {
        Some(s) => Ok(s.to_string()),
        None => Err({
                let msg = format!("{} expects a string, got {}", name, tag_of(&rt.heap, v).name());
                raise(&mut rt.heap, ErrKind::Type, msg)
            }),
    }
}

pub fn re_pattern(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 1 {
        return Err(arity_error(&mut rt.heap, "re-pattern", args.len()));
    }
    let source = str_arg(rt, "re-pattern", args[0])?;
    if let Err(e) = compile_pattern(&source) {
        return Err(raise(
            &mut rt.heap,
            ErrKind::IllegalArgument,
            format!("invalid regex: {}", e),
        ));
    }
    Ok(Value::Obj(rt.heap.alloc(Obj::Regex(RegexObj {
        source: source.into_boxed_str(),
    }))))
}

fn captures_value(rt: &mut Rt, re: &Regex, caps: regex::Captures<'_>) -> Value {
    if re.captures_len() == 1 {
        let whole = caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
        return rt.heap.string_value(whole);
    }
    let mut items = Vec::with_capacity(re.captures_len());
    for i in 0..re.captures_len() {
        match caps.get(i) {
            Some(m) => {
                let s = m.as_str().to_string();
                items.push(rt.heap.string_value(s));
            }
            None => items.push(Value::Nil),
        }
    }
    rt.heap.vector_value(items)
}

pub fn re_matches(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "re-matches", args.len()));
    }
    let re = pattern_of(rt, args[0])?;
    let text = str_arg(rt, "re-matches", args[1])?;
    match re.captures(&text) {
        Some(caps) => {
            // Full-string match only.
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or("");
            if whole != text {
                return Ok(Value::Nil);
            }
            Ok(captures_value(rt, &re, caps))
        }
        None => Ok(Value::Nil),
    }
}

pub fn re_find(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "re-find", args.len()));
    }
    let re = pattern_of(rt, args[0])?;
    let text = str_arg(rt, "re-find", args[1])?;
    match re.captures(&text) {
        Some(caps) => Ok(captures_value(rt, &re, caps)),
        None => Ok(Value::Nil),
    }
}

pub fn re_seq(rt: &mut Rt, args: &[Value]) -> EvalResult {
    if args.len() != 2 {
        return Err(arity_error(&mut rt.heap, "re-seq", args.len()));
    }
    let re = pattern_of(rt, args[0])?;
    let text = str_arg(rt, "re-seq", args[1])?;
    let all: Vec<regex::Captures<'_>> = re.captures_iter(&text).collect();
    let mut items = Vec::with_capacity(all.len());
    for caps in all {
        items.push(captures_value(rt, &re, caps));
    }
    Ok(rt.heap.list_value(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::Limits;

    fn rt() -> Rt {
        Rt::new(Limits::default())
    }

    fn pattern(rt: &mut Rt, src: &str) -> Value {
        let s = rt.heap.str_value(src);
        re_pattern(rt, &[s]).unwrap()
    }

    #[test]
    fn test_re_matches_full_only() {
        let mut rt = rt();
        let p = pattern(&mut rt, r"\d+");
        let full = rt.heap.str_value("123");
        let partial = rt.heap.str_value("a123");
        let hit = re_matches(&mut rt, &[p, full]).unwrap();
        assert_eq!(rt.heap.try_str(hit), Some("123"));
        assert_eq!(re_matches(&mut rt, &[p, partial]).unwrap(), Value::Nil);
    }

    #[test]
    fn test_re_find_with_groups() {
        let mut rt = rt();
        let p = pattern(&mut rt, r"(\w+)=(\d+)");
        let s = rt.heap.str_value("x=42;");
        let found = re_find(&mut rt, &[p, s]).unwrap();
        let items = rt.heap.try_vector(found).unwrap().to_vec();
        assert_eq!(items.len(), 3);
        assert_eq!(rt.heap.try_str(items[1]), Some("x"));
        assert_eq!(rt.heap.try_str(items[2]), Some("42"));
    }

    #[test]
    fn test_invalid_pattern_raises() {
        let mut rt = rt();
        let s = rt.heap.str_value("(unclosed");
        let err = re_pattern(&mut rt, &[s]).unwrap_err();
        assert_eq!(err.kind(&rt.heap), ErrKind::IllegalArgument);
    }
}
