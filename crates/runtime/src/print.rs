//! The printer.
//!
//! `pr_str` produces a readable form: re-reading it yields an `=` value,
//! with the intentional exceptions of functions, atoms, and other opaque
//! handles, which print as `#<fn ...>` style forms. `display_str` is the
//! `str` view: strings unquoted, characters bare, nil empty.
//!
//! Printing realizes lazy sequences, so it threads the runtime and can
//! throw.

use clove_core::{intern, Obj, Value};

use crate::error::Thrown;
use crate::rt::Rt;
use crate::seq;

pub fn pr_str(rt: &mut Rt, v: Value) -> Result<String, Thrown> {
    let mut out = String::new();
    write_value(rt, v, true, &mut out)?;
    Ok(out)
}

pub fn display_str(rt: &mut Rt, v: Value) -> Result<String, Thrown> {
    let mut out = String::new();
    write_value(rt, v, false, &mut out)?;
    Ok(out)
}

fn write_value(rt: &mut Rt, v: Value, readable: bool, out: &mut String) -> Result<(), Thrown> {
    match v {
        Value::Nil => {
            if readable {
                out.push_str("nil");
            }
        }
        Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(f) => out.push_str(&format_float(f)),
        Value::Char(c) => {
            if readable {
                out.push_str(&format_char(c));
            } else {
                out.push(c);
            }
        }
        Value::Sym(id) => out.push_str(intern::full_name(id)),
        Value::Keyword(id) => {
            out.push(':');
            out.push_str(intern::full_name(id));
        }
        Value::Var(id) => {
            out.push_str("#'");
            out.push_str(intern::full_name(rt.env.var(id).name));
        }
        Value::Obj(r) => {
            enum Shape {
                Str(String),
                Seq(&'static str, &'static str, Value),
                Map(Value),
                Atom(Value),
                Opaque(String),
            }
            let shape = match rt.heap.get(r) {
                Obj::Str(s) => Shape::Str(s.to_string()),
                Obj::List(_) | Obj::Lazy(_) => Shape::Seq("(", ")", v),
                Obj::Vector(_) => Shape::Seq("[", "]", v),
                Obj::Set(_) => Shape::Seq("#{", "}", v),
                Obj::Map(_) => Shape::Map(v),
                Obj::Closure(c) => Shape::Opaque(match c.name {
                    Some(n) => format!("#<fn {}>", intern::full_name(n)),
                    None => "#<fn>".to_string(),
                }),
                Obj::Builtin(b) => {
                    Shape::Opaque(format!("#<builtin {}>", intern::full_name(b.name)))
                }
                Obj::Partial(_) => Shape::Opaque("#<fn partial>".to_string()),
                Obj::Comp(_) => Shape::Opaque("#<fn comp>".to_string()),
                Obj::MultiFn(m) => {
                    Shape::Opaque(format!("#<multifn {}>", intern::full_name(m.name)))
                }
                Obj::Protocol(p) => {
                    Shape::Opaque(format!("#<protocol {}>", intern::full_name(p.name)))
                }
                Obj::ProtocolFn(p) => {
                    Shape::Opaque(format!("#<protocol-fn {}>", intern::full_name(p.method)))
                }
                Obj::Atom(a) => Shape::Atom(a.value),
                Obj::Regex(re) => Shape::Opaque(format!("#\"{}\"", re.source)),
                Obj::Error(e) => Shape::Opaque(format!(
                    "#error {{:kind :{} :message {:?}}}",
                    e.kind.as_str(),
                    &*e.message
                )),
            };
            match shape {
                Shape::Str(s) => {
                    if readable {
                        out.push_str(&escape_string(&s));
                    } else {
                        out.push_str(&s);
                    }
                }
                Shape::Seq(open, close, coll) => {
                    out.push_str(open);
                    let mark = rt.temp_mark();
                    let items = seq::seq_to_vec(rt, coll)?;
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            out.push(' ');
                        }
                        write_value(rt, *item, readable, out)?;
                    }
                    rt.truncate_temps(mark);
                    out.push_str(close);
                }
                Shape::Map(m) => {
                    let entries = match rt.heap.try_map(m) {
                        Some(md) => md.entries.clone(),
                        None => Vec::new(),
                    };
                    out.push('{');
                    for (i, (k, val)) in entries.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        write_value(rt, *k, readable, out)?;
                        out.push(' ');
                        write_value(rt, *val, readable, out)?;
                    }
                    out.push('}');
                }
                Shape::Atom(held) => {
                    out.push_str("#<atom ");
                    write_value(rt, held, readable, out)?;
                    out.push('>');
                }
                Shape::Opaque(s) => out.push_str(&s),
            }
        }
    }
    Ok(())
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "##NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "##Inf".to_string()
        } else {
            "##-Inf".to_string()
        }
    } else {
        // {:?} keeps the trailing .0 on integral floats.
        format!("{:?}", f)
    }
}

fn format_char(c: char) -> String {
    match c {
        '\n' => r"\newline".to_string(),
        ' ' => r"\space".to_string(),
        '\t' => r"\tab".to_string(),
        '\r' => r"\return".to_string(),
        '\u{8}' => r"\backspace".to_string(),
        '\u{c}' => r"\formfeed".to_string(),
        other => format!("\\{}", other),
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::Limits;
    use clove_core::LazyGen;

    fn rt() -> Rt {
        Rt::new(Limits::default())
    }

    #[test]
    fn test_scalars() {
        let mut rt = rt();
        assert_eq!(pr_str(&mut rt, Value::Nil).unwrap(), "nil");
        assert_eq!(pr_str(&mut rt, Value::Int(42)).unwrap(), "42");
        assert_eq!(pr_str(&mut rt, Value::Float(1.0)).unwrap(), "1.0");
        assert_eq!(pr_str(&mut rt, Value::Float(f64::INFINITY)).unwrap(), "##Inf");
        assert_eq!(pr_str(&mut rt, Value::Char('a')).unwrap(), "\\a");
        assert_eq!(pr_str(&mut rt, Value::Char('\n')).unwrap(), "\\newline");
    }

    #[test]
    fn test_string_readable_vs_display() {
        let mut rt = rt();
        let s = rt.heap.str_value("a\"b");
        assert_eq!(pr_str(&mut rt, s).unwrap(), "\"a\\\"b\"");
        assert_eq!(display_str(&mut rt, s).unwrap(), "a\"b");
    }

    #[test]
    fn test_collections_round_trip_shape() {
        let mut rt = rt();
        let v = rt.heap.vector_value(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(pr_str(&mut rt, v).unwrap(), "[1 2]");
        let l = rt.heap.list_value(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(pr_str(&mut rt, l).unwrap(), "(1 2)");
        let k = Value::Keyword(clove_core::intern::intern_name("a"));
        let m = rt.heap.map_value(vec![(k, Value::Int(1))]);
        assert_eq!(pr_str(&mut rt, m).unwrap(), "{:a 1}");
    }

    #[test]
    fn test_lazy_seq_prints_realized() {
        let mut rt = rt();
        let r = rt.heap.lazy_value(LazyGen::Range {
            next: 0,
            end: Some(3),
            step: 1,
        });
        assert_eq!(pr_str(&mut rt, r).unwrap(), "(0 1 2)");
    }

    #[test]
    fn test_nil_displays_empty() {
        let mut rt = rt();
        assert_eq!(display_str(&mut rt, Value::Nil).unwrap(), "");
        let kw = Value::Keyword(clove_core::intern::intern_name("k"));
        assert_eq!(display_str(&mut rt, kw).unwrap(), ":k");
    }
}
