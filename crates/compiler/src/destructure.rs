//! Destructuring lowering.
//!
//! Sequential `[a b & r :as all]` and associative
//! `{:keys [...] :strs [...] x :x :or {...} :as m}` patterns flatten into
//! plain binding pairs over `nth`, `drop`, and `get`. `let`, `loop`, and
//! `fn` parameters all route through here; a destructured parameter gets a
//! synthetic name and the generated chain wraps the body.

use clove_core::{Pos, intern};

use crate::analyzer::AnalyzerError;
use crate::form::{Form, FormKind};

fn err(pos: Pos, message: impl Into<String>) -> AnalyzerError {
    AnalyzerError {
        message: message.into(),
        pos,
    }
}

/// Expand one `pattern <- init` pair into flat (symbol, init-form) pairs,
/// appended in binding order.
pub fn destructure(
    pattern: &Form,
    init: Form,
    out: &mut Vec<(Form, Form)>,
) -> Result<(), AnalyzerError> {
    match &pattern.kind {
        FormKind::Sym(id) => {
            if intern::ns_of(*id).is_some() {
                return Err(err(pattern.pos, "cannot bind a qualified symbol"));
            }
            out.push((pattern.clone(), init));
            Ok(())
        }
        FormKind::Vector(elems) => destructure_seq(pattern.pos, elems, init, out),
        FormKind::Map(entries) => destructure_map(pattern.pos, entries, init, out),
        _ => Err(err(
            pattern.pos,
            "binding target must be a symbol, vector, or map",
        )),
    }
}

fn gensym_form(stem: &str) -> Form {
    Form::synthetic(FormKind::Sym(intern::gensym(stem)))
}

fn call2(name: &str, a: Form, b: Form) -> Form {
    Form::list(vec![Form::sym(name), a, b])
}

fn destructure_seq(
    pos: Pos,
    elems: &[Form],
    init: Form,
    out: &mut Vec<(Form, Form)>,
) -> Result<(), AnalyzerError> {
    let tmp = gensym_form("vec");
    out.push((tmp.clone(), init));

    let mut i = 0usize;
    let mut idx = 0i64;
    while i < elems.len() {
        let elem = &elems[i];
        if elem.is_sym("&") {
            let rest_pat = elems
                .get(i + 1)
                .ok_or_else(|| err(pos, "expected a binding after '&'"))?;
            let rest_init = call2(
                "clove.core/drop",
                Form::synthetic(FormKind::Int(idx)),
                tmp.clone(),
            );
            destructure(rest_pat, rest_init, out)?;
            i += 2;
            continue;
        }
        if elem.is_keyword("as") {
            let as_sym = elems
                .get(i + 1)
                .ok_or_else(|| err(pos, "expected a symbol after ':as'"))?;
            if as_sym.as_sym().is_none() {
                return Err(err(as_sym.pos, ":as target must be a symbol"));
            }
            out.push((as_sym.clone(), tmp.clone()));
            i += 2;
            continue;
        }
        let elem_init = Form::list(vec![
            Form::sym("clove.core/nth"),
            tmp.clone(),
            Form::synthetic(FormKind::Int(idx)),
            Form::nil(),
        ]);
        destructure(elem, elem_init, out)?;
        idx += 1;
        i += 1;
    }
    Ok(())
}

fn keyword_key(name: &str) -> Form {
    Form::keyword(name)
}

fn destructure_map(
    pos: Pos,
    entries: &[Form],
    init: Form,
    out: &mut Vec<(Form, Form)>,
) -> Result<(), AnalyzerError> {
    let tmp = gensym_form("map");
    out.push((tmp.clone(), init));

    // Collect :or defaults first; they apply to every key group.
    let mut defaults: Vec<(Form, Form)> = Vec::new();
    for pair in entries.chunks(2) {
        if pair.len() == 2 && pair[0].is_keyword("or") {
            match &pair[1].kind {
                FormKind::Map(items) => {
                    for kv in items.chunks(2) {
                        if kv.len() == 2 {
                            defaults.push((kv[0].clone(), kv[1].clone()));
                        }
                    }
                }
                _ => return Err(err(pair[1].pos, ":or expects a map of defaults")),
            }
        }
    }
    let default_for = |sym: &Form| -> Form {
        defaults
            .iter()
            .find(|(k, _)| k.kind == sym.kind)
            .map(|(_, v)| v.clone())
            .unwrap_or_else(Form::nil)
    };

    for pair in entries.chunks(2) {
        if pair.len() != 2 {
            return Err(err(pos, "map pattern must have an even number of forms"));
        }
        let (k, v) = (&pair[0], &pair[1]);
        if k.is_keyword("or") {
            continue;
        }
        if k.is_keyword("as") {
            if v.as_sym().is_none() {
                return Err(err(v.pos, ":as target must be a symbol"));
            }
            out.push((v.clone(), tmp.clone()));
            continue;
        }
        if k.is_keyword("keys") || k.is_keyword("strs") || k.is_keyword("syms") {
            let syms = v
                .as_vector()
                .ok_or_else(|| err(v.pos, ":keys expects a vector of symbols"))?;
            for s in syms {
                let id = s
                    .as_sym()
                    .ok_or_else(|| err(s.pos, ":keys entries must be symbols"))?;
                let name = intern::name_of(id);
                let key = if k.is_keyword("keys") {
                    keyword_key(name)
                } else if k.is_keyword("strs") {
                    Form::synthetic(FormKind::Str(name.to_string()))
                } else {
                    Form::list(vec![Form::sym("quote"), s.clone()])
                };
                let get = Form::list(vec![
                    Form::sym("clove.core/get"),
                    tmp.clone(),
                    key,
                    default_for(s),
                ]);
                out.push((s.clone(), get));
            }
            continue;
        }
        // pattern -> key entry: `{x :x}` or nested `{[a b] :pair}`.
        let get = Form::list(vec![
            Form::sym("clove.core/get"),
            tmp.clone(),
            v.clone(),
            default_for(k),
        ]);
        destructure(k, get, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{Reader, ReaderLimits};

    fn read(src: &str) -> Form {
        Reader::new(src, "user", ReaderLimits::default())
            .read_one()
            .expect("read")
            .expect("form")
    }

    fn expand(pattern: &str, init: &str) -> Vec<(String, Form)> {
        let p = read(pattern);
        let i = read(init);
        let mut out = Vec::new();
        destructure(&p, i, &mut out).expect("destructure");
        out.into_iter()
            .map(|(sym, form)| {
                let name = sym.as_sym().map(intern::full_name).unwrap_or("?");
                (name.to_string(), form)
            })
            .collect()
    }

    #[test]
    fn test_plain_symbol_passes_through() {
        let pairs = expand("x", "1");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "x");
    }

    #[test]
    fn test_seq_pattern_uses_nth() {
        let pairs = expand("[a b]", "coll");
        // tmp, a, b
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[1].0, "a");
        assert!(pairs[1].1.is_call("clove.core/nth"));
        assert_eq!(pairs[2].0, "b");
    }

    #[test]
    fn test_rest_and_as() {
        let pairs = expand("[a & r :as all]", "coll");
        let names: Vec<&str> = pairs.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"a"));
        assert!(names.contains(&"r"));
        assert!(names.contains(&"all"));
        let rest = pairs.iter().find(|(n, _)| n == "r").unwrap();
        assert!(rest.1.is_call("clove.core/drop"));
    }

    #[test]
    fn test_map_keys_with_defaults() {
        let pairs = expand("{:keys [x y] :or {y 9}}", "m");
        let y = pairs.iter().find(|(n, _)| n == "y").unwrap();
        let get = y.1.as_list().unwrap();
        // (get tmp :y 9)
        assert_eq!(get[3].kind, FormKind::Int(9));
    }

    #[test]
    fn test_nested_patterns() {
        let pairs = expand("[[a b] c]", "coll");
        let names: Vec<&str> = pairs.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"a"));
        assert!(names.contains(&"b"));
        assert!(names.contains(&"c"));
    }

    #[test]
    fn test_rejects_qualified_target() {
        let p = read("other/x");
        let mut out = Vec::new();
        assert!(destructure(&p, read("1"), &mut out).is_err());
    }
}
