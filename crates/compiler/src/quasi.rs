//! Syntax-quote expansion.
//!
//! `` `x `` lowers at read time: simple forms become `(quote x)`, and
//! collections become `(clove.core/list ...)` / `(clove.core/concat ...)`
//! trees that rebuild the template at runtime, with `~` splicing a value
//! and `~@` splicing a sequence. `sym#` auto-gensyms consistently within
//! one template.
//!
//! Symbols are quoted as written (not namespace-resolved); macros that
//! need hygiene reach for auto-gensym or `gensym`, which the core macros
//! themselves do.

use clove_core::{SymId, intern};
use std::collections::HashMap;

use crate::form::{Form, FormKind};

pub fn expand(template: &Form) -> Result<Form, String> {
    let mut gensyms: HashMap<SymId, SymId> = HashMap::new();
    expand_inner(template, &mut gensyms)
}

fn is_unquote(form: &Form) -> Option<&Form> {
    let items = form.as_list()?;
    if items.len() == 2 && items[0].is_sym("unquote") {
        Some(&items[1])
    } else {
        None
    }
}

fn is_unquote_splicing(form: &Form) -> Option<&Form> {
    let items = form.as_list()?;
    if items.len() == 2 && items[0].is_sym("unquote-splicing") {
        Some(&items[1])
    } else {
        None
    }
}

fn expand_inner(form: &Form, gensyms: &mut HashMap<SymId, SymId>) -> Result<Form, String> {
    if let Some(inner) = is_unquote(form) {
        return Ok(inner.clone());
    }
    if is_unquote_splicing(form).is_some() {
        return Err("splice (~@) outside of a collection".to_string());
    }
    match &form.kind {
        FormKind::Sym(id) => {
            let name = intern::name_of(*id);
            let resolved = if intern::ns_of(*id).is_none() && name.ends_with('#') {
                let stem = &name[..name.len() - 1];
                *gensyms
                    .entry(*id)
                    .or_insert_with(|| intern::gensym(stem))
            } else {
                *id
            };
            Ok(Form::list(vec![
                Form::sym("quote"),
                Form::synthetic(FormKind::Sym(resolved)),
            ]))
        }
        FormKind::List(items) => {
            let segments = expand_elements(items, gensyms)?;
            Ok(build_seq(segments))
        }
        FormKind::Vector(items) => {
            let segments = expand_elements(items, gensyms)?;
            Ok(Form::list(vec![Form::sym("clove.core/vec"), build_seq(segments)]))
        }
        FormKind::Set(items) => {
            let segments = expand_elements(items, gensyms)?;
            Ok(Form::list(vec![
                Form::sym("clove.core/set"),
                build_seq(segments),
            ]))
        }
        FormKind::Map(items) => {
            let mut call = vec![Form::sym("clove.core/hash-map")];
            for item in items {
                call.push(expand_inner(item, gensyms)?);
            }
            Ok(Form::list(call))
        }
        // Self-evaluating literals need no quoting.
        _ => Ok(form.clone()),
    }
}

enum Segment {
    One(Form),
    Splice(Form),
}

fn expand_elements(
    items: &[Form],
    gensyms: &mut HashMap<SymId, SymId>,
) -> Result<Vec<Segment>, String> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let Some(inner) = is_unquote_splicing(item) {
            out.push(Segment::Splice(inner.clone()));
        } else {
            out.push(Segment::One(expand_inner(item, gensyms)?));
        }
    }
    Ok(out)
}

/// `(list a b)` when nothing splices, else `(concat (list a) spliced ...)`.
fn build_seq(segments: Vec<Segment>) -> Form {
    let any_splice = segments.iter().any(|s| matches!(s, Segment::Splice(_)));
    if !any_splice {
        let mut call = vec![Form::sym("clove.core/list")];
        for s in segments {
            if let Segment::One(f) = s {
                call.push(f);
            }
        }
        return Form::list(call);
    }
    let mut call = vec![Form::sym("clove.core/concat")];
    let mut run: Vec<Form> = Vec::new();
    for s in segments {
        match s {
            Segment::One(f) => run.push(f),
            Segment::Splice(f) => {
                if !run.is_empty() {
                    let mut part = vec![Form::sym("clove.core/list")];
                    part.append(&mut run);
                    call.push(Form::list(part));
                }
                call.push(f);
            }
        }
    }
    if !run.is_empty() {
        let mut part = vec![Form::sym("clove.core/list")];
        part.append(&mut run);
        call.push(Form::list(part));
    }
    Form::list(call)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_quotes() {
        let f = expand(&Form::sym("x")).unwrap();
        assert!(f.is_call("quote"));
    }

    #[test]
    fn test_literal_passes_through() {
        let f = expand(&Form::synthetic(FormKind::Int(5))).unwrap();
        assert_eq!(f.kind, FormKind::Int(5));
    }

    #[test]
    fn test_unquote_inserts() {
        // `(a ~b) -> (list 'a b)
        let template = Form::list(vec![
            Form::sym("a"),
            Form::list(vec![Form::sym("unquote"), Form::sym("b")]),
        ]);
        let f = expand(&template).unwrap();
        let items = f.as_list().unwrap();
        assert!(items[0].is_sym("clove.core/list"));
        assert!(items[1].is_call("quote"));
        assert!(items[2].is_sym("b"));
    }

    #[test]
    fn test_splice_uses_concat() {
        // `(a ~@xs) -> (concat (list 'a) xs)
        let template = Form::list(vec![
            Form::sym("a"),
            Form::list(vec![Form::sym("unquote-splicing"), Form::sym("xs")]),
        ]);
        let f = expand(&template).unwrap();
        let items = f.as_list().unwrap();
        assert!(items[0].is_sym("clove.core/concat"));
        assert!(items[2].is_sym("xs"));
    }

    #[test]
    fn test_auto_gensym_is_consistent() {
        // `(x# x#) -> both occurrences share one generated symbol.
        let template = Form::list(vec![Form::sym("x#"), Form::sym("x#")]);
        let f = expand(&template).unwrap();
        let items = f.as_list().unwrap();
        let a = items[1].as_list().unwrap()[1].as_sym().unwrap();
        let b = items[2].as_list().unwrap()[1].as_sym().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, intern::intern_name("x#"));
    }

    #[test]
    fn test_top_level_splice_rejected() {
        let template = Form::list(vec![Form::sym("unquote-splicing"), Form::sym("xs")]);
        assert!(expand(&template).is_err());
    }
}
