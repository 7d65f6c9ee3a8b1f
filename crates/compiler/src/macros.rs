//! Built-in macro expansion.
//!
//! Each expander takes the whole call form and produces a new Form that the
//! analyzer re-analyzes, so expansions compose (a `when` inside a `->`
//! thread expands in a later pass). Hygiene comes from `gensym` where a
//! generated binding could capture.
//!
//! Function-shaped combinators (`complement`, `constantly`, `some-fn`,
//! `every-pred`, `fnil`, `juxt`, `update`) expand to `fn` forms here so the
//! result is a first-class value at the call site.

use clove_core::{Pos, SymId, intern};

use crate::analyzer::AnalyzerError;
use crate::form::{Form, FormKind};

fn err(pos: Pos, message: impl Into<String>) -> AnalyzerError {
    AnalyzerError {
        message: message.into(),
        pos,
    }
}

fn sym_form(id: SymId) -> Form {
    Form::synthetic(FormKind::Sym(id))
}

fn gensym(stem: &str) -> Form {
    sym_form(intern::gensym(stem))
}

fn flist(items: Vec<Form>) -> Form {
    Form::list(items)
}

fn let_form(bindings: Vec<Form>, body: Vec<Form>) -> Form {
    let mut items = vec![Form::sym("let"), Form::vector(bindings)];
    items.extend(body);
    flist(items)
}

fn if_form(test: Form, then: Form, els: Option<Form>) -> Form {
    let mut items = vec![Form::sym("if"), test, then];
    if let Some(e) = els {
        items.push(e);
    }
    flist(items)
}

fn do_form(body: Vec<Form>) -> Form {
    let mut items = vec![Form::sym("do")];
    items.extend(body);
    flist(items)
}

fn quote_form(f: Form) -> Form {
    flist(vec![Form::sym("quote"), f])
}

/// Thread `x` into `form` as first (or last) argument.
fn thread_into(x: Form, form: &Form, first: bool) -> Form {
    match &form.kind {
        FormKind::List(items) if !items.is_empty() => {
            let mut out = Vec::with_capacity(items.len() + 1);
            out.push(items[0].clone());
            if first {
                out.push(x);
                out.extend(items[1..].iter().cloned());
            } else {
                out.extend(items[1..].iter().cloned());
                out.push(x);
            }
            Form::new(FormKind::List(out), form.pos)
        }
        _ => flist(vec![form.clone(), x]),
    }
}

/// Expand a built-in macro call, or return None when `name` is not one.
pub fn expand_builtin(name: &str, form: &Form) -> Result<Option<Form>, AnalyzerError> {
    let items = match form.as_list() {
        Some(items) => items,
        None => return Ok(None),
    };
    let args = &items[1..];
    let pos = form.pos;
    let expanded = match name {
        "when" => {
            if args.is_empty() {
                return Err(err(pos, "when expects a test"));
            }
            Some(if_form(
                args[0].clone(),
                do_form(args[1..].to_vec()),
                None,
            ))
        }
        "when-not" => {
            if args.is_empty() {
                return Err(err(pos, "when-not expects a test"));
            }
            Some(if_form(
                args[0].clone(),
                Form::nil(),
                Some(do_form(args[1..].to_vec())),
            ))
        }
        "if-not" => match args {
            [test, then] => Some(if_form(test.clone(), Form::nil(), Some(then.clone()))),
            [test, then, els] => Some(if_form(test.clone(), els.clone(), Some(then.clone()))),
            _ => return Err(err(pos, "if-not expects 2 or 3 forms")),
        },
        "cond" => {
            if args.len() % 2 != 0 {
                return Err(err(pos, "cond expects an even number of forms"));
            }
            let mut out = Form::nil();
            for pair in args.chunks(2).rev() {
                out = if_form(pair[0].clone(), pair[1].clone(), Some(out));
            }
            Some(out)
        }
        "if-let" | "if-some" => {
            let binding = args
                .first()
                .and_then(Form::as_vector)
                .ok_or_else(|| err(pos, "expected a binding vector"))?;
            if binding.len() != 2 || args.len() < 2 || args.len() > 3 {
                return Err(err(pos, "expected [binding init] then else?"));
            }
            let tmp = gensym("t");
            let test = if name == "if-let" {
                tmp.clone()
            } else {
                flist(vec![Form::sym("clove.core/some?"), tmp.clone()])
            };
            let then = let_form(
                vec![binding[0].clone(), tmp.clone()],
                vec![args[1].clone()],
            );
            let els = args.get(2).cloned();
            Some(let_form(
                vec![tmp.clone(), binding[1].clone()],
                vec![if_form(test, then, els)],
            ))
        }
        "when-let" | "when-some" => {
            let binding = args
                .first()
                .ok_or_else(|| err(pos, "expected a binding vector"))?;
            let inner = if name == "when-let" { "if-let" } else { "if-some" };
            Some(flist(vec![
                Form::sym(inner),
                binding.clone(),
                do_form(args[1..].to_vec()),
            ]))
        }
        "and" => match args {
            [] => Some(Form::synthetic(FormKind::Bool(true))),
            [x] => Some(x.clone()),
            [x, rest @ ..] => {
                let tmp = gensym("and");
                let mut more = vec![Form::sym("and")];
                more.extend(rest.iter().cloned());
                Some(let_form(
                    vec![tmp.clone(), x.clone()],
                    vec![if_form(tmp.clone(), flist(more), Some(tmp))],
                ))
            }
        },
        "or" => match args {
            [] => Some(Form::nil()),
            [x] => Some(x.clone()),
            [x, rest @ ..] => {
                let tmp = gensym("or");
                let mut more = vec![Form::sym("or")];
                more.extend(rest.iter().cloned());
                Some(let_form(
                    vec![tmp.clone(), x.clone()],
                    vec![if_form(tmp.clone(), tmp, Some(flist(more)))],
                ))
            }
        },
        "->" | "->>" => {
            let first = name == "->";
            let mut iter = args.iter();
            let mut acc = iter
                .next()
                .cloned()
                .ok_or_else(|| err(pos, "-> expects an initial value"))?;
            for step in iter {
                acc = thread_into(acc, step, first);
            }
            Some(acc)
        }
        "some->" | "some->>" => {
            let first = name == "some->";
            match args {
                [] => return Err(err(pos, "some-> expects an initial value")),
                [x] => Some(x.clone()),
                [x, step, rest @ ..] => {
                    let tmp = gensym("s");
                    let mut again = vec![Form::sym(name)];
                    again.push(thread_into(tmp.clone(), step, first));
                    again.extend(rest.iter().cloned());
                    Some(let_form(
                        vec![tmp.clone(), x.clone()],
                        vec![if_form(
                            flist(vec![Form::sym("clove.core/nil?"), tmp]),
                            Form::nil(),
                            Some(flist(again)),
                        )],
                    ))
                }
            }
        }
        "as->" => {
            if args.len() < 2 {
                return Err(err(pos, "as-> expects an expression and a name"));
            }
            let name_form = args[1].clone();
            let mut bindings = vec![name_form.clone(), args[0].clone()];
            for step in &args[2..] {
                bindings.push(name_form.clone());
                bindings.push(step.clone());
            }
            Some(let_form(bindings, vec![name_form]))
        }
        "cond->" | "cond->>" => {
            let first = name == "cond->";
            if args.is_empty() || args.len() % 2 == 0 {
                return Err(err(pos, "cond-> expects an expression and test/form pairs"));
            }
            let tmp = gensym("c");
            let mut bindings = vec![tmp.clone(), args[0].clone()];
            for pair in args[1..].chunks(2) {
                bindings.push(tmp.clone());
                bindings.push(if_form(
                    pair[0].clone(),
                    thread_into(tmp.clone(), &pair[1], first),
                    Some(tmp.clone()),
                ));
            }
            Some(let_form(bindings, vec![tmp]))
        }
        "doto" => {
            if args.is_empty() {
                return Err(err(pos, "doto expects an expression"));
            }
            let tmp = gensym("d");
            let mut body: Vec<Form> = args[1..]
                .iter()
                .map(|step| thread_into(tmp.clone(), step, true))
                .collect();
            body.push(tmp.clone());
            Some(let_form(vec![tmp, args[0].clone()], body))
        }
        "case" => Some(expand_case(args, pos)?),
        "condp" => Some(expand_condp(args, pos)?),
        "dotimes" => {
            let binding = args
                .first()
                .and_then(Form::as_vector)
                .ok_or_else(|| err(pos, "dotimes expects [name n]"))?;
            if binding.len() != 2 {
                return Err(err(pos, "dotimes expects [name n]"));
            }
            let i = binding[0].clone();
            let limit = gensym("n");
            let mut when_body = vec![Form::sym("when"), flist(vec![
                Form::sym("clove.core/<"),
                i.clone(),
                limit.clone(),
            ])];
            when_body.extend(args[1..].iter().cloned());
            when_body.push(flist(vec![
                Form::sym("recur"),
                flist(vec![Form::sym("clove.core/inc"), i.clone()]),
            ]));
            let loop_form = flist(vec![
                Form::sym("loop"),
                Form::vector(vec![i, Form::synthetic(FormKind::Int(0))]),
                flist(when_body),
            ]);
            Some(let_form(vec![limit, binding[1].clone()], vec![loop_form]))
        }
        "while" => {
            if args.is_empty() {
                return Err(err(pos, "while expects a test"));
            }
            let mut when_body = vec![Form::sym("when"), args[0].clone()];
            when_body.extend(args[1..].iter().cloned());
            when_body.push(flist(vec![Form::sym("recur")]));
            Some(flist(vec![
                Form::sym("loop"),
                Form::vector(vec![]),
                flist(when_body),
            ]))
        }
        "for" => Some(expand_for(args, pos)?),
        "doseq" => {
            if args.is_empty() {
                return Err(err(pos, "doseq expects a binding vector"));
            }
            let mut for_form = vec![Form::sym("for"), args[0].clone()];
            for_form.push(do_form(args[1..].to_vec()));
            Some(flist(vec![
                Form::sym("clove.core/dorun"),
                flist(for_form),
            ]))
        }
        "when-first" => {
            let binding = args
                .first()
                .and_then(Form::as_vector)
                .ok_or_else(|| err(pos, "when-first expects [x coll]"))?;
            if binding.len() != 2 {
                return Err(err(pos, "when-first expects [x coll]"));
            }
            let s = gensym("s");
            let inner = let_form(
                vec![
                    binding[0].clone(),
                    flist(vec![Form::sym("clove.core/first"), s.clone()]),
                ],
                args[1..].to_vec(),
            );
            Some(let_form(
                vec![
                    s.clone(),
                    flist(vec![Form::sym("clove.core/seq"), binding[1].clone()]),
                ],
                vec![flist(vec![Form::sym("when"), s, inner])],
            ))
        }
        "defn" | "defn-" => Some(expand_defn(args, pos, name == "defn-")?),
        "declare" => {
            let mut body = vec![];
            for a in args {
                if a.as_sym().is_none() {
                    return Err(err(a.pos, "declare expects symbols"));
                }
                body.push(flist(vec![Form::sym("def"), a.clone()]));
            }
            Some(do_form(body))
        }
        "assert" => {
            let expr = args
                .first()
                .ok_or_else(|| err(pos, "assert expects an expression"))?;
            let detail = match args.get(1) {
                Some(msg) => msg.clone(),
                None => quote_form(expr.clone()),
            };
            Some(flist(vec![
                Form::sym("when-not"),
                expr.clone(),
                flist(vec![Form::sym("clove.core/assert-failed"), detail]),
            ]))
        }
        "comment" => Some(Form::nil()),
        "update" => {
            if args.len() < 3 {
                return Err(err(pos, "update expects a map, key, and function"));
            }
            let m = gensym("m");
            let k = gensym("k");
            let mut call = vec![
                args[2].clone(),
                flist(vec![Form::sym("clove.core/get"), m.clone(), k.clone()]),
            ];
            call.extend(args[3..].iter().cloned());
            Some(let_form(
                vec![m.clone(), args[0].clone(), k.clone(), args[1].clone()],
                vec![flist(vec![
                    Form::sym("clove.core/assoc"),
                    m,
                    k,
                    flist(call),
                ])],
            ))
        }
        "extend-protocol" => Some(expand_extend_protocol(args, pos)?),
        "complement" => {
            let f = args
                .first()
                .ok_or_else(|| err(pos, "complement expects a function"))?;
            let fg = gensym("f");
            let rest = gensym("args");
            Some(let_form(
                vec![fg.clone(), f.clone()],
                vec![flist(vec![
                    Form::sym("fn"),
                    Form::vector(vec![Form::sym("&"), rest.clone()]),
                    flist(vec![
                        Form::sym("clove.core/not"),
                        flist(vec![Form::sym("clove.core/apply"), fg, rest]),
                    ]),
                ])],
            ))
        }
        "constantly" => {
            let x = args
                .first()
                .ok_or_else(|| err(pos, "constantly expects a value"))?;
            let xg = gensym("x");
            Some(let_form(
                vec![xg.clone(), x.clone()],
                vec![flist(vec![
                    Form::sym("fn"),
                    Form::vector(vec![Form::sym("&"), gensym("ignored")]),
                    xg,
                ])],
            ))
        }
        "some-fn" | "every-pred" => {
            if args.is_empty() {
                return Err(err(pos, "expected at least one predicate"));
            }
            let fs = gensym("fs");
            let f = gensym("f");
            let call_args = gensym("args");
            let walker = if name == "some-fn" {
                "clove.core/some"
            } else {
                "clove.core/every?"
            };
            let per_fn = flist(vec![
                Form::sym("fn"),
                Form::vector(vec![f.clone()]),
                flist(vec![Form::sym(walker), f, call_args.clone()]),
            ]);
            Some(let_form(
                vec![fs.clone(), Form::vector(args.to_vec())],
                vec![flist(vec![
                    Form::sym("fn"),
                    Form::vector(vec![Form::sym("&"), call_args]),
                    flist(vec![Form::sym(walker), per_fn, fs]),
                ])],
            ))
        }
        "fnil" => Some(expand_fnil(args, pos)?),
        "juxt" => {
            if args.is_empty() {
                return Err(err(pos, "juxt expects at least one function"));
            }
            let fs = gensym("fs");
            let f = gensym("f");
            let call_args = gensym("args");
            Some(let_form(
                vec![fs.clone(), Form::vector(args.to_vec())],
                vec![flist(vec![
                    Form::sym("fn"),
                    Form::vector(vec![Form::sym("&"), call_args.clone()]),
                    flist(vec![
                        Form::sym("clove.core/mapv"),
                        flist(vec![
                            Form::sym("fn"),
                            Form::vector(vec![f.clone()]),
                            flist(vec![Form::sym("clove.core/apply"), f, call_args]),
                        ]),
                        fs,
                    ]),
                ])],
            ))
        }
        _ => None,
    };
    Ok(expanded)
}

fn expand_case(args: &[Form], pos: Pos) -> Result<Form, AnalyzerError> {
    if args.is_empty() {
        return Err(err(pos, "case expects an expression"));
    }
    let g = gensym("case");
    let clauses = &args[1..];
    let has_default = clauses.len() % 2 == 1;
    let pairs = if has_default {
        &clauses[..clauses.len() - 1]
    } else {
        clauses
    };
    let mut cond_items = vec![Form::sym("cond")];
    for pair in pairs.chunks(2) {
        let test_consts = &pair[0];
        let result = pair[1].clone();
        // A list clause groups several unevaluated constants.
        let test = match &test_consts.kind {
            FormKind::List(options) => {
                let mut or_items = vec![Form::sym("or")];
                for option in options {
                    or_items.push(flist(vec![
                        Form::sym("clove.core/="),
                        g.clone(),
                        quote_form(option.clone()),
                    ]));
                }
                flist(or_items)
            }
            _ => flist(vec![
                Form::sym("clove.core/="),
                g.clone(),
                quote_form(test_consts.clone()),
            ]),
        };
        cond_items.push(test);
        cond_items.push(result);
    }
    cond_items.push(Form::keyword("else"));
    cond_items.push(match has_default {
        true => clauses[clauses.len() - 1].clone(),
        false => flist(vec![Form::sym("clove.core/case-failed"), g.clone()]),
    });
    Ok(let_form(
        vec![g, args[0].clone()],
        vec![flist(cond_items)],
    ))
}

fn expand_condp(args: &[Form], pos: Pos) -> Result<Form, AnalyzerError> {
    if args.len() < 2 {
        return Err(err(pos, "condp expects a predicate and an expression"));
    }
    let p = gensym("pred");
    let e = gensym("expr");
    let clauses = &args[2..];
    let has_default = clauses.len() % 2 == 1;
    let pairs = if has_default {
        &clauses[..clauses.len() - 1]
    } else {
        clauses
    };
    let mut cond_items = vec![Form::sym("cond")];
    for pair in pairs.chunks(2) {
        cond_items.push(flist(vec![p.clone(), pair[0].clone(), e.clone()]));
        cond_items.push(pair[1].clone());
    }
    cond_items.push(Form::keyword("else"));
    cond_items.push(match has_default {
        true => clauses[clauses.len() - 1].clone(),
        false => flist(vec![Form::sym("clove.core/case-failed"), e.clone()]),
    });
    Ok(let_form(
        vec![p, args[0].clone(), e, args[1].clone()],
        vec![flist(cond_items)],
    ))
}

/// One binding group of a `for` comprehension.
struct ForGroup {
    pattern: Form,
    source: Form,
    lets: Vec<Form>,
    whens: Vec<Form>,
    whiles: Vec<Form>,
}

fn expand_for(args: &[Form], pos: Pos) -> Result<Form, AnalyzerError> {
    let bindings = args
        .first()
        .and_then(Form::as_vector)
        .ok_or_else(|| err(pos, "for expects a binding vector"))?;
    if args.len() != 2 {
        return Err(err(pos, "for expects a binding vector and one body form"));
    }
    let body = args[1].clone();

    let mut groups: Vec<ForGroup> = Vec::new();
    let mut i = 0usize;
    while i < bindings.len() {
        let b = &bindings[i];
        if b.is_keyword("let") {
            let group = groups
                .last_mut()
                .ok_or_else(|| err(b.pos, ":let before any binding"))?;
            let lets = bindings
                .get(i + 1)
                .and_then(Form::as_vector)
                .ok_or_else(|| err(b.pos, ":let expects a vector"))?;
            group.lets.extend(lets.iter().cloned());
            i += 2;
        } else if b.is_keyword("when") {
            let group = groups
                .last_mut()
                .ok_or_else(|| err(b.pos, ":when before any binding"))?;
            let test = bindings
                .get(i + 1)
                .ok_or_else(|| err(b.pos, ":when expects a test"))?;
            group.whens.push(test.clone());
            i += 2;
        } else if b.is_keyword("while") {
            let group = groups
                .last_mut()
                .ok_or_else(|| err(b.pos, ":while before any binding"))?;
            let test = bindings
                .get(i + 1)
                .ok_or_else(|| err(b.pos, ":while expects a test"))?;
            group.whiles.push(test.clone());
            i += 2;
        } else {
            let source = bindings
                .get(i + 1)
                .ok_or_else(|| err(b.pos, "binding without a source sequence"))?;
            groups.push(ForGroup {
                pattern: b.clone(),
                source: source.clone(),
                lets: Vec::new(),
                whens: Vec::new(),
                whiles: Vec::new(),
            });
            i += 2;
        }
    }
    if groups.is_empty() {
        return Err(err(pos, "for expects at least one binding"));
    }
    Ok(expand_for_groups(&groups, body))
}

fn expand_for_groups(groups: &[ForGroup], body: Form) -> Form {
    let group = &groups[0];
    // Innermost group yields (list body); outer groups splice via mapcat.
    let mut element: Form = if groups.len() == 1 {
        flist(vec![Form::sym("clove.core/list"), body])
    } else {
        expand_for_groups(&groups[1..], body)
    };
    if !group.whens.is_empty() {
        let mut test = vec![Form::sym("and")];
        test.extend(group.whens.iter().cloned());
        element = if_form(
            flist(test),
            element,
            Some(flist(vec![Form::sym("clove.core/list")])),
        );
    }
    if !group.lets.is_empty() {
        element = let_form(group.lets.clone(), vec![element]);
    }
    let mut source = group.source.clone();
    if !group.whiles.is_empty() {
        let mut test = vec![Form::sym("and")];
        test.extend(group.whiles.iter().cloned());
        source = flist(vec![
            Form::sym("clove.core/take-while"),
            flist(vec![
                Form::sym("fn"),
                Form::vector(vec![group.pattern.clone()]),
                flist(test),
            ]),
            source,
        ]);
    }
    flist(vec![
        Form::sym("clove.core/mapcat"),
        flist(vec![
            Form::sym("fn"),
            Form::vector(vec![group.pattern.clone()]),
            element,
        ]),
        source,
    ])
}

fn expand_defn(args: &[Form], pos: Pos, private: bool) -> Result<Form, AnalyzerError> {
    let mut name = args
        .first()
        .cloned()
        .ok_or_else(|| err(pos, "defn expects a name"))?;
    if name.as_sym().is_none() {
        return Err(err(name.pos, "defn name must be a symbol"));
    }
    let mut rest = &args[1..];
    let mut doc: Option<Form> = None;
    if let Some(first) = rest.first() {
        if matches!(first.kind, FormKind::Str(_)) && rest.len() > 1 {
            doc = Some(first.clone());
            rest = &rest[1..];
        }
    }
    if rest.is_empty() {
        return Err(err(pos, "defn expects parameters and a body"));
    }
    if private {
        // ^:private merged onto the name.
        let meta = Form::synthetic(FormKind::Map(vec![
            Form::keyword("private"),
            Form::synthetic(FormKind::Bool(true)),
        ]));
        name.meta = Some(Box::new(meta));
    }
    let mut fn_items = vec![Form::sym("fn"), name.clone()];
    fn_items.extend(rest.iter().cloned());
    let mut def_items = vec![Form::sym("def"), name];
    if let Some(d) = doc {
        def_items.push(d);
    }
    def_items.push(flist(fn_items));
    Ok(flist(def_items))
}

fn expand_extend_protocol(args: &[Form], pos: Pos) -> Result<Form, AnalyzerError> {
    let proto = args
        .first()
        .cloned()
        .ok_or_else(|| err(pos, "extend-protocol expects a protocol"))?;
    let mut body = vec![Form::sym("do")];
    let mut i = 1usize;
    while i < args.len() {
        let type_sym = args[i].clone();
        if type_sym.as_sym().is_none() {
            return Err(err(type_sym.pos, "expected a type symbol"));
        }
        let mut group = vec![Form::sym("extend-type"), type_sym, proto.clone()];
        i += 1;
        while i < args.len() && args[i].as_list().is_some() {
            group.push(args[i].clone());
            i += 1;
        }
        body.push(flist(group));
    }
    Ok(do_form(body[1..].to_vec()))
}

fn expand_fnil(args: &[Form], pos: Pos) -> Result<Form, AnalyzerError> {
    if args.len() < 2 || args.len() > 4 {
        return Err(err(pos, "fnil expects a function and 1-3 defaults"));
    }
    let f = gensym("f");
    let defaults: Vec<Form> = (0..args.len() - 1).map(|_| gensym("d")).collect();
    let params: Vec<Form> = (0..args.len() - 1).map(|_| gensym("x")).collect();
    let rest = gensym("rest");

    let mut bindings = vec![f.clone(), args[0].clone()];
    for (d, v) in defaults.iter().zip(&args[1..]) {
        bindings.push(d.clone());
        bindings.push(v.clone());
    }

    let mut param_vec: Vec<Form> = params.clone();
    param_vec.push(Form::sym("&"));
    param_vec.push(rest.clone());

    let mut call = vec![Form::sym("clove.core/apply"), f];
    for (p, d) in params.iter().zip(&defaults) {
        call.push(if_form(
            flist(vec![Form::sym("clove.core/nil?"), p.clone()]),
            d.clone(),
            Some(p.clone()),
        ));
    }
    call.push(rest);

    Ok(let_form(
        bindings,
        vec![flist(vec![
            Form::sym("fn"),
            Form::vector(param_vec),
            flist(call),
        ])],
    ))
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

    fn expand(src: &str) -> Form {
        let form = read(src);
        let head = form.as_list().unwrap()[0].clone();
        let name = head.as_sym().map(intern::name_of).unwrap();
        expand_builtin(name, &form)
            .expect("expansion")
            .expect("macro")
    }

    #[test]
    fn test_when_becomes_if_do() {
        let f = expand("(when t a b)");
        assert!(f.is_call("if"));
        let items = f.as_list().unwrap();
        assert!(items[2].is_call("do"));
    }

    #[test]
    fn test_cond_nests_ifs() {
        let f = expand("(cond a 1 :else 2)");
        assert!(f.is_call("if"));
        let items = f.as_list().unwrap();
        // else branch is the next if
        assert!(items[3].is_call("if"));
    }

    #[test]
    fn test_thread_first_inserts_after_head() {
        let f = expand("(-> x (f a) g)");
        // (g (f x a))
        let items = f.as_list().unwrap();
        assert!(items[0].is_sym("g"));
        let inner = items[1].as_list().unwrap();
        assert!(inner[0].is_sym("f"));
        assert!(inner[1].is_sym("x"));
        assert!(inner[2].is_sym("a"));
    }

    #[test]
    fn test_thread_last_appends() {
        let f = expand("(->> x (f a))");
        let items = f.as_list().unwrap();
        assert!(items[0].is_sym("f"));
        assert!(items[1].is_sym("a"));
        assert!(items[2].is_sym("x"));
    }

    #[test]
    fn test_and_short_circuits_via_let() {
        let f = expand("(and a b)");
        assert!(f.is_call("let"));
    }

    #[test]
    fn test_case_quotes_constants() {
        let f = expand("(case x :a 1 2)");
        // (let [g x] (cond (= g (quote :a)) 1 :else 2))
        assert!(f.is_call("let"));
        let body = &f.as_list().unwrap()[2];
        assert!(body.is_call("cond"));
    }

    #[test]
    fn test_defn_wraps_fn_in_def() {
        let f = expand("(defn add [a b] (+ a b))");
        assert!(f.is_call("def"));
        let items = f.as_list().unwrap();
        assert!(items[1].is_sym("add"));
        assert!(items[2].is_call("fn"));
    }

    #[test]
    fn test_defn_doc_string() {
        let f = expand("(defn add \"adds\" [a b] (+ a b))");
        let items = f.as_list().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[2].kind, FormKind::Str("adds".into()));
    }

    #[test]
    fn test_for_builds_mapcat() {
        let f = expand("(for [x xs] (* x x))");
        assert!(f.is_call("clove.core/mapcat"));
    }

    #[test]
    fn test_update_threads_through_let() {
        let f = expand("(update m :k inc)");
        assert!(f.is_call("let"));
    }

    #[test]
    fn test_comment_is_nil() {
        let f = expand("(comment anything (at all))");
        assert_eq!(f.kind, FormKind::Nil);
    }
}
