//! The tree-walking evaluator: the reference backend.
//!
//! Frames live contiguously on the shared binding stack as
//! `[captures... params... lets...]`; nested calls push frames above.
//! `recur` never grows the stack: the body returns a `Flow::Recur` sentinel
//! and the enclosing loop/function trampoline rebinds the frame in place.
//!
//! Safe points: function entry and every trampoline back-edge. Values
//! evaluated mid-expression (a callee while its arguments evaluate, a
//! collected argument vector) are parked on the temp-root stack so a
//! collection inside a nested call cannot sweep them.

use clove_core::value::tag_of;
use clove_core::{ErrKind, Obj, Value, intern};

use crate::builtins::{atom_ops, seq_ops};
use crate::defs::{self, FrameRef};
use crate::error::{EvalResult, Thrown, raise};
use crate::invoke::invoke;
use crate::node::{FnDef, Node, NodeKind};
use crate::rt::Rt;
use crate::seq;

/// The active frame: a region of the binding stack.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub base: usize,
    pub ncap: usize,
}

impl Frame {
    fn slot(&self, s: u16) -> usize {
        self.base + self.ncap + s as usize
    }

    fn frame_ref(&self) -> FrameRef {
        FrameRef {
            base: self.base,
            ncap: self.ncap,
            vm: false,
        }
    }
}

/// Tail-position outcome: a value, or a `recur` heading for the nearest
/// trampoline.
enum Flow {
    Val(Value),
    Recur(Vec<Value>),
}

/// Call a closure value on the evaluator backend.
pub fn call_closure_eval(rt: &mut Rt, callee: Value, args: &[Value]) -> EvalResult {
    let r = match callee.as_obj() {
        Some(r) => r,
        None => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::IllegalState,
                "closure call on a non-object".to_string(),
            ));
        }
    };
    let (def_id, captures, name) = match rt.heap.get(r) {
        Obj::Closure(c) => (c.def, c.captures.clone(), c.name),
        other => {
            let msg = format!("closure call on {:?}", std::mem::discriminant(other));
            return Err(raise(&mut rt.heap, ErrKind::IllegalState, msg));
        }
    };
    let def = rt.fndef(def_id);
    let arity_idx = match def
        .arities
        .iter()
        .position(|a| !a.variadic && a.params.len() == args.len())
        .or_else(|| {
            def.arities
                .iter()
                .position(|a| a.variadic && args.len() >= a.params.len() - 1)
        }) {
        Some(i) => i,
        None => {
            let shown = name
                .map(intern::full_name)
                .unwrap_or("fn")
                .to_string();
            return Err(crate::error::arity_error(&mut rt.heap, &shown, args.len()));
        }
    };
    if rt.call_depth >= rt.limits.max_call_depth {
        return Err(raise(
            &mut rt.heap,
            ErrKind::StackOverflow,
            "evaluation stack depth exceeded".to_string(),
        ));
    }

    let arity = &def.arities[arity_idx];
    let base = rt.locals.len();
    rt.locals.extend_from_slice(&captures);
    if arity.variadic {
        let fixed = arity.params.len() - 1;
        rt.locals.extend_from_slice(&args[..fixed]);
        let rest = if args.len() > fixed {
            let items = args[fixed..].to_vec();
            rt.heap.list_value(items)
        } else {
            Value::Nil
        };
        rt.locals.push(rest);
    } else {
        rt.locals.extend_from_slice(args);
    }
    for _ in arity.params.len()..arity.n_slots as usize {
        rt.locals.push(Value::Nil);
    }

    rt.call_depth += 1;
    let result = run_frame(rt, &def, arity_idx, base);
    rt.call_depth -= 1;
    rt.locals.truncate(base);
    result
}

/// The function-level trampoline: entry safe point, then rebind-and-loop on
/// `recur`.
fn run_frame(rt: &mut Rt, def: &FnDef, arity_idx: usize, base: usize) -> EvalResult {
    rt.maybe_gc();
    let arity = &def.arities[arity_idx];
    let fr = Frame {
        base,
        ncap: def.captures.len(),
    };
    loop {
        match eval_body_tail(rt, &arity.body, fr)? {
            Flow::Val(v) => return Ok(v),
            Flow::Recur(vals) => {
                for (i, v) in vals.into_iter().enumerate() {
                    rt.locals[fr.slot(i as u16)] = v;
                }
                rt.maybe_gc();
            }
        }
    }
}

/// Evaluate a body; the last expression is in tail position.
fn eval_body_tail(rt: &mut Rt, body: &[Node], fr: Frame) -> Result<Flow, Thrown> {
    match body.split_last() {
        None => Ok(Flow::Val(Value::Nil)),
        Some((last, rest)) => {
            for stmt in rest {
                eval_expr(rt, stmt, fr)?;
            }
            eval_tail(rt, last, fr)
        }
    }
}

fn eval_body(rt: &mut Rt, body: &[Node], fr: Frame) -> EvalResult {
    let mut result = Value::Nil;
    for stmt in body {
        result = eval_expr(rt, stmt, fr)?;
    }
    Ok(result)
}

fn eval_tail(rt: &mut Rt, node: &Node, fr: Frame) -> Result<Flow, Thrown> {
    match &node.kind {
        NodeKind::If { test, then, els } => {
            let t = eval_expr(rt, test, fr)?;
            if t.is_truthy() {
                eval_tail(rt, then, fr)
            } else {
                match els {
                    Some(e) => eval_tail(rt, e, fr),
                    None => Ok(Flow::Val(Value::Nil)),
                }
            }
        }
        NodeKind::Do(stmts) => eval_body_tail(rt, stmts, fr),
        NodeKind::Let {
            bindings,
            body,
            is_loop,
        } => {
            if *is_loop {
                Ok(Flow::Val(eval_loop(rt, bindings, body, fr)?))
            } else {
                for (_, slot, init) in bindings {
                    let v = eval_expr(rt, init, fr)?;
                    rt.locals[fr.slot(*slot)] = v;
                }
                eval_body_tail(rt, body, fr)
            }
        }
        NodeKind::Recur(args) => {
            let mark = rt.temp_mark();
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                match eval_expr(rt, a, fr) {
                    Ok(v) => {
                        rt.push_temp(v);
                        vals.push(v);
                    }
                    Err(t) => {
                        rt.truncate_temps(mark);
                        return Err(t);
                    }
                }
            }
            rt.truncate_temps(mark);
            // No safe point between here and the trampoline's rebind.
            Ok(Flow::Recur(vals))
        }
        _ => Ok(Flow::Val(eval_expr(rt, node, fr)?)),
    }
}

/// The `loop` trampoline.
fn eval_loop(
    rt: &mut Rt,
    bindings: &[(clove_core::SymId, u16, Node)],
    body: &[Node],
    fr: Frame,
) -> EvalResult {
    for (_, slot, init) in bindings {
        let v = eval_expr(rt, init, fr)?;
        rt.locals[fr.slot(*slot)] = v;
    }
    loop {
        match eval_body_tail(rt, body, fr)? {
            Flow::Val(v) => return Ok(v),
            Flow::Recur(vals) => {
                for (i, v) in vals.into_iter().enumerate() {
                    let (_, slot, _) = bindings[i];
                    rt.locals[fr.slot(slot)] = v;
                }
                rt.maybe_gc();
            }
        }
    }
}

/// Evaluate a node in non-tail position.
pub fn eval_expr(rt: &mut Rt, node: &Node, fr: Frame) -> EvalResult {
    match &node.kind {
        NodeKind::Const(v) => Ok(*v),
        NodeKind::VarRef(id) => match rt.env.var(*id).value() {
            Some(v) => Ok(v),
            None => {
                let name = intern::full_name(rt.env.var(*id).name);
                Err(raise(
                    &mut rt.heap,
                    ErrKind::UnboundVar,
                    format!("unbound var: {}", name),
                )
                .with_pos(node.pos))
            }
        },
        NodeKind::LocalRef { slot } => Ok(rt.locals[fr.slot(*slot)]),
        NodeKind::CaptureRef { idx } => Ok(rt.locals[fr.base + *idx as usize]),
        NodeKind::If { test, then, els } => {
            let t = eval_expr(rt, test, fr)?;
            if t.is_truthy() {
                eval_expr(rt, then, fr)
            } else {
                match els {
                    Some(e) => eval_expr(rt, e, fr),
                    None => Ok(Value::Nil),
                }
            }
        }
        NodeKind::Do(stmts) => eval_body(rt, stmts, fr),
        NodeKind::Let {
            bindings,
            body,
            is_loop,
        } => {
            if *is_loop {
                eval_loop(rt, bindings, body, fr)
            } else {
                for (_, slot, init) in bindings {
                    let v = eval_expr(rt, init, fr)?;
                    rt.locals[fr.slot(*slot)] = v;
                }
                eval_body(rt, body, fr)
            }
        }
        NodeKind::Recur(_) => Err(raise(
            &mut rt.heap,
            ErrKind::IllegalState,
            "recur outside of loop or fn tail".to_string(),
        )
        .with_pos(node.pos)),
        NodeKind::Fn { def } => Ok(defs::make_closure(rt, *def, fr.frame_ref())),
        NodeKind::LetFn { bindings, body } => {
            // Install every closure first, then fill captures so mutual
            // references resolve.
            for (_, slot, def_id) in bindings {
                let c = defs::make_closure(rt, *def_id, fr.frame_ref());
                rt.locals[fr.slot(*slot)] = c;
            }
            for (_, slot, _) in bindings {
                let c = rt.locals[fr.slot(*slot)];
                defs::refill_captures(rt, c, fr.frame_ref());
            }
            eval_body(rt, body, fr)
        }
        NodeKind::Call { callee, args } => {
            let mark = rt.temp_mark();
            let result = eval_call(rt, callee, args, fr);
            rt.truncate_temps(mark);
            result.map_err(|t| t.with_pos(node.pos))
        }
        NodeKind::Def {
            var,
            init,
            is_macro,
            doc,
        } => {
            let v = match init {
                Some(n) => Some(eval_expr(rt, n, fr)?),
                None => None,
            };
            Ok(defs::do_def(rt, *var, v, *is_macro, doc.clone()))
        }
        NodeKind::Throw(e) => {
            let v = eval_expr(rt, e, fr)?;
            Err(Thrown::at(v, node.pos))
        }
        NodeKind::Try {
            body,
            catch,
            finally,
        } => {
            let mut result = eval_body(rt, body, fr);
            if let Err(t) = result {
                if let Some(c) = catch {
                    rt.locals[fr.slot(c.slot)] = t.value;
                    result = eval_body(rt, &c.body, fr);
                } else {
                    result = Err(t);
                }
            }
            if let Some(f) = finally {
                // A finally failure supersedes the in-flight outcome.
                eval_body(rt, f, fr)?;
            }
            result
        }
        NodeKind::Apply { callee, args } => {
            let mark = rt.temp_mark();
            let result = eval_apply(rt, callee, args, fr);
            rt.truncate_temps(mark);
            result.map_err(|t| t.with_pos(node.pos))
        }
        NodeKind::Partial { callee, args } => {
            let mark = rt.temp_mark();
            let result = (|| -> EvalResult {
                let f = eval_expr(rt, callee, fr)?;
                rt.push_temp(f);
                let argv = eval_args(rt, args, fr)?;
                Ok(Value::Obj(rt.heap.alloc(Obj::Partial(
                    clove_core::PartialObj { f, args: argv },
                ))))
            })();
            rt.truncate_temps(mark);
            result
        }
        NodeKind::Comp(fns) => {
            let mark = rt.temp_mark();
            let result = (|| -> EvalResult {
                let fv = eval_args(rt, fns, fr)?;
                Ok(Value::Obj(
                    rt.heap.alloc(Obj::Comp(clove_core::CompObj { fns: fv })),
                ))
            })();
            rt.truncate_temps(mark);
            result
        }
        NodeKind::SeqOp { op, args } => {
            let mark = rt.temp_mark();
            let result = (|| -> EvalResult {
                let argv = eval_args(rt, args, fr)?;
                seq_ops::dispatch_seq_op(rt, *op, &argv)
            })();
            rt.truncate_temps(mark);
            result.map_err(|t| t.with_pos(node.pos))
        }
        NodeKind::Swap(args) => {
            let mark = rt.temp_mark();
            let result = (|| -> EvalResult {
                let argv = eval_args(rt, args, fr)?;
                atom_ops::swap_in_place(rt, &argv)
            })();
            rt.truncate_temps(mark);
            result.map_err(|t| t.with_pos(node.pos))
        }
        NodeKind::DefMulti {
            var,
            name,
            dispatch,
        } => {
            let d = eval_expr(rt, dispatch, fr)?;
            Ok(defs::do_defmulti(rt, *var, *name, d))
        }
        NodeKind::DefMethod {
            var,
            dispatch_val,
            method,
        } => {
            let mark = rt.temp_mark();
            let result = (|| -> EvalResult {
                let dv = eval_expr(rt, dispatch_val, fr)?;
                rt.push_temp(dv);
                let m = eval_expr(rt, method, fr)?;
                rt.push_temp(m);
                defs::do_defmethod(rt, *var, dv, m)
            })();
            rt.truncate_temps(mark);
            result
        }
        NodeKind::DefProtocol { var, name, sigs } => {
            Ok(defs::do_defprotocol(rt, *var, *name, sigs))
        }
        NodeKind::ExtendType { tag, impls } => {
            for (proto_node, methods) in impls {
                let mark = rt.temp_mark();
                let result = (|| -> EvalResult {
                    let proto = eval_expr(rt, proto_node, fr)?;
                    rt.push_temp(proto);
                    let mut resolved = Vec::with_capacity(methods.len());
                    for (mname, mnode) in methods {
                        let f = eval_expr(rt, mnode, fr)?;
                        rt.push_temp(f);
                        resolved.push((*mname, f));
                    }
                    defs::do_extend_type(rt, *tag, proto, &resolved)
                })();
                rt.truncate_temps(mark);
                result.map_err(|t| t.with_pos(node.pos))?;
            }
            Ok(Value::Nil)
        }
        NodeKind::Binding { pairs, body } => eval_binding(rt, pairs, body, fr, node),
        NodeKind::LazySeq { def } => Ok(defs::make_lazy(rt, *def, fr.frame_ref())),
        NodeKind::InNs { name } => Ok(defs::do_in_ns(rt, *name)),
    }
}

fn eval_args(rt: &mut Rt, args: &[Node], fr: Frame) -> Result<Vec<Value>, Thrown> {
    let mut out = Vec::with_capacity(args.len());
    for a in args {
        let v = eval_expr(rt, a, fr)?;
        rt.push_temp(v);
        out.push(v);
    }
    Ok(out)
}

fn eval_call(rt: &mut Rt, callee: &Node, args: &[Node], fr: Frame) -> EvalResult {
    let cv = eval_expr(rt, callee, fr)?;
    rt.push_temp(cv);
    let argv = eval_args(rt, args, fr)?;
    invoke(rt, cv, &argv)
}

fn eval_apply(rt: &mut Rt, callee: &Node, args: &[Node], fr: Frame) -> EvalResult {
    let cv = eval_expr(rt, callee, fr)?;
    rt.push_temp(cv);
    let argv = eval_args(rt, args, fr)?;
    if argv.is_empty() {
        return Err(raise(
            &mut rt.heap,
            ErrKind::Arity,
            "apply expects a function and a sequence".to_string(),
        ));
    }
    let (tail, fixed) = argv.split_last().map(|(t, f)| (*t, f.to_vec())).unwrap_or((Value::Nil, vec![]));
    if !seq::is_seqable(rt, tail) {
        return Err({
                let msg = format!( "apply expects a sequence as its last argument, got {}", tag_of(&rt.heap, tail).name() );
                raise(&mut rt.heap, ErrKind::Type, msg)
            });
    }
    let mut full = fixed;
    let spread = seq::seq_to_vec(rt, tail)?;
    full.extend_from_slice(&spread);
    invoke(rt, cv, &full)
}

fn eval_binding(
    rt: &mut Rt,
    pairs: &[(clove_core::VarId, Node)],
    body: &[Node],
    fr: Frame,
    node: &Node,
) -> EvalResult {
    let mark = rt.temp_mark();
    let mut vals = Vec::with_capacity(pairs.len());
    for (var, init) in pairs {
        match eval_expr(rt, init, fr) {
            Ok(v) => {
                rt.push_temp(v);
                vals.push((*var, v));
            }
            Err(t) => {
                rt.truncate_temps(mark);
                return Err(t);
            }
        }
    }
    for (var, _) in &vals {
        if !rt.env.var(*var).meta.is_dynamic {
            let name = intern::full_name(rt.env.var(*var).name);
            rt.truncate_temps(mark);
            return Err(raise(
                &mut rt.heap,
                ErrKind::IllegalState,
                format!("binding target {} is not dynamic", name),
            )
            .with_pos(node.pos));
        }
    }
    for (var, v) in &vals {
        rt.env.var_mut(*var).dyn_stack.push(*v);
    }
    rt.truncate_temps(mark);
    let result = eval_body(rt, body, fr);
    for (var, _) in vals.iter().rev() {
        rt.env.var_mut(*var).dyn_stack.pop();
    }
    result
}
