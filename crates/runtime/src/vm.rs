//! The bytecode VM: the optimized backend.
//!
//! Frames share one operand stack (owned by `Rt`, so every live value is a
//! GC root). A frame's region is `[captures... slots... operands...]`;
//! `recur` rebinds the parameter slots in place and jumps to the body
//! start, so iteration allocates nothing and stack depth stays flat.
//! `tail_call` collapses the current frame before pushing the callee's.
//!
//! Exception handlers record (frame depth, stack height, catch pc);
//! `throw` unwinds to the innermost handler, pushes the thrown value, and
//! resumes at the catch pc. Uncaught throws surface from `run`.
//!
//! Safe points: function entry, `recur`, and loop back-edge `safepoint`
//! instructions.

use clove_core::{ErrKind, Obj, Pos, Value, intern};
use std::rc::Rc;
use tracing::trace;

use crate::builtins::{atom_ops, seq_ops};
use crate::chunk::{Chunk, Op};
use crate::defs::{self, FrameRef};
use crate::emit::{self, FastVars};
use crate::error::{EvalResult, Thrown, arity_error, raise};
use crate::invoke::invoke;
use crate::node::FnDef;
use crate::rt::Rt;

struct VmFrame {
    chunk: Rc<Chunk>,
    pc: usize,
    base: usize,
}

impl VmFrame {
    fn frame_ref(&self) -> FrameRef {
        FrameRef {
            base: self.base,
            ncap: self.chunk.n_captures as usize,
            vm: true,
        }
    }
}

struct Handler {
    frame_depth: usize,
    stack_len: usize,
    catch_pc: usize,
}

enum Ctrl {
    Continue,
    Return(Value),
}

/// Compile (or fetch) the chunk for one arity.
fn ensure_chunk(rt: &Rt, def: &Rc<FnDef>, arity_idx: usize) -> Rc<Chunk> {
    let arity = &def.arities[arity_idx];
    if let Some(c) = arity.chunk.get() {
        return Rc::clone(c);
    }
    let fast = FastVars::from_env(&rt.env);
    let chunk = Rc::new(emit::compile(def, arity, &fast));
    trace!(
        name = chunk.name.map(intern::full_name).unwrap_or("<fn>"),
        ops = chunk.code.len(),
        "compiled chunk"
    );
    let _ = arity.chunk.set(Rc::clone(&chunk));
    chunk
}

fn is_closure(rt: &Rt, v: Value) -> bool {
    matches!(v.as_obj().map(|r| rt.heap.get(r)), Some(Obj::Closure(_)))
}

/// Rearrange `[... callee args...]` into a frame `[captures args lets]`
/// starting where the callee sat, and return the new frame.
fn setup_frame(rt: &mut Rt, callee: Value, argstart: usize) -> Result<VmFrame, Thrown> {
    let r = match callee.as_obj() {
        Some(r) => r,
        None => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::IllegalState,
                "vm call on a non-object".to_string(),
            ));
        }
    };
    let (def_id, captures, name) = match rt.heap.get(r) {
        Obj::Closure(c) => (c.def, c.captures.clone(), c.name),
        _ => {
            return Err(raise(
                &mut rt.heap,
                ErrKind::IllegalState,
                "vm call on a non-closure".to_string(),
            ));
        }
    };
    let def = rt.fndef(def_id);
    let nargs = rt.stack.len() - argstart;
    let arity_idx = match def
        .arities
        .iter()
        .position(|a| !a.variadic && a.params.len() == nargs)
        .or_else(|| {
            def.arities
                .iter()
                .position(|a| a.variadic && nargs >= a.params.len() - 1)
        }) {
        Some(i) => i,
        None => {
            let shown = name.map(intern::full_name).unwrap_or("fn").to_string();
            return Err(arity_error(&mut rt.heap, &shown, nargs));
        }
    };
    let chunk = ensure_chunk(rt, &def, arity_idx);

    let arity = &def.arities[arity_idx];
    let all_args: Vec<Value> = rt.stack[argstart..].to_vec();
    // Build the variadic tail while the originals are still stack-rooted.
    let rest = if arity.variadic {
        let fixed = arity.params.len() - 1;
        if all_args.len() > fixed {
            Some(rt.heap.list_value(all_args[fixed..].to_vec()))
        } else {
            Some(Value::Nil)
        }
    } else {
        None
    };

    rt.stack.truncate(argstart - 1);
    let base = rt.stack.len();
    rt.stack.extend_from_slice(&captures);
    match rest {
        Some(tail) => {
            let fixed = arity.params.len() - 1;
            rt.stack.extend_from_slice(&all_args[..fixed]);
            rt.stack.push(tail);
        }
        None => rt.stack.extend_from_slice(&all_args),
    }
    for _ in arity.params.len()..arity.n_slots as usize {
        rt.stack.push(Value::Nil);
    }
    Ok(VmFrame { chunk, pc: 0, base })
}

/// Run a closure to completion on the VM backend.
pub fn call_closure_vm(rt: &mut Rt, callee: Value, args: &[Value]) -> EvalResult {
    if rt.call_depth >= rt.limits.max_call_depth {
        return Err(raise(
            &mut rt.heap,
            ErrKind::StackOverflow,
            "vm call depth exceeded".to_string(),
        ));
    }
    rt.call_depth += 1;
    // Stage callee + args as a call site on the operand stack.
    let callsite = rt.stack.len();
    rt.stack.push(callee);
    rt.stack.extend_from_slice(args);
    let result = match setup_frame(rt, callee, callsite + 1) {
        Ok(frame) => run(rt, frame),
        Err(t) => {
            rt.stack.truncate(callsite);
            Err(t)
        }
    };
    rt.call_depth -= 1;
    result
}

fn run(rt: &mut Rt, first: VmFrame) -> EvalResult {
    let outer_base = first.base;
    let mut frames: Vec<VmFrame> = vec![first];
    let mut handlers: Vec<Handler> = Vec::new();
    rt.maybe_gc();

    loop {
        let (op, at) = {
            let f = match frames.last_mut() {
                Some(f) => f,
                None => {
                    return Err(raise(
                        &mut rt.heap,
                        ErrKind::IllegalState,
                        "vm ran out of frames".to_string(),
                    ));
                }
            };
            let at = f.pc;
            let op = f.chunk.code[at];
            f.pc += 1;
            (op, at)
        };

        match step(rt, &mut frames, &mut handlers, op) {
            Ok(Ctrl::Continue) => {}
            Ok(Ctrl::Return(v)) => return Ok(v),
            Err(t) => {
                let pos = frames
                    .last()
                    .map(|f| f.chunk.pos_at(at))
                    .unwrap_or(Pos::synthetic());
                let t = t.with_pos(pos);
                match handlers.pop() {
                    Some(h) => {
                        frames.truncate(h.frame_depth);
                        rt.stack.truncate(h.stack_len);
                        rt.stack.push(t.value);
                        if let Some(f) = frames.last_mut() {
                            f.pc = h.catch_pc;
                        }
                    }
                    None => {
                        // Unwind this run's whole stack region.
                        rt.stack.truncate(outer_base);
                        return Err(t);
                    }
                }
            }
        }
    }
}

fn step(
    rt: &mut Rt,
    frames: &mut Vec<VmFrame>,
    handlers: &mut Vec<Handler>,
    op: Op,
) -> Result<Ctrl, Thrown> {
    let (base, ncap) = {
        let f = frames.last().expect("step without a frame");
        (f.base, f.chunk.n_captures as usize)
    };
    match op {
        Op::Const(k) => {
            let v = frames.last().expect("frame").chunk.consts[k as usize];
            rt.stack.push(v);
        }
        Op::Nil => rt.stack.push(Value::Nil),
        Op::True => rt.stack.push(Value::Bool(true)),
        Op::False => rt.stack.push(Value::Bool(false)),
        Op::LoadSlot(s) => {
            let v = rt.stack[base + ncap + s as usize];
            rt.stack.push(v);
        }
        Op::StoreSlot(s) => {
            let v = rt.stack.pop().unwrap_or(Value::Nil);
            rt.stack[base + ncap + s as usize] = v;
        }
        Op::LoadCapture(i) => {
            let v = rt.stack[base + i as usize];
            rt.stack.push(v);
        }
        Op::Pop => {
            rt.stack.pop();
        }
        Op::Jump(t) => {
            frames.last_mut().expect("frame").pc = t as usize;
        }
        Op::JumpIfFalse(t) => {
            let v = rt.stack.pop().unwrap_or(Value::Nil);
            if !v.is_truthy() {
                frames.last_mut().expect("frame").pc = t as usize;
            }
        }
        Op::Call(n) => {
            if frames.len() >= rt.limits.max_call_depth {
                return Err(raise(
                    &mut rt.heap,
                    ErrKind::StackOverflow,
                    "vm frame depth exceeded".to_string(),
                ));
            }
            let argstart = rt.stack.len() - n as usize;
            let callee = rt.stack[argstart - 1];
            if is_closure(rt, callee) {
                let frame = setup_frame(rt, callee, argstart)?;
                frames.push(frame);
                rt.maybe_gc();
            } else {
                let args: Vec<Value> = rt.stack[argstart..].to_vec();
                let result = invoke(rt, callee, &args)?;
                rt.stack.truncate(argstart - 1);
                rt.stack.push(result);
            }
        }
        Op::TailCall(n) => {
            let argstart = rt.stack.len() - n as usize;
            let callee = rt.stack[argstart - 1];
            if is_closure(rt, callee) {
                let frame = setup_frame(rt, callee, argstart)?;
                // Collapse: the new frame replaces the current one at its
                // own base; relocate the region down to the caller's base.
                let old = frames.pop().expect("frame");
                let region: Vec<Value> = rt.stack[frame.base..].to_vec();
                rt.stack.truncate(old.base);
                let new_base = rt.stack.len();
                rt.stack.extend_from_slice(&region);
                frames.push(VmFrame {
                    chunk: frame.chunk,
                    pc: 0,
                    base: new_base,
                });
                rt.maybe_gc();
            } else {
                let args: Vec<Value> = rt.stack[argstart..].to_vec();
                let result = invoke(rt, callee, &args)?;
                let old = frames.pop().expect("frame");
                rt.stack.truncate(old.base);
                if frames.is_empty() {
                    return Ok(Ctrl::Return(result));
                }
                rt.stack.push(result);
            }
        }
        Op::Ret => {
            let v = rt.stack.pop().unwrap_or(Value::Nil);
            let f = frames.pop().expect("frame");
            rt.stack.truncate(f.base);
            if frames.is_empty() {
                return Ok(Ctrl::Return(v));
            }
            rt.stack.push(v);
        }
        Op::Throw => {
            let v = rt.stack.pop().unwrap_or(Value::Nil);
            return Err(Thrown::new(v));
        }
        Op::TryPush(t) => handlers.push(Handler {
            frame_depth: frames.len(),
            stack_len: rt.stack.len(),
            catch_pc: t as usize,
        }),
        Op::TryPop => {
            handlers.pop();
        }
        Op::DefVar(k) | Op::DefMacroVar(k) => {
            let v = rt.stack.pop().unwrap_or(Value::Nil);
            let (var, doc) = {
                let f = frames.last().expect("frame");
                let var = f.chunk.vars[k as usize];
                let doc = f
                    .chunk
                    .docs
                    .iter()
                    .find(|(i, _)| *i == k)
                    .map(|(_, d)| d.clone());
                (var, doc)
            };
            let is_macro = matches!(op, Op::DefMacroVar(_));
            let out = defs::do_def(rt, var, Some(v), is_macro, doc);
            rt.stack.push(out);
        }
        Op::DeclareVar(k) => {
            let var = frames.last().expect("frame").chunk.vars[k as usize];
            let out = defs::do_def(rt, var, None, false, None);
            rt.stack.push(out);
        }
        Op::VarGet(k) => {
            let var = frames.last().expect("frame").chunk.vars[k as usize];
            match rt.env.var(var).value() {
                Some(v) => rt.stack.push(v),
                None => {
                    let name = intern::full_name(rt.env.var(var).name);
                    return Err(raise(
                        &mut rt.heap,
                        ErrKind::UnboundVar,
                        format!("unbound var: {}", name),
                    ));
                }
            }
        }
        Op::MakeClosure(k) => {
            let (def_id, fr) = {
                let f = frames.last().expect("frame");
                (f.chunk.fndefs[k as usize], f.frame_ref())
            };
            let c = defs::make_closure(rt, def_id, fr);
            rt.stack.push(c);
        }
        Op::FillCaptures => {
            let c = rt.stack.pop().unwrap_or(Value::Nil);
            let fr = frames.last().expect("frame").frame_ref();
            defs::refill_captures(rt, c, fr);
        }
        Op::MakeLazy(k) => {
            let (def_id, fr) = {
                let f = frames.last().expect("frame");
                (f.chunk.fndefs[k as usize], f.frame_ref())
            };
            let v = defs::make_lazy(rt, def_id, fr);
            rt.stack.push(v);
        }
        Op::Recur(n) => {
            let n = n as usize;
            let vals_start = rt.stack.len() - n;
            for i in 0..n {
                rt.stack[base + ncap + i] = rt.stack[vals_start + i];
            }
            let n_slots = frames.last().expect("frame").chunk.n_slots as usize;
            rt.stack.truncate(base + ncap + n_slots);
            frames.last_mut().expect("frame").pc = 0;
            rt.maybe_gc();
        }
        Op::Safepoint => rt.maybe_gc(),
        Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Lt | Op::Le | Op::Gt | Op::Ge
        | Op::NumEq | Op::Eq => {
            let b = rt.stack.pop().unwrap_or(Value::Nil);
            let a = rt.stack.pop().unwrap_or(Value::Nil);
            let result = fast_op(rt, op, a, b)?;
            rt.stack.push(result);
        }
        Op::Seq(kind, argc) => {
            let argstart = rt.stack.len() - argc as usize;
            let args: Vec<Value> = rt.stack[argstart..].to_vec();
            let result = seq_ops::dispatch_seq_op(rt, kind, &args)?;
            rt.stack.truncate(argstart);
            rt.stack.push(result);
        }
        Op::Swap(argc) => {
            let argstart = rt.stack.len() - argc as usize;
            let args: Vec<Value> = rt.stack[argstart..].to_vec();
            let result = atom_ops::swap_in_place(rt, &args)?;
            rt.stack.truncate(argstart);
            rt.stack.push(result);
        }
        Op::Apply(argc) => {
            let argstart = rt.stack.len() - argc as usize;
            let args: Vec<Value> = rt.stack[argstart..].to_vec();
            let result = seq_ops::apply(rt, &args)?;
            rt.stack.truncate(argstart);
            rt.stack.push(result);
        }
        Op::MakePartial(argc) => {
            let argstart = rt.stack.len() - argc as usize;
            let f = rt.stack[argstart];
            let fixed = rt.stack[argstart + 1..].to_vec();
            let v = Value::Obj(rt.heap.alloc(Obj::Partial(clove_core::PartialObj {
                f,
                args: fixed,
            })));
            rt.stack.truncate(argstart);
            rt.stack.push(v);
        }
        Op::MakeComp(argc) => {
            let argstart = rt.stack.len() - argc as usize;
            let fns = rt.stack[argstart..].to_vec();
            let v = Value::Obj(rt.heap.alloc(Obj::Comp(clove_core::CompObj { fns })));
            rt.stack.truncate(argstart);
            rt.stack.push(v);
        }
        Op::DefMulti(i) => {
            let (var, name) = frames.last().expect("frame").chunk.multi_defs[i as usize];
            let dispatch = rt.stack.pop().unwrap_or(Value::Nil);
            let mark = rt.temp_mark();
            rt.push_temp(dispatch);
            let out = defs::do_defmulti(rt, var, name, dispatch);
            rt.truncate_temps(mark);
            rt.stack.push(out);
        }
        Op::DefMethod(k) => {
            let var = frames.last().expect("frame").chunk.vars[k as usize];
            let method = rt.stack.pop().unwrap_or(Value::Nil);
            let dval = rt.stack.pop().unwrap_or(Value::Nil);
            let mark = rt.temp_mark();
            rt.push_temp(method);
            rt.push_temp(dval);
            let out = defs::do_defmethod(rt, var, dval, method);
            rt.truncate_temps(mark);
            rt.stack.push(out?);
        }
        Op::DefProtocol(i) => {
            let plan = frames.last().expect("frame").chunk.proto_defs[i as usize].clone();
            let sigs: Vec<crate::node::ProtoSig> = plan
                .sigs
                .iter()
                .map(|(m, v)| crate::node::ProtoSig { method: *m, var: *v })
                .collect();
            let out = defs::do_defprotocol(rt, plan.var, plan.name, &sigs);
            rt.stack.push(out);
        }
        Op::ExtendType(i) => {
            let plan = frames.last().expect("frame").chunk.extend_defs[i as usize].clone();
            let total: usize = plan.protos.iter().map(|m| 1 + m.len()).sum();
            let start = rt.stack.len() - total;
            let mut cursor = start;
            for methods in &plan.protos {
                let proto = rt.stack[cursor];
                cursor += 1;
                let mut resolved = Vec::with_capacity(methods.len());
                for m in methods {
                    resolved.push((*m, rt.stack[cursor]));
                    cursor += 1;
                }
                defs::do_extend_type(rt, plan.tag, proto, &resolved)?;
            }
            rt.stack.truncate(start);
            rt.stack.push(Value::Nil);
        }
        Op::BindingPush(k) => {
            let var = frames.last().expect("frame").chunk.vars[k as usize];
            let v = rt.stack.pop().unwrap_or(Value::Nil);
            if !rt.env.var(var).meta.is_dynamic {
                let name = intern::full_name(rt.env.var(var).name);
                return Err(raise(
                    &mut rt.heap,
                    ErrKind::IllegalState,
                    format!("binding target {} is not dynamic", name),
                ));
            }
            rt.env.var_mut(var).dyn_stack.push(v);
        }
        Op::BindingPop(k) => {
            let var = frames.last().expect("frame").chunk.vars[k as usize];
            rt.env.var_mut(var).dyn_stack.pop();
        }
        Op::InNs(i) => {
            let name = frames.last().expect("frame").chunk.ns_names[i as usize];
            let out = defs::do_in_ns(rt, name);
            rt.stack.push(out);
        }
    }
    Ok(Ctrl::Continue)
}

/// Dedicated arithmetic/compare path: immediate for int/int and
/// float-involved pairs, generic builtin otherwise (for the error paths).
fn fast_op(rt: &mut Rt, op: Op, a: Value, b: Value) -> EvalResult {
    use crate::builtins::arithmetic as ar;
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        match op {
            Op::Add => {
                if let Some(n) = x.checked_add(y) {
                    return Ok(Value::Int(n));
                }
            }
            Op::Sub => {
                if let Some(n) = x.checked_sub(y) {
                    return Ok(Value::Int(n));
                }
            }
            Op::Mul => {
                if let Some(n) = x.checked_mul(y) {
                    return Ok(Value::Int(n));
                }
            }
            Op::Lt => return Ok(Value::Bool(x < y)),
            Op::Le => return Ok(Value::Bool(x <= y)),
            Op::Gt => return Ok(Value::Bool(x > y)),
            Op::Ge => return Ok(Value::Bool(x >= y)),
            Op::NumEq | Op::Eq => return Ok(Value::Bool(x == y)),
            _ => {}
        }
    }
    let args = [a, b];
    match op {
        Op::Add => ar::add(rt, &args),
        Op::Sub => ar::sub(rt, &args),
        Op::Mul => ar::mul(rt, &args),
        Op::Div => ar::div(rt, &args),
        Op::Lt => ar::lt(rt, &args),
        Op::Le => ar::le(rt, &args),
        Op::Gt => ar::gt(rt, &args),
        Op::Ge => ar::ge(rt, &args),
        Op::NumEq => ar::num_eq(rt, &args),
        Op::Eq => crate::builtins::core_ops::eq(rt, &args),
        other => Err(raise(
            &mut rt.heap,
            ErrKind::IllegalState,
            format!("fast_op on non-arithmetic op {:?}", other),
        )),
    }
}
