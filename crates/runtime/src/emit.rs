//! The bytecode compiler: Node -> Chunk.
//!
//! One chunk per function arity, compiled lazily on first VM call and
//! cached on the definition. Compilation is pure over the node tree except
//! for the fast-op table, which pins the core arithmetic vars so that
//! `(+ a b)` with the unshadowed core `+` emits a dedicated instruction
//! instead of the generic call path.
//!
//! `try`/`finally` compiles without any subroutine mechanism: the finally
//! block is duplicated on the normal path, the catch path, and the
//! rethrow path.

use clove_core::{Value, VarId, intern};

use crate::chunk::{Chunk, ExtendPlan, Op, ProtoPlan};
use crate::env::Env;
use crate::node::{FnArity, FnDef, Node, NodeKind};

/// Core vars whose 2-argument calls compile to dedicated instructions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FastVars {
    add: Option<VarId>,
    sub: Option<VarId>,
    mul: Option<VarId>,
    div: Option<VarId>,
    lt: Option<VarId>,
    le: Option<VarId>,
    gt: Option<VarId>,
    ge: Option<VarId>,
    num_eq: Option<VarId>,
    eq: Option<VarId>,
}

impl FastVars {
    pub fn from_env(env: &Env) -> Self {
        let core = env.core_ns();
        // Pin the core vars themselves: a shadowing user `+` resolves to a
        // different var and keeps the generic call path.
        let lookup = |name: &str| {
            let sym = intern::intern_name(name);
            env.lookup_ns(core, sym)
        };
        FastVars {
            add: lookup("+"),
            sub: lookup("-"),
            mul: lookup("*"),
            div: lookup("/"),
            lt: lookup("<"),
            le: lookup("<="),
            gt: lookup(">"),
            ge: lookup(">="),
            num_eq: lookup("=="),
            eq: lookup("="),
        }
    }

    fn op_for(&self, var: VarId) -> Option<Op> {
        let v = Some(var);
        if v == self.add {
            Some(Op::Add)
        } else if v == self.sub {
            Some(Op::Sub)
        } else if v == self.mul {
            Some(Op::Mul)
        } else if v == self.div {
            Some(Op::Div)
        } else if v == self.lt {
            Some(Op::Lt)
        } else if v == self.le {
            Some(Op::Le)
        } else if v == self.gt {
            Some(Op::Gt)
        } else if v == self.ge {
            Some(Op::Ge)
        } else if v == self.num_eq {
            Some(Op::NumEq)
        } else if v == self.eq {
            Some(Op::Eq)
        } else {
            None
        }
    }
}

struct LoopCtx {
    start: u32,
    slots: Vec<u16>,
}

struct Emitter<'a> {
    chunk: Chunk,
    fast: &'a FastVars,
    loops: Vec<LoopCtx>,
}

pub fn compile(def: &FnDef, arity: &FnArity, fast: &FastVars) -> Chunk {
    let mut e = Emitter {
        chunk: Chunk {
            name: def.name,
            n_params: arity.params.len() as u16,
            variadic: arity.variadic,
            n_slots: arity.n_slots,
            n_captures: def.captures.len() as u16,
            ..Chunk::default()
        },
        fast,
        loops: Vec::new(),
    };
    e.emit_body(&arity.body, true);
    e.chunk.emit(Op::Ret, def.pos);
    e.chunk
}

impl Emitter<'_> {
    fn emit_body(&mut self, body: &[Node], tail: bool) {
        match body.split_last() {
            None => {
                self.chunk.emit(Op::Nil, clove_core::Pos::synthetic());
            }
            Some((last, rest)) => {
                for stmt in rest {
                    self.emit_node(stmt, false);
                    self.chunk.emit(Op::Pop, stmt.pos);
                }
                self.emit_node(last, tail);
            }
        }
    }

    fn emit_node(&mut self, node: &Node, tail: bool) {
        let pos = node.pos;
        match &node.kind {
            NodeKind::Const(v) => {
                match v {
                    Value::Nil => {
                        self.chunk.emit(Op::Nil, pos);
                    }
                    Value::Bool(true) => {
                        self.chunk.emit(Op::True, pos);
                    }
                    Value::Bool(false) => {
                        self.chunk.emit(Op::False, pos);
                    }
                    other => {
                        let k = self.chunk.add_const(*other);
                        self.chunk.emit(Op::Const(k), pos);
                    }
                };
            }
            NodeKind::VarRef(id) => {
                let k = self.chunk.add_var(*id);
                self.chunk.emit(Op::VarGet(k), pos);
            }
            NodeKind::LocalRef { slot } => {
                self.chunk.emit(Op::LoadSlot(*slot), pos);
            }
            NodeKind::CaptureRef { idx } => {
                self.chunk.emit(Op::LoadCapture(*idx), pos);
            }
            NodeKind::If { test, then, els } => {
                self.emit_node(test, false);
                let to_else = self.chunk.emit_jump(Op::JumpIfFalse(0), pos);
                self.emit_node(then, tail);
                let to_end = self.chunk.emit_jump(Op::Jump(0), pos);
                self.chunk.patch_jump(to_else);
                match els {
                    Some(e) => self.emit_node(e, tail),
                    None => {
                        self.chunk.emit(Op::Nil, pos);
                    }
                }
                self.chunk.patch_jump(to_end);
            }
            NodeKind::Do(stmts) => self.emit_body(stmts, tail),
            NodeKind::Let {
                bindings,
                body,
                is_loop,
            } => {
                for (_, slot, init) in bindings {
                    self.emit_node(init, false);
                    self.chunk.emit(Op::StoreSlot(*slot), init.pos);
                }
                if *is_loop {
                    self.loops.push(LoopCtx {
                        start: self.chunk.here(),
                        slots: bindings.iter().map(|(_, s, _)| *s).collect(),
                    });
                    // The loop body is a recur target; its result is the
                    // loop's value regardless of surrounding tail position.
                    self.emit_body(body, false);
                    self.loops.pop();
                } else {
                    self.emit_body(body, tail);
                }
            }
            NodeKind::Recur(args) => {
                for a in args {
                    self.emit_node(a, false);
                }
                match self.loops.last() {
                    Some(ctx) => {
                        let slots = ctx.slots.clone();
                        let start = ctx.start;
                        // Stores run right-to-left so stack order matches
                        // binding order.
                        for slot in slots.iter().rev() {
                            self.chunk.emit(Op::StoreSlot(*slot), pos);
                        }
                        self.chunk.emit(Op::Safepoint, pos);
                        self.chunk.emit(Op::Jump(start), pos);
                    }
                    None => {
                        self.chunk.emit(Op::Recur(args.len() as u8), pos);
                    }
                }
            }
            NodeKind::Fn { def } => {
                let k = self.chunk.add_fndef(*def);
                self.chunk.emit(Op::MakeClosure(k), pos);
            }
            NodeKind::LetFn { bindings, body } => {
                for (_, slot, def_id) in bindings {
                    let k = self.chunk.add_fndef(*def_id);
                    self.chunk.emit(Op::MakeClosure(k), pos);
                    self.chunk.emit(Op::StoreSlot(*slot), pos);
                }
                for (_, slot, _) in bindings {
                    self.chunk.emit(Op::LoadSlot(*slot), pos);
                    self.chunk.emit(Op::FillCaptures, pos);
                }
                self.emit_body(body, tail);
            }
            NodeKind::Call { callee, args } => {
                // Two-argument calls of pinned core arithmetic vars take the
                // dedicated instruction.
                if args.len() == 2 {
                    if let NodeKind::VarRef(id) = &callee.kind {
                        if let Some(op) = self.fast.op_for(*id) {
                            self.emit_node(&args[0], false);
                            self.emit_node(&args[1], false);
                            self.chunk.emit(op, pos);
                            return;
                        }
                    }
                }
                self.emit_node(callee, false);
                for a in args {
                    self.emit_node(a, false);
                }
                let op = if tail {
                    Op::TailCall(args.len() as u8)
                } else {
                    Op::Call(args.len() as u8)
                };
                self.chunk.emit(op, pos);
            }
            NodeKind::Def {
                var,
                init,
                is_macro,
                doc,
            } => {
                let k = self.chunk.add_var(*var);
                if let Some(d) = doc {
                    self.chunk.docs.push((k, d.clone()));
                }
                match init {
                    Some(n) => {
                        self.emit_node(n, false);
                        let op = if *is_macro {
                            Op::DefMacroVar(k)
                        } else {
                            Op::DefVar(k)
                        };
                        self.chunk.emit(op, pos);
                    }
                    None => {
                        self.chunk.emit(Op::DeclareVar(k), pos);
                    }
                }
            }
            NodeKind::Throw(e) => {
                self.emit_node(e, false);
                self.chunk.emit(Op::Throw, pos);
            }
            NodeKind::Try {
                body,
                catch,
                finally,
            } => self.emit_try(body, catch.as_ref(), finally.as_deref(), pos),
            NodeKind::Apply { callee, args } => {
                self.emit_node(callee, false);
                for a in args {
                    self.emit_node(a, false);
                }
                self.chunk.emit(Op::Apply((args.len() + 1) as u8), pos);
            }
            NodeKind::Partial { callee, args } => {
                self.emit_node(callee, false);
                for a in args {
                    self.emit_node(a, false);
                }
                self.chunk.emit(Op::MakePartial((args.len() + 1) as u8), pos);
            }
            NodeKind::Comp(fns) => {
                for f in fns {
                    self.emit_node(f, false);
                }
                self.chunk.emit(Op::MakeComp(fns.len() as u8), pos);
            }
            NodeKind::SeqOp { op, args } => {
                for a in args {
                    self.emit_node(a, false);
                }
                self.chunk.emit(Op::Seq(*op, args.len() as u8), pos);
            }
            NodeKind::Swap(args) => {
                for a in args {
                    self.emit_node(a, false);
                }
                self.chunk.emit(Op::Swap(args.len() as u8), pos);
            }
            NodeKind::DefMulti {
                var,
                name,
                dispatch,
            } => {
                self.emit_node(dispatch, false);
                self.chunk.multi_defs.push((*var, *name));
                let i = (self.chunk.multi_defs.len() - 1) as u16;
                self.chunk.emit(Op::DefMulti(i), pos);
            }
            NodeKind::DefMethod {
                var,
                dispatch_val,
                method,
            } => {
                let k = self.chunk.add_var(*var);
                self.emit_node(dispatch_val, false);
                self.emit_node(method, false);
                self.chunk.emit(Op::DefMethod(k), pos);
            }
            NodeKind::DefProtocol { var, name, sigs } => {
                self.chunk.proto_defs.push(ProtoPlan {
                    var: *var,
                    name: *name,
                    sigs: sigs.iter().map(|s| (s.method, s.var)).collect(),
                });
                let i = (self.chunk.proto_defs.len() - 1) as u16;
                self.chunk.emit(Op::DefProtocol(i), pos);
            }
            NodeKind::ExtendType { tag, impls } => {
                let mut plan = ExtendPlan {
                    tag: *tag,
                    protos: Vec::with_capacity(impls.len()),
                };
                for (proto_node, methods) in impls {
                    self.emit_node(proto_node, false);
                    for (_, mnode) in methods {
                        self.emit_node(mnode, false);
                    }
                    plan.protos.push(methods.iter().map(|(m, _)| *m).collect());
                }
                self.chunk.extend_defs.push(plan);
                let i = (self.chunk.extend_defs.len() - 1) as u16;
                self.chunk.emit(Op::ExtendType(i), pos);
            }
            NodeKind::Binding { pairs, body } => {
                for (var, init) in pairs {
                    self.emit_node(init, false);
                    let k = self.chunk.add_var(*var);
                    self.chunk.emit(Op::BindingPush(k), pos);
                }
                let protect = self.chunk.emit_jump(Op::TryPush(0), pos);
                self.emit_body(body, false);
                self.chunk.emit(Op::TryPop, pos);
                for (var, _) in pairs.iter().rev() {
                    let k = self.chunk.add_var(*var);
                    self.chunk.emit(Op::BindingPop(k), pos);
                }
                let done = self.chunk.emit_jump(Op::Jump(0), pos);
                self.chunk.patch_jump(protect);
                for (var, _) in pairs.iter().rev() {
                    let k = self.chunk.add_var(*var);
                    self.chunk.emit(Op::BindingPop(k), pos);
                }
                self.chunk.emit(Op::Throw, pos);
                self.chunk.patch_jump(done);
            }
            NodeKind::LazySeq { def } => {
                let k = self.chunk.add_fndef(*def);
                self.chunk.emit(Op::MakeLazy(k), pos);
            }
            NodeKind::InNs { name } => {
                self.chunk.ns_names.push(*name);
                let i = (self.chunk.ns_names.len() - 1) as u16;
                self.chunk.emit(Op::InNs(i), pos);
            }
        }
    }

    /// try/catch/finally with the finally block duplicated per exit path.
    fn emit_try(
        &mut self,
        body: &[Node],
        catch: Option<&crate::node::CatchClause>,
        finally: Option<&[Node]>,
        pos: clove_core::Pos,
    ) {
        let emit_finally = |e: &mut Self| {
            if let Some(f) = finally {
                for stmt in f {
                    e.emit_node(stmt, false);
                    e.chunk.emit(Op::Pop, stmt.pos);
                }
            }
        };

        let protect = self.chunk.emit_jump(Op::TryPush(0), pos);
        self.emit_body(body, false);
        self.chunk.emit(Op::TryPop, pos);
        emit_finally(self);
        let done_normal = self.chunk.emit_jump(Op::Jump(0), pos);

        // Handler target: the thrown value is on the stack.
        self.chunk.patch_jump(protect);
        match catch {
            Some(c) => {
                self.chunk.emit(Op::StoreSlot(c.slot), pos);
                // Protect the catch body so the finally still runs if it
                // throws.
                let protect_catch = self.chunk.emit_jump(Op::TryPush(0), pos);
                self.emit_body(&c.body, false);
                self.chunk.emit(Op::TryPop, pos);
                emit_finally(self);
                let done_catch = self.chunk.emit_jump(Op::Jump(0), pos);

                self.chunk.patch_jump(protect_catch);
                emit_finally(self);
                self.chunk.emit(Op::Throw, pos);

                self.chunk.patch_jump(done_catch);
                self.chunk.patch_jump(done_normal);
            }
            None => {
                emit_finally(self);
                self.chunk.emit(Op::Throw, pos);
                self.chunk.patch_jump(done_normal);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clove_core::Pos;
    use std::cell::OnceCell;

    fn arity_of(body: Vec<Node>, n_slots: u16) -> FnArity {
        FnArity {
            params: vec![],
            variadic: false,
            body,
            n_slots,
            chunk: OnceCell::new(),
        }
    }

    fn def_of(arity: FnArity) -> FnDef {
        FnDef {
            name: None,
            arities: vec![arity],
            captures: vec![],
            pos: Pos::synthetic(),
        }
    }

    fn node(kind: NodeKind) -> Node {
        Node::new(kind, Pos::new(1, 1))
    }

    #[test]
    fn test_constant_body() {
        let def = def_of(arity_of(vec![node(NodeKind::Const(Value::Int(7)))], 0));
        let chunk = compile(&def, &def.arities[0], &FastVars::default());
        assert_eq!(chunk.code[0], Op::Const(0));
        assert_eq!(chunk.code[1], Op::Ret);
        assert_eq!(chunk.consts[0], Value::Int(7));
    }

    #[test]
    fn test_if_patches_jumps() {
        let def = def_of(arity_of(
            vec![node(NodeKind::If {
                test: Box::new(node(NodeKind::Const(Value::Bool(true)))),
                then: Box::new(node(NodeKind::Const(Value::Int(1)))),
                els: Some(Box::new(node(NodeKind::Const(Value::Int(2))))),
            })],
            0,
        ));
        let chunk = compile(&def, &def.arities[0], &FastVars::default());
        // True, JumpIfFalse -> else, Const 1, Jump -> end, Const 2, Ret
        match chunk.code[1] {
            Op::JumpIfFalse(target) => assert_eq!(target, 4),
            other => panic!("expected JumpIfFalse, got {:?}", other),
        }
        match chunk.code[3] {
            Op::Jump(target) => assert_eq!(target, 5),
            other => panic!("expected Jump, got {:?}", other),
        }
    }

    #[test]
    fn test_tail_call_emitted() {
        let def = def_of(arity_of(
            vec![node(NodeKind::Call {
                callee: Box::new(node(NodeKind::LocalRef { slot: 0 })),
                args: vec![],
            })],
            1,
        ));
        let chunk = compile(&def, &def.arities[0], &FastVars::default());
        assert!(chunk.code.contains(&Op::TailCall(0)));
    }

    #[test]
    fn test_loop_recur_jumps_back() {
        let def = def_of(arity_of(
            vec![node(NodeKind::Let {
                bindings: vec![(clove_core::intern::intern_name("i"), 0, node(NodeKind::Const(Value::Int(0))))],
                body: vec![node(NodeKind::Recur(vec![node(NodeKind::Const(Value::Int(1)))]))],
                is_loop: true,
            })],
            1,
        ));
        let chunk = compile(&def, &def.arities[0], &FastVars::default());
        assert!(chunk.code.contains(&Op::Safepoint));
        // The back-jump targets the loop start (after the initial store).
        let back = chunk
            .code
            .iter()
            .find_map(|op| match op {
                Op::Jump(t) => Some(*t),
                _ => None,
            })
            .expect("loop should emit a back-jump");
        assert_eq!(back, 2);
    }
}
