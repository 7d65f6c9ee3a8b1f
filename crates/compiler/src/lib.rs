//! Clove Compiler: reader, analyzer, and the driver pipeline.
//!
//! Data flows strictly: source text -> Form -> Node -> Value. `Session`
//! owns the runtime state and drives the pipeline form by form, so an
//! `(ns ...)` switch affects how later forms in the same source read and
//! analyze.
//!
//! Compare mode runs the evaluator and the VM on the same Node and demands
//! structurally equal results (or equal error kinds) per top-level form;
//! it is the correctness oracle for the two backends.

pub mod analyzer;
pub mod config;
pub mod destructure;
pub mod form;
pub mod macros;
pub mod quasi;
pub mod reader;

pub use analyzer::{Analyzer, AnalyzerError, analyze_top};
pub use config::{ConfigFile, load_limits};
pub use form::{Form, FormKind};
pub use reader::{Reader, ReaderError, ReaderErrorKind, ReaderLimits};

use clove_core::{ErrKind, FnDefId, Pos, Value, intern};
use clove_runtime::defs::FrameRef;
use clove_runtime::emit::{self, FastVars};
use clove_runtime::rt::{Backend, Limits, Rt};
use clove_runtime::{Thrown, chunk, defs, eq, invoke, print};
use std::path::Path;

/// Driver-level error: which domain failed, and how the process should
/// exit.
#[derive(Debug)]
pub enum CloveError {
    Reader(ReaderError),
    Analyzer(AnalyzerError),
    Runtime {
        kind: ErrKind,
        message: String,
        pos: Pos,
    },
    CompareMismatch {
        pos: Pos,
        treewalk: String,
        vm: String,
    },
    Io(String),
}

impl CloveError {
    /// 1 uncaught evaluation error, 2 read/analyze error, 3 compare
    /// mismatch.
    pub fn exit_code(&self) -> i32 {
        match self {
            CloveError::Runtime { .. } => 1,
            CloveError::Reader(_) | CloveError::Analyzer(_) | CloveError::Io(_) => 2,
            CloveError::CompareMismatch { .. } => 3,
        }
    }
}

impl std::fmt::Display for CloveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloveError::Reader(e) => write!(f, "read error: {}", e),
            CloveError::Analyzer(e) => write!(f, "{}", e),
            CloveError::Runtime { kind, message, pos } => {
                if pos.is_known() {
                    write!(f, "{} at {}: {}", kind.as_str(), pos, message)
                } else {
                    write!(f, "{}: {}", kind.as_str(), message)
                }
            }
            CloveError::CompareMismatch { pos, treewalk, vm } => write!(
                f,
                "backend divergence at {}: treewalk produced {} but vm produced {}",
                pos, treewalk, vm
            ),
            CloveError::Io(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CloveError {}

impl From<ReaderError> for CloveError {
    fn from(e: ReaderError) -> Self {
        CloveError::Reader(e)
    }
}

impl From<AnalyzerError> for CloveError {
    fn from(e: AnalyzerError) -> Self {
        CloveError::Analyzer(e)
    }
}

/// One interactive or batch execution context.
pub struct Session {
    pub rt: Rt,
}

impl Session {
    pub fn new(limits: Limits) -> Self {
        Session {
            rt: Rt::new(limits),
        }
    }

    pub fn with_backend(limits: Limits, backend: Backend) -> Self {
        let mut s = Session::new(limits);
        s.rt.backend = backend;
        s
    }

    fn reader_limits(&self) -> ReaderLimits {
        ReaderLimits {
            max_depth: self.rt.limits.reader_depth,
            max_forms: self.rt.limits.reader_forms,
        }
    }

    fn current_ns(&self) -> &'static str {
        intern::full_name(self.rt.env.current_ns)
    }

    /// Read, analyze, and run every form; the last result wins.
    pub fn eval_str(&mut self, src: &str) -> Result<Value, CloveError> {
        let mut reader = Reader::new(src, self.current_ns(), self.reader_limits());
        let mut last = Value::Nil;
        loop {
            reader.set_current_ns(self.current_ns());
            match reader.read_one()? {
                None => return Ok(last),
                Some(form) => last = self.eval_form(&form)?,
            }
        }
    }

    pub fn eval_form(&mut self, form: &Form) -> Result<Value, CloveError> {
        tracing::trace!(pos = %form.pos, "evaluating top-level form");
        let def = analyze_top(&mut self.rt, form)?;
        self.run_def(def).map_err(|t| self.runtime_error(t))
    }

    pub fn eval_file(&mut self, path: &Path) -> Result<Value, CloveError> {
        let src = std::fs::read_to_string(path)
            .map_err(|e| CloveError::Io(format!("could not read {}: {}", path.display(), e)))?;
        self.eval_str(&src)
    }

    fn run_def(&mut self, def: FnDefId) -> Result<Value, Thrown> {
        let mark = self.rt.temp_mark();
        // Top-level definitions have no captures; the frame view is unused.
        let frame = FrameRef {
            base: self.rt.locals.len(),
            ncap: 0,
            vm: false,
        };
        let closure = defs::make_closure(&mut self.rt, def, frame);
        self.rt.push_temp(closure);
        let result = invoke(&mut self.rt, closure, &[]);
        self.rt.truncate_temps(mark);
        result
    }

    pub fn runtime_error(&mut self, t: Thrown) -> CloveError {
        let kind = t.kind(&self.rt.heap);
        let message = match self.rt.heap.try_error(t.value) {
            Some(e) => {
                let base = e.message.to_string();
                let data = e.data;
                if data.is_nil() {
                    base
                } else {
                    let shown = print::pr_str(&mut self.rt, data)
                        .unwrap_or_else(|_| "?".to_string());
                    format!("{} {}", base, shown)
                }
            }
            None => print::pr_str(&mut self.rt, t.value).unwrap_or_else(|_| "?".to_string()),
        };
        CloveError::Runtime {
            kind,
            message,
            pos: t.pos,
        }
    }

    /// Differential execution: both backends per form, structural equality
    /// (or matching error kinds) demanded.
    pub fn compare_str(&mut self, src: &str) -> Result<Value, CloveError> {
        let mut reader = Reader::new(src, self.current_ns(), self.reader_limits());
        let mut last = Value::Nil;
        loop {
            reader.set_current_ns(self.current_ns());
            let form = match reader.read_one()? {
                None => return Ok(last),
                Some(f) => f,
            };
            let def = analyze_top(&mut self.rt, &form)?;

            self.rt.backend = Backend::Treewalk;
            let tree = self.run_def(def);
            self.rt.backend = Backend::Vm;
            let vm = self.run_def(def);
            self.rt.backend = Backend::Treewalk;

            match (tree, vm) {
                (Ok(a), Ok(b)) => {
                    let mark = self.rt.temp_mark();
                    self.rt.push_temp(a);
                    self.rt.push_temp(b);
                    let equal = eq::value_eq(&mut self.rt, a, b);
                    self.rt.truncate_temps(mark);
                    match equal {
                        Ok(true) => last = a,
                        Ok(false) => {
                            let left = print::pr_str(&mut self.rt, a)
                                .unwrap_or_else(|_| "?".to_string());
                            let right = print::pr_str(&mut self.rt, b)
                                .unwrap_or_else(|_| "?".to_string());
                            return Err(CloveError::CompareMismatch {
                                pos: form.pos,
                                treewalk: left,
                                vm: right,
                            });
                        }
                        Err(t) => return Err(self.runtime_error(t)),
                    }
                }
                (Err(t1), Err(t2)) => {
                    let (k1, k2) = (t1.kind(&self.rt.heap), t2.kind(&self.rt.heap));
                    if k1 == k2 {
                        // Agreement on failure is still a program error.
                        return Err(self.runtime_error(t1));
                    }
                    return Err(CloveError::CompareMismatch {
                        pos: form.pos,
                        treewalk: format!("error: {}", k1.as_str()),
                        vm: format!("error: {}", k2.as_str()),
                    });
                }
                (Ok(a), Err(t)) => {
                    let left =
                        print::pr_str(&mut self.rt, a).unwrap_or_else(|_| "?".to_string());
                    return Err(CloveError::CompareMismatch {
                        pos: form.pos,
                        treewalk: left,
                        vm: format!("error: {}", t.kind(&self.rt.heap).as_str()),
                    });
                }
                (Err(t), Ok(b)) => {
                    let right =
                        print::pr_str(&mut self.rt, b).unwrap_or_else(|_| "?".to_string());
                    return Err(CloveError::CompareMismatch {
                        pos: form.pos,
                        treewalk: format!("error: {}", t.kind(&self.rt.heap).as_str()),
                        vm: right,
                    });
                }
            }
        }
    }

    /// Compile without running; returns the disassembly of every chunk the
    /// source produces (top-level forms and nested fns).
    pub fn dump_bytecode_str(&mut self, src: &str) -> Result<String, CloveError> {
        let mut reader = Reader::new(src, self.current_ns(), self.reader_limits());
        let mut out = String::new();
        loop {
            reader.set_current_ns(self.current_ns());
            let form = match reader.read_one()? {
                None => return Ok(out),
                Some(f) => f,
            };
            let first_def = self.rt.fndefs.len();
            analyze_top(&mut self.rt, &form)?;
            for i in first_def..self.rt.fndefs.len() {
                let def = self.rt.fndef(FnDefId(i as u32));
                let fast = FastVars::from_env(&self.rt.env);
                for arity in &def.arities {
                    let compiled = emit::compile(&def, arity, &fast);
                    let mut previews = Vec::with_capacity(compiled.consts.len());
                    for &c in &compiled.consts {
                        previews.push(
                            print::pr_str(&mut self.rt, c)
                                .unwrap_or_else(|_| "?".to_string()),
                        );
                    }
                    out.push_str(&chunk::disassemble(&compiled, &previews));
                    out.push('\n');
                }
            }
        }
    }

    /// Pretty-print a value the way the REPL does.
    pub fn print_value(&mut self, v: Value) -> String {
        print::pr_str(&mut self.rt, v).unwrap_or_else(|_| "#<unprintable>".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(Limits::default())
    }

    #[test]
    fn test_eval_str_basic() {
        let mut s = session();
        let v = s.eval_str("(+ 1 2)").unwrap();
        assert_eq!(v, Value::Int(3));
    }

    #[test]
    fn test_reader_error_exit_code() {
        let mut s = session();
        let e = s.eval_str("(unclosed").unwrap_err();
        assert_eq!(e.exit_code(), 2);
    }

    #[test]
    fn test_runtime_error_exit_code() {
        let mut s = session();
        let e = s.eval_str("(/ 1 0)").unwrap_err();
        assert_eq!(e.exit_code(), 1);
    }

    #[test]
    fn test_compare_agrees_on_pure_program() {
        let mut s = session();
        let v = s.compare_str("(reduce + (range 1 101))").unwrap();
        assert_eq!(v, Value::Int(5050));
    }

    #[test]
    fn test_dump_bytecode_lists_chunks() {
        let mut s = session();
        let text = s.dump_bytecode_str("(defn f [x] (+ x 1))").unwrap();
        assert!(text.contains("Ret"));
    }
}
