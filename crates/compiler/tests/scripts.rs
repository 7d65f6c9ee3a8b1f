//! Loading source files through the driver.

use clove_compiler::{CloveError, Session};
use clove_runtime::{Backend, Limits};
use std::io::Write;

fn write_script(content: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new()
        .suffix(".clv")
        .tempfile()
        .expect("create temp script");
    f.write_all(content.as_bytes()).expect("write script");
    f
}

#[test]
fn test_eval_file_returns_last_value() {
    let script = write_script(
        "(defn square [x] (* x x))\n\
         (def answer (square 7))\n\
         answer\n",
    );
    let mut s = Session::new(Limits::default());
    let v = s.eval_file(script.path()).expect("file evaluates");
    assert_eq!(s.print_value(v), "49");
}

#[test]
fn test_file_definitions_persist_in_session() {
    let script = write_script("(defn triple [x] (* 3 x))\n");
    let mut s = Session::new(Limits::default());
    s.eval_file(script.path()).expect("file evaluates");
    let v = s.eval_str("(triple 5)").expect("uses file defn");
    assert_eq!(s.print_value(v), "15");
}

#[test]
fn test_missing_file_is_an_io_error() {
    let mut s = Session::new(Limits::default());
    let e = s
        .eval_file(std::path::Path::new("/no/such/clove/file.clv"))
        .unwrap_err();
    assert!(matches!(e, CloveError::Io(_)));
    assert_eq!(e.exit_code(), 2);
}

#[test]
fn test_file_with_ns_switch() {
    let script = write_script(
        "(ns scripts.demo)\n\
         (def local ::here)\n\
         (name local)\n",
    );
    let mut s = Session::new(Limits::default());
    let v = s.eval_file(script.path()).expect("file evaluates");
    assert_eq!(s.print_value(v), "\"here\"");
}

#[test]
fn test_file_on_vm_backend() {
    let script = write_script(
        "(defn sum-to [n] (reduce + (range (inc n))))\n\
         (sum-to 100)\n",
    );
    let mut s = Session::with_backend(Limits::default(), Backend::Vm);
    let v = s.eval_file(script.path()).expect("file evaluates on vm");
    assert_eq!(s.print_value(v), "5050");
}

#[test]
fn test_reader_error_reports_file_position() {
    let script = write_script("(+ 1 2)\n(oops \"unterminated\n");
    let mut s = Session::new(Limits::default());
    match s.eval_file(script.path()) {
        Err(CloveError::Reader(e)) => assert_eq!(e.pos.line, 2),
        other => panic!("expected reader error, got {:?}", other.map(|_| ())),
    }
}
