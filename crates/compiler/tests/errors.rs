//! The three error domains: reader errors and analyzer errors surface to
//! the driver and are never catchable; runtime exceptions unwind through
//! try/catch/finally.

use clove_compiler::{CloveError, Session};
use clove_core::ErrKind;
use clove_runtime::Limits;

fn session() -> Session {
    Session::new(Limits::default())
}

fn eval(src: &str) -> Result<String, CloveError> {
    let mut s = session();
    let v = s.eval_str(src)?;
    Ok(s.print_value(v))
}

fn runtime_kind(src: &str) -> ErrKind {
    match eval(src) {
        Err(CloveError::Runtime { kind, .. }) => kind,
        other => panic!("expected runtime error for {:?}, got {:?}", src, other),
    }
}

#[test]
fn test_reader_errors_are_not_catchable() {
    // A malformed form inside try aborts the read; it never reaches the
    // exception machinery.
    let e = eval("(try (oops \"unterminated) (catch Exception e :caught))").unwrap_err();
    assert!(matches!(e, CloveError::Reader(_)));
    assert_eq!(e.exit_code(), 2);
}

#[test]
fn test_analyzer_errors_are_not_catchable() {
    let e = eval("(try no-such-symbol-here (catch Exception e :caught))").unwrap_err();
    assert!(matches!(e, CloveError::Analyzer(_)));
    assert_eq!(e.exit_code(), 2);
}

#[test]
fn test_runtime_errors_are_catchable() {
    assert_eq!(
        eval("(try (/ 1 0) (catch Exception e :caught))").unwrap(),
        ":caught"
    );
}

#[test]
fn test_runtime_error_kinds() {
    assert_eq!(runtime_kind("(/ 1 0)"), ErrKind::Arithmetic);
    assert_eq!(runtime_kind("(inc \"x\")"), ErrKind::Type);
    assert_eq!(runtime_kind("(nth [1] 5)"), ErrKind::IndexOutOfBounds);
    assert_eq!(runtime_kind("((fn [x] x))"), ErrKind::Arity);
    assert_eq!(runtime_kind("(assert (= 1 2))"), ErrKind::AssertionFailed);
    assert_eq!(runtime_kind("(case 42 1 :one)"), ErrKind::IllegalArgument);
    assert_eq!(runtime_kind("(1 2 3)"), ErrKind::Type);
    assert_eq!(
        runtime_kind("(defmulti m :k) (m {:k :none})"),
        ErrKind::NoMatchingMethod
    );
    assert_eq!(
        runtime_kind("(defprotocol Q (qm [x])) (qm 5)"),
        ErrKind::NoProtocolImpl
    );
    assert_eq!(runtime_kind("(def unbound-var-x) unbound-var-x"), ErrKind::UnboundVar);
}

#[test]
fn test_throw_arbitrary_value() {
    assert_eq!(
        eval("(try (throw 42) (catch Exception e (inc e)))").unwrap(),
        "43"
    );
}

#[test]
fn test_finally_runs_on_normal_exit() {
    assert_eq!(
        eval(
            "(def log (atom []))
             [(try :value (finally (swap! log conj :fin))) @log]"
        )
        .unwrap(),
        "[:value [:fin]]"
    );
}

#[test]
fn test_finally_runs_on_catch() {
    assert_eq!(
        eval(
            "(def log (atom []))
             [(try (throw (ex-info \"x\" nil))
                   (catch Exception e :caught)
                   (finally (swap! log conj :fin)))
              @log]"
        )
        .unwrap(),
        "[:caught [:fin]]"
    );
}

#[test]
fn test_finally_runs_on_rethrow() {
    assert_eq!(
        eval(
            "(def log (atom []))
             [(try (try (throw (ex-info \"x\" nil))
                        (finally (swap! log conj :inner)))
                   (catch Exception e :outer-caught))
              @log]"
        )
        .unwrap(),
        "[:outer-caught [:inner]]"
    );
}

#[test]
fn test_finally_runs_when_catch_throws() {
    assert_eq!(
        eval(
            "(def log (atom []))
             [(try (try (throw (ex-info \"first\" nil))
                        (catch Exception e (throw (ex-info \"second\" nil)))
                        (finally (swap! log conj :fin)))
                   (catch Exception e (ex-message e)))
              @log]"
        )
        .unwrap(),
        "[\"second\" [:fin]]"
    );
}

#[test]
fn test_finally_error_supersedes() {
    assert_eq!(
        eval(
            "(try (try (throw (ex-info \"original\" nil))
                       (finally (throw (ex-info \"from-finally\" nil))))
                  (catch Exception e (ex-message e)))"
        )
        .unwrap(),
        "\"from-finally\""
    );
}

#[test]
fn test_uncaught_throw_surfaces_with_message() {
    match eval("(throw (ex-info \"boom\" {:why :because}))") {
        Err(CloveError::Runtime { kind, message, .. }) => {
            assert_eq!(kind, ErrKind::User);
            assert!(message.contains("boom"));
            assert!(message.contains(":why"));
        }
        other => panic!("expected uncaught error, got {:?}", other),
    }
}

#[test]
fn test_nested_catch_binds_thrown_value() {
    assert_eq!(
        eval(
            "(try
               (try (throw (ex-info \"inner\" {:n 1}))
                    (catch Exception e (throw (ex-info \"outer\" {:n (inc (:n (ex-data e)))}))))
               (catch Exception e (:n (ex-data e))))"
        )
        .unwrap(),
        "2"
    );
}

#[test]
fn test_validator_rejection_is_catchable() {
    assert_eq!(
        eval(
            "(def a (atom 1))
             (set-validator! a pos?)
             (try (reset! a -1) (catch Exception e :rejected))"
        )
        .unwrap(),
        ":rejected"
    );
}

#[test]
fn test_error_positions_reported() {
    let mut s = session();
    match s.eval_str("\n\n  (/ 1 0)") {
        Err(CloveError::Runtime { pos, .. }) => {
            assert_eq!(pos.line, 3);
        }
        other => panic!("expected positioned error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_stack_overflow_guard() {
    assert_eq!(runtime_kind("(defn f [x] (f (inc x))) (f 0)"), ErrKind::StackOverflow);
}
