//! Lazy sequence semantics: idempotent realization, at-most-once thunks,
//! infinite sources bounded by take, and fused reduce pipelines matching
//! the naive walk.

use clove_compiler::Session;
use clove_runtime::Limits;

fn eval(src: &str) -> String {
    let mut s = Session::new(Limits::default());
    let v = s.eval_str(src).unwrap_or_else(|e| panic!("{}: {}", src, e));
    s.print_value(v)
}

#[test]
fn test_lazy_seq_thunk_runs_at_most_once() {
    assert_eq!(
        eval(
            "(def hits (atom 0))
             (def s (lazy-seq (do (swap! hits inc) (cons 1 nil))))
             [(first s) (first s) (first s) @hits]"
        ),
        "[1 1 1 1]"
    );
}

#[test]
fn test_forcing_is_idempotent_through_equality() {
    assert_eq!(
        eval(
            "(def s (map inc [1 2 3]))
             [(= s s) (= s '(2 3 4)) (= s [2 3 4])]"
        ),
        "[true true true]"
    );
}

#[test]
fn test_infinite_range_with_take() {
    assert_eq!(eval("(take 5 (range))"), "(0 1 2 3 4)");
    assert_eq!(eval("(take 3 (iterate inc 10))"), "(10 11 12)");
    assert_eq!(eval("(take 4 (repeat :x))"), "(:x :x :x :x)");
    assert_eq!(eval("(take 5 (cycle [1 2]))"), "(1 2 1 2 1)");
}

#[test]
fn test_lazy_map_defers_side_effects() {
    assert_eq!(
        eval(
            "(def hits (atom 0))
             (def s (map (fn [x] (swap! hits inc) x) [1 2 3]))
             (let [before @hits
                   one (first s)
                   after-one @hits
                   all (doall s)]
               [before after-one @hits])"
        ),
        "[0 1 3]"
    );
}

#[test]
fn test_user_lazy_recursion() {
    assert_eq!(
        eval(
            "(defn numbers-from [n] (lazy-seq (cons n (numbers-from (inc n)))))
             (take 4 (numbers-from 5))"
        ),
        "(5 6 7 8)"
    );
}

#[test]
fn test_fused_reduce_matches_naive() {
    // The fused pipeline and an explicitly materialized walk must agree.
    assert_eq!(
        eval(
            "(let [fused (reduce + (take 10 (map (fn [x] (* x x)) (filter odd? (range)))))
                   naive (reduce + 0 (vec (take 10 (map (fn [x] (* x x)) (filter odd? (range))))))]
               [fused naive (= fused naive)])"
        ),
        "[1330 1330 true]"
    );
}

#[test]
fn test_fused_reduce_side_effect_order() {
    assert_eq!(
        eval(
            "(def seen (atom []))
             (def total
               (reduce +
                 (take 3 (map (fn [x] (swap! seen conj x) x) (range)))))
             [total @seen]"
        ),
        "[3 [0 1 2]]"
    );
}

#[test]
fn test_fused_reduce_with_init_and_drop() {
    assert_eq!(eval("(reduce + 100 (drop 95 (range 100)))"), "585");
    assert_eq!(eval("(reduce + (take-while #(< % 5) (range)))"), "10");
    assert_eq!(eval("(reduce + (drop-while #(< % 95) (range 100)))"), "485");
}

#[test]
fn test_reduce_empty_cases() {
    assert_eq!(eval("(reduce + [])"), "0");
    assert_eq!(eval("(reduce + 5 [])"), "5");
    assert_eq!(eval("(reduce + [7])"), "7");
}

#[test]
fn test_partially_realized_chain_not_recomputed() {
    // Realize two elements, then reduce the same seq: the generic walk
    // observes the memoized cells, and effects run once per element.
    assert_eq!(
        eval(
            "(def hits (atom 0))
             (def s (map (fn [x] (swap! hits inc) x) [1 2 3]))
             (let [_ (first s)
                   total (reduce + s)]
               [total @hits])"
        ),
        "[6 3]"
    );
}

#[test]
fn test_concat_is_lazy() {
    assert_eq!(
        eval("(take 4 (concat [1 2] (range)))"),
        "(1 2 0 1)"
    );
}

#[test]
fn test_seq_on_collections() {
    assert_eq!(eval("(seq [])"), "nil");
    assert_eq!(eval("(seq [1])"), "(1)");
    assert_eq!(eval("(seq \"ab\")"), "(\\a \\b)");
    assert_eq!(eval("(seq {:a 1})"), "([:a 1])");
    assert_eq!(eval("(first {:a 1})"), "[:a 1]");
}

#[test]
fn test_large_lazy_walk_under_gc() {
    // Walking a long lazy chain allocates cells; collections must not
    // disturb the memoized chain.
    assert_eq!(eval("(count (map inc (range 50000)))"), "50000");
}
