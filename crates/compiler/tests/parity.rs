//! Backend parity: every program in this corpus must produce `=` results
//! (or equal error kinds) under the tree walker and the VM. This is the
//! compare-mode oracle exercised as a test suite.

use clove_compiler::{CloveError, Session};
use clove_runtime::Limits;

fn compare(src: &str) {
    let mut s = Session::new(Limits::default());
    match s.compare_str(src) {
        Ok(_) => {}
        Err(CloveError::CompareMismatch { pos, treewalk, vm }) => {
            panic!(
                "backends diverged at {} for {:?}: treewalk={} vm={}",
                pos, src, treewalk, vm
            );
        }
        // Runtime errors are fine as long as both backends agreed, which
        // compare_str already verified.
        Err(CloveError::Runtime { .. }) => {}
        Err(e) => panic!("unexpected failure for {:?}: {}", src, e),
    }
}

const CORPUS: &[&str] = &[
    "42",
    "(+ 1 2.5)",
    "(reduce + (range 1 101))",
    "(->> (range) (filter odd?) (take 5) (reduce +))",
    "(let [a (atom 0)] (dotimes [_ 100] (swap! a inc)) @a)",
    "(try (throw (ex-info \"bad\" {:x 1})) (catch Exception e (:x (ex-data e))))",
    "(defmulti area :shape)
     (defmethod area :square [s] (* (:side s) (:side s)))
     (area {:shape :square :side 4})",
    "(defprotocol P (g [x]))
     (extend-type String P (g [x] (count x)))
     (g \"hello\")",
    "(loop [i 0 acc 0] (if (< i 1000) (recur (inc i) (+ acc i)) acc))",
    "((fn fact [n] (if (< n 2) 1 (* n (fact (dec n))))) 15)",
    "(letfn [(e? [n] (if (zero? n) true (o? (dec n))))
             (o? [n] (if (zero? n) false (e? (dec n))))]
       (o? 101))",
    "(let [[a b & r] [1 2 3 4 5]] [a b (vec r)])",
    "(let [{:keys [x y] :or {y 7}} {:x 3}] [x y])",
    "(map (fn [x] (* x x)) [1 2 3 4])",
    "(vec (for [x (range 5) :when (odd? x)] (* 10 x)))",
    "(sort-by :k [{:k 3} {:k 1} {:k 2}])",
    "(group-by even? (range 10))",
    "(apply + 1 2 (range 10))",
    "((partial conj [0]) 1 2)",
    "((comp vec (partial map inc)) [1 2 3])",
    "(assoc-in {:a {:b 1}} [:a :b] 9)",
    "(merge-with + {:a 1 :b 2} {:a 10})",
    "(take-while pos? [2 1 0 -1 5])",
    "(drop-while pos? [2 1 0 -1 5])",
    "(interleave [1 2 3] [:a :b])",
    "(partition 2 1 [1 2 3 4])",
    "(frequencies (concat [1 1] [2]))",
    "(str (take 3 (iterate (fn [x] (* 2 x)) 1)))",
    "(doall (map inc (range 5)))",
    "(= [1 2] '(1 2))",
    "(= 1 1.0)",
    "(hash {:a [1 2] :b #{3}})",
    "(-> {} (assoc :a 1) (update :a inc) :a)",
    "(case 5 (1 2) :low (5 6) :high :other)",
    "(if-let [x (first [9])] (inc x) :none)",
    "(defn weird [& xs] (count xs)) (weird)",
    "(try (/ 1 0) (catch Exception e :caught))",
    "(try (assert false) (catch Exception e (ex-message e)))",
    "(let [a (atom {})] (swap! a assoc :k 1) (:k @a))",
    "(nth [1 2 3] 10)",
    "(cons 0 (take 3 (range)))",
    "(count (set [1 1.0 2]))",
    "(reduce (fn [acc x] (conj acc x)) [] (map inc (filter even? (range 10))))",
    "(defmacro my-when [t & body] `(if ~t (do ~@body) nil)) (my-when true 1 2 3)",
    "(def ^:dynamic *x* 1) (binding [*x* 9] *x*)",
    "(re-find #\"[a-z]+\" \"123abc456\")",
];

#[test]
fn test_corpus_parity() {
    for src in CORPUS {
        compare(src);
    }
}

#[test]
fn test_error_kind_parity_divide_by_zero() {
    // Both backends throw the same kind; compare_str reports it as a plain
    // runtime error, not a mismatch.
    let mut s = Session::new(Limits::default());
    match s.compare_str("(/ 1 0)") {
        Err(CloveError::Runtime { .. }) => {}
        other => panic!("expected agreed-on runtime error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_error_kind_parity_unresolved_method() {
    let mut s = Session::new(Limits::default());
    let src = "(defmulti m :k) (m {:k :nope})";
    match s.compare_str(src) {
        Err(CloveError::Runtime { kind, .. }) => {
            assert_eq!(kind, clove_core::ErrKind::NoMatchingMethod);
        }
        other => panic!("expected no-matching-method, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_deep_tail_calls_agree() {
    // The VM's tail_call keeps the frame flat; the evaluator trampolines.
    compare(
        "(defn spin [n] (if (zero? n) :done (recur (dec n))))
         (spin 200000)",
    );
}
