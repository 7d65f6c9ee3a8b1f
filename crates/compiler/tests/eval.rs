//! End-to-end evaluation through the full pipeline (reader -> analyzer ->
//! tree walker), checked against printed results.

use clove_compiler::Session;
use clove_runtime::Limits;

fn eval(src: &str) -> String {
    let mut s = Session::new(Limits::default());
    let v = s.eval_str(src).unwrap_or_else(|e| panic!("{}: {}", src, e));
    s.print_value(v)
}

#[test]
fn scenario_reduce_over_range() {
    assert_eq!(eval("(reduce + (range 1 101))"), "5050");
}

#[test]
fn scenario_thread_filter_take_reduce() {
    assert_eq!(eval("(->> (range) (filter odd?) (take 5) (reduce +))"), "25");
}

#[test]
fn scenario_atom_dotimes() {
    assert_eq!(
        eval("(let [a (atom 0)] (dotimes [_ 100] (swap! a inc)) @a)"),
        "100"
    );
}

#[test]
fn scenario_ex_info_catch() {
    assert_eq!(
        eval("(try (throw (ex-info \"bad\" {:x 1})) (catch Exception e (:x (ex-data e))))"),
        "1"
    );
}

#[test]
fn scenario_multimethod_dispatch() {
    assert_eq!(
        eval(
            "(defmulti area :shape)
             (defmethod area :square [s] (* (:side s) (:side s)))
             (area {:shape :square :side 4})"
        ),
        "16"
    );
}

#[test]
fn scenario_protocol_extend_string() {
    assert_eq!(
        eval(
            "(defprotocol P (g [x]))
             (extend-type String P (g [x] (count x)))
             (g \"hello\")"
        ),
        "5"
    );
}

#[test]
fn test_recur_is_bounded() {
    assert_eq!(
        eval("(loop [i 0] (if (< i 1000000) (recur (inc i)) i))"),
        "1000000"
    );
}

#[test]
fn test_fn_recur_rebinds_params() {
    assert_eq!(
        eval("(defn count-down [n acc] (if (zero? n) acc (recur (dec n) (inc acc)))) (count-down 100000 0)"),
        "100000"
    );
}

#[test]
fn test_closures_capture_values() {
    assert_eq!(
        eval("(defn adder [n] (fn [x] (+ x n))) ((adder 3) 4)"),
        "7"
    );
}

#[test]
fn test_named_fn_self_recursion() {
    assert_eq!(
        eval("((fn fact [n] (if (< n 2) 1 (* n (fact (dec n))))) 10)"),
        "3628800"
    );
}

#[test]
fn test_letfn_mutual_recursion() {
    assert_eq!(
        eval(
            "(letfn [(even2? [n] (if (zero? n) true (odd2? (dec n))))
                     (odd2? [n] (if (zero? n) false (even2? (dec n))))]
               (even2? 10))"
        ),
        "true"
    );
}

#[test]
fn test_multi_arity_and_variadic() {
    assert_eq!(
        eval(
            "(defn greet
               ([] :none)
               ([x] x)
               ([x & more] (count more)))
             [(greet) (greet 1) (greet 1 2 3)]"
        ),
        "[:none 1 2]"
    );
}

#[test]
fn test_destructuring_in_let() {
    assert_eq!(eval("(let [[a b & r] [1 2 3 4]] [a b r])"), "[1 2 (3 4)]");
    assert_eq!(
        eval("(let [{:keys [x y] :or {y 10}} {:x 1}] [x y])"),
        "[1 10]"
    );
    assert_eq!(eval("(let [{a :a :as m} {:a 5}] [a (count m)])"), "[5 1]");
}

#[test]
fn test_destructuring_fn_params() {
    assert_eq!(eval("((fn [[a b]] (+ a b)) [3 4])"), "7");
}

#[test]
fn test_collection_basics() {
    assert_eq!(eval("(conj [1 2] 3)"), "[1 2 3]");
    assert_eq!(eval("(conj '(2 3) 1)"), "(1 2 3)");
    assert_eq!(eval("(assoc {:a 1} :b 2)"), "{:a 1, :b 2}");
    assert_eq!(eval("(dissoc {:a 1 :b 2} :a)"), "{:b 2}");
    assert_eq!(eval("(get-in {:a {:b 3}} [:a :b])"), "3");
    assert_eq!(eval("(count #{1 2 2 3})"), "3");
    assert_eq!(eval("(nth [10 20 30] 1)"), "20");
    assert_eq!(eval("(into {} [[:a 1] [:b 2]])"), "{:a 1, :b 2}");
}

#[test]
fn test_persistence_invariant() {
    assert_eq!(
        eval("(let [v [1 2] v2 (conj v 3)] [(count v) (count v2)])"),
        "[2 3]"
    );
    assert_eq!(
        eval("(let [m {:a 1} m2 (assoc m :a 2)] [(:a m) (:a m2)])"),
        "[1 2]"
    );
}

#[test]
fn test_equality_rules() {
    assert_eq!(eval("(= 1 1.0)"), "true");
    assert_eq!(eval("(== 1 1.0)"), "true");
    assert_eq!(eval("(= [1 2] '(1 2))"), "true");
    assert_eq!(eval("(= {:a 1 :b 2} {:b 2 :a 1})"), "true");
    assert_eq!(eval("(= #{1 2} #{2 1})"), "true");
    assert_eq!(eval("(= \"a\" \"a\")"), "true");
    assert_eq!(eval("(not= :a :b)"), "true");
}

#[test]
fn test_truthiness() {
    assert_eq!(eval("(if 0 :t :f)"), ":t");
    assert_eq!(eval("(if \"\" :t :f)"), ":t");
    assert_eq!(eval("(if [] :t :f)"), ":t");
    assert_eq!(eval("(if nil :t :f)"), ":f");
    assert_eq!(eval("(if false :t :f)"), ":f");
}

#[test]
fn test_keyword_and_map_as_functions() {
    assert_eq!(eval("(:a {:a 1})"), "1");
    assert_eq!(eval("({:a 1} :a)"), "1");
    assert_eq!(eval("(:missing {:a 1} :default)"), ":default");
    assert_eq!(eval("(#{1 2} 2)"), "2");
    assert_eq!(eval("([10 20] 1)"), "20");
}

#[test]
fn test_higher_order_builtins() {
    assert_eq!(eval("(map inc [1 2 3])"), "(2 3 4)");
    assert_eq!(eval("(filter even? (range 10))"), "(0 2 4 6 8)");
    assert_eq!(eval("(mapv #(* % %) [1 2 3])"), "[1 4 9]");
    assert_eq!(eval("(apply + 1 2 [3 4])"), "10");
    assert_eq!(eval("((partial + 10) 5)"), "15");
    assert_eq!(eval("((comp inc #(* 2 %)) 5)"), "11");
    assert_eq!(eval("(sort [3 1 2])"), "(1 2 3)");
    assert_eq!(eval("(sort-by - [1 3 2])"), "(3 2 1)");
    assert_eq!(eval("(group-by even? [1 2 3 4])"), "{false [1 3], true [2 4]}");
}

#[test]
fn test_fn_combinator_macros() {
    assert_eq!(eval("((complement even?) 3)"), "true");
    assert_eq!(eval("((constantly 7) 1 2 3)"), "7");
    assert_eq!(eval("((some-fn even? pos?) 3)"), "true");
    assert_eq!(eval("((every-pred pos? even?) 2 4)"), "true");
    assert_eq!(eval("((fnil + 0) nil 5)"), "5");
    assert_eq!(eval("((juxt inc dec) 5)"), "[6 4]");
}

#[test]
fn test_threading_macros() {
    assert_eq!(eval("(-> 5 inc (* 2))"), "12");
    assert_eq!(eval("(->> [1 2 3] (map inc) (reduce +))"), "9");
    assert_eq!(eval("(as-> 5 x (+ x 1) (* x 2))"), "12");
    assert_eq!(eval("(some-> {:a 1} :a inc)"), "2");
    assert_eq!(eval("(some-> {:a 1} :b inc)"), "nil");
    assert_eq!(eval("(cond-> 5 true inc false (* 100))"), "6");
}

#[test]
fn test_control_macros() {
    assert_eq!(eval("(when true 1 2)"), "2");
    assert_eq!(eval("(when false 1)"), "nil");
    assert_eq!(eval("(cond false 1 :else 2)"), "2");
    assert_eq!(eval("(and 1 2 3)"), "3");
    assert_eq!(eval("(and 1 nil 3)"), "nil");
    assert_eq!(eval("(or nil false 3)"), "3");
    assert_eq!(eval("(or nil false)"), "false");
    assert_eq!(eval("(if-let [x (:a {:a 5})] x :no)"), "5");
    assert_eq!(eval("(if-let [x (:b {:a 5})] x :no)"), ":no");
    assert_eq!(eval("(if-some [x false] x :no)"), "false");
    assert_eq!(eval("(case 2 1 :one 2 :two :other)"), ":two");
    assert_eq!(eval("(case 9 1 :one :other)"), ":other");
    assert_eq!(eval("(case 3 (2 3) :few :many)"), ":few");
    assert_eq!(eval("(condp < 7 10 :small 5 :big)"), ":small");
}

#[test]
fn test_for_comprehension() {
    assert_eq!(eval("(vec (for [x [1 2 3]] (* x x)))"), "[1 4 9]");
    assert_eq!(
        eval("(vec (for [x [1 2 3] y [10 20] :when (even? x)] (+ x y)))"),
        "[12 22]"
    );
    assert_eq!(
        eval("(vec (for [x (range 10) :while (< x 3)] x))"),
        "[0 1 2]"
    );
    assert_eq!(
        eval("(vec (for [x [1 2] :let [y (* x 10)]] y))"),
        "[10 20]"
    );
}

#[test]
fn test_doseq_effects_in_order() {
    assert_eq!(
        eval("(let [a (atom [])] (doseq [x [1 2 3]] (swap! a conj x)) @a)"),
        "[1 2 3]"
    );
}

#[test]
fn test_user_macros() {
    assert_eq!(
        eval(
            "(defmacro unless [test then else] (list 'if test else then))
             (unless false :yes :no)"
        ),
        ":yes"
    );
    assert_eq!(
        eval(
            "(defmacro twice [form] `(do ~form ~form))
             (let [a (atom 0)] (twice (swap! a inc)) @a)"
        ),
        "2"
    );
}

#[test]
fn test_syntax_quote_splice_in_macro() {
    assert_eq!(
        eval(
            "(defmacro sum-all [& xs] `(+ ~@xs))
             (sum-all 1 2 3 4)"
        ),
        "10"
    );
}

#[test]
fn test_atoms_watchers_and_validators() {
    assert_eq!(
        eval(
            "(def a (atom 0))
             (def log (atom []))
             (add-watch a :w (fn [k r old new] (swap! log conj [old new])))
             (reset! a 1)
             (swap! a + 9)
             @log"
        ),
        "[[0 1] [1 10]]"
    );
    assert_eq!(
        eval("(def a (atom 0)) (compare-and-set! a 0 5) @a"),
        "5"
    );
}

#[test]
fn test_dynamic_binding() {
    assert_eq!(
        eval(
            "(def ^:dynamic *depth* 0)
             (defn probe [] *depth*)
             [(probe) (binding [*depth* 5] (probe)) (probe)]"
        ),
        "[0 5 0]"
    );
}

#[test]
fn test_var_quote_and_deref() {
    assert_eq!(eval("(def x 42) @#'x"), "42");
    assert_eq!(eval("(def x 1) (alter-var-root #'x inc) x"), "2");
}

#[test]
fn test_strings_and_chars() {
    assert_eq!(eval("(str \"a\" 1 :k nil)"), "\"a1:k\"");
    assert_eq!(eval("(subs \"hello\" 1 3)"), "\"el\"");
    assert_eq!(eval("(first \"ab\")"), "\\a");
    assert_eq!(eval("(count \"hello\")"), "5");
    assert_eq!(eval("(name :user/k)"), "\"k\"");
    assert_eq!(eval("(namespace :user/k)"), "\"user\"");
    assert_eq!(eval("(keyword \"zap\")"), ":zap");
    assert_eq!(eval("(symbol \"zap\")"), "zap");
}

#[test]
fn test_regex_builtins() {
    assert_eq!(eval("(re-matches #\"\\d+\" \"123\")"), "\"123\"");
    assert_eq!(eval("(re-matches #\"\\d+\" \"x123\")"), "nil");
    assert_eq!(eval("(re-find #\"(a+)(b)\" \"caaab\")"), "[\"aaab\" \"aaa\" \"b\"]");
    assert_eq!(eval("(re-seq #\"\\d\" \"a1b2\")"), "(\"1\" \"2\")");
}

#[test]
fn test_printer_round_trip_shapes() {
    assert_eq!(eval("'(1 2.5 \"s\" \\c :k sym [v] {:m 1} #{9})"),
        "(1 2.5 \"s\" \\c :k sym [v] {:m 1} #{9})");
    assert_eq!(eval("1.0"), "1.0");
    assert_eq!(eval("##Inf"), "##Inf");
}

#[test]
fn test_protocol_satisfies_and_multiple_types() {
    assert_eq!(
        eval(
            "(defprotocol Sized (size-of [x]))
             (extend-protocol Sized
               String (size-of [x] (count x))
               Vector (size-of [x] (count x))
               Long (size-of [x] 1))
             [(size-of \"abc\") (size-of [1 2]) (size-of 9) (satisfies? Sized :kw)]"
        ),
        "[3 2 1 false]"
    );
}

#[test]
fn test_multimethod_default() {
    assert_eq!(
        eval(
            "(defmulti speak :kind)
             (defmethod speak :dog [_] :woof)
             (defmethod speak :default [_] :silence)
             [(speak {:kind :dog}) (speak {:kind :fish})]"
        ),
        "[:woof :silence]"
    );
}

#[test]
fn test_ns_switching() {
    assert_eq!(
        eval("(ns other.place) (def here 1) (ns user) (def here 2) [other.place/here here]"),
        "[1 2]"
    );
}

#[test]
fn test_defonce_keeps_first_value() {
    assert_eq!(eval("(defonce x 1) (defonce x 2) x"), "1");
}

#[test]
fn test_seq_library() {
    assert_eq!(eval("(interpose :- [1 2 3])"), "(1 :- 2 :- 3)");
    assert_eq!(eval("(interleave [1 2] [:a :b])"), "(1 :a 2 :b)");
    assert_eq!(eval("(partition 2 [1 2 3 4 5])"), "((1 2) (3 4))");
    assert_eq!(eval("(partition-all 2 [1 2 3])"), "((1 2) (3))");
    assert_eq!(eval("(distinct [1 2 1 3 2])"), "(1 2 3)");
    assert_eq!(eval("(frequencies [:a :b :a])"), "{:a 2, :b 1}");
    assert_eq!(eval("(keep #(if (odd? %) (* % 10)) [1 2 3])"), "(10 30)");
    assert_eq!(eval("(map-indexed vector [:a :b])"), "([0 :a] [1 :b])");
    assert_eq!(eval("(zipmap [:a :b] [1 2])"), "{:a 1, :b 2}");
    assert_eq!(eval("(merge-with + {:a 1} {:a 2 :b 3})"), "{:a 3, :b 3}");
    assert_eq!(eval("(every? pos? [1 2])"), "true");
    assert_eq!(eval("(some even? [1 3 4])"), "true");
    assert_eq!(eval("(not-any? neg? [1 2])"), "true");
    assert_eq!(eval("(mapcat (fn [x] [x x]) [1 2])"), "(1 1 2 2)");
}

#[test]
fn test_update_and_assoc_in() {
    assert_eq!(eval("(update {:a 1} :a + 10)"), "{:a 11}");
    assert_eq!(eval("(assoc-in {:a {:b 1}} [:a :b] 2)"), "{:a {:b 2}}");
}

#[test]
fn test_arithmetic_contract() {
    assert_eq!(eval("(/ 6 3)"), "2");
    assert_eq!(eval("(/ 7 2)"), "3.5");
    assert_eq!(eval("(mod -7 3)"), "2");
    assert_eq!(eval("(rem -7 3)"), "-1");
    assert_eq!(eval("(max 1 3 2)"), "3");
    assert_eq!(eval("(quot 7 2)"), "3");
}

#[test]
fn test_do_returns_last_evaluates_all() {
    assert_eq!(
        eval("(let [a (atom 0)] [(do (swap! a inc) (swap! a inc) :done) @a])"),
        "[:done 2]"
    );
}

#[test]
fn test_gc_survives_heavy_allocation() {
    // Allocation-heavy loop forces several collections; reachable
    // structures must survive intact.
    assert_eq!(
        eval(
            "(def keeper {:k (vec (range 50))})
             (loop [i 0 acc nil]
               (if (< i 20000)
                 (recur (inc i) (str \"x\" i))
                 (count (:k keeper))))"
        ),
        "50"
    );
}
