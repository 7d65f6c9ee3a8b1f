//! Built-in function registry.
//!
//! One flat table maps names to implementations; `install` interns a var in
//! `clove.core` for each entry holding a permanent builtin value whose id
//! is the table index. The table order is therefore part of a chunk's
//! meaning and entries are only ever appended.

use clove_core::{BuiltinObj, Obj, SymId, Value, intern};

use crate::error::EvalResult;
use crate::rt::Rt;

pub mod arithmetic;
pub mod atom_ops;
pub mod coll_ops;
pub mod core_ops;
pub mod regex_ops;
pub mod seq_ops;
pub mod string_ops;

pub type BuiltinFn = fn(&mut Rt, &[Value]) -> EvalResult;

pub struct BuiltinDef {
    pub name: &'static str,
    pub func: BuiltinFn,
}

macro_rules! b {
    ($name:literal, $func:path) => {
        BuiltinDef {
            name: $name,
            func: $func,
        }
    };
}

static BUILTINS: &[BuiltinDef] = &[
    // Arithmetic and comparison
    b!("+", arithmetic::add),
    b!("-", arithmetic::sub),
    b!("*", arithmetic::mul),
    b!("/", arithmetic::div),
    b!("quot", arithmetic::quot),
    b!("rem", arithmetic::rem_),
    b!("mod", arithmetic::mod_),
    b!("inc", arithmetic::inc),
    b!("dec", arithmetic::dec),
    b!("abs", arithmetic::abs_),
    b!("max", arithmetic::max_),
    b!("min", arithmetic::min_),
    b!("<", arithmetic::lt),
    b!("<=", arithmetic::le),
    b!(">", arithmetic::gt),
    b!(">=", arithmetic::ge),
    b!("==", arithmetic::num_eq),
    b!("compare", arithmetic::compare),
    b!("zero?", arithmetic::zero_p),
    b!("pos?", arithmetic::pos_p),
    b!("neg?", arithmetic::neg_p),
    b!("even?", arithmetic::even_p),
    b!("odd?", arithmetic::odd_p),
    // Equality and predicates
    b!("=", core_ops::eq),
    b!("not=", core_ops::not_eq),
    b!("not", core_ops::not),
    b!("boolean", core_ops::boolean),
    b!("identity", core_ops::identity),
    b!("type", core_ops::type_),
    b!("hash", core_ops::hash),
    b!("nil?", core_ops::nil_p),
    b!("some?", core_ops::some_p),
    b!("true?", core_ops::true_p),
    b!("false?", core_ops::false_p),
    b!("number?", core_ops::number_p),
    b!("int?", core_ops::int_p),
    b!("integer?", core_ops::int_p),
    b!("float?", core_ops::float_p),
    b!("double?", core_ops::float_p),
    b!("string?", core_ops::string_p),
    b!("char?", core_ops::char_p),
    b!("symbol?", core_ops::symbol_p),
    b!("keyword?", core_ops::keyword_p),
    b!("boolean?", core_ops::boolean_p),
    b!("coll?", core_ops::coll_p),
    b!("list?", core_ops::list_p),
    b!("vector?", core_ops::vector_p),
    b!("map?", core_ops::map_p),
    b!("set?", core_ops::set_p),
    b!("seq?", core_ops::seq_p),
    b!("seqable?", core_ops::seqable_p),
    b!("fn?", core_ops::fn_p),
    b!("ifn?", core_ops::ifn_p),
    b!("distinct?", core_ops::distinct_p),
    b!("satisfies?", core_ops::satisfies_p),
    // Printing and strings
    b!("str", core_ops::str_fn),
    b!("pr-str", core_ops::pr_str_fn),
    b!("print", core_ops::print_),
    b!("println", core_ops::println_),
    b!("pr", core_ops::pr),
    b!("prn", core_ops::prn),
    b!("subs", string_ops::subs),
    b!("int", string_ops::int_fn),
    b!("char", string_ops::char_fn),
    b!("name", core_ops::name_fn),
    b!("namespace", core_ops::namespace_fn),
    b!("keyword", core_ops::keyword_fn),
    b!("symbol", core_ops::symbol_fn),
    b!("gensym", core_ops::gensym_fn),
    // Exceptions
    b!("ex-info", core_ops::ex_info),
    b!("ex-data", core_ops::ex_data),
    b!("ex-message", core_ops::ex_message),
    b!("assert-failed", core_ops::assert_failed),
    b!("case-failed", core_ops::case_failed),
    // Collections
    b!("list", coll_ops::list),
    b!("vector", coll_ops::vector),
    b!("vec", coll_ops::vec),
    b!("hash-map", coll_ops::hash_map),
    b!("hash-set", coll_ops::hash_set),
    b!("set", coll_ops::set),
    b!("conj", coll_ops::conj),
    b!("cons", coll_ops::cons),
    b!("assoc", coll_ops::assoc),
    b!("assoc-in", coll_ops::assoc_in),
    b!("dissoc", coll_ops::dissoc),
    b!("disj", coll_ops::disj),
    b!("get", coll_ops::get),
    b!("get-in", coll_ops::get_in),
    b!("contains?", coll_ops::contains_p),
    b!("count", coll_ops::count),
    b!("empty?", coll_ops::empty_p),
    b!("not-empty", coll_ops::not_empty),
    b!("empty", coll_ops::empty),
    b!("first", coll_ops::first),
    b!("rest", coll_ops::rest),
    b!("next", coll_ops::next_),
    b!("second", coll_ops::second),
    b!("last", coll_ops::last),
    b!("butlast", coll_ops::butlast),
    b!("nth", coll_ops::nth),
    b!("seq", coll_ops::seq_fn),
    b!("keys", coll_ops::keys),
    b!("vals", coll_ops::vals),
    b!("merge", coll_ops::merge),
    b!("merge-with", coll_ops::merge_with),
    b!("select-keys", coll_ops::select_keys),
    b!("zipmap", coll_ops::zipmap),
    b!("peek", coll_ops::peek),
    b!("pop", coll_ops::pop),
    b!("subvec", coll_ops::subvec),
    b!("reverse", coll_ops::reverse),
    b!("into", coll_ops::into),
    // Sequences
    b!("range", seq_ops::range),
    b!("repeat", seq_ops::repeat),
    b!("iterate", seq_ops::iterate),
    b!("cycle", seq_ops::cycle),
    b!("concat", seq_ops::concat),
    b!("take", seq_ops::take),
    b!("drop", seq_ops::drop),
    b!("take-while", seq_ops::take_while),
    b!("drop-while", seq_ops::drop_while),
    b!("map", seq_ops::map),
    b!("map-indexed", seq_ops::map_indexed),
    b!("filter", seq_ops::filter),
    b!("remove", seq_ops::remove),
    b!("keep", seq_ops::keep),
    b!("keep-indexed", seq_ops::keep_indexed),
    b!("mapcat", seq_ops::mapcat),
    b!("interleave", seq_ops::interleave),
    b!("interpose", seq_ops::interpose),
    b!("partition", seq_ops::partition),
    b!("partition-all", seq_ops::partition_all),
    b!("distinct", seq_ops::distinct),
    b!("reduce", seq_ops::reduce),
    b!("sort", seq_ops::sort),
    b!("sort-by", seq_ops::sort_by),
    b!("group-by", seq_ops::group_by),
    b!("frequencies", seq_ops::frequencies),
    b!("doall", seq_ops::doall),
    b!("dorun", seq_ops::dorun),
    b!("run!", seq_ops::run_bang),
    b!("every?", seq_ops::every_p),
    b!("not-every?", seq_ops::not_every_p),
    b!("some", seq_ops::some),
    b!("not-any?", seq_ops::not_any_p),
    b!("mapv", seq_ops::mapv),
    b!("filterv", seq_ops::filterv),
    b!("apply", seq_ops::apply),
    // Atoms and vars
    b!("atom", atom_ops::atom),
    b!("atom?", atom_ops::atom_p),
    b!("deref", atom_ops::deref),
    b!("reset!", atom_ops::reset_bang),
    b!("swap!", atom_ops::swap_in_place),
    b!("compare-and-set!", atom_ops::compare_and_set),
    b!("set-validator!", atom_ops::set_validator),
    b!("add-watch", atom_ops::add_watch),
    b!("remove-watch", atom_ops::remove_watch),
    b!("var-get", core_ops::var_get),
    b!("alter-var-root", core_ops::alter_var_root),
    // Regex
    b!("re-pattern", regex_ops::re_pattern),
    b!("re-matches", regex_ops::re_matches),
    b!("re-find", regex_ops::re_find),
    b!("re-seq", regex_ops::re_seq),
];

/// Dispatch a builtin by table id.
pub fn call(rt: &mut Rt, id: u16, _name: SymId, args: &[Value]) -> EvalResult {
    (BUILTINS[id as usize].func)(rt, args)
}

/// Intern every builtin into `clove.core`.
pub fn install(rt: &mut Rt) {
    let core = rt.env.core_ns();
    for (id, def) in BUILTINS.iter().enumerate() {
        let sym = intern::intern_name(def.name);
        let var = rt.env.intern_var(core, sym);
        let value = Value::Obj(rt.heap.alloc_perm(Obj::Builtin(BuiltinObj {
            name: sym,
            id: id as u16,
        })));
        rt.env.var_mut(var).root = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::invoke;
    use crate::rt::Limits;

    #[test]
    fn test_install_resolves_core_names() {
        let rt = Rt::new(Limits::default());
        for probe in ["+", "map", "swap!", "ex-info"] {
            let sym = intern::intern_name(probe);
            assert!(rt.env.resolve(sym).is_some(), "missing builtin {}", probe);
        }
    }

    #[test]
    fn test_builtin_invocation_through_var() {
        let mut rt = Rt::new(Limits::default());
        let sym = intern::intern_name("+");
        let var = rt.env.resolve(sym).unwrap();
        let f = rt.env.var(var).value().unwrap();
        let r = invoke(&mut rt, f, &[Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(r, Value::Int(5));
    }

    #[test]
    fn test_no_duplicate_names() {
        let mut seen = std::collections::HashSet::new();
        for def in BUILTINS {
            assert!(seen.insert(def.name), "duplicate builtin {}", def.name);
        }
    }
}
