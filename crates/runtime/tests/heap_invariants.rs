//! GC safety and persistence invariants exercised against the runtime API
//! directly: after any collection, everything reachable from a var keeps
//! its structure, and persistent updates never disturb old references.

use clove_core::{Obj, Value, intern};
use clove_runtime::rt::{Limits, Rt};
use clove_runtime::{colls, eq};

fn rt() -> Rt {
    Rt::new(Limits::default())
}

#[test]
fn test_var_roots_survive_collection() {
    let mut rt = rt();
    let inner = rt.heap.str_value("payload");
    let vec_val = rt.heap.vector_value(vec![inner, Value::Int(7)]);
    let sym = intern::intern_name("keeper");
    let var = rt.env.intern_current(sym);
    rt.env.var_mut(var).root = Some(vec_val);

    // Drown the heap in garbage and collect repeatedly.
    for round in 0..5 {
        for i in 0..10_000 {
            rt.heap
                .alloc(Obj::Str(format!("junk-{}-{}", round, i).into_boxed_str()));
        }
        rt.gc_now();
    }

    let root = rt.env.var(var).root.expect("root survived");
    let items = rt.heap.try_vector(root).expect("still a vector").to_vec();
    assert_eq!(items.len(), 2);
    assert_eq!(rt.heap.try_str(items[0]), Some("payload"));
    assert_eq!(items[1], Value::Int(7));
}

#[test]
fn test_structure_equal_after_collection() {
    let mut rt = rt();
    let k = Value::Keyword(intern::intern_name("k"));
    let before = rt.heap.map_value(vec![(k, Value::Int(1))]);
    let sym = intern::intern_name("snapshot");
    let var = rt.env.intern_current(sym);
    rt.env.var_mut(var).root = Some(before);

    for _ in 0..3 {
        for _ in 0..5_000 {
            rt.heap.alloc(Obj::Str("junk".into()));
        }
        rt.gc_now();
    }

    let after = rt.env.var(var).root.expect("root survived");
    let rebuilt = rt.heap.map_value(vec![(k, Value::Int(1))]);
    assert!(eq::value_eq(&mut rt, after, rebuilt).expect("comparable"));
}

#[test]
fn test_old_value_unchanged_by_updates() {
    let mut rt = rt();
    let k = Value::Keyword(intern::intern_name("a"));
    let m0 = rt.heap.map_value(vec![(k, Value::Int(1))]);
    let mark = rt.temp_mark();
    rt.push_temp(m0);

    let mut latest = m0;
    for i in 2..50 {
        latest = colls::map_assoc(&mut rt, latest, Value::Int(i), Value::Int(i)).expect("assoc");
        rt.push_temp(latest);
    }
    rt.gc_now();

    // The original single-entry map is untouched by forty-eight updates
    // and a collection.
    assert_eq!(colls::count_value(&mut rt, m0).expect("count"), 1);
    assert_eq!(
        colls::map_get(&mut rt, m0, k).expect("get"),
        Some(Value::Int(1))
    );
    assert_eq!(colls::count_value(&mut rt, latest).expect("count"), 49);
    rt.truncate_temps(mark);
}

#[test]
fn test_atom_contents_are_roots() {
    let mut rt = rt();
    let held = rt.heap.str_value("held");
    let atom = Value::Obj(rt.heap.alloc(Obj::Atom(clove_core::AtomObj {
        value: held,
        validator: None,
        watchers: vec![],
    })));
    let sym = intern::intern_name("cell");
    let var = rt.env.intern_current(sym);
    rt.env.var_mut(var).root = Some(atom);

    for _ in 0..2_000 {
        rt.heap.alloc(Obj::Str("junk".into()));
    }
    rt.gc_now();
    assert_eq!(rt.heap.try_str(held), Some("held"));
}

#[test]
fn test_dynamic_binding_stack_is_a_root() {
    let mut rt = rt();
    let sym = intern::intern_name("*bound*");
    let var = rt.env.intern_current(sym);
    rt.env.var_mut(var).meta.is_dynamic = true;
    let pushed = rt.heap.str_value("shadow");
    rt.env.var_mut(var).dyn_stack.push(pushed);

    for _ in 0..2_000 {
        rt.heap.alloc(Obj::Str("junk".into()));
    }
    rt.gc_now();
    assert_eq!(rt.heap.try_str(pushed), Some("shadow"));
    rt.env.var_mut(var).dyn_stack.pop();
}
