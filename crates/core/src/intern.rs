//! Symbol and keyword interner.
//!
//! Every symbol and keyword in a running program is interned by
//! (namespace, name) into a process-wide table. Interning gives two things:
//!
//! - equality between symbols is a `u32` compare (`SymId`), no string walk
//! - the names themselves are allocated once, in a bump arena, and shared
//!   by every occurrence
//!
//! The interner is infrastructure in the heap-discipline sense: entries are
//! never freed and never traced by the collector. Interned name strings are
//! handed out as `&'static str`; the arena backing them lives in a
//! thread-local that is never reset.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;

/// Handle to an interned symbol or keyword name. Two handles are equal iff
/// their (namespace, name) pairs are equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymId(pub u32);

struct SymData {
    ns: Option<&'static str>,
    name: &'static str,
    /// Pre-joined "ns/name" (or just "name") for printing.
    full: &'static str,
}

struct Interner {
    arena: Bump,
    by_key: HashMap<(Option<&'static str>, &'static str), SymId>,
    strings: HashMap<&'static str, &'static str>,
    syms: Vec<SymData>,
    gensym_counter: u64,
}

impl Interner {
    fn new() -> Self {
        Interner {
            arena: Bump::new(),
            by_key: HashMap::new(),
            strings: HashMap::new(),
            syms: Vec::new(),
            gensym_counter: 0,
        }
    }

    fn intern_str(&mut self, s: &str) -> &'static str {
        if let Some(existing) = self.strings.get(s) {
            return existing;
        }
        let stored = self.arena.alloc_str(s);
        // SAFETY: the arena is owned by a thread-local interner that is never
        // reset; allocations stay valid for the life of the thread, and no
        // SymId escapes the thread that created it.
        let stored: &'static str = unsafe { std::mem::transmute::<&str, &'static str>(stored) };
        self.strings.insert(stored, stored);
        stored
    }

    fn intern(&mut self, ns: Option<&str>, name: &str) -> SymId {
        let ns = ns.map(|n| self.intern_str(n));
        let name = self.intern_str(name);
        if let Some(&id) = self.by_key.get(&(ns, name)) {
            return id;
        }
        let full = match ns {
            Some(n) => self.intern_str(&format!("{}/{}", n, name)),
            None => name,
        };
        let id = SymId(self.syms.len() as u32);
        self.syms.push(SymData { ns, name, full });
        self.by_key.insert((ns, name), id);
        id
    }
}

thread_local! {
    static INTERNER: RefCell<Interner> = RefCell::new(Interner::new());
}

/// Intern a (namespace, name) pair.
pub fn intern(ns: Option<&str>, name: &str) -> SymId {
    INTERNER.with(|i| i.borrow_mut().intern(ns, name))
}

/// Intern an unqualified name.
pub fn intern_name(name: &str) -> SymId {
    intern(None, name)
}

/// Parse and intern a printed symbol, splitting on the first `/`.
/// A lone `/` is the division symbol, not a separator.
pub fn intern_qualified(text: &str) -> SymId {
    if text == "/" {
        return intern(None, "/");
    }
    match text.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() => intern(Some(ns), name),
        _ => intern(None, text),
    }
}

/// The simple (unqualified) name of an interned symbol.
pub fn name_of(id: SymId) -> &'static str {
    INTERNER.with(|i| i.borrow().syms[id.0 as usize].name)
}

/// The namespace part, if the symbol is qualified.
pub fn ns_of(id: SymId) -> Option<&'static str> {
    INTERNER.with(|i| i.borrow().syms[id.0 as usize].ns)
}

/// The full printed name: `ns/name` when qualified, `name` otherwise.
pub fn full_name(id: SymId) -> &'static str {
    INTERNER.with(|i| i.borrow().syms[id.0 as usize].full)
}

/// Re-qualify: intern `name_of(id)` under the given namespace.
pub fn with_ns(ns: &str, id: SymId) -> SymId {
    let name = name_of(id);
    intern(Some(ns), name)
}

/// Produce a fresh symbol guaranteed not to collide with any read symbol.
/// Interned names never contain `__` followed by a counter unless they came
/// from here.
pub fn gensym(prefix: &str) -> SymId {
    INTERNER.with(|i| {
        let mut interner = i.borrow_mut();
        interner.gensym_counter += 1;
        let n = interner.gensym_counter;
        let name = format!("{}__{}auto", prefix, n);
        interner.intern(None, &name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_identity() {
        let a = intern(None, "foo");
        let b = intern(None, "foo");
        assert_eq!(a, b);
        assert_eq!(name_of(a), "foo");
        assert_eq!(ns_of(a), None);
    }

    #[test]
    fn test_qualified_differs_from_plain() {
        let plain = intern(None, "foo");
        let qualified = intern(Some("user"), "foo");
        assert_ne!(plain, qualified);
        assert_eq!(full_name(qualified), "user/foo");
        assert_eq!(name_of(qualified), "foo");
        assert_eq!(ns_of(qualified), Some("user"));
    }

    #[test]
    fn test_intern_qualified_parses_slash() {
        let id = intern_qualified("clove.core/map");
        assert_eq!(ns_of(id), Some("clove.core"));
        assert_eq!(name_of(id), "map");

        let division = intern_qualified("/");
        assert_eq!(ns_of(division), None);
        assert_eq!(name_of(division), "/");
    }

    #[test]
    fn test_gensym_unique() {
        let a = gensym("x");
        let b = gensym("x");
        assert_ne!(a, b);
        assert!(name_of(a).starts_with("x__"));
    }
}
