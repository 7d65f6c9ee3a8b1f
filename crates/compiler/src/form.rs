//! Form: the reader's syntax tree.
//!
//! Forms are ephemeral: the reader produces them, the analyzer consumes
//! them, and nothing holds them afterwards. Each node carries its source
//! position and (for symbols and collections) optional `^` metadata.

use clove_core::{Pos, SymId, intern};

#[derive(Debug, Clone, PartialEq)]
pub enum FormKind {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    /// `#"..."` literal, validated during analysis.
    Regex(String),
    Sym(SymId),
    Keyword(SymId),
    List(Vec<Form>),
    Vector(Vec<Form>),
    /// Alternating key/value forms; even count enforced by the reader.
    Map(Vec<Form>),
    Set(Vec<Form>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    pub kind: FormKind,
    pub pos: Pos,
    pub meta: Option<Box<Form>>,
}

impl Form {
    pub fn new(kind: FormKind, pos: Pos) -> Self {
        Form {
            kind,
            pos,
            meta: None,
        }
    }

    pub fn synthetic(kind: FormKind) -> Self {
        Form::new(kind, Pos::synthetic())
    }

    pub fn sym(name: &str) -> Self {
        Form::synthetic(FormKind::Sym(intern::intern_qualified(name)))
    }

    pub fn keyword(name: &str) -> Self {
        Form::synthetic(FormKind::Keyword(intern::intern_name(name)))
    }

    pub fn list(items: Vec<Form>) -> Self {
        Form::synthetic(FormKind::List(items))
    }

    pub fn vector(items: Vec<Form>) -> Self {
        Form::synthetic(FormKind::Vector(items))
    }

    pub fn nil() -> Self {
        Form::synthetic(FormKind::Nil)
    }

    pub fn as_sym(&self) -> Option<SymId> {
        match self.kind {
            FormKind::Sym(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Form]> {
        match &self.kind {
            FormKind::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Form]> {
        match &self.kind {
            FormKind::Vector(items) => Some(items),
            _ => None,
        }
    }

    /// Is this exactly the symbol `name`? A `/` in `name` matches the full
    /// qualified form; otherwise only an unqualified symbol matches.
    pub fn is_sym(&self, name: &str) -> bool {
        match self.kind {
            FormKind::Sym(id) => {
                if name.contains('/') && name.len() > 1 {
                    intern::full_name(id) == name
                } else {
                    intern::ns_of(id).is_none() && intern::name_of(id) == name
                }
            }
            _ => false,
        }
    }

    pub fn is_keyword(&self, name: &str) -> bool {
        match self.kind {
            FormKind::Keyword(id) => {
                intern::ns_of(id).is_none() && intern::name_of(id) == name
            }
            _ => false,
        }
    }

    /// A list whose head is the unqualified symbol `name`.
    pub fn is_call(&self, name: &str) -> bool {
        match &self.kind {
            FormKind::List(items) => items.first().map(|f| f.is_sym(name)).unwrap_or(false),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sym_helpers() {
        let f = Form::sym("map");
        assert!(f.is_sym("map"));
        assert!(!f.is_sym("filter"));
        let q = Form::sym("clove.core/map");
        assert!(!q.is_sym("map")); // qualified is not the bare name
    }

    #[test]
    fn test_is_call() {
        let call = Form::list(vec![Form::sym("if"), Form::nil()]);
        assert!(call.is_call("if"));
        assert!(!call.is_call("do"));
        assert!(!Form::nil().is_call("if"));
    }
}
