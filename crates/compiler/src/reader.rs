//! The reader: character stream -> Forms.
//!
//! One pass, no separate token vector: the reader walks characters,
//! tracking line and column, and builds forms directly. Reader macros
//! (`'`, `` ` ``, `~`, `~@`, `@`, `^`, `#'`, `#_`, `#{}`, `#"..."`,
//! `#(...)`) expand here; syntax-quote lowers through `crate::quasi`.
//!
//! Errors are structured and positioned. They are never catchable from
//! user code; a failed read aborts the current read unit.

use clove_core::{Pos, SymId, intern};

use crate::form::{Form, FormKind};
use crate::quasi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderErrorKind {
    UnexpectedEof,
    EofInString,
    UnmatchedDelimiter,
    OddMapForms,
    InvalidNumber,
    InvalidEscape,
    InvalidChar,
    InvalidToken,
    MisplacedUnquote,
    ReaderLimit,
}

impl ReaderErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReaderErrorKind::UnexpectedEof => "unexpected-eof",
            ReaderErrorKind::EofInString => "eof-in-string",
            ReaderErrorKind::UnmatchedDelimiter => "unmatched-delimiter",
            ReaderErrorKind::OddMapForms => "odd-map-forms",
            ReaderErrorKind::InvalidNumber => "invalid-number",
            ReaderErrorKind::InvalidEscape => "invalid-escape",
            ReaderErrorKind::InvalidChar => "invalid-char",
            ReaderErrorKind::InvalidToken => "invalid-token",
            ReaderErrorKind::MisplacedUnquote => "misplaced-unquote",
            ReaderErrorKind::ReaderLimit => "reader-limit",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReaderError {
    pub kind: ReaderErrorKind,
    pub pos: Pos,
    pub detail: String,
}

impl std::fmt::Display for ReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.kind.as_str(), self.pos, self.detail)
    }
}

impl std::error::Error for ReaderError {}

#[derive(Debug, Clone, Copy)]
pub struct ReaderLimits {
    pub max_depth: usize,
    pub max_forms: usize,
}

impl Default for ReaderLimits {
    fn default() -> Self {
        ReaderLimits {
            max_depth: 256,
            max_forms: 1_000_000,
        }
    }
}

pub struct Reader {
    chars: Vec<char>,
    idx: usize,
    line: u32,
    col: u32,
    depth: usize,
    form_count: usize,
    limits: ReaderLimits,
    /// Namespace used to resolve `::kw` literals.
    current_ns: String,
}

impl Reader {
    pub fn new(source: &str, current_ns: &str, limits: ReaderLimits) -> Self {
        Reader {
            chars: source.chars().collect(),
            idx: 0,
            line: 1,
            col: 1,
            depth: 0,
            form_count: 0,
            limits,
            current_ns: current_ns.to_string(),
        }
    }

    /// Update the namespace used for `::kw` resolution; the driver calls
    /// this between top-level forms so `(ns ...)` affects later reads.
    pub fn set_current_ns(&mut self, ns: &str) {
        if self.current_ns != ns {
            self.current_ns = ns.to_string();
        }
    }

    fn err(&self, kind: ReaderErrorKind, detail: impl Into<String>) -> ReaderError {
        ReaderError {
            kind,
            pos: self.pos(),
            detail: detail.into(),
        }
    }

    fn err_at(&self, kind: ReaderErrorKind, pos: Pos, detail: impl Into<String>) -> ReaderError {
        ReaderError {
            kind,
            pos,
            detail: detail.into(),
        }
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.idx + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.idx).copied()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn is_ws(c: char) -> bool {
        c.is_whitespace() || c == ','
    }

    fn is_terminator(c: char) -> bool {
        Self::is_ws(c) || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';')
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if Self::is_ws(c) => {
                    self.advance();
                }
                Some(';') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                // Shebang line, tolerated anywhere a comment is.
                Some('#') if self.peek2() == Some('!') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn count_form(&mut self) -> Result<(), ReaderError> {
        self.form_count += 1;
        if self.form_count > self.limits.max_forms {
            return Err(self.err(ReaderErrorKind::ReaderLimit, "too many forms"));
        }
        Ok(())
    }

    /// Read one top-level form; `None` on clean end of input.
    pub fn read_one(&mut self) -> Result<Option<Form>, ReaderError> {
        self.skip_ws_and_comments();
        if self.peek().is_none() {
            return Ok(None);
        }
        if self.peek() == Some(')') || self.peek() == Some(']') || self.peek() == Some('}') {
            let c = self.peek().unwrap_or(')');
            return Err(self.err(
                ReaderErrorKind::UnmatchedDelimiter,
                format!("unmatched '{}'", c),
            ));
        }
        self.read_form().map(Some)
    }

    pub fn read_all(&mut self) -> Result<Vec<Form>, ReaderError> {
        let mut out = Vec::new();
        while let Some(form) = self.read_one()? {
            out.push(form);
        }
        Ok(out)
    }

    fn read_form(&mut self) -> Result<Form, ReaderError> {
        self.skip_ws_and_comments();
        self.count_form()?;
        let pos = self.pos();
        let c = match self.peek() {
            Some(c) => c,
            None => return Err(self.err(ReaderErrorKind::UnexpectedEof, "expected a form")),
        };
        match c {
            '(' => {
                self.advance();
                let items = self.read_seq(')')?;
                Ok(Form::new(FormKind::List(items), pos))
            }
            '[' => {
                self.advance();
                let items = self.read_seq(']')?;
                Ok(Form::new(FormKind::Vector(items), pos))
            }
            '{' => {
                self.advance();
                let items = self.read_seq('}')?;
                if items.len() % 2 != 0 {
                    return Err(self.err_at(
                        ReaderErrorKind::OddMapForms,
                        pos,
                        "map literal must have an even number of forms",
                    ));
                }
                Ok(Form::new(FormKind::Map(items), pos))
            }
            ')' | ']' | '}' => Err(self.err(
                ReaderErrorKind::UnmatchedDelimiter,
                format!("unmatched '{}'", c),
            )),
            '"' => {
                self.advance();
                let s = self.read_string_body(pos)?;
                Ok(Form::new(FormKind::Str(s), pos))
            }
            '\\' => {
                self.advance();
                let ch = self.read_char_literal(pos)?;
                Ok(Form::new(FormKind::Char(ch), pos))
            }
            '\'' => {
                self.advance();
                let inner = self.read_form()?;
                Ok(Form::new(
                    FormKind::List(vec![Form::sym("quote"), inner]),
                    pos,
                ))
            }
            '@' => {
                self.advance();
                let inner = self.read_form()?;
                Ok(Form::new(
                    FormKind::List(vec![Form::sym("clove.core/deref"), inner]),
                    pos,
                ))
            }
            '`' => {
                self.advance();
                let inner = self.read_form()?;
                quasi::expand(&inner).map_err(|detail| {
                    self.err_at(ReaderErrorKind::MisplacedUnquote, pos, detail)
                })
            }
            '~' => {
                self.advance();
                if self.peek() == Some('@') {
                    self.advance();
                    let inner = self.read_form()?;
                    Ok(Form::new(
                        FormKind::List(vec![Form::sym("unquote-splicing"), inner]),
                        pos,
                    ))
                } else {
                    let inner = self.read_form()?;
                    Ok(Form::new(
                        FormKind::List(vec![Form::sym("unquote"), inner]),
                        pos,
                    ))
                }
            }
            '^' => {
                self.advance();
                let meta = self.read_form()?;
                let mut target = self.read_form()?;
                target.meta = Some(Box::new(normalize_meta(meta)));
                Ok(target)
            }
            '#' => {
                self.advance();
                self.read_dispatch(pos)
            }
            ':' => {
                self.advance();
                self.read_keyword(pos)
            }
            _ => self.read_number_or_symbol(pos),
        }
    }

    fn read_seq(&mut self, close: char) -> Result<Vec<Form>, ReaderError> {
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            self.depth -= 1;
            return Err(self.err(ReaderErrorKind::ReaderLimit, "nesting too deep"));
        }
        let mut items = Vec::new();
        let result = loop {
            self.skip_ws_and_comments();
            match self.peek() {
                None => {
                    break Err(self.err(
                        ReaderErrorKind::UnexpectedEof,
                        format!("expected '{}'", close),
                    ));
                }
                Some(c) if c == close => {
                    self.advance();
                    break Ok(items);
                }
                Some(c) if matches!(c, ')' | ']' | '}') => {
                    break Err(self.err(
                        ReaderErrorKind::UnmatchedDelimiter,
                        format!("expected '{}', found '{}'", close, c),
                    ));
                }
                Some(_) => match self.read_form() {
                    Ok(f) => items.push(f),
                    Err(e) => break Err(e),
                },
            }
        };
        self.depth -= 1;
        result
    }

    fn read_dispatch(&mut self, pos: Pos) -> Result<Form, ReaderError> {
        match self.peek() {
            Some('{') => {
                self.advance();
                let items = self.read_seq('}')?;
                Ok(Form::new(FormKind::Set(items), pos))
            }
            Some('_') => {
                self.advance();
                // Discard the next form, then read the one after it.
                self.read_form()?;
                self.read_form()
            }
            Some('"') => {
                self.advance();
                let s = self.read_regex_body(pos)?;
                Ok(Form::new(FormKind::Regex(s), pos))
            }
            Some('\'') => {
                self.advance();
                let inner = self.read_form()?;
                Ok(Form::new(FormKind::List(vec![Form::sym("var"), inner]), pos))
            }
            Some('(') => {
                self.advance();
                let items = self.read_seq(')')?;
                self.fn_literal(items, pos)
            }
            Some('#') => {
                self.advance();
                let token = self.read_token();
                match token.as_str() {
                    "Inf" => Ok(Form::new(FormKind::Float(f64::INFINITY), pos)),
                    "-Inf" => Ok(Form::new(FormKind::Float(f64::NEG_INFINITY), pos)),
                    "NaN" => Ok(Form::new(FormKind::Float(f64::NAN), pos)),
                    other => Err(self.err_at(
                        ReaderErrorKind::InvalidToken,
                        pos,
                        format!("unknown symbolic value ##{}", other),
                    )),
                }
            }
            Some(c) => Err(self.err_at(
                ReaderErrorKind::InvalidToken,
                pos,
                format!("unsupported dispatch #{}", c),
            )),
            None => Err(self.err(ReaderErrorKind::UnexpectedEof, "dangling '#'")),
        }
    }

    fn read_string_body(&mut self, start: Pos) -> Result<String, ReaderError> {
        let mut out = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(self.err_at(
                        ReaderErrorKind::EofInString,
                        start,
                        "unterminated string literal",
                    ));
                }
                Some('"') => return Ok(out),
                Some('\\') => match self.advance() {
                    None => {
                        return Err(self.err_at(
                            ReaderErrorKind::EofInString,
                            start,
                            "unterminated string literal",
                        ));
                    }
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('0') => out.push('\0'),
                    Some('u') => out.push(self.read_unicode_escape()?),
                    Some(other) => {
                        return Err(self.err(
                            ReaderErrorKind::InvalidEscape,
                            format!("unsupported escape \\{}", other),
                        ));
                    }
                },
                Some(c) => out.push(c),
            }
        }
    }

    /// Regex bodies keep backslashes verbatim except before a quote.
    fn read_regex_body(&mut self, start: Pos) -> Result<String, ReaderError> {
        let mut out = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(self.err_at(
                        ReaderErrorKind::EofInString,
                        start,
                        "unterminated regex literal",
                    ));
                }
                Some('"') => return Ok(out),
                Some('\\') => match self.advance() {
                    None => {
                        return Err(self.err_at(
                            ReaderErrorKind::EofInString,
                            start,
                            "unterminated regex literal",
                        ));
                    }
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn read_unicode_escape(&mut self) -> Result<char, ReaderError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let c = self
                .advance()
                .ok_or_else(|| self.err(ReaderErrorKind::InvalidEscape, "truncated \\u escape"))?;
            let digit = c.to_digit(16).ok_or_else(|| {
                self.err(
                    ReaderErrorKind::InvalidEscape,
                    format!("invalid hex digit '{}' in \\u escape", c),
                )
            })?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| {
            self.err(
                ReaderErrorKind::InvalidEscape,
                format!("\\u{:04x} is not a valid code point", code),
            )
        })
    }

    fn read_char_literal(&mut self, pos: Pos) -> Result<char, ReaderError> {
        let first = self
            .advance()
            .ok_or_else(|| self.err_at(ReaderErrorKind::UnexpectedEof, pos, "dangling '\\'"))?;
        // A single named character, \uXXXX, or one literal char.
        if first.is_alphabetic() {
            let mut word = String::new();
            word.push(first);
            while let Some(c) = self.peek() {
                if Self::is_terminator(c) {
                    break;
                }
                word.push(c);
                self.advance();
            }
            if word.len() == 1 {
                return Ok(first);
            }
            return match word.as_str() {
                "newline" => Ok('\n'),
                "space" => Ok(' '),
                "tab" => Ok('\t'),
                "return" => Ok('\r'),
                "backspace" => Ok('\u{8}'),
                "formfeed" => Ok('\u{c}'),
                w if w.starts_with('u') && w.len() == 5 => {
                    let code = u32::from_str_radix(&w[1..], 16).map_err(|_| {
                        self.err_at(
                            ReaderErrorKind::InvalidChar,
                            pos,
                            format!("invalid \\{}", w),
                        )
                    })?;
                    char::from_u32(code).ok_or_else(|| {
                        self.err_at(
                            ReaderErrorKind::InvalidChar,
                            pos,
                            format!("\\{} is not a valid code point", w),
                        )
                    })
                }
                w => Err(self.err_at(
                    ReaderErrorKind::InvalidChar,
                    pos,
                    format!("unknown character name \\{}", w),
                )),
            };
        }
        Ok(first)
    }

    fn read_token(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if Self::is_terminator(c) {
                break;
            }
            out.push(c);
            self.advance();
        }
        out
    }

    fn read_keyword(&mut self, pos: Pos) -> Result<Form, ReaderError> {
        let current_ns = self.peek() == Some(':');
        if current_ns {
            self.advance();
        }
        let token = self.read_token();
        if token.is_empty() {
            return Err(self.err_at(ReaderErrorKind::InvalidToken, pos, "empty keyword"));
        }
        let id = if current_ns {
            let ns = self.current_ns.clone();
            intern::intern(Some(&ns), &token)
        } else {
            intern::intern_qualified(&token)
        };
        Ok(Form::new(FormKind::Keyword(id), pos))
    }

    fn read_number_or_symbol(&mut self, pos: Pos) -> Result<Form, ReaderError> {
        let token = self.read_token();
        if token.is_empty() {
            return Err(self.err_at(ReaderErrorKind::InvalidToken, pos, "empty token"));
        }
        let first = token.chars().next().unwrap_or('_');
        let second = token.chars().nth(1);
        let numeric = first.is_ascii_digit()
            || ((first == '+' || first == '-') && second.map(|c| c.is_ascii_digit()).unwrap_or(false));
        if numeric {
            return self
                .parse_number(&token)
                .map(|kind| Form::new(kind, pos))
                .map_err(|detail| self.err_at(ReaderErrorKind::InvalidNumber, pos, detail));
        }
        match token.as_str() {
            "nil" => Ok(Form::new(FormKind::Nil, pos)),
            "true" => Ok(Form::new(FormKind::Bool(true), pos)),
            "false" => Ok(Form::new(FormKind::Bool(false), pos)),
            _ => Ok(Form::new(FormKind::Sym(intern::intern_qualified(&token)), pos)),
        }
    }

    fn parse_number(&self, token: &str) -> Result<FormKind, String> {
        let (sign, body) = match token.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, token.strip_prefix('+').unwrap_or(token)),
        };
        // Hex and octal integer forms.
        if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
            return i64::from_str_radix(hex, 16)
                .map(|n| FormKind::Int(sign * n))
                .map_err(|_| format!("invalid hex literal '{}'", token));
        }
        // Ratio syntax: parse-only, lowering to the division's value.
        if let Some((num, den)) = body.split_once('/') {
            let n: i64 = num
                .parse()
                .map_err(|_| format!("invalid ratio '{}'", token))?;
            let d: i64 = den
                .parse()
                .map_err(|_| format!("invalid ratio '{}'", token))?;
            if d == 0 {
                return Err(format!("ratio with zero denominator '{}'", token));
            }
            if n % d == 0 {
                return Ok(FormKind::Int(sign * (n / d)));
            }
            return Ok(FormKind::Float(sign as f64 * (n as f64 / d as f64)));
        }
        if !body.contains('.') && !body.contains('e') && !body.contains('E') {
            return body
                .parse::<i64>()
                .map(|n| FormKind::Int(sign * n))
                .map_err(|_| format!("invalid integer literal '{}'", token));
        }
        body.parse::<f64>()
            .map(|f| FormKind::Float(sign as f64 * f))
            .map_err(|_| format!("invalid number literal '{}'", token))
    }

    /// `#(...)`: rewrite `%`, `%1..%n`, `%&` into a fn form.
    fn fn_literal(&mut self, body: Vec<Form>, pos: Pos) -> Result<Form, ReaderError> {
        let mut max_arg = 0usize;
        let mut rest = false;
        scan_percents(&body, &mut max_arg, &mut rest);

        let params: Vec<SymId> = (1..=max_arg)
            .map(|i| intern::gensym(&format!("p{}", i)))
            .collect();
        let rest_param = if rest { Some(intern::gensym("rest")) } else { None };

        let rewritten: Vec<Form> = body
            .into_iter()
            .map(|f| rewrite_percents(f, &params, rest_param))
            .collect();

        let mut param_vec: Vec<Form> = params
            .iter()
            .map(|p| Form::synthetic(FormKind::Sym(*p)))
            .collect();
        if let Some(rp) = rest_param {
            param_vec.push(Form::sym("&"));
            param_vec.push(Form::synthetic(FormKind::Sym(rp)));
        }

        Ok(Form::new(
            FormKind::List(vec![
                Form::sym("fn"),
                Form::vector(param_vec),
                Form::list(rewritten),
            ]),
            pos,
        ))
    }
}

fn percent_index(name: &str) -> Option<usize> {
    match name {
        "%" => Some(1),
        "%&" => None,
        _ => name
            .strip_prefix('%')
            .and_then(|d| d.parse().ok())
            .filter(|&n| n >= 1),
    }
}

fn scan_percents(forms: &[Form], max_arg: &mut usize, rest: &mut bool) {
    for f in forms {
        match &f.kind {
            FormKind::Sym(id) => {
                let name = intern::name_of(*id);
                if intern::ns_of(*id).is_none() && name.starts_with('%') {
                    if name == "%&" {
                        *rest = true;
                    } else if let Some(i) = percent_index(name) {
                        *max_arg = (*max_arg).max(i);
                    }
                }
            }
            FormKind::List(items)
            | FormKind::Vector(items)
            | FormKind::Map(items)
            | FormKind::Set(items) => scan_percents(items, max_arg, rest),
            _ => {}
        }
    }
}

fn rewrite_percents(form: Form, params: &[SymId], rest: Option<SymId>) -> Form {
    let pos = form.pos;
    let meta = form.meta.clone();
    let kind = match form.kind {
        FormKind::Sym(id) => {
            let name = intern::name_of(id);
            if intern::ns_of(id).is_none() && name.starts_with('%') {
                if name == "%&" {
                    match rest {
                        Some(rp) => FormKind::Sym(rp),
                        None => FormKind::Sym(id),
                    }
                } else if let Some(i) = percent_index(name) {
                    match params.get(i - 1) {
                        Some(p) => FormKind::Sym(*p),
                        None => FormKind::Sym(id),
                    }
                } else {
                    FormKind::Sym(id)
                }
            } else {
                FormKind::Sym(id)
            }
        }
        FormKind::List(items) => FormKind::List(
            items
                .into_iter()
                .map(|f| rewrite_percents(f, params, rest))
                .collect(),
        ),
        FormKind::Vector(items) => FormKind::Vector(
            items
                .into_iter()
                .map(|f| rewrite_percents(f, params, rest))
                .collect(),
        ),
        FormKind::Map(items) => FormKind::Map(
            items
                .into_iter()
                .map(|f| rewrite_percents(f, params, rest))
                .collect(),
        ),
        FormKind::Set(items) => FormKind::Set(
            items
                .into_iter()
                .map(|f| rewrite_percents(f, params, rest))
                .collect(),
        ),
        other => other,
    };
    Form { kind, pos, meta }
}

/// `^:kw` -> `{:kw true}`, `^Sym` / `^"str"` -> `{:tag ...}`.
fn normalize_meta(meta: Form) -> Form {
    match &meta.kind {
        FormKind::Keyword(_) => Form::synthetic(FormKind::Map(vec![
            meta,
            Form::synthetic(FormKind::Bool(true)),
        ])),
        FormKind::Sym(_) | FormKind::Str(_) => {
            Form::synthetic(FormKind::Map(vec![Form::keyword("tag"), meta]))
        }
        _ => meta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_first(src: &str) -> Form {
        let mut r = Reader::new(src, "user", ReaderLimits::default());
        r.read_one().expect("read failed").expect("empty input")
    }

    fn read_err(src: &str) -> ReaderError {
        let mut r = Reader::new(src, "user", ReaderLimits::default());
        loop {
            match r.read_one() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected a reader error for {:?}", src),
                Err(e) => return e,
            }
        }
    }

    #[test]
    fn test_numbers() {
        assert_eq!(read_first("42").kind, FormKind::Int(42));
        assert_eq!(read_first("-7").kind, FormKind::Int(-7));
        assert_eq!(read_first("3.5").kind, FormKind::Float(3.5));
        assert_eq!(read_first("1e3").kind, FormKind::Float(1000.0));
        assert_eq!(read_first("0x1F").kind, FormKind::Int(31));
        // Ratio syntax is parse-only.
        assert_eq!(read_first("6/3").kind, FormKind::Int(2));
        assert_eq!(read_first("3/4").kind, FormKind::Float(0.75));
        match read_first("##Inf").kind {
            FormKind::Float(f) => assert!(f.is_infinite() && f > 0.0),
            other => panic!("expected Inf, got {:?}", other),
        }
    }

    #[test]
    fn test_symbols_keep_sign_chars() {
        assert!(read_first("+").is_sym("+"));
        assert!(read_first("-").is_sym("-"));
        assert!(read_first("x+y").is_sym("x+y"));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(read_first(r#""a\nb""#).kind, FormKind::Str("a\nb".into()));
        assert_eq!(read_first(r#""A""#).kind, FormKind::Str("A".into()));
        assert_eq!(read_err(r#""abc"#).kind, ReaderErrorKind::EofInString);
        assert_eq!(read_err(r#""\q""#).kind, ReaderErrorKind::InvalidEscape);
    }

    #[test]
    fn test_char_literals() {
        assert_eq!(read_first(r"\a").kind, FormKind::Char('a'));
        assert_eq!(read_first(r"\newline").kind, FormKind::Char('\n'));
        assert_eq!(read_first(r"\u0041").kind, FormKind::Char('A'));
        assert_eq!(read_err(r"\banana").kind, ReaderErrorKind::InvalidChar);
    }

    #[test]
    fn test_collections() {
        let v = read_first("[1 2 3]");
        assert_eq!(v.as_vector().map(<[Form]>::len), Some(3));
        let m = read_first("{:a 1, :b 2}");
        match m.kind {
            FormKind::Map(items) => assert_eq!(items.len(), 4),
            other => panic!("expected map, got {:?}", other),
        }
        let s = read_first("#{1 2}");
        match s.kind {
            FormKind::Set(items) => assert_eq!(items.len(), 2),
            other => panic!("expected set, got {:?}", other),
        }
        assert_eq!(read_err("{:a}").kind, ReaderErrorKind::OddMapForms);
        assert_eq!(read_err("(1 2").kind, ReaderErrorKind::UnexpectedEof);
        assert_eq!(read_err(")").kind, ReaderErrorKind::UnmatchedDelimiter);
        assert_eq!(read_err("(1 2]").kind, ReaderErrorKind::UnmatchedDelimiter);
    }

    #[test]
    fn test_quote_and_deref_macros() {
        let q = read_first("'x");
        assert!(q.is_call("quote"));
        let d = read_first("@a");
        assert!(d.is_call("clove.core/deref"));
        let v = read_first("#'foo");
        assert!(v.is_call("var"));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            read_first(":a").kind,
            FormKind::Keyword(intern::intern_name("a"))
        );
        assert_eq!(
            read_first(":ns/a").kind,
            FormKind::Keyword(intern::intern(Some("ns"), "a"))
        );
        assert_eq!(
            read_first("::local").kind,
            FormKind::Keyword(intern::intern(Some("user"), "local"))
        );
    }

    #[test]
    fn test_discard_form() {
        let f = read_first("#_ 1 2");
        assert_eq!(f.kind, FormKind::Int(2));
    }

    #[test]
    fn test_comments_and_commas() {
        let f = read_first("; leading\n  ,,, 5");
        assert_eq!(f.kind, FormKind::Int(5));
    }

    #[test]
    fn test_fn_literal_params() {
        let f = read_first("#(+ % %2)");
        let items = f.as_list().expect("fn form");
        assert!(items[0].is_sym("fn"));
        let params = items[1].as_vector().expect("param vector");
        assert_eq!(params.len(), 2);
        // The body references the generated params, not raw percents.
        let body = items[2].as_list().expect("body");
        assert_eq!(body[1].kind, params[0].kind);
        assert_eq!(body[2].kind, params[1].kind);
    }

    #[test]
    fn test_fn_literal_rest() {
        let f = read_first("#(apply + %&)");
        let items = f.as_list().expect("fn form");
        let params = items[1].as_vector().expect("param vector");
        assert!(params[0].is_sym("&"));
    }

    #[test]
    fn test_metadata_attaches() {
        let f = read_first("^:private foo");
        assert!(f.is_sym("foo"));
        let meta = f.meta.expect("meta");
        match meta.kind {
            FormKind::Map(ref items) => assert!(items[0].is_keyword("private")),
            ref other => panic!("expected meta map, got {:?}", other),
        }
    }

    #[test]
    fn test_depth_limit() {
        let limits = ReaderLimits {
            max_depth: 4,
            max_forms: 1000,
        };
        let mut r = Reader::new("((((((1))))))", "user", limits);
        let e = r.read_one().expect_err("depth limit");
        assert_eq!(e.kind, ReaderErrorKind::ReaderLimit);
    }

    #[test]
    fn test_regex_literal() {
        let f = read_first(r#"#"\d+""#);
        assert_eq!(f.kind, FormKind::Regex(r"\d+".into()));
    }

    #[test]
    fn test_positions_tracked() {
        let mut r = Reader::new("1\n  foo", "user", ReaderLimits::default());
        let one = r.read_one().unwrap().unwrap();
        assert_eq!(one.pos, Pos::new(1, 1));
        let foo = r.read_one().unwrap().unwrap();
        assert_eq!(foo.pos, Pos::new(2, 3));
    }
}
