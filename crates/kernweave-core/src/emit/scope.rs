//! Indentation-aware text sink with an explicit scope stack.
//!
//! The writer knows nothing about blocks. It only tracks which scopes are
//! open and refuses to close a scope that is not there, so an emission bug
//! surfaces as an error instead of as unbalanced source.

use crate::error::ScopeError;
use crate::ir::CaseKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// `{ ... }`
    Brace,
    /// A case body, ended by `break;`.
    Case,
}

/// Token-level record of what was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeEvent {
    Open,
    Close,
    Else,
    CaseLabel,
    Break,
    Statement,
    Comment,
}

#[derive(Debug)]
enum PendingHeader {
    Line(String),
    /// `else` joined onto the preceding `}` line.
    InlineElse,
}

#[derive(Debug)]
pub struct ScopeWriter {
    out: String,
    indent_unit: String,
    scopes: Vec<Scope>,
    header: Option<PendingHeader>,
    /// Length of `out` right after the most recent `}` line.
    after_close: Option<usize>,
    events: Vec<ScopeEvent>,
}

impl ScopeWriter {
    pub fn new(indent_width: usize) -> Self {
        ScopeWriter {
            out: String::new(),
            indent_unit: " ".repeat(indent_width),
            scopes: Vec::new(),
            header: None,
            after_close: None,
            events: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn open_scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn events(&self) -> &[ScopeEvent] {
        &self.events
    }

    fn write_line(&mut self, text: &str) {
        for _ in 0..self.scopes.len() {
            self.out.push_str(&self.indent_unit);
        }
        self.out.push_str(text);
        self.out.push('\n');
        self.after_close = None;
    }

    fn flush_header(&mut self) {
        match self.header.take() {
            Some(PendingHeader::Line(text)) => self.write_line(&text),
            Some(PendingHeader::InlineElse) => {
                self.out.push_str(" else\n");
                self.after_close = None;
            }
            None => {}
        }
    }

    /// Hold a scope header (`if (c)`, `switch (v)`, `for (...)`) so the next
    /// [`open_brace`](Self::open_brace) lands on the same line.
    pub fn emit_header(&mut self, text: &str) {
        self.flush_header();
        self.header = Some(PendingHeader::Line(text.to_string()));
    }

    /// `else`, joined to the preceding `}` when that was the last line.
    pub fn emit_else(&mut self) {
        self.flush_header();
        self.events.push(ScopeEvent::Else);
        if self.after_close == Some(self.out.len()) && self.out.ends_with('\n') {
            self.out.pop();
            self.header = Some(PendingHeader::InlineElse);
        } else {
            self.header = Some(PendingHeader::Line("else".to_string()));
        }
    }

    pub fn open_brace(&mut self) {
        match self.header.take() {
            Some(PendingHeader::Line(text)) => self.write_line(&format!("{text} {{")),
            Some(PendingHeader::InlineElse) => {
                self.out.push_str(" else {\n");
                self.after_close = None;
            }
            None => self.write_line("{"),
        }
        self.scopes.push(Scope::Brace);
        self.events.push(ScopeEvent::Open);
    }

    pub fn close_brace(&mut self) -> Result<(), ScopeError> {
        self.flush_header();
        match self.scopes.last() {
            None => return Err(ScopeError::CloseWithoutOpen),
            Some(Scope::Case) => return Err(ScopeError::CloseInsideCase),
            Some(Scope::Brace) => {}
        }
        self.scopes.pop();
        self.write_line("}");
        self.after_close = Some(self.out.len());
        self.events.push(ScopeEvent::Close);
        Ok(())
    }

    /// One label line per key, then a single case body scope.
    pub fn emit_case_label(&mut self, keys: &[CaseKey]) {
        self.flush_header();
        for key in keys {
            match key {
                CaseKey::Value(v) => self.write_line(&format!("case {v}:")),
                CaseKey::Default => self.write_line("default:"),
            }
        }
        self.scopes.push(Scope::Case);
        self.events.push(ScopeEvent::CaseLabel);
    }

    /// `break;` ending the innermost case body.
    pub fn emit_break_statement(&mut self) {
        self.flush_header();
        self.write_line("break;");
        if self.scopes.last() == Some(&Scope::Case) {
            self.scopes.pop();
        }
        self.events.push(ScopeEvent::Break);
    }

    pub fn emit_statement(&mut self, text: &str) {
        self.flush_header();
        self.write_line(text);
        self.events.push(ScopeEvent::Statement);
    }

    pub fn emit_comment(&mut self, text: &str) {
        self.flush_header();
        self.write_line(&format!("// {text}"));
        self.events.push(ScopeEvent::Comment);
    }

    /// Finished source text, or an error if any scope is still open.
    pub fn finish(mut self) -> Result<(String, Vec<ScopeEvent>), ScopeError> {
        self.flush_header();
        if !self.scopes.is_empty() {
            return Err(ScopeError::Unclosed(self.scopes.len()));
        }
        Ok((self.out, self.events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_else_joins_lines() {
        let mut w = ScopeWriter::new(2);
        w.emit_header("if (c)");
        w.open_brace();
        w.emit_statement("a = 1;");
        w.close_brace().unwrap();
        w.emit_else();
        w.open_brace();
        w.emit_statement("a = 2;");
        w.close_brace().unwrap();
        let (text, events) = w.finish().unwrap();
        assert_eq!(text, "if (c) {\n  a = 1;\n} else {\n  a = 2;\n}\n");
        assert_eq!(
            events,
            vec![
                ScopeEvent::Open,
                ScopeEvent::Statement,
                ScopeEvent::Close,
                ScopeEvent::Else,
                ScopeEvent::Open,
                ScopeEvent::Statement,
                ScopeEvent::Close,
            ]
        );
    }

    #[test]
    fn case_label_indents_until_break() {
        let mut w = ScopeWriter::new(2);
        w.emit_header("switch (k)");
        w.open_brace();
        w.emit_case_label(&[CaseKey::Value(0), CaseKey::Value(1)]);
        w.emit_statement("f();");
        w.emit_break_statement();
        w.emit_case_label(&[CaseKey::Default]);
        w.emit_break_statement();
        w.close_brace().unwrap();
        let (text, _) = w.finish().unwrap();
        assert_eq!(
            text,
            "switch (k) {\n  case 0:\n  case 1:\n    f();\n    break;\n  default:\n    break;\n}\n"
        );
    }

    #[test]
    fn close_without_open_is_an_error() {
        let mut w = ScopeWriter::new(2);
        assert_eq!(w.close_brace(), Err(ScopeError::CloseWithoutOpen));
    }

    #[test]
    fn close_inside_case_is_an_error() {
        let mut w = ScopeWriter::new(2);
        w.open_brace();
        w.emit_case_label(&[CaseKey::Default]);
        assert_eq!(w.close_brace(), Err(ScopeError::CloseInsideCase));
    }

    #[test]
    fn unclosed_scope_fails_finish() {
        let mut w = ScopeWriter::new(4);
        w.emit_header("for (;;)");
        w.open_brace();
        w.emit_statement("x;");
        assert_eq!(w.finish().unwrap_err(), ScopeError::Unclosed(1));
    }

    #[test]
    fn else_after_statement_starts_new_line() {
        let mut w = ScopeWriter::new(2);
        w.emit_statement("x;");
        w.emit_else();
        w.open_brace();
        w.close_brace().unwrap();
        let (text, _) = w.finish().unwrap();
        assert_eq!(text, "x;\nelse {\n}\n");
    }
}
