use std::io;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use thiserror::Error;

use crate::position::Position;

/// Errors that stop parsing of a page.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{pos}: block has no type")]
    NoBlockType { pos: Position },

    #[error("{pos}: attempted to close main block")]
    CloseMainBlock { pos: Position },

    #[error("cannot read page source: {0}")]
    Io(#[from] io::Error),
}

impl ParseError {
    pub fn position(&self) -> Option<Position> {
        match self {
            ParseError::NoBlockType { pos } | ParseError::CloseMainBlock { pos } => Some(*pos),
            ParseError::Io(_) => None,
        }
    }

    /// Message without the position prefix.
    pub fn message(&self) -> String {
        match self {
            ParseError::NoBlockType { .. } => "block has no type".to_string(),
            ParseError::CloseMainBlock { .. } => "attempted to close main block".to_string(),
            ParseError::Io(e) => format!("cannot read page source: {}", e),
        }
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self, file_id: usize, source: &str) -> Diagnostic<usize> {
        let diagnostic = Diagnostic::new(Severity::Error).with_message(self.message());
        match self.position() {
            Some(pos) => {
                diagnostic.with_labels(vec![Label::primary(file_id, pos.span_in(source))])
            }
            None => diagnostic,
        }
    }
}

/// Errors from reading or writing page variables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VarError {
    #[error("'{segment}' in '{path}' is not a map")]
    NotMap { path: String, segment: String },

    #[error("variable @{path} is {found}, expected {expected}")]
    WrongType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("empty variable name")]
    EmptyName,
}
