use crate::funcs::Arity;
use thiserror::Error;

/// Line and column (both 1-based) of a byte offset in template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Compute the position of `offset` in `source`. Offsets past the end
    /// clamp to the end of the source.
    pub fn locate(source: &str, offset: usize) -> Self {
        let mut end = offset.min(source.len());
        while !source.is_char_boundary(end) {
            end -= 1;
        }
        let before = &source[..end];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        Self { line, column }
    }
}

/// Malformed template source. Raised while lexing or parsing, before any
/// render attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error{}: {message}", describe(.offset, .position))]
pub struct SyntaxError {
    pub message: String,
    /// Byte offset into the template source.
    pub offset: usize,
    /// Filled in once the source text is known (see [`SyntaxError::locate`]).
    pub position: Option<Position>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
            position: None,
        }
    }

    /// Attach the line/column of the error offset within `source`.
    pub fn locate(mut self, source: &str) -> Self {
        self.position = Some(Position::locate(source, self.offset));
        self
    }
}

fn describe(offset: &usize, position: &Option<Position>) -> String {
    match position {
        Some(pos) => format!(" at line {}, column {}", pos.line, pos.column),
        None => format!(" at offset {offset}"),
    }
}

/// Failure reported by a registry function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FuncError {
    pub message: String,
}

impl FuncError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn type_mismatch(expected: &str, found: &'static str) -> Self {
        Self::new(format!("expected {expected}, got {found}"))
    }
}

/// Failure while rendering a parsed template against a context.
///
/// Offsets point at the start of the action that failed.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("field `{path}` not found (offset {offset})")]
    MissingField { path: String, offset: usize },

    #[error("can't evaluate field `{field}` in {kind} value (offset {offset})")]
    NotARecord {
        field: String,
        kind: &'static str,
        offset: usize,
    },

    #[error("function `{name}` not defined (offset {offset})")]
    UnknownFunction { name: String, offset: usize },

    #[error("wrong number of arguments for `{name}`: expected {expected}, got {got} (offset {offset})")]
    Arity {
        name: String,
        expected: Arity,
        got: usize,
        offset: usize,
    },

    #[error("error calling `{name}` (offset {offset}): {source}")]
    Function {
        name: String,
        offset: usize,
        #[source]
        source: FuncError,
    },

    #[error("range can't iterate over {kind} value (offset {offset})")]
    NotIterable { kind: &'static str, offset: usize },

    #[error("render step limit of {limit} exceeded")]
    ResourceLimitExceeded { limit: u64 },

    #[error("output sink rejected write")]
    Write,

    #[error("output sink failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Either half of the one-shot `render` entry points.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
