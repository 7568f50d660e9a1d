//! Default parser for the ES-module subset the graph analyzes.
//!
//! Recursive descent with precedence climbing for expressions. Hosts that
//! want a different parser can return a pre-built [`Program`] from their
//! `load` or `transform` hooks; this module is only the fallback.

mod lexer;
mod parser;

pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;

use crate::ast::{Program, Span};

/// Parser configuration.
///
/// Dynamic import and `import.meta` are always enabled; only top-level
/// `await` is gated.
#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    /// Allow `await` at module top level.
    pub allow_top_level_await: bool,
}

/// Parse error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} at {}..{}", span.start, span.end)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    /// Create a new parse error.
    #[must_use]
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// Parse a module source into a [`Program`].
pub fn parse_module(source: &str, options: &ParserOptions) -> Result<Program, ParseError> {
    Parser::new(source, options.clone()).parse()
}
