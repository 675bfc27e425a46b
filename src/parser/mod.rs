//! Sisp program notation
//!
//! Parses and prints the keyed S-expression notation shared by every ladder level. Programs are
//! serde types; [`decode`] and [`encode`] move them through [`serde_json::Value`] so that one
//! parser and one printer serve the whole ladder.

mod sisp_parser;
mod sisp_printer;

pub use sisp_parser::SispParser;
pub use sisp_printer::SispPrinter;

use crate::compiler::Level;
use crate::error::{Error, Result};
use crate::lexer::{SispScanner, Token, TokenKind};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parses Sisp text written at `level` into a value tree
pub fn parse(level: Level, text: &str) -> Result<serde_json::Value> {
    let tokens = SispScanner::new(level, text).scan_tokens()?;
    SispParser::new(level, tokens).parse()
}

/// Decodes a program of type `T` from Sisp text, reporting errors against `level`
pub fn decode<T: DeserializeOwned>(level: Level, text: &str) -> Result<T> {
    let tokens = SispScanner::new(level, text).scan_tokens()?;
    let value = SispParser::new(level, tokens.clone()).parse()?;
    serde_json::from_value(value).map_err(|e| {
        let message = e.to_string();
        let (line, col) = position(&tokens, &message);
        Error::Decode {
            level,
            line,
            col,
            message,
        }
    })
}

/// Encodes a program as Sisp text
pub fn encode<T: Serialize>(level: Level, program: &T) -> Result<String> {
    let value = serde_json::to_value(program)
        .map_err(|e| Error::validation(level, format!("program cannot be encoded: {}", e)))?;
    Ok(SispPrinter::new().print(&value))
}

/// Position of the first atom quoted in a decoder message, or of the first token
fn position(tokens: &[Token], message: &str) -> (usize, usize) {
    let quoted = message.split('`').skip(1).step_by(2);
    let named = quoted
        .filter_map(|atom| {
            tokens.iter().find(|token| match &token.kind {
                TokenKind::Identifier(name) | TokenKind::String(name) => name == atom,
                _ => false,
            })
        })
        .next();
    named
        .or_else(|| tokens.first())
        .map(|token| (token.line, token.column))
        .unwrap_or((1, 1))
}
