//! Lexical analysis for the Sisp program notation
//!
//! Converts program text into a stream of tokens. Every ladder level is written in the same
//! notation, so one scanner serves all of them.

mod sisp_scanner;
mod token;

pub use sisp_scanner::SispScanner;
pub use token::{Token, TokenKind};
