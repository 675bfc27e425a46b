use serde::{Deserialize, Serialize};

/// A single token from program text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The type of token
    pub kind: TokenKind,
    /// Original text of the token
    pub lexeme: String,
    /// Line number where token appears (1-indexed)
    pub line: usize,
    /// Column number where token starts (1-indexed)
    pub column: usize,
}

impl Token {
    /// Creates a new token with the given properties
    pub fn new(kind: TokenKind, lexeme: String, line: usize, column: usize) -> Self {
        Token {
            kind,
            lexeme,
            line,
            column,
        }
    }
}

/// All token types of the Sisp notation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    /// Integer literal
    Integer(i64),
    /// Floating-point literal
    Float(f64),
    /// Quoted string literal
    String(String),
    /// Boolean true literal
    True,
    /// Boolean false literal
    False,
    /// `nil`
    Null,

    /// Bare atom such as `set`, `x` or `cc.ret$3`
    Identifier(String),

    // Delimiters
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// ,
    Comma,
    /// :
    Colon,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Short human-readable description used in parse errors
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Integer(n) => format!("integer {}", n),
            TokenKind::Float(f) => format!("number {}", f),
            TokenKind::String(s) => format!("string {:?}", s),
            TokenKind::True => "true".to_string(),
            TokenKind::False => "false".to_string(),
            TokenKind::Null => "nil".to_string(),
            TokenKind::Identifier(name) => format!("atom {}", name),
            TokenKind::LeftParen => "'('".to_string(),
            TokenKind::RightParen => "')'".to_string(),
            TokenKind::LeftBracket => "'['".to_string(),
            TokenKind::RightBracket => "']'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}
