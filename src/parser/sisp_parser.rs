use crate::compiler::Level;
use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind};
use serde_json::{Map, Number, Value};

/// One argument inside a head form or map form
enum Argument {
    /// `value`
    Positional(Value),
    /// `key: value`
    Labelled(String, Value),
}

/// Parser for the Sisp notation
///
/// Sisp is a keyed rendering of the serde data model, so the parser produces a
/// [`serde_json::Value`] which each level then deserializes into its own program type:
///
/// - `name(a: 1, b: 2)` is the map `{"name": {"a": 1, "b": 2}}`
/// - `name(x)` is `{"name": x}`, `name(x, y)` is `{"name": [x, y]}` and `name()` is `{"name": {}}`
/// - `(a: 1, b: 2)` is a map without a head, `[x, y]` is an array
/// - bare atoms and quoted strings are strings
pub struct SispParser {
    level: Level,
    tokens: Vec<Token>,
    current: usize,
}

impl SispParser {
    /// Creates a new parser over tokens scanned from program text at `level`
    pub fn new(level: Level, tokens: Vec<Token>) -> Self {
        SispParser {
            level,
            tokens,
            current: 0,
        }
    }

    /// Parses exactly one value followed by the end of input
    pub fn parse(&mut self) -> Result<Value> {
        let value = self.parse_value()?;
        if !self.is_at_end() {
            return Err(self.unexpected("end of input"));
        }
        Ok(value)
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek().kind.clone() {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Value::Number(n.into()))
            }
            TokenKind::Float(f) => {
                let token = self.advance();
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| Error::SyntaxError {
                        level: self.level,
                        line: token.line,
                        col: token.column,
                        message: format!("{} is not a finite number", f),
                    })
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Value::String(s))
            }
            TokenKind::True => {
                self.advance();
                Ok(Value::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Value::Bool(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Value::Null)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::LeftParen) {
                    self.advance();
                    self.parse_head_form(name)
                } else {
                    Ok(Value::String(name))
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                self.parse_map_form()
            }
            TokenKind::LeftBracket => {
                self.advance();
                self.parse_array()
            }
            TokenKind::Eof => Err(self.unexpected("a value")),
            _ => Err(self.unexpected("a value")),
        }
    }

    /// Parses the arguments of `name(...)`; the opening parenthesis is already consumed
    fn parse_head_form(&mut self, head: String) -> Result<Value> {
        let line = self.previous().line;
        let col = self.previous().column;
        let arguments = self.parse_arguments()?;

        let labelled = arguments
            .iter()
            .filter(|a| matches!(a, Argument::Labelled(..)))
            .count();
        let payload = if arguments.is_empty() {
            Value::Object(Map::new())
        } else if labelled == arguments.len() {
            self.labelled_map(arguments, line, col)?
        } else if labelled == 0 {
            let mut values: Vec<Value> = arguments
                .into_iter()
                .filter_map(|a| match a {
                    Argument::Positional(v) => Some(v),
                    Argument::Labelled(..) => None,
                })
                .collect();
            if values.len() == 1 {
                values.remove(0)
            } else {
                Value::Array(values)
            }
        } else {
            return Err(Error::SyntaxError {
                level: self.level,
                line,
                col,
                message: format!("{}(...) mixes labelled and positional arguments", head),
            });
        };

        let mut map = Map::new();
        map.insert(head, payload);
        Ok(Value::Object(map))
    }

    /// Parses `(key: value, ...)`; the opening parenthesis is already consumed
    fn parse_map_form(&mut self) -> Result<Value> {
        let line = self.previous().line;
        let col = self.previous().column;
        let arguments = self.parse_arguments()?;
        if arguments
            .iter()
            .any(|a| matches!(a, Argument::Positional(_)))
        {
            return Err(Error::SyntaxError {
                level: self.level,
                line,
                col,
                message: "a form without a head takes only labelled arguments".to_string(),
            });
        }
        self.labelled_map(arguments, line, col)
    }

    fn labelled_map(&self, arguments: Vec<Argument>, line: usize, col: usize) -> Result<Value> {
        let mut map = Map::new();
        for argument in arguments {
            if let Argument::Labelled(key, value) = argument {
                if map.insert(key.clone(), value).is_some() {
                    return Err(Error::SyntaxError {
                        level: self.level,
                        line,
                        col,
                        message: format!("label {} appears more than once", key),
                    });
                }
            }
        }
        Ok(Value::Object(map))
    }

    fn parse_arguments(&mut self) -> Result<Vec<Argument>> {
        let mut arguments = Vec::new();

        while !self.check(&TokenKind::RightParen) {
            let label = match &self.peek().kind {
                TokenKind::Identifier(name) | TokenKind::String(name)
                    if self.peek_next_is(&TokenKind::Colon) =>
                {
                    Some(name.clone())
                }
                _ => None,
            };

            match label {
                Some(label) => {
                    self.advance(); // label
                    self.advance(); // :
                    arguments.push(Argument::Labelled(label, self.parse_value()?));
                }
                None => arguments.push(Argument::Positional(self.parse_value()?)),
            }

            if self.check(&TokenKind::Comma) {
                self.advance();
            } else if !self.check(&TokenKind::RightParen) {
                return Err(self.unexpected("',' or ')'"));
            }
        }

        self.advance(); // )
        Ok(arguments)
    }

    fn parse_array(&mut self) -> Result<Value> {
        let mut elements = Vec::new();

        while !self.check(&TokenKind::RightBracket) {
            elements.push(self.parse_value()?);

            if self.check(&TokenKind::Comma) {
                self.advance();
            } else if !self.check(&TokenKind::RightBracket) {
                return Err(self.unexpected("',' or ']'"));
            }
        }

        self.advance(); // ]
        Ok(Value::Array(elements))
    }

    fn unexpected(&self, expected: &str) -> Error {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            return Error::UnexpectedEof {
                level: self.level,
                line: token.line,
                col: token.column,
            };
        }
        Error::UnexpectedToken {
            level: self.level,
            expected: expected.to_string(),
            got: token.kind.describe(),
            line: token.line,
            col: token.column,
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn peek_next_is(&self, kind: &TokenKind) -> bool {
        self.tokens
            .get(self.current + 1)
            .map(|t| &t.kind == kind)
            .unwrap_or(false)
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.current.min(last)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }
}
