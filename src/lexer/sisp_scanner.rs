use super::token::{Token, TokenKind};
use crate::compiler::Level;
use crate::error::{Error, Result};

/// Scanner for the Sisp notation used by every ladder level
pub struct SispScanner {
    /// Level whose program text is scanned, named in errors
    level: Level,
    /// Source text as character vector
    source: Vec<char>,
    /// Accumulated tokens
    tokens: Vec<Token>,
    /// Start position of current token
    start: usize,
    /// Column where the current token starts
    start_column: usize,
    /// Current position in source
    current: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
}

impl SispScanner {
    /// Creates a new scanner over program text at `level`
    pub fn new(level: Level, source: &str) -> Self {
        SispScanner {
            level,
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            start_column: 1,
            current: 0,
            line: 1,
            column: 1,
        }
    }

    /// Scans all tokens and returns them, terminated by an `Eof` token
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.start_column = self.column;
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            String::new(),
            self.line,
            self.column,
        ));

        Ok(std::mem::take(&mut self.tokens))
    }

    fn scan_token(&mut self) -> Result<()> {
        let c = self.advance();

        match c {
            ' ' | '\r' | '\t' => {}
            '\n' => {
                self.line += 1;
                self.column = 1;
            }

            ';' => self.skip_line_comment(),

            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            '[' => self.add_token(TokenKind::LeftBracket),
            ']' => self.add_token(TokenKind::RightBracket),
            ',' => self.add_token(TokenKind::Comma),
            ':' => self.add_token(TokenKind::Colon),

            '"' => self.scan_string()?,

            '-' if self.peek().is_ascii_digit() => self.scan_number()?,
            c if c.is_ascii_digit() => self.scan_number()?,

            c if c.is_alphabetic() || c == '_' => self.scan_atom(),

            _ => {
                return Err(Error::SyntaxError {
                    level: self.level,
                    line: self.line,
                    col: self.start_column,
                    message: format!("unexpected character '{}'", c),
                });
            }
        }

        Ok(())
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn scan_string(&mut self) -> Result<()> {
        let mut value = String::new();

        while !self.is_at_end() && self.peek() != '"' {
            if self.peek() == '\\' {
                self.advance();
                if self.is_at_end() {
                    break;
                }
                let escaped = self.advance();
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    _ => {
                        return Err(Error::SyntaxError {
                            level: self.level,
                            line: self.line,
                            col: self.column,
                            message: format!("invalid escape sequence \\{}", escaped),
                        });
                    }
                }
            } else {
                if self.peek() == '\n' {
                    self.line += 1;
                    self.column = 0;
                }
                value.push(self.advance());
            }
        }

        if self.is_at_end() {
            return Err(Error::SyntaxError {
                level: self.level,
                line: self.line,
                col: self.start_column,
                message: "unterminated string".to_string(),
            });
        }

        self.advance(); // Closing "

        self.add_token(TokenKind::String(value));
        Ok(())
    }

    fn scan_number(&mut self) -> Result<()> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance(); // consume .
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text: String = self.source[self.start..self.current].iter().collect();

        let kind = if is_float {
            text.parse().map(TokenKind::Float).map_err(|_| Error::SyntaxError {
                level: self.level,
                line: self.line,
                col: self.start_column,
                message: format!("invalid number {}", text),
            })?
        } else {
            text.parse().map(TokenKind::Integer).map_err(|_| Error::SyntaxError {
                level: self.level,
                line: self.line,
                col: self.start_column,
                message: format!("integer {} out of range", text),
            })?
        };

        self.add_token(kind);
        Ok(())
    }

    /// Atoms may contain `.` and `$` so that generated names such as `cc.ret$3` stay bare
    fn scan_atom(&mut self) {
        while self.peek().is_alphanumeric() || matches!(self.peek(), '_' | '.' | '$') {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();

        let kind = match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" => TokenKind::Null,
            _ => TokenKind::Identifier(text),
        };

        self.add_token(kind);
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        self.column += 1;
        c
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.source.len() {
            '\0'
        } else {
            self.source[self.current + 1]
        }
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme: String = self.source[self.start..self.current].iter().collect();
        self.tokens
            .push(Token::new(kind, lexeme, self.line, self.start_column));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_form() {
        let mut scanner = SispScanner::new(Level::EX, "set(x, 1)");
        let tokens = scanner.scan_tokens().unwrap();

        assert_eq!(tokens.len(), 7); // set ( x , 1 ) EOF
        assert_eq!(tokens[0].kind, TokenKind::Identifier("set".into()));
        assert_eq!(tokens[1].kind, TokenKind::LeftParen);
        assert_eq!(tokens[2].kind, TokenKind::Identifier("x".into()));
        assert_eq!(tokens[3].kind, TokenKind::Comma);
        assert_eq!(tokens[4].kind, TokenKind::Integer(1));
        assert_eq!(tokens[5].kind, TokenKind::RightParen);
        assert_eq!(tokens[6].kind, TokenKind::Eof);
    }

    #[test]
    fn test_generated_names_are_single_atoms() {
        let mut scanner = SispScanner::new(Level::EX, "cc.ret$12");
        let tokens = scanner.scan_tokens().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier("cc.ret$12".into()));
    }

    #[test]
    fn test_negative_integer_and_keywords() {
        let mut scanner = SispScanner::new(Level::EX, "frame(-16) true nil");
        let tokens = scanner.scan_tokens().unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Integer(-16));
        assert_eq!(tokens[4].kind, TokenKind::True);
        assert_eq!(tokens[5].kind, TokenKind::Null);
    }

    #[test]
    fn test_comment_and_positions() {
        let mut scanner = SispScanner::new(Level::EX, "; header\n  return(x)");
        let tokens = scanner.scan_tokens().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier("return".into()));
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[0].column, 3);
    }

    #[test]
    fn test_unterminated_string() {
        let mut scanner = SispScanner::new(Level::EX, "\"abc");
        assert!(matches!(
            scanner.scan_tokens(),
            Err(Error::SyntaxError { level: Level::EX, line: 1, .. })
        ));
    }

    #[test]
    fn test_unexpected_character() {
        let mut scanner = SispScanner::new(Level::EX, "set(x, @)");
        assert!(matches!(
            scanner.scan_tokens(),
            Err(Error::SyntaxError { col: 8, .. })
        ));
    }
}
