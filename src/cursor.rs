// src/cursor.rs
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("{0}")]
    InvalidSyntax(String),
}

impl From<String> for ParseError {
    fn from(msg: String) -> Self {
        ParseError::InvalidSyntax(msg)
    }
}

/// Numeric literal as scanned from source text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

/// Character cursor shared by the dotted-path parser and the lexer.
pub struct Cursor<'a> {
    s: &'a str,
    i: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, i: 0, line: 1 }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn pos(&self) -> usize {
        self.i
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.i += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// `[A-Za-z_][A-Za-z0-9_]*`
    pub fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let start = self.i;
        match self.peek_char() {
            Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
            _ => return Err(ParseError::InvalidSyntax("identifier expected".into())),
        }
        while let Some(c) = self.peek_char() {
            if c == '_' || c.is_ascii_alphanumeric() {
                self.i += 1;
            } else {
                break;
            }
        }
        Ok(self.s[start..self.i].to_string())
    }

    /// Unsigned run of ASCII digits.
    pub fn parse_digits(&mut self) -> Result<&'a str, ParseError> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(ParseError::InvalidSyntax("digits expected".into()));
        }
        Ok(&self.s[start..self.i])
    }

    pub fn parse_number(&mut self) -> Result<Number, ParseError> {
        let start = self.i;
        self.parse_digits()?;
        let mut is_float = false;
        if self.peek_char() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            self.i += 1;
            self.parse_digits()?;
            is_float = true;
        } else if self.peek_char() == Some('.') && !self.peek_nth(1).is_some_and(is_ident_start) {
            // `1.` is a float, `1.real` would be attribute access
            self.i += 1;
            is_float = true;
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let mark = self.i;
            self.i += 1;
            if matches!(self.peek_char(), Some('+') | Some('-')) {
                self.i += 1;
            }
            if self.parse_digits().is_ok() {
                is_float = true;
            } else {
                self.i = mark;
            }
        }
        let text = &self.s[start..self.i];
        if is_float {
            text.parse::<f64>()
                .map(Number::Float)
                .map_err(|_| ParseError::InvalidSyntax(format!("bad float literal '{text}'")))
        } else {
            text.parse::<i64>()
                .map(Number::Int)
                .map_err(|_| ParseError::InvalidSyntax(format!("integer literal '{text}' is too large")))
        }
    }

    pub fn parse_quoted_string(&mut self) -> Result<String, ParseError> {
        let quote = self
            .peek_char()
            .ok_or_else(|| ParseError::InvalidSyntax("string".into()))?;
        if quote != '\'' && quote != '"' {
            return Err(ParseError::InvalidSyntax("expected quoted string".into()));
        }
        self.i += 1;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            if c == quote {
                return Ok(out);
            }
            if c == '\n' {
                break;
            }
            if c == '\\' {
                if let Some(nc) = self.bump() {
                    match nc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' => out.push('\\'),
                        '"' => out.push('"'),
                        '\'' => out.push('\''),
                        '\n' => {}
                        _ => {
                            out.push('\\');
                            out.push(nc);
                        }
                    }
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        Err(ParseError::InvalidSyntax("unterminated string".into()))
    }

    pub fn expect(&mut self, c: char) -> Result<(), ParseError> {
        if self.consume_char(c) {
            Ok(())
        } else {
            Err(ParseError::InvalidSyntax(format!("expected '{}'", c)))
        }
    }

    pub fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub fn consume_str(&mut self, lit: &str) -> bool {
        if self.peek_str(lit) {
            self.i += lit.len();
            self.line += lit.matches('\n').count();
            true
        } else {
            false
        }
    }

    pub fn next_char(&mut self) -> Option<char> {
        self.bump()
    }

    pub fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    pub fn peek_nth(&self, n: usize) -> Option<char> {
        self.s[self.i..].chars().nth(n)
    }

    pub fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    /// Skips spaces, tabs and carriage returns, but not newlines.
    pub fn skip_inline_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == ' ' || c == '\t' || c == '\r' || c == '\x0c' {
                self.i += 1;
            } else {
                break;
            }
        }
    }

    pub fn skip_to_eol(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }
            self.i += c.len_utf8();
        }
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}

pub fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers() {
        assert_eq!(Cursor::new("42").parse_number(), Ok(Number::Int(42)));
        assert_eq!(Cursor::new("2.5").parse_number(), Ok(Number::Float(2.5)));
        assert_eq!(Cursor::new("1e3").parse_number(), Ok(Number::Float(1000.0)));
        assert_eq!(Cursor::new("3.").parse_number(), Ok(Number::Float(3.0)));
    }

    #[test]
    fn identifier_must_not_start_with_digit() {
        assert!(Cursor::new("9lives").parse_identifier().is_err());
        assert_eq!(Cursor::new("_x9 rest").parse_identifier(), Ok("_x9".to_string()));
    }

    #[test]
    fn quoted_strings_with_escapes() {
        let mut c = Cursor::new(r#"'it\'s\n' tail"#);
        assert_eq!(c.parse_quoted_string(), Ok("it's\n".to_string()));
        assert!(Cursor::new("'open").parse_quoted_string().is_err());
    }

    #[test]
    fn tracks_lines() {
        let mut c = Cursor::new("a\nb");
        c.next_char();
        c.next_char();
        assert_eq!(c.line(), 2);
    }
}
