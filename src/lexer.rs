// src/lexer.rs
use std::fmt;

use crate::cursor::{is_ident_start, Cursor, Number, ParseError};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Name(n) => write!(f, "'{n}'"),
            Tok::Int(i) => write!(f, "{i}"),
            Tok::Float(x) => write!(f, "{x}"),
            Tok::Str(s) => write!(f, "{s:?}"),
            Tok::Op(op) => write!(f, "'{op}'"),
            Tok::Newline => write!(f, "end of line"),
            Tok::Indent => write!(f, "indent"),
            Tok::Dedent => write!(f, "dedent"),
            Tok::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

// Longest operators first.
const OPERATORS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "+", "-", "*", "/", "%", "<", ">",
    "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
];

/// Splits source text into tokens, turning leading whitespace into
/// `Indent`/`Dedent` pairs. Newlines inside brackets are insignificant.
/// The first non-blank line sets the base indentation, so fragments copied
/// from an indented config file need no dedenting.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer {
        cur: Cursor::new(source),
        out: Vec::new(),
        indents: Vec::new(),
        depth: 0,
    };
    lexer.run()?;
    Ok(lexer.out)
}

struct Lexer<'a> {
    cur: Cursor<'a>,
    out: Vec<Token>,
    indents: Vec<usize>,
    depth: usize,
}

impl Lexer<'_> {
    fn push(&mut self, tok: Tok) {
        let line = self.cur.line();
        self.out.push(Token { tok, line });
    }

    fn error(&self, msg: impl fmt::Display) -> ParseError {
        ParseError::InvalidSyntax(format!("line {}: {msg}", self.cur.line()))
    }

    fn run(&mut self) -> Result<(), ParseError> {
        let mut at_line_start = true;
        loop {
            if at_line_start && self.depth == 0 {
                let width = self.indentation();
                match self.cur.peek_char() {
                    None => break,
                    Some('\n') => {
                        self.cur.next_char();
                        continue;
                    }
                    Some('#') => {
                        self.cur.skip_to_eol();
                        continue;
                    }
                    _ => {}
                }
                self.indent_to(width)?;
                at_line_start = false;
            }

            self.cur.skip_inline_ws();
            let Some(c) = self.cur.peek_char() else {
                break;
            };
            match c {
                '#' => self.cur.skip_to_eol(),
                '\n' => {
                    self.cur.next_char();
                    if self.depth == 0 {
                        self.newline();
                        at_line_start = true;
                    }
                }
                '\\' if self.cur.peek_nth(1) == Some('\n') => {
                    self.cur.next_char();
                    self.cur.next_char();
                }
                '\'' | '"' => {
                    let s = self.cur.parse_quoted_string().map_err(|e| self.error(e))?;
                    self.push(Tok::Str(s));
                }
                c if c.is_ascii_digit() => {
                    let tok = match self.cur.parse_number().map_err(|e| self.error(e))? {
                        Number::Int(i) => Tok::Int(i),
                        Number::Float(f) => Tok::Float(f),
                    };
                    self.push(tok);
                }
                c if is_ident_start(c) => {
                    let name = self.cur.parse_identifier().map_err(|e| self.error(e))?;
                    self.push(Tok::Name(name));
                }
                _ => self.operator(c)?,
            }
        }

        if self.depth > 0 {
            return Err(self.error("unexpected end of input inside brackets"));
        }
        self.newline();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(())
    }

    fn operator(&mut self, c: char) -> Result<(), ParseError> {
        let Some(op) = OPERATORS.iter().copied().find(|op| self.cur.peek_str(op)) else {
            return Err(self.error(format!("unexpected character '{c}'")));
        };
        self.cur.consume_str(op);
        match op {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => {
                if self.depth == 0 {
                    return Err(self.error(format!("unmatched '{op}'")));
                }
                self.depth -= 1;
            }
            _ => {}
        }
        self.push(Tok::Op(op));
        Ok(())
    }

    fn indentation(&mut self) -> usize {
        let mut width = 0;
        loop {
            match self.cur.peek_char() {
                Some(' ') => width += 1,
                Some('\t') => width += 8 - width % 8,
                Some('\r') | Some('\x0c') => {}
                _ => return width,
            }
            self.cur.next_char();
        }
    }

    fn indent_to(&mut self, width: usize) -> Result<(), ParseError> {
        let Some(&top) = self.indents.last() else {
            self.indents.push(width);
            return Ok(());
        };
        if width > top {
            self.indents.push(width);
            self.push(Tok::Indent);
        } else if width < top {
            while self.indents.last().is_some_and(|&top| width < top) {
                self.indents.pop();
                self.push(Tok::Dedent);
            }
            if self.indents.last() != Some(&width) {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(())
    }

    fn newline(&mut self) {
        if !matches!(self.out.last().map(|t| &t.tok), None | Some(Tok::Newline)) {
            self.push(Tok::Newline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn single_expression() {
        assert_eq!(
            toks("x + 1.5"),
            vec![
                Tok::Name("x".into()),
                Tok::Op("+"),
                Tok::Float(1.5),
                Tok::Newline,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn indented_block() {
        let src = "def f(x):\n    return x\ny = 1\n";
        let t = toks(src);
        assert!(t.contains(&Tok::Indent));
        assert!(t.contains(&Tok::Dedent));
        assert_eq!(t.last(), Some(&Tok::Eof));
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let t = toks("f(1,\n  2)");
        assert_eq!(t.iter().filter(|t| **t == Tok::Newline).count(), 1);
        assert!(!t.contains(&Tok::Indent));
    }

    #[test]
    fn base_indentation_is_taken_from_first_line() {
        let t = toks("    def f():\n        return 1\n");
        assert_eq!(t.iter().filter(|t| **t == Tok::Indent).count(), 1);
    }

    #[test]
    fn errors() {
        assert!(tokenize("f(1").is_err());
        assert!(tokenize("x)").is_err());
        assert!(tokenize("a ? b").is_err());
        assert!(tokenize("if x:\n    a\n  b\n").is_err());
    }
}
