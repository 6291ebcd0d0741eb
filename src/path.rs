use std::fmt;

use crate::cursor::{is_ident_start, Cursor, ParseError};

/// `a.b.c`, where each segment is an identifier or, for list indexing, a run of digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DottedPath {
    segments: Vec<String>,
}

impl DottedPath {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut cur = Cursor::new(input);
        let mut segments = Vec::new();
        loop {
            let segment = match cur.peek_char() {
                Some(c) if c.is_ascii_digit() => {
                    if segments.is_empty() {
                        return Err(ParseError::InvalidSyntax(format!(
                            "path must start with a name: {input:?}"
                        )));
                    }
                    cur.parse_digits()?.to_string()
                }
                Some(c) if is_ident_start(c) => cur.parse_identifier()?,
                _ => {
                    return Err(ParseError::InvalidSyntax(format!(
                        "expected a segment at offset {} in {input:?}",
                        cur.pos()
                    )))
                }
            };
            segments.push(segment);
            if cur.eof() {
                break;
            }
            cur.expect('.')?;
        }
        Ok(Self { segments })
    }

    /// Whether `input` is nothing but a dotted path.
    pub fn is_pure(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn head(&self) -> &str {
        &self.segments[0]
    }

    /// Parent segments and the final one.
    pub fn split_last(&self) -> (&[String], &str) {
        match self.segments.split_last() {
            Some((last, parent)) => (parent, last),
            None => (&[], ""),
        }
    }
}

impl fmt::Display for DottedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}
