//! Line-oriented access to JAS source text.

use std::io::{BufRead, Lines};

/// One source line with its comment removed and surrounding whitespace trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: u32,
    pub text: String,
}

/// Pulls lines one at a time from a buffered reader, numbering them from 1
pub struct SourceReader<R: BufRead> {
    lines: Lines<R>,
    number: u32,
}

impl<R: BufRead> SourceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            number: 0,
        }
    }

    /// Number of the most recently read line, 0 before the first read
    pub fn line_number(&self) -> u32 {
        self.number
    }

    pub fn next_line(&mut self) -> std::io::Result<Option<Line>> {
        match self.lines.next() {
            Some(raw) => {
                let raw = raw?;
                self.number += 1;
                Ok(Some(Line {
                    number: self.number,
                    text: strip_comment(&raw).trim().to_string(),
                }))
            }
            None => Ok(None),
        }
    }
}

/// Drop everything from the first `//`
pub fn strip_comment(raw: &str) -> &str {
    match raw.find("//") {
        Some(index) => &raw[..index],
        None => raw,
    }
}

/// Split a line on whitespace, keeping a quoted character such as `' '` as one token
pub fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut quoted = false;

    for (index, ch) in text.char_indices() {
        match start {
            None if ch.is_whitespace() => {}
            None => {
                start = Some(index);
                quoted = ch == '\'';
            }
            Some(begin) if quoted => {
                if ch == '\'' && index > begin {
                    tokens.push(&text[begin..index + ch.len_utf8()]);
                    start = None;
                    quoted = false;
                }
            }
            Some(begin) if ch.is_whitespace() => {
                tokens.push(&text[begin..index]);
                start = None;
            }
            Some(_) => {}
        }
    }

    if let Some(begin) = start {
        tokens.push(&text[begin..]);
    }
    tokens
}
