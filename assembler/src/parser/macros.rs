use ijvm::isa::mnemonic;
use std::sync::Arc;
use tracing::debug;

use super::Assembler;
use crate::program::{Argument, Instruction, Method};

pub const PRINT: &str = "#print";

impl<'a> Assembler<'a> {
    /// Expand a `#` directive in place of an instruction
    pub(super) fn directive(&mut self, method: &mut Method, text: &str, line: u32) {
        let (directive, argument) = match text.split_once(char::is_whitespace) {
            Some((directive, argument)) => (directive, argument.trim()),
            None => (text, ""),
        };

        match directive {
            PRINT => self.print(method, argument, line),
            _ => self.reporter.error(line, format!("Unknown macro `{}`", directive)),
        }
    }

    /// `#print "text"` pushes and outputs every byte of the string
    fn print(&mut self, method: &mut Method, argument: &str, line: u32) {
        if argument.is_empty() {
            self.reporter.error(line, "#print called without arguments".to_string());
            return;
        }

        let bytes = match unquote(argument) {
            Ok(bytes) => bytes,
            Err(message) => {
                self.reporter.error(line, format!("#print: {}", message));
                return;
            }
        };

        let (Some(push), Some(out)) = (self.set.lookup(mnemonic::BIPUSH), self.set.lookup(mnemonic::OUT)) else {
            self.reporter.error(
                line,
                "#print needs BIPUSH and OUT in the instruction set".to_string(),
            );
            return;
        };

        if bytes.is_empty() {
            self.reporter.warning(line, "#print with an empty string emits nothing".to_string());
            return;
        }

        debug!("[.{}] Expanding #print of {} byte(s)", method.name, bytes.len());
        for byte in bytes {
            method.push(Instruction::new(Arc::clone(&push), line).with_argument(Argument::Resolved(byte as i8 as i32)));
            method.push(Instruction::new(Arc::clone(&out), line));
        }
    }
}

/// Decode a `"..."` string with escapes or a raw `` `...` `` string into bytes
pub fn unquote(argument: &str) -> Result<Vec<u8>, String> {
    if let Some(body) = argument.strip_prefix('`') {
        return match body.strip_suffix('`') {
            Some(inner) if !inner.contains('`') => ascii_bytes(inner),
            _ => Err(format!("Malformed raw string {}", argument)),
        };
    }

    let body = argument
        .strip_prefix('"')
        .ok_or_else(|| format!("Expected a quoted string, got {}", argument))?;

    let mut bytes = Vec::new();
    let mut chars = body.chars();
    loop {
        match chars.next() {
            None => return Err(format!("Unterminated string {}", argument)),
            Some('"') => break,
            Some('\\') => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| format!("Unterminated string {}", argument))?;
                let byte = match escaped {
                    'n' => b'\n',
                    't' => b'\t',
                    'r' => b'\r',
                    '0' => 0,
                    '\\' => b'\\',
                    '"' => b'"',
                    '\'' => b'\'',
                    'x' => {
                        let digits: String = chars.by_ref().take(2).collect();
                        if digits.len() != 2 {
                            return Err(format!("Incomplete escape sequence `\\x{}`", digits));
                        }
                        u8::from_str_radix(&digits, 16)
                            .map_err(|_| format!("Invalid escape sequence `\\x{}`", digits))?
                    }
                    other => return Err(format!("Invalid escape sequence `\\{}`", other)),
                };
                bytes.push(byte);
            }
            Some(ch) if ch.is_ascii() => bytes.push(ch as u8),
            Some(ch) => return Err(format!("Character `{}` does not fit in a byte", ch)),
        }
    }

    let rest = chars.as_str();
    if !rest.is_empty() {
        return Err(format!("Unexpected characters after string: `{}`", rest));
    }
    Ok(bytes)
}

fn ascii_bytes(text: &str) -> Result<Vec<u8>, String> {
    match text.chars().find(|ch| !ch.is_ascii()) {
        Some(ch) => Err(format!("Character `{}` does not fit in a byte", ch)),
        None => Ok(text.as_bytes().to_vec()),
    }
}
