//! Numeric and character literal parsing.
//!
//! Integers accept an optional sign followed by a decimal number, a prefixed
//! number (`0x`, `0o`, `0b`) or a legacy octal number with a leading `0`.
//! Digit separators (`_`) are only accepted after a base prefix.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiteralError {
    #[error("Invalid value: `{0}`")]
    Invalid(String),

    #[error("Value out of range: `{0}`")]
    OutOfRange(String),

    #[error("Value cannot be negative: `{0}`")]
    Negative(String),

    #[error("Invalid character literal: `{0}`")]
    InvalidChar(String),
}

/// Parse any integer literal into an `i128`, leaving range checks to the caller.
fn parse_integer(token: &str) -> Result<i128, LiteralError> {
    let invalid = || LiteralError::Invalid(token.to_string());

    let (negative, body) = match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    };

    let (radix, digits, prefixed) = match split_prefix(body) {
        Some((radix, rest)) => (radix, rest, true),
        None if body.len() > 1 && body.starts_with('0') => (8, &body[1..], false),
        None => (10, body, false),
    };

    if digits.is_empty() {
        return Err(invalid());
    }

    let cleaned = if prefixed {
        if digits.ends_with('_') || digits.contains("__") {
            return Err(invalid());
        }
        digits.replace('_', "")
    } else {
        if digits.contains('_') {
            return Err(invalid());
        }
        digits.to_string()
    };

    // from_str_radix tolerates a leading sign, the literal grammar does not.
    if cleaned.is_empty() || cleaned.starts_with(|ch| ch == '+' || ch == '-') {
        return Err(invalid());
    }

    let magnitude = u128::from_str_radix(&cleaned, radix).map_err(|err| match err.kind() {
        std::num::IntErrorKind::PosOverflow => LiteralError::OutOfRange(token.to_string()),
        _ => invalid(),
    })?;
    let magnitude =
        i128::try_from(magnitude).map_err(|_| LiteralError::OutOfRange(token.to_string()))?;

    Ok(if negative { -magnitude } else { magnitude })
}

fn split_prefix(body: &str) -> Option<(u32, &str)> {
    let bytes = body.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'0' {
        return None;
    }
    let radix = match bytes[1] {
        b'x' | b'X' => 16,
        b'o' | b'O' => 8,
        b'b' | b'B' => 2,
        _ => return None,
    };
    Some((radix, &body[2..]))
}

macro_rules! signed_parser {
    ($(#[$doc:meta])* $name:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(token: &str) -> Result<$ty, LiteralError> {
            let value = parse_integer(token)?;
            <$ty>::try_from(value).map_err(|_| LiteralError::OutOfRange(token.to_string()))
        }
    };
}

macro_rules! unsigned_parser {
    ($(#[$doc:meta])* $name:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(token: &str) -> Result<$ty, LiteralError> {
            let value = parse_integer(token)?;
            if value < 0 {
                return Err(LiteralError::Negative(token.to_string()));
            }
            <$ty>::try_from(value).map_err(|_| LiteralError::OutOfRange(token.to_string()))
        }
    };
}

signed_parser!(
    /// Parse a signed 8 bit literal
    parse_i8, i8
);
signed_parser!(parse_i16, i16);
signed_parser!(
    /// Parse a signed 32 bit literal, the width of an IJVM word
    parse_i32, i32
);
signed_parser!(parse_i64, i64);

unsigned_parser!(
    /// Parse an unsigned 8 bit literal, used for opcodes
    parse_u8, u8
);
unsigned_parser!(parse_u16, u16);
unsigned_parser!(parse_u32, u32);
unsigned_parser!(parse_u64, u64);

/// Parse a character literal of the form `'c'` into a signed byte.
///
/// Exactly one ASCII character must be enclosed.
pub fn parse_char(token: &str) -> Result<i8, LiteralError> {
    let invalid = || LiteralError::InvalidChar(token.to_string());

    let inner = token
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .ok_or_else(invalid)?;

    let mut chars = inner.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) if ch.is_ascii() => Ok(ch as u8 as i8),
        _ => Err(invalid()),
    }
}
