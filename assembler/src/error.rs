use std::io::Error as IoError;
use thiserror::Error;

/// Malformed `.method` declaration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Invalid method declaration. Missing opening parenthesis")]
    MissingOpenParen,

    #[error("Invalid method declaration. Missing closing parenthesis")]
    MissingCloseParen,

    #[error("Invalid method declaration. Characters remaining after parameter list: `{0}`")]
    TrailingCharacters(String),

    #[error("Invalid method declaration. Missing method name")]
    MissingName,
}

/// Conditions that stop the assembler on the spot
#[derive(Error, Debug)]
pub enum Fatal {
    #[error("{file}:{line} > Unexpected end of file, expected `{expected}`")]
    UnexpectedEof {
        file: String,
        line: u32,
        expected: &'static str,
    },

    #[error("{file}:{line} > {source}")]
    MethodHeader {
        file: String,
        line: u32,
        source: HeaderError,
    },

    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("Assembly failed with {count} error(s)")]
    Failed { count: usize },

    #[error(transparent)]
    Aborted(#[from] Fatal),
}
