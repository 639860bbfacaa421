//! The IJVM binary image format.
//!
//! All fields are big-endian:
//!
//! ```text
//! u32 magic                 0x1DEADFAD
//! u32 constant pool offset  0x00010000
//! u32 constant pool size    4 * constant count
//! i32 constants[]
//! u32 data base             0
//! u32 text size
//! u8  text[]                entry method, then (u16 params, u16 locals, code) per method
//! ```
//!
//! Optionally followed by two debug symbol blocks, each framed as
//! `u32 marker, u32 length, payload`, whose payload is a sequence of
//! `u32 offset` + NUL-terminated name.

mod disasm;
mod reader;

pub use disasm::{disassemble, Decoded, Listing};

use std::io::Error as IoError;
use thiserror::Error;

/// Magic number at the start of every image
pub const MAGIC: u32 = 0x1DEA_DFAD;

/// Fixed constant pool offset field
pub const CONSTANT_POOL_OFFSET: u32 = 0x0001_0000;

/// Bytes occupied by a method header: u16 parameter count + u16 local count
pub const METHOD_HEADER_SIZE: u32 = 4;

/// Marker of the debug block holding method offsets
pub const METHOD_SYMBOLS_MARKER: u32 = 0xEEEE_EEEE;

/// Marker of the debug block holding `method#label` offsets
pub const LABEL_SYMBOLS_MARKER: u32 = 0xFFFF_FFFF;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("IO error: {0}")]
    IoError(#[from] IoError),

    #[error("Invalid magic number: {0:#010X}")]
    InvalidMagic(u32),

    #[error("Invalid image format: {0}")]
    InvalidFormat(String),
}

/// A named offset from the debug symbol blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub offset: u32,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugSymbols {
    pub methods: Vec<Symbol>,
    pub labels: Vec<Symbol>,
}

/// A decoded IJVM image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub constant_pool_offset: u32,
    pub constants: Vec<i32>,
    pub data_base: u32,
    pub text: Vec<u8>,
    pub symbols: Option<DebugSymbols>,
}

impl Image {
    /// Name of the method starting at `offset`, if debug symbols are present
    pub fn method_at(&self, offset: u32) -> Option<&str> {
        self.symbols
            .as_ref()?
            .methods
            .iter()
            .find(|symbol| symbol.offset == offset)
            .map(|symbol| symbol.name.as_str())
    }
}
