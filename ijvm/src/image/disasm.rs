use std::collections::BTreeSet;
use std::fmt;
use std::io::{Cursor, ErrorKind};
use std::sync::Arc;
use byteorder::{BigEndian, ReadBytesExt};

use crate::image::{Image, ImageError, METHOD_HEADER_SIZE};
use crate::isa::{ArgKind, InstructionSet, Operation};

/// One instruction decoded from the text segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub offset: u32,
    pub operation: Arc<Operation>,
    pub operands: Vec<i32>,
    pub wide: bool,
}

impl Decoded {
    /// Absolute target of a label operand
    pub fn branch_target(&self) -> Option<u32> {
        self.operation
            .args
            .iter()
            .position(|kind| *kind == ArgKind::Label)
            .map(|index| (self.offset as i64 + self.operands[index] as i64) as u32)
    }
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}  {}", self.offset, self.operation.name)?;
        for (kind, value) in self.operation.args.iter().zip(&self.operands) {
            match kind {
                ArgKind::Label => write!(f, " {:+}", value)?,
                ArgKind::Constant | ArgKind::Method => write!(f, " #{}", value)?,
                ArgKind::Byte | ArgKind::Var => write!(f, " {}", value)?,
            }
        }
        if let Some(target) = self.branch_target() {
            write!(f, "  ; -> {:04X}", target)?;
        }
        Ok(())
    }
}

/// A line of disassembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Header { offset: u32, params: u16, locals: u16 },
    Instruction(Decoded),
    Unknown { offset: u32, byte: u8 },
}

impl Listing {
    pub fn offset(&self) -> u32 {
        match self {
            Listing::Header { offset, .. } | Listing::Unknown { offset, .. } => *offset,
            Listing::Instruction(decoded) => decoded.offset,
        }
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listing::Header { offset, params, locals } => {
                write!(f, "{:04X}  ; params={} locals={}", offset, params, locals)
            }
            Listing::Instruction(decoded) => decoded.fmt(f),
            Listing::Unknown { offset, byte } => write!(f, "{:04X}  .byte 0x{:02X}", offset, byte),
        }
    }
}

/// Decode the text segment of an image.
///
/// Method headers can only be told apart from code through the debug symbols,
/// so without them the whole segment is decoded as instructions.
pub fn disassemble(image: &Image, set: &InstructionSet) -> Result<Vec<Listing>, ImageError> {
    let headers: BTreeSet<u32> = image
        .symbols
        .iter()
        .flat_map(|symbols| symbols.methods.iter())
        .map(|symbol| symbol.offset)
        .filter(|offset| *offset != 0)
        .collect();

    let mut cursor = Cursor::new(image.text.as_slice());
    let mut listing = Vec::new();
    let mut wide = false;

    while (cursor.position() as usize) < image.text.len() {
        let offset = cursor.position() as u32;

        if headers.contains(&offset) {
            if image.text.len() - (offset as usize) < METHOD_HEADER_SIZE as usize {
                return Err(truncated(offset));
            }
            let params = cursor.read_u16::<BigEndian>()?;
            let locals = cursor.read_u16::<BigEndian>()?;
            listing.push(Listing::Header { offset, params, locals });
            wide = false;
            continue;
        }

        let byte = cursor.read_u8()?;
        let Some(operation) = set.by_opcode(byte) else {
            listing.push(Listing::Unknown { offset, byte });
            wide = false;
            continue;
        };

        let mut operands = Vec::with_capacity(operation.args.len());
        for kind in &operation.args {
            let value = read_operand(&mut cursor, *kind, wide).map_err(|err| match err.kind() {
                ErrorKind::UnexpectedEof => truncated(offset),
                _ => ImageError::IoError(err),
            })?;
            operands.push(value);
        }

        let next_wide = operation.is_wide_prefix();
        listing.push(Listing::Instruction(Decoded {
            offset,
            operation,
            operands,
            wide,
        }));
        wide = next_wide;
    }

    Ok(listing)
}

fn read_operand(cursor: &mut Cursor<&[u8]>, kind: ArgKind, wide: bool) -> std::io::Result<i32> {
    Ok(match kind {
        ArgKind::Byte => cursor.read_i8()? as i32,
        ArgKind::Var if wide => cursor.read_u16::<BigEndian>()? as i32,
        ArgKind::Var => cursor.read_u8()? as i32,
        ArgKind::Label => cursor.read_i16::<BigEndian>()? as i32,
        ArgKind::Method | ArgKind::Constant => cursor.read_u16::<BigEndian>()? as i32,
    })
}

fn truncated(offset: u32) -> ImageError {
    ImageError::InvalidFormat(format!("Truncated instruction at {:04X}", offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{DebugSymbols, Symbol, CONSTANT_POOL_OFFSET};

    fn image(text: Vec<u8>, methods: Option<Vec<u32>>) -> Image {
        Image {
            constant_pool_offset: CONSTANT_POOL_OFFSET,
            constants: Vec::new(),
            data_base: 0,
            text,
            symbols: methods.map(|offsets| DebugSymbols {
                methods: offsets
                    .into_iter()
                    .map(|offset| Symbol { offset, name: format!("m{}", offset) })
                    .collect(),
                labels: Vec::new(),
            }),
        }
    }

    fn names(listing: &[Listing]) -> Vec<String> {
        listing
            .iter()
            .map(|line| match line {
                Listing::Instruction(decoded) => decoded.operation.name.clone(),
                Listing::Header { .. } => ".header".to_string(),
                Listing::Unknown { .. } => ".byte".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_simple_sequence() {
        let set = InstructionSet::builtin();
        let listing = disassemble(&image(vec![0x10, 0xFF, 0xFD, 0xA7, 0xFF, 0xFD], None), &set).unwrap();

        assert_eq!(names(&listing), vec!["BIPUSH", "OUT", "GOTO"]);
        match &listing[0] {
            Listing::Instruction(decoded) => assert_eq!(decoded.operands, vec![-1]),
            other => panic!("Expected instruction, got {:?}", other),
        }
        match &listing[2] {
            Listing::Instruction(decoded) => {
                assert_eq!(decoded.operands, vec![-3]);
                assert_eq!(decoded.branch_target(), Some(0));
            }
            other => panic!("Expected instruction, got {:?}", other),
        }
    }

    #[test]
    fn test_wide_prefix_widens_next_var() {
        let set = InstructionSet::builtin();
        let listing = disassemble(&image(vec![0xC4, 0x15, 0x01, 0x00, 0x15, 0x02], None), &set).unwrap();

        assert_eq!(listing.len(), 3);
        match &listing[1] {
            Listing::Instruction(decoded) => {
                assert!(decoded.wide);
                assert_eq!(decoded.operands, vec![256]);
            }
            other => panic!("Expected instruction, got {:?}", other),
        }
        match &listing[2] {
            Listing::Instruction(decoded) => {
                assert!(!decoded.wide);
                assert_eq!(decoded.operands, vec![2]);
            }
            other => panic!("Expected instruction, got {:?}", other),
        }
    }

    #[test]
    fn test_method_headers_from_symbols() {
        let set = InstructionSet::builtin();
        let text = vec![0xFF, 0x00, 0x02, 0x00, 0x01, 0x15, 0x01, 0xAC];
        let listing = disassemble(&image(text, Some(vec![0, 1])), &set).unwrap();

        assert_eq!(names(&listing), vec!["HALT", ".header", "ILOAD", "IRETURN"]);
        assert_eq!(listing[1], Listing::Header { offset: 1, params: 2, locals: 1 });
        assert_eq!(listing[2].offset(), 5);
    }

    #[test]
    fn test_unknown_opcode() {
        let set = InstructionSet::builtin();
        let listing = disassemble(&image(vec![0x01, 0x00], None), &set).unwrap();
        assert_eq!(listing[0], Listing::Unknown { offset: 0, byte: 0x01 });
        assert_eq!(listing[0].to_string(), "0000  .byte 0x01");
    }

    #[test]
    fn test_truncated_operand() {
        let set = InstructionSet::builtin();
        match disassemble(&image(vec![0x00, 0xA7, 0x00], None), &set).unwrap_err() {
            ImageError::InvalidFormat(msg) => assert_eq!(msg, "Truncated instruction at 0001"),
            other => panic!("Expected InvalidFormat error, got {:?}", other),
        }
    }

    #[test]
    fn test_display() {
        let set = InstructionSet::builtin();
        let listing = disassemble(&image(vec![0x84, 0x01, 0xFF, 0x13, 0x00, 0x02], None), &set).unwrap();
        assert_eq!(listing[0].to_string(), "0000  IINC 1 -1");
        assert_eq!(listing[1].to_string(), "0003  LDC_W #2");
    }
}
