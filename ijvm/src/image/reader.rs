use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::Path;
use byteorder::{BigEndian, ReadBytesExt};

use crate::image::{
    DebugSymbols, Image, ImageError, Symbol, LABEL_SYMBOLS_MARKER, MAGIC, METHOD_SYMBOLS_MARKER,
};

impl Image {
    /// Parse an image from a reader (file, memory buffer, etc.)
    pub fn parse<R: Read>(reader: &mut R) -> Result<Image, ImageError> {
        let magic = reader.read_u32::<BigEndian>()?;
        if magic != MAGIC {
            return Err(ImageError::InvalidMagic(magic));
        }

        let constant_pool_offset = reader.read_u32::<BigEndian>()?;
        let pool_size = reader.read_u32::<BigEndian>()?;
        if pool_size % 4 != 0 {
            return Err(ImageError::InvalidFormat(format!(
                "Constant pool size {} is not a multiple of 4",
                pool_size
            )));
        }

        let pool = read_exact_len(reader, pool_size)?;
        let mut pool = Cursor::new(pool.as_slice());
        let mut constants = Vec::new();
        for _ in 0..pool_size / 4 {
            constants.push(pool.read_i32::<BigEndian>()?);
        }

        let data_base = reader.read_u32::<BigEndian>()?;
        let text_size = reader.read_u32::<BigEndian>()?;
        let text = read_exact_len(reader, text_size)?;

        let mut trailer = Vec::new();
        reader.read_to_end(&mut trailer)?;
        let symbols = if trailer.is_empty() {
            None
        } else {
            Some(parse_symbols(&trailer)?)
        };

        Ok(Image {
            constant_pool_offset,
            constants,
            data_base,
            text,
            symbols,
        })
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Image, ImageError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::parse(&mut reader)
    }
}

/// Read exactly `len` bytes. Buffer growth follows the input actually
/// available, not the length claimed by the header.
fn read_exact_len<R: Read>(reader: &mut R, len: u32) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len as usize {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, found {}", len, buf.len()),
        ));
    }
    Ok(buf)
}

fn parse_symbols(trailer: &[u8]) -> Result<DebugSymbols, ImageError> {
    let mut cursor = Cursor::new(trailer);
    let methods = parse_symbol_block(&mut cursor, METHOD_SYMBOLS_MARKER)?;
    let labels = parse_symbol_block(&mut cursor, LABEL_SYMBOLS_MARKER)?;

    if (cursor.position() as usize) < trailer.len() {
        return Err(ImageError::InvalidFormat(format!(
            "{} trailing bytes after debug symbols",
            trailer.len() - cursor.position() as usize
        )));
    }

    Ok(DebugSymbols { methods, labels })
}

fn parse_symbol_block(cursor: &mut Cursor<&[u8]>, marker: u32) -> Result<Vec<Symbol>, ImageError> {
    let found = cursor.read_u32::<BigEndian>()?;
    if found != marker {
        return Err(ImageError::InvalidFormat(format!(
            "Expected symbol block {:#010X}, found {:#010X}",
            marker, found
        )));
    }

    let length = cursor.read_u32::<BigEndian>()?;
    let payload = read_exact_len(cursor, length)?;

    let mut block = Cursor::new(payload.as_slice());
    let mut symbols = Vec::new();
    while (block.position() as usize) < payload.len() {
        let offset = block.read_u32::<BigEndian>()?;
        let mut name = Vec::new();
        block.read_until(0, &mut name)?;
        if name.pop() != Some(0) {
            return Err(ImageError::InvalidFormat(
                "Unterminated symbol name".to_string(),
            ));
        }
        symbols.push(Symbol {
            offset,
            name: String::from_utf8_lossy(&name).into_owned(),
        });
    }

    Ok(symbols)
}
