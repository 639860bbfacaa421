use byteorder::{BigEndian, WriteBytesExt};
use ijvm::image::{CONSTANT_POOL_OFFSET, LABEL_SYMBOLS_MARKER, MAGIC, METHOD_SYMBOLS_MARKER};
use ijvm::ArgKind;
use std::io::{self, Write};
use thiserror::Error;
use tracing::{debug, info};

use crate::program::{Argument, Instruction, Method, Program};

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Program has no entry method")]
    MissingEntry,

    #[error("Unresolved reference `{name}` in method `{method}` at line {line}")]
    Unresolved {
        method: String,
        name: String,
        line: u32,
    },

    #[error("Value {value} does not fit a {kind} argument at line {line}")]
    OutOfRange { value: i32, kind: ArgKind, line: u32 },

    #[error("Method `{method}` has too many {what} for the header")]
    HeaderOverflow { method: String, what: &'static str },
}

/// Serializes a linked [`Program`] into an IJVM image
#[derive(Debug, Clone, Default)]
pub struct CodeGenerator {
    lenient: bool,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode unresolved arguments as 0 instead of refusing the program
    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// Render the image, and the debug symbols when asked, into memory
    pub fn render(&self, program: &Program, debug_symbols: bool) -> Result<Vec<u8>, CodegenError> {
        let mut out = Vec::new();
        self.generate(program, &mut out)?;
        if debug_symbols {
            self.generate_debug_symbols(program, &mut out)?;
        }
        Ok(out)
    }

    /// Write the header, the constant pool and the text segment
    pub fn generate<W: Write>(&self, program: &Program, out: &mut W) -> Result<(), CodegenError> {
        let entry = program.entry().ok_or(CodegenError::MissingEntry)?;

        out.write_u32::<BigEndian>(MAGIC)?;
        out.write_u32::<BigEndian>(CONSTANT_POOL_OFFSET)?;
        out.write_u32::<BigEndian>(program.constants.len() as u32 * 4)?;
        for constant in &program.constants {
            out.write_i32::<BigEndian>(constant.value)?;
        }

        // Data segment base, unused
        out.write_u32::<BigEndian>(0)?;
        out.write_u32::<BigEndian>(program.size())?;

        self.generate_method(entry, out)?;
        for method in &program.methods[1..] {
            let params = u16::try_from(method.parameter_count).map_err(|_| CodegenError::HeaderOverflow {
                method: method.name.clone(),
                what: "parameters",
            })?;
            let locals = u16::try_from(method.local_count()).map_err(|_| CodegenError::HeaderOverflow {
                method: method.name.clone(),
                what: "locals",
            })?;
            out.write_u16::<BigEndian>(params)?;
            out.write_u16::<BigEndian>(locals)?;
            self.generate_method(method, out)?;
        }

        info!(
            "Generated image: {} constant(s), {} method(s), {} text byte(s)",
            program.constants.len(),
            program.methods.len(),
            program.size()
        );
        Ok(())
    }

    fn generate_method<W: Write>(&self, method: &Method, out: &mut W) -> Result<(), CodegenError> {
        debug!("Generating method {} ({} byte(s))", method.name, method.size);
        for instruction in &method.instructions {
            out.write_u8(instruction.operation.opcode)?;
            for (kind, argument) in instruction.operation.args.iter().zip(&instruction.arguments) {
                let value = self.argument_value(method, instruction, argument)?;
                write_argument(out, *kind, value, instruction)?;
            }
        }
        Ok(())
    }

    fn argument_value(
        &self,
        method: &Method,
        instruction: &Instruction,
        argument: &Argument,
    ) -> Result<i32, CodegenError> {
        match argument {
            Argument::Resolved(value) => Ok(*value),
            Argument::Pending(_) if self.lenient => Ok(0),
            Argument::Pending(reference) => Err(CodegenError::Unresolved {
                method: method.name.clone(),
                name: reference.name().to_string(),
                line: instruction.line,
            }),
        }
    }

    /// Append the method and label symbol blocks
    pub fn generate_debug_symbols<W: Write>(&self, program: &Program, out: &mut W) -> Result<(), CodegenError> {
        let offsets = method_offsets(program);

        let mut methods = Vec::new();
        for (method, offset) in program.methods.iter().zip(&offsets) {
            write_symbol(&mut methods, *offset, &method.name)?;
        }
        write_block(out, METHOD_SYMBOLS_MARKER, &methods)?;

        let mut labels = Vec::new();
        for (method, offset) in program.methods.iter().zip(&offsets) {
            for label in &method.labels {
                let name = format!("{}#{}", method.name, label.name);
                write_symbol(&mut labels, offset + label.offset, &name)?;
            }
        }
        write_block(out, LABEL_SYMBOLS_MARKER, &labels)?;

        debug!(
            "Generated debug symbols: {} method byte(s), {} label byte(s)",
            methods.len(),
            labels.len()
        );
        Ok(())
    }
}

/// Start of every method in the text segment, folded from the method sizes
fn method_offsets(program: &Program) -> Vec<u32> {
    let mut cursor = 0;
    program
        .methods
        .iter()
        .map(|method| {
            let offset = cursor;
            cursor += method.image_size();
            offset
        })
        .collect()
}

fn write_argument<W: Write>(out: &mut W, kind: ArgKind, value: i32, instruction: &Instruction) -> Result<(), CodegenError> {
    let out_of_range = || CodegenError::OutOfRange {
        value,
        kind,
        line: instruction.line,
    };

    match kind {
        ArgKind::Byte => out.write_i8(i8::try_from(value).map_err(|_| out_of_range())?)?,
        ArgKind::Var if instruction.wide => out.write_u16::<BigEndian>(u16::try_from(value).map_err(|_| out_of_range())?)?,
        ArgKind::Var => out.write_u8(u8::try_from(value).map_err(|_| out_of_range())?)?,
        ArgKind::Label => out.write_i16::<BigEndian>(i16::try_from(value).map_err(|_| out_of_range())?)?,
        ArgKind::Constant | ArgKind::Method => {
            out.write_u16::<BigEndian>(u16::try_from(value).map_err(|_| out_of_range())?)?
        }
    }
    Ok(())
}

fn write_symbol(payload: &mut Vec<u8>, offset: u32, name: &str) -> io::Result<()> {
    payload.write_u32::<BigEndian>(offset)?;
    payload.write_all(name.as_bytes())?;
    payload.write_u8(0)
}

fn write_block<W: Write>(out: &mut W, marker: u32, payload: &[u8]) -> io::Result<()> {
    out.write_u32::<BigEndian>(marker)?;
    out.write_u32::<BigEndian>(payload.len() as u32)?;
    out.write_all(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssemblerConfig;
    use crate::diagnostics::Diagnostics;
    use crate::parser::Assembler;
    use byteorder::ReadBytesExt;
    use ijvm::{Image, InstructionSet};
    use std::io::Cursor;

    fn link(source: &str, config: AssemblerConfig) -> (Program, usize) {
        let set = InstructionSet::builtin();
        let mut diagnostics = Diagnostics::new();
        let assembled = Assembler::new(&set, &config, "test.jas", &mut diagnostics)
            .assemble(Cursor::new(source))
            .unwrap();
        (assembled.program, assembled.errors)
    }

    fn render(source: &str) -> Vec<u8> {
        let (program, errors) = link(source, AssemblerConfig::new());
        assert_eq!(errors, 0);
        CodeGenerator::new().render(&program, false).unwrap()
    }

    /// A writer that fails after `limit` bytes
    struct FailingWriter {
        written: usize,
        limit: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written + buf.len() > self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.written += buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_header_of_single_constant_program() {
        let bytes = render(".constant\nONE 1\n.end-constant\n.main\nLDC_W ONE\nOUT\nHALT\n.end-main\n");
        let mut cursor = Cursor::new(bytes.as_slice());

        assert_eq!(cursor.read_u32::<BigEndian>().unwrap(), MAGIC);
        assert_eq!(cursor.read_u32::<BigEndian>().unwrap(), CONSTANT_POOL_OFFSET);
        assert_eq!(cursor.read_u32::<BigEndian>().unwrap(), 4);
        assert_eq!(cursor.read_i32::<BigEndian>().unwrap(), 1);
        assert_eq!(cursor.read_u32::<BigEndian>().unwrap(), 0);
        assert_eq!(cursor.read_u32::<BigEndian>().unwrap(), 5);

        let text = &bytes[cursor.position() as usize..];
        assert_eq!(text, &[0x13, 0x00, 0x00, 0xFD, 0xFF]);
    }

    #[test]
    fn test_argument_encodings() {
        let bytes = render(
            ".main\n.var\nx\n.end-var\nBIPUSH -2\nISTORE x\nIINC x -1\nback: GOTO back\n.end-main\n",
        );
        let text = &bytes[bytes.len() - 10..];
        assert_eq!(text, &[0x10, 0xFE, 0x36, 0x01, 0x84, 0x01, 0xFF, 0xA7, 0x00, 0x00]);
    }

    #[test]
    fn test_method_headers() {
        let bytes = render(
            ".main\nBIPUSH 0\nINVOKEVIRTUAL add\nHALT\n.end-main\n.method add(a, b)\n.var\nr\n.end-var\nILOAD a\nIRETURN\n.end-method\n",
        );
        let image = Image::parse(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(image.constants, vec![6]);
        assert_eq!(image.text.len(), 6 + 4 + 3);
        assert_eq!(&image.text[..6], &[0x10, 0x00, 0xB6, 0x00, 0x00, 0xFF]);
        assert_eq!(&image.text[6..10], &[0x00, 0x03, 0x00, 0x01]);
        assert_eq!(&image.text[10..], &[0x15, 0x01, 0xAC]);
    }

    #[test]
    fn test_wide_variable_encoding() {
        let names: Vec<String> = (1..=256).map(|i| format!("v{}", i)).collect();
        let source = format!(".main\n.var\n{}\n.end-var\nILOAD v256\n.end-main\n", names.join(" "));
        let (program, errors) = link(&source, AssemblerConfig::new().with_auto_wide(true));
        assert_eq!(errors, 0);

        let bytes = CodeGenerator::new().render(&program, false).unwrap();
        assert_eq!(&bytes[bytes.len() - 4..], &[0xC4, 0x15, 0x01, 0x00]);
    }

    #[test]
    fn test_debug_symbol_blocks() {
        let (program, _) = link(
            ".main\nstart: INVOKEVIRTUAL f\nHALT\n.end-main\n.method f()\nNOP\nret: IRETURN\n.end-method\n",
            AssemblerConfig::new(),
        );
        let generator = CodeGenerator::new();
        let plain = generator.render(&program, false).unwrap();
        let bytes = generator.render(&program, true).unwrap();
        assert_eq!(&bytes[..plain.len()], plain.as_slice());

        let mut trailer = Cursor::new(&bytes[plain.len()..]);
        assert_eq!(trailer.read_u32::<BigEndian>().unwrap(), METHOD_SYMBOLS_MARKER);
        assert_eq!(trailer.read_u32::<BigEndian>().unwrap(), (4 + 5) + (4 + 2));

        let image = Image::parse(&mut Cursor::new(bytes)).unwrap();
        let symbols = image.symbols.unwrap();
        let methods: Vec<(u32, &str)> = symbols.methods.iter().map(|s| (s.offset, s.name.as_str())).collect();
        assert_eq!(methods, vec![(0, "main"), (4, "f")]);
        let labels: Vec<(u32, &str)> = symbols.labels.iter().map(|s| (s.offset, s.name.as_str())).collect();
        assert_eq!(labels, vec![(0, "main#start"), (5, "f#ret")]);
    }

    #[test]
    fn test_pending_reference_is_refused() {
        let (program, errors) = link(".main\nGOTO missing\n.end-main\n", AssemblerConfig::new());
        assert_eq!(errors, 1);

        match CodeGenerator::new().render(&program, false).unwrap_err() {
            CodegenError::Unresolved { method, name, line } => {
                assert_eq!(method, "main");
                assert_eq!(name, "missing");
                assert_eq!(line, 2);
            }
            other => panic!("Expected Unresolved error, got {:?}", other),
        }

        let bytes = CodeGenerator::new().with_lenient(true).render(&program, false).unwrap();
        assert_eq!(&bytes[bytes.len() - 3..], &[0xA7, 0x00, 0x00]);
    }

    #[test]
    fn test_missing_entry() {
        let program = Program::new();
        assert!(matches!(
            CodeGenerator::new().render(&program, false),
            Err(CodegenError::MissingEntry)
        ));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let (program, _) = link(".main\nHALT\n.end-main\n", AssemblerConfig::new());
        let mut out = FailingWriter { written: 0, limit: 10 };
        match CodeGenerator::new().generate(&program, &mut out) {
            Err(CodegenError::Io(err)) => assert_eq!(err.to_string(), "disk full"),
            other => panic!("Expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_generator_does_not_mutate() {
        let (program, _) = link(".main\nloop: GOTO loop\n.end-main\n", AssemblerConfig::new());
        let before = program.clone();
        CodeGenerator::new().render(&program, true).unwrap();
        assert_eq!(program, before);
    }
}
