pub mod cli;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod linker;
pub mod parser;
pub mod program;
pub mod source;

pub use codegen::{CodeGenerator, CodegenError};
pub use config::AssemblerConfig;
pub use diagnostics::{Diagnostic, DiagnosticSink, Diagnostics, Severity};
pub use error::{AssembleError, Fatal, HeaderError};
pub use parser::{Assembled, Assembler};
pub use program::{Argument, Constant, ConstantOrigin, Instruction, Label, Method, Program, Reference, Variable};

use ijvm::InstructionSet;
use std::io::BufRead;

/// Parse and link one source, reporting recoverable problems to `sink`
pub fn assemble<R: BufRead>(
    reader: R,
    file: &str,
    set: &InstructionSet,
    config: &AssemblerConfig,
    sink: &mut dyn DiagnosticSink,
) -> Result<Assembled, Fatal> {
    Assembler::new(set, config, file, sink).assemble(reader)
}
