// ijvm - instruction set tables, literals and the binary image format of the IJVM

pub mod image;
pub mod isa;
pub mod literal;
pub mod logging;

pub use image::{disassemble, Image, ImageError};
pub use isa::{ArgKind, InstructionSet, IsaError, Operation};
pub use literal::LiteralError;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
