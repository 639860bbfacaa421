mod loader;
mod opcode;

pub use loader::{ConfigDiagnostic, IsaError, Loader};
pub use opcode::{mnemonic, DEFAULT_OPERATIONS};

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

/// The kind of an operation argument, which decides how a source token is
/// resolved and how many bytes it occupies in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    Byte,
    Label,
    Var,
    Method,
    Constant,
}

impl ArgKind {
    /// Parse an argument kind as written in an instruction set definition
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "byte" => Some(ArgKind::Byte),
            "label" => Some(ArgKind::Label),
            "var" => Some(ArgKind::Var),
            "method" => Some(ArgKind::Method),
            "constant" => Some(ArgKind::Constant),
            _ => None,
        }
    }

    /// Encoded size in bytes. Only variable slots change size when wide.
    pub fn encoded_size(&self, wide: bool) -> u32 {
        match self {
            ArgKind::Byte => 1,
            ArgKind::Var if wide => 2,
            ArgKind::Var => 1,
            ArgKind::Label | ArgKind::Method | ArgKind::Constant => 2,
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgKind::Byte => "byte",
            ArgKind::Label => "label",
            ArgKind::Var => "var",
            ArgKind::Method => "method",
            ArgKind::Constant => "constant",
        };
        f.write_str(name)
    }
}

/// A single operation the assembler understands, e.g. `BIPUSH` (0x10) taking a byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub name: String,
    pub opcode: u8,
    pub args: Vec<ArgKind>,
}

impl Operation {
    pub fn new(name: &str, opcode: u8) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            opcode,
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, kind: ArgKind) -> Self {
        self.args.push(kind);
        self
    }

    pub fn with_args(mut self, kinds: &[ArgKind]) -> Self {
        self.args.extend_from_slice(kinds);
        self
    }

    /// Encoded size of the operation including its opcode byte
    pub fn size(&self, wide: bool) -> u32 {
        1 + self.args.iter().map(|kind| kind.encoded_size(wide)).sum::<u32>()
    }

    /// Whether this operation is the `WIDE` prefix
    pub fn is_wide_prefix(&self) -> bool {
        self.name == mnemonic::WIDE
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} {}", self.opcode, self.name)?;
        for kind in &self.args {
            write!(f, " {}", kind)?;
        }
        Ok(())
    }
}

/// Lookup table from mnemonic (and opcode) to operation.
#[derive(Debug, Clone, Default)]
pub struct InstructionSet {
    name: String,
    by_name: FxHashMap<String, Arc<Operation>>,
    by_opcode: FxHashMap<u8, Arc<Operation>>,
}

impl InstructionSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// The standard IJVM instruction set
    pub fn builtin() -> Self {
        let mut set = Self::new("default");
        for (opcode, name, args) in DEFAULT_OPERATIONS {
            set.insert(Operation::new(name, *opcode).with_args(args));
        }
        set
    }

    /// Load an instruction set definition from a file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, IsaError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Loader::parse(BufReader::new(file), &name)
    }

    /// Load an instruction set definition from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R, name: &str) -> Result<Self, IsaError> {
        Loader::parse(reader, name)
    }

    /// Register an operation, replacing any previous entry with the same name or opcode
    pub fn insert(&mut self, operation: Operation) {
        let operation = Arc::new(operation);
        self.by_opcode.insert(operation.opcode, Arc::clone(&operation));
        self.by_name.insert(operation.name.clone(), operation);
    }

    /// Look an operation up by mnemonic. Mnemonics are case-insensitive.
    pub fn lookup(&self, name: &str) -> Option<Arc<Operation>> {
        self.by_name.get(&name.to_ascii_uppercase()).cloned()
    }

    pub fn by_opcode(&self, opcode: u8) -> Option<Arc<Operation>> {
        self.by_opcode.get(&opcode).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_ascii_uppercase())
    }

    pub fn contains_opcode(&self, opcode: u8) -> bool {
        self.by_opcode.contains_key(&opcode)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// All operations ordered by opcode
    pub fn operations(&self) -> Vec<Arc<Operation>> {
        let mut operations: Vec<_> = self.by_opcode.values().cloned().collect();
        operations.sort_by_key(|operation| operation.opcode);
        operations
    }
}
