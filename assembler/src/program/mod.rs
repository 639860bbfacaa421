//! In-memory representation of an assembled program.

use ijvm::image::METHOD_HEADER_SIZE;
use ijvm::Operation;
use serde::Serialize;
use std::sync::Arc;

/// Name of slot 0. Not a valid identifier, so no source token can refer to it.
pub const LINK_POINTER: &str = "LINK PTR";

/// Name of the entry method
pub const ENTRY_NAME: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstantOrigin {
    /// Declared in the `.constant` block
    Declared,
    /// Registered by the linker for a non-entry method
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Constant {
    pub name: String,
    pub value: i32,
    pub line: u32,
    pub origin: ConstantOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variable {
    pub name: String,
    pub slot: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    pub name: String,
    pub line: u32,
    /// Byte offset from the start of the owning method
    pub offset: u32,
    /// Index of the instruction the label points at
    #[serde(skip)]
    index: usize,
}

/// Symbol an argument waits for until link time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Reference {
    Label(String),
    Method(String),
}

impl Reference {
    pub fn name(&self) -> &str {
        match self {
            Reference::Label(name) | Reference::Method(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Argument {
    Resolved(i32),
    Pending(Reference),
}

impl Argument {
    pub fn value(&self) -> Option<i32> {
        match self {
            Argument::Resolved(value) => Some(*value),
            Argument::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Argument::Pending(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub operation: Arc<Operation>,
    pub arguments: Vec<Argument>,
    pub wide: bool,
    pub line: u32,
    /// Byte offset from the start of the owning method, set when the method is sealed
    pub offset: u32,
}

impl Instruction {
    pub fn new(operation: Arc<Operation>, line: u32) -> Self {
        Self {
            arguments: Vec::with_capacity(operation.args.len()),
            operation,
            wide: false,
            line,
            offset: 0,
        }
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn size(&self) -> u32 {
        self.operation.size(self.wide)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Method {
    pub name: String,
    /// Declared parameters plus the link pointer slot
    pub parameter_count: u32,
    pub variables: Vec<Variable>,
    pub instructions: Vec<Instruction>,
    pub labels: Vec<Label>,
    pub size: u32,
    /// Absolute byte offset in the text segment, set by the linker
    pub offset: u32,
    pub is_entry: bool,
    pub line: u32,
    #[serde(skip)]
    wide_pending: bool,
}

impl Method {
    /// The `.main` method
    pub fn entry(line: u32) -> Self {
        Self::build(ENTRY_NAME, &[], line, true)
    }

    pub fn new(name: &str, parameters: &[String], line: u32) -> Self {
        Self::build(name, parameters, line, false)
    }

    fn build(name: &str, parameters: &[String], line: u32, is_entry: bool) -> Self {
        let mut method = Self {
            name: name.to_string(),
            parameter_count: 0,
            variables: Vec::new(),
            instructions: Vec::new(),
            labels: Vec::new(),
            size: 0,
            offset: 0,
            is_entry,
            line,
            wide_pending: false,
        };
        method.add_variable(LINK_POINTER);
        for parameter in parameters {
            method.add_variable(parameter);
        }
        method.parameter_count = method.variables.len() as u32;
        method
    }

    /// Append a variable in the next free slot and return the slot
    pub fn add_variable(&mut self, name: &str) -> u32 {
        let slot = self.variables.len() as u32;
        self.variables.push(Variable {
            name: name.to_string(),
            slot,
        });
        slot
    }

    /// First variable with the given name
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    pub fn local_count(&self) -> u32 {
        self.variables.len() as u32 - self.parameter_count
    }

    pub fn label(&self, name: &str) -> Option<&Label> {
        self.labels.iter().find(|label| label.name == name)
    }

    /// Register a label at the next instruction. A name already in use is
    /// rejected and the existing label is returned.
    pub fn add_label(&mut self, name: &str, line: u32) -> Result<(), &Label> {
        if let Some(index) = self.labels.iter().position(|label| label.name == name) {
            return Err(&self.labels[index]);
        }
        self.labels.push(Label {
            name: name.to_string(),
            line,
            offset: self.size,
            index: self.instructions.len(),
        });
        Ok(())
    }

    /// Whether the last instruction was a `WIDE` prefix still waiting for its operand
    pub fn wide_pending(&self) -> bool {
        self.wide_pending
    }

    /// Append an instruction. An instruction following a `WIDE` prefix is marked wide.
    pub fn push(&mut self, mut instruction: Instruction) {
        if std::mem::take(&mut self.wide_pending) {
            instruction.wide = true;
        }
        if instruction.operation.is_wide_prefix() {
            self.wide_pending = true;
        }
        instruction.offset = self.size;
        self.size += instruction.size();
        self.instructions.push(instruction);
    }

    /// Fix instruction and label offsets by folding instruction sizes
    pub fn seal(&mut self) {
        let mut offsets = Vec::with_capacity(self.instructions.len() + 1);
        let mut cursor = 0;
        for instruction in &mut self.instructions {
            instruction.offset = cursor;
            offsets.push(cursor);
            cursor += instruction.size();
        }
        offsets.push(cursor);

        for label in &mut self.labels {
            label.offset = offsets[label.index.min(offsets.len() - 1)];
        }
        self.size = cursor;
    }

    /// Size including the parameter/local header, zero for the entry method
    pub fn image_size(&self) -> u32 {
        if self.is_entry {
            self.size
        } else {
            self.size + METHOD_HEADER_SIZE
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Program {
    pub constants: Vec<Constant>,
    pub methods: Vec<Method>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool index and entry of the constant with the given name
    pub fn constant(&self, name: &str) -> Option<(usize, &Constant)> {
        self.constants
            .iter()
            .enumerate()
            .find(|(_, constant)| constant.name == name)
    }

    pub fn entry(&self) -> Option<&Method> {
        self.methods.first().filter(|method| method.is_entry)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// Byte count of the text segment: the entry method plus every other method and its header
    pub fn size(&self) -> u32 {
        self.methods.iter().map(Method::image_size).sum()
    }

    /// Constants registered by the linker, one per non-entry method
    pub fn method_constants(&self) -> impl Iterator<Item = &Constant> {
        self.constants
            .iter()
            .filter(|constant| constant.origin == ConstantOrigin::Method)
    }

    pub fn has_pending(&self) -> bool {
        self.methods
            .iter()
            .flat_map(|method| &method.instructions)
            .flat_map(|instruction| &instruction.arguments)
            .any(Argument::is_pending)
    }
}
