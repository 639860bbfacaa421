use std::fmt;
use std::io::{BufRead, Error as IoError};
use thiserror::Error;
use tracing::{debug, error};

use crate::isa::{ArgKind, InstructionSet, Operation};
use crate::literal::parse_u8;

#[derive(Error, Debug)]
pub enum IsaError {
    #[error("IO error: {0}")]
    IoError(#[from] IoError),

    #[error("Invalid instruction set `{name}`: {} error(s){}", .errors.len(), listing(.errors))]
    Invalid {
        name: String,
        errors: Vec<ConfigDiagnostic>,
    },
}

/// A problem found on one line of an instruction set definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDiagnostic {
    pub file: String,
    pub line: u32,
    pub message: String,
}

impl fmt::Display for ConfigDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} > {}", self.file, self.line, self.message)
    }
}

/// One `file:line > message` per line, each preceded by a newline
fn listing(errors: &[ConfigDiagnostic]) -> String {
    errors.iter().map(|diagnostic| format!("\n{}", diagnostic)).collect()
}

/// Reads instruction set definitions.
///
/// Every non-empty line is `<opcode> <NAME> [argkind ...]`, where the opcode is
/// any integer literal fitting a byte and the argument kinds are one of
/// `byte`, `label`, `var`, `method` or `constant`. `//` starts a comment.
pub struct Loader {
    set: InstructionSet,
    file: String,
    line: u32,
    errors: Vec<ConfigDiagnostic>,
}

impl Loader {
    pub fn parse<R: BufRead>(reader: R, name: &str) -> Result<InstructionSet, IsaError> {
        let mut loader = Loader {
            set: InstructionSet::new(name),
            file: name.to_string(),
            line: 0,
            errors: Vec::new(),
        };

        for line in reader.lines() {
            let line = line?;
            loader.line += 1;
            let text = line.split("//").next().unwrap_or("");
            let tokens: Vec<&str> = text.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            loader.parse_line(&tokens);
        }

        if loader.errors.is_empty() {
            Ok(loader.set)
        } else {
            Err(IsaError::Invalid {
                name: loader.file,
                errors: loader.errors,
            })
        }
    }

    fn parse_line(&mut self, tokens: &[&str]) {
        let Some((opcode_token, rest)) = tokens.split_first() else {
            return;
        };
        let Some((name, arg_tokens)) = rest.split_first() else {
            self.report("Missing operation name".to_string());
            return;
        };

        let opcode = match parse_u8(opcode_token) {
            Ok(opcode) => opcode,
            Err(err) => {
                self.report(format!("opcode: {}", err));
                return;
            }
        };

        if self.set.contains_opcode(opcode) {
            self.report(format!("Duplicate opcode `{:02X}`", opcode));
            return;
        }

        let name = name.to_ascii_uppercase();
        if self.set.contains(&name) {
            self.report(format!("Duplicate operation `{}`", name));
            return;
        }

        let mut operation = Operation::new(&name, opcode);
        for token in arg_tokens {
            match ArgKind::from_name(token) {
                Some(kind) => operation = operation.with_arg(kind),
                None => {
                    self.report(format!("argument: Unknown argument type `{}`", token));
                    return;
                }
            }
        }

        debug!(
            "Operation registered: {:02X} -> {} ({})",
            operation.opcode,
            operation.name,
            operation.args.len()
        );
        self.set.insert(operation);
    }

    fn report(&mut self, message: String) {
        let diagnostic = ConfigDiagnostic {
            file: self.file.clone(),
            line: self.line,
            message,
        };
        error!("{}", diagnostic);
        self.errors.push(diagnostic);
    }
}
