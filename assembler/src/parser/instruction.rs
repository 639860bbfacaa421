use ijvm::isa::mnemonic;
use ijvm::literal::{parse_char, parse_i8, LiteralError};
use ijvm::ArgKind;
use tracing::debug;

use super::Assembler;
use crate::program::{Argument, Instruction, Method, Reference};
use crate::source::tokenize;

/// Largest slot addressable without a `WIDE` prefix
const NARROW_SLOT_LIMIT: u32 = u8::MAX as u32;

/// Largest slot addressable at all
const WIDE_SLOT_LIMIT: u32 = u16::MAX as u32;

/// A numeric literal or a quoted character fitting a signed byte
pub(crate) fn parse_byte(token: &str) -> Result<i32, LiteralError> {
    if token.starts_with('\'') {
        parse_char(token).map(i32::from)
    } else {
        parse_i8(token).map(i32::from)
    }
}

impl<'a> Assembler<'a> {
    pub(super) fn instruction(&mut self, method: &mut Method, text: &str, line: u32) {
        let tokens = tokenize(text);
        let Some((name, arguments)) = tokens.split_first() else {
            return;
        };

        let Some(operation) = self.set.lookup(name) else {
            self.reporter
                .error(line, format!("Undefined instruction `{}`", text));
            return;
        };

        if arguments.len() != operation.args.len() {
            let message = format!(
                "Mismatched argument count for `{}`, expected {}, got {}",
                operation.name,
                operation.args.len(),
                arguments.len()
            );
            self.reporter.error(line, message);
            return;
        }

        let wide = method.wide_pending();
        let mut needs_wide = false;
        let mut instruction = Instruction::new(operation.clone(), line);

        for (kind, token) in operation.args.iter().zip(arguments) {
            match self.argument(method, *kind, token, wide) {
                Ok((argument, widen)) => {
                    needs_wide |= widen;
                    instruction = instruction.with_argument(argument);
                }
                Err(message) => {
                    self.reporter.error(line, format!("argument: {}", message));
                    return;
                }
            }
        }

        if needs_wide {
            let Some(prefix) = self.set.lookup(mnemonic::WIDE) else {
                self.reporter.error(
                    line,
                    format!("Cannot widen `{}`: no WIDE operation in the instruction set", operation.name),
                );
                return;
            };
            debug!("[.{}] Inserting WIDE before {} on line {}", method.name, operation.name, line);
            method.push(Instruction::new(prefix, line));
        }

        debug!(
            "[.{}] Registered instruction: {} ({})",
            method.name,
            operation.name,
            instruction.arguments.len()
        );
        method.push(instruction);
    }

    /// Convert one argument token. The flag asks for a `WIDE` prefix to be inserted.
    fn argument(&self, method: &Method, kind: ArgKind, token: &str, wide: bool) -> Result<(Argument, bool), String> {
        match kind {
            ArgKind::Byte => parse_byte(token)
                .map(|value| (Argument::Resolved(value), false))
                .map_err(|err| err.to_string()),

            ArgKind::Var => {
                let variable = method
                    .variable(token)
                    .ok_or_else(|| format!("Variable not found: `{}`", token))?;
                let slot = variable.slot;

                if slot > WIDE_SLOT_LIMIT {
                    return Err(format!("Variable `{}` in slot {} cannot be addressed", token, slot));
                }
                if slot > NARROW_SLOT_LIMIT && !wide {
                    if !self.config.auto_wide {
                        return Err(format!(
                            "Variable `{}` in slot {} needs a WIDE prefix",
                            token, slot
                        ));
                    }
                    return Ok((Argument::Resolved(slot as i32), true));
                }
                Ok((Argument::Resolved(slot as i32), false))
            }

            ArgKind::Label => Ok((Argument::Pending(Reference::Label(token.to_string())), false)),

            ArgKind::Constant => self
                .program
                .constant(token)
                .map(|(index, _)| (Argument::Resolved(index as i32), false))
                .ok_or_else(|| format!("Constant not found: `{}`", token)),

            ArgKind::Method => Ok((Argument::Pending(Reference::Method(token.to_string())), false)),
        }
    }
}
