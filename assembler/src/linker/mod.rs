//! Layout and symbol resolution.
//!
//! The entry method sits at offset 0 and every other method follows in
//! declaration order, each preceded by its 4 byte header. Each non-entry
//! method is published as a constant holding its offset so `INVOKEVIRTUAL`
//! can refer to it through the constant pool. Pending label arguments become
//! displacements relative to the jumping instruction, pending method
//! arguments become pool indices.

use ijvm::image::METHOD_HEADER_SIZE;
use tracing::{debug, info};

use crate::diagnostics::{DiagnosticSink, Reporter};
use crate::program::{Argument, Constant, ConstantOrigin, Program, Reference};

/// Lay out and resolve `program`, reporting problems to `sink`. Returns the number of errors.
///
/// Linking an already linked program recomputes the method constants in
/// place and leaves every resolved argument unchanged.
pub fn link(program: &mut Program, file: &str, sink: &mut dyn DiagnosticSink) -> usize {
    let mut reporter = Reporter::new(file, sink);
    link_with(program, &mut reporter);
    reporter.errors()
}

pub(crate) fn link_with(program: &mut Program, reporter: &mut Reporter<'_>) {
    if program.entry().is_none() {
        reporter.error(0, "linker: No main found".to_string());
        return;
    }

    // Label displacements are method-local and do not depend on the layout
    let laid_out = layout(program, reporter);
    resolve(program, reporter, laid_out);
}

/// Assign method offsets and register one constant per non-entry method
fn layout(program: &mut Program, reporter: &mut Reporter<'_>) -> bool {
    program
        .constants
        .retain(|constant| constant.origin != ConstantOrigin::Method);

    let Program { constants, methods } = program;
    let Some((entry, others)) = methods.split_first_mut() else {
        return false;
    };

    entry.offset = 0;
    let mut cursor = entry.size;

    for (index, method) in others.iter_mut().enumerate() {
        if let Some(existing) = constants.iter().find(|constant| constant.name == method.name) {
            let message = format!(
                "linker: Method constant name conflict. `{}` already defined on line {}",
                method.name, existing.line
            );
            reporter.error(method.line, message);
            return false;
        }

        constants.push(Constant {
            name: method.name.clone(),
            value: cursor as i32,
            line: method.line,
            origin: ConstantOrigin::Method,
        });
        method.offset = cursor;
        info!("Method #{} line {} placed at {}", index, method.line, cursor);
        cursor += method.size + METHOD_HEADER_SIZE;
    }

    true
}

/// Turn pending arguments into resolved values. Method references are left
/// pending unless `methods` is set.
fn resolve(program: &mut Program, reporter: &mut Reporter<'_>, methods: bool) {
    let Program { constants, methods: method_list } = program;

    for method in method_list.iter_mut() {
        for instruction in method.instructions.iter_mut() {
            for argument in instruction.arguments.iter_mut() {
                let Argument::Pending(reference) = &*argument else {
                    continue;
                };

                let resolved = match reference {
                    Reference::Label(name) => match method.labels.iter().find(|label| label.name == *name) {
                        Some(label) => {
                            let displacement = label.offset as i64 - instruction.offset as i64;
                            match i16::try_from(displacement) {
                                Ok(displacement) => {
                                    debug!(
                                        "[.{}] Linking label, line {}: @{} -> {}@{}, offset = {}",
                                        method.name, instruction.line, instruction.offset, name, label.offset, displacement
                                    );
                                    Some(displacement as i32)
                                }
                                Err(_) => {
                                    let message = format!(
                                        "[.{}] Jump to `{}` is out of range ({} bytes)",
                                        method.name, name, displacement
                                    );
                                    reporter.error(instruction.line, message);
                                    None
                                }
                            }
                        }
                        None => {
                            reporter.error(
                                instruction.line,
                                format!("[.{}] Undefined label `{}`", method.name, name),
                            );
                            None
                        }
                    },

                    Reference::Method(_) if !methods => None,

                    Reference::Method(name) => match constants.iter().position(|constant| constant.name == *name) {
                        Some(index) => {
                            debug!(
                                "[.{}] Linking method, line {}: {} -> {}",
                                method.name, instruction.line, name, index
                            );
                            Some(index as i32)
                        }
                        None => {
                            reporter.error(
                                instruction.line,
                                format!("[.{}] Undefined method `{}`", method.name, name),
                            );
                            None
                        }
                    },
                };

                if let Some(value) = resolved {
                    *argument = Argument::Resolved(value);
                }
            }
        }
    }
}
