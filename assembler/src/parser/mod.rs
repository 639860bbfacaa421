//! Block parser turning JAS source into a [`Program`].
//!
//! The source is consumed line by line. Top-level lines open one of the
//! `.constant`, `.main` or `.method` blocks; inside a method an optional
//! `.var` block may precede the first statement. Problems that only concern
//! one line are reported to the diagnostic sink and parsing continues,
//! while running out of input inside a block or a malformed method header
//! stops everything with a [`Fatal`] error.

mod header;
mod instruction;
mod macros;

pub use header::{method_declaration, parse_method_header, MethodHeader};

use ijvm::InstructionSet;
use regex::Regex;
use std::io::BufRead;
use std::sync::OnceLock;
use tracing::{debug, info, trace};

use crate::config::AssemblerConfig;
use crate::diagnostics::{DiagnosticSink, Reporter};
use crate::error::{AssembleError, Fatal};
use crate::linker;
use crate::program::{Constant, ConstantOrigin, Method, Program};
use crate::source::{tokenize, Line, SourceReader};

pub const CONSTANT_START: &str = ".constant";
pub const CONSTANT_END: &str = ".end-constant";
pub const MAIN_START: &str = ".main";
pub const MAIN_END: &str = ".end-main";
pub const METHOD_START: &str = ".method";
pub const METHOD_END: &str = ".end-method";
pub const VAR_START: &str = ".var";
pub const VAR_END: &str = ".end-var";

/// Whether `name` is usable as a variable, parameter, constant or label name
pub fn is_identifier(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*$").expect("identifier pattern compiles"))
        .is_match(name)
}

/// A single token in front of `:`, as opposed to a `:` inside a quoted argument
fn is_label_candidate(head: &str) -> bool {
    !head.is_empty()
        && !head.starts_with('#')
        && !head.contains(|c: char| c.is_whitespace() || matches!(c, '\'' | '"' | '`'))
}

/// Result of a run that was not aborted
#[derive(Debug, Clone)]
pub struct Assembled {
    pub program: Program,
    pub errors: usize,
    pub warnings: usize,
}

impl Assembled {
    pub fn succeeded(&self) -> bool {
        self.errors == 0
    }

    /// The linked program, or the error count if anything was reported
    pub fn into_result(self) -> Result<Program, AssembleError> {
        if self.succeeded() {
            Ok(self.program)
        } else {
            Err(AssembleError::Failed { count: self.errors })
        }
    }
}

/// Builds and links a program from one source file
pub struct Assembler<'a> {
    set: &'a InstructionSet,
    config: &'a AssemblerConfig,
    reporter: Reporter<'a>,
    program: Program,
    parsed_constants: bool,
    parsed_main: bool,
}

impl<'a> Assembler<'a> {
    pub fn new(
        set: &'a InstructionSet,
        config: &'a AssemblerConfig,
        file: &str,
        sink: &'a mut dyn DiagnosticSink,
    ) -> Self {
        Self {
            set,
            config,
            reporter: Reporter::new(file, sink),
            program: Program::new(),
            parsed_constants: false,
            parsed_main: false,
        }
    }

    /// Parse the whole source, then link the result
    pub fn assemble<R: BufRead>(mut self, reader: R) -> Result<Assembled, Fatal> {
        let mut source = SourceReader::new(reader);
        self.parse(&mut source)?;
        linker::link_with(&mut self.program, &mut self.reporter);

        info!(
            "Assembled {}: {} method(s), {} constant(s), {} byte(s)",
            self.reporter.file(),
            self.program.methods.len(),
            self.program.constants.len(),
            self.program.size()
        );

        Ok(Assembled {
            errors: self.reporter.errors(),
            warnings: self.reporter.warnings(),
            program: self.program,
        })
    }

    fn parse<R: BufRead>(&mut self, source: &mut SourceReader<R>) -> Result<(), Fatal> {
        while let Some(line) = source.next_line()? {
            trace!("{}:{} > {}", self.reporter.file(), line.number, line.text);

            if line.text.is_empty() {
                continue;
            }

            if line.text == CONSTANT_START {
                self.constant_block(source)?;
            } else if line.text == MAIN_START {
                self.main_block(source, &line)?;
            } else if let Some(declaration) = method_declaration(&line.text) {
                self.method_block(source, &line, declaration)?;
            } else {
                self.reporter.warning(
                    line.number,
                    format!("Ignoring line outside of any block: `{}`", line.text),
                );
            }
        }
        Ok(())
    }

    fn constant_block<R: BufRead>(&mut self, source: &mut SourceReader<R>) -> Result<(), Fatal> {
        let line = source.line_number();
        if self.parsed_constants {
            self.reporter.error(line, "Constant block was already declared".to_string());
            return self.skip_until(source, CONSTANT_END);
        }
        if self.parsed_main {
            self.reporter.error(line, "Constant block must appear before methods".to_string());
            return self.skip_until(source, CONSTANT_END);
        }

        while let Some(line) = source.next_line()? {
            if line.text == CONSTANT_END {
                self.parsed_constants = true;
                return Ok(());
            }
            if line.text.is_empty() {
                continue;
            }
            self.constant(&line);
        }
        Err(self.unexpected_eof(source, CONSTANT_END))
    }

    fn constant(&mut self, line: &Line) {
        let tokens = tokenize(&line.text);
        let (name, literal) = match tokens.as_slice() {
            [name, literal, ..] => (*name, *literal),
            _ => {
                self.reporter.error(line.number, "constant: Missing constant value".to_string());
                return;
            }
        };

        if !is_identifier(name) {
            self.reporter
                .error(line.number, format!("constant: Invalid constant name `{}`", name));
            return;
        }

        if let Some((_, existing)) = self.program.constant(name) {
            let message = format!(
                "constant: Redefinition of constant `{}` from line {}",
                name, existing.line
            );
            self.reporter.error(line.number, message);
            return;
        }

        let value = if literal.starts_with('\'') {
            ijvm::literal::parse_char(literal).map(i32::from)
        } else {
            ijvm::literal::parse_i32(literal)
        };
        let value = match value {
            Ok(value) => value,
            Err(err) => {
                self.reporter.error(line.number, format!("constant: {}", err));
                return;
            }
        };

        if tokens.len() > 2 {
            self.reporter.warning(
                line.number,
                format!("constant: Ignoring trailing tokens after `{}`", name),
            );
        }

        debug!("Constant registered: {} = {}", name, value);
        self.program.constants.push(Constant {
            name: name.to_string(),
            value,
            line: line.number,
            origin: ConstantOrigin::Declared,
        });
    }

    fn main_block<R: BufRead>(&mut self, source: &mut SourceReader<R>, header: &Line) -> Result<(), Fatal> {
        if self.parsed_main {
            self.reporter.error(header.number, "Main was already declared".to_string());
            return self.skip_until(source, MAIN_END);
        }
        self.parsed_main = true;
        self.method_body(source, Method::entry(header.number), MAIN_END)
    }

    fn method_block<R: BufRead>(
        &mut self,
        source: &mut SourceReader<R>,
        header: &Line,
        declaration: &str,
    ) -> Result<(), Fatal> {
        if !self.parsed_main {
            self.reporter.error(
                header.number,
                "Main must be declared before other methods".to_string(),
            );
            return self.skip_until(source, METHOD_END);
        }

        let parsed = parse_method_header(declaration).map_err(|err| Fatal::MethodHeader {
            file: self.reporter.file().to_string(),
            line: header.number,
            source: err,
        })?;

        if !is_identifier(&parsed.name) {
            self.reporter
                .error(header.number, format!("Invalid method name `{}`", parsed.name));
        }
        for (index, parameter) in parsed.parameters.iter().enumerate() {
            if !is_identifier(parameter) {
                self.reporter
                    .error(header.number, format!("Invalid parameter name `{}`", parameter));
            } else if parsed.parameters[..index].contains(parameter) {
                self.reporter
                    .warning(header.number, format!("Duplicate parameter `{}`", parameter));
            }
        }

        let method = Method::new(&parsed.name, &parsed.parameters, header.number);
        self.method_body(source, method, METHOD_END)
    }

    fn method_body<R: BufRead>(
        &mut self,
        source: &mut SourceReader<R>,
        mut method: Method,
        terminator: &'static str,
    ) -> Result<(), Fatal> {
        info!("[.{}] Entering method", method.name);
        let mut parsed_vars = false;

        while let Some(line) = source.next_line()? {
            if line.text == terminator {
                if method.wide_pending() {
                    self.reporter.warning(
                        line.number,
                        format!("[.{}] WIDE prefix at the end of the method has no effect", method.name),
                    );
                }
                method.seal();
                info!(
                    "Registered method: ({}) {} [{} byte(s)]",
                    self.program.methods.len(),
                    method.name,
                    method.size
                );
                self.program.methods.push(method);
                return Ok(());
            }

            if line.text.is_empty() {
                continue;
            }

            if line.text == VAR_START {
                if parsed_vars {
                    self.reporter.error(line.number, "Unexpected .var block".to_string());
                    self.skip_until(source, VAR_END)?;
                } else {
                    self.var_block(source, &mut method)?;
                    parsed_vars = true;
                }
                continue;
            }

            parsed_vars = true;
            self.statement(&mut method, &line);
        }

        Err(self.unexpected_eof(source, terminator))
    }

    fn var_block<R: BufRead>(&mut self, source: &mut SourceReader<R>, method: &mut Method) -> Result<(), Fatal> {
        while let Some(line) = source.next_line()? {
            if line.text == VAR_END {
                return Ok(());
            }
            for name in line.text.split_whitespace() {
                if !is_identifier(name) {
                    self.reporter
                        .error(line.number, format!("Invalid variable name `{}`", name));
                    continue;
                }
                if let Some(existing) = method.variable(name) {
                    let message = format!(
                        "Duplicate variable `{}`, references resolve to slot {}",
                        name, existing.slot
                    );
                    self.reporter.warning(line.number, message);
                }
                let slot = method.add_variable(name);
                debug!("[.{}] Registered variable: {} -> {}", method.name, name, slot);
            }
        }
        Err(self.unexpected_eof(source, VAR_END))
    }

    /// An optional `label:` followed by an instruction or a macro directive
    fn statement(&mut self, method: &mut Method, line: &Line) {
        let mut text = line.text.as_str();

        if let Some((head, rest)) = text.split_once(':') {
            let name = head.trim();
            if is_label_candidate(name) {
                if !is_identifier(name) {
                    self.reporter
                        .error(line.number, format!("Invalid label name `{}`", name));
                } else {
                    let first = method.add_label(name, line.number).err().map(|existing| existing.line);
                    match first {
                        None => debug!("[.{}] Registered label: {}@{}", method.name, name, method.size),
                        Some(first) => self.reporter.error(
                            line.number,
                            format!("Duplicate label `{}`, first defined on line {}", name, first),
                        ),
                    }
                }
                text = rest.trim();
            }
        }

        if text.is_empty() {
            return;
        }

        if text.starts_with('#') {
            self.directive(method, text, line.number);
        } else {
            self.instruction(method, text, line.number);
        }
    }

    fn skip_until<R: BufRead>(&mut self, source: &mut SourceReader<R>, terminator: &'static str) -> Result<(), Fatal> {
        while let Some(line) = source.next_line()? {
            debug!("{}:{} > |skip| {}", self.reporter.file(), line.number, line.text);
            if line.text == terminator {
                return Ok(());
            }
        }
        Err(self.unexpected_eof(source, terminator))
    }

    fn unexpected_eof<R: BufRead>(&self, source: &SourceReader<R>, expected: &'static str) -> Fatal {
        Fatal::UnexpectedEof {
            file: self.reporter.file().to_string(),
            line: source.line_number(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::error::HeaderError;
    use crate::program::Argument;
    use std::io::Cursor;

    fn run(source: &str, config: &AssemblerConfig) -> (Result<Assembled, Fatal>, Diagnostics) {
        let set = InstructionSet::builtin();
        let mut diagnostics = Diagnostics::new();
        let result = Assembler::new(&set, config, "test.jas", &mut diagnostics).assemble(Cursor::new(source));
        (result, diagnostics)
    }

    fn assemble(source: &str) -> (Assembled, Diagnostics) {
        let (result, diagnostics) = run(source, &AssemblerConfig::new());
        (result.unwrap(), diagnostics)
    }

    fn messages(diagnostics: &Diagnostics) -> Vec<String> {
        diagnostics.entries().iter().map(|d| d.message.clone()).collect()
    }

    #[test]
    fn test_identifier_pattern() {
        assert!(is_identifier("a"));
        assert!(is_identifier("loop_1-end"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("_x"));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_minimal_program() {
        let (assembled, diagnostics) = assemble(".main\nHALT\n.end-main\n");
        assert!(assembled.succeeded());
        assert!(diagnostics.is_empty());
        let main = assembled.program.entry().unwrap();
        assert_eq!(main.instructions.len(), 1);
        assert_eq!(main.size, 1);
    }

    #[test]
    fn test_constants_are_registered_in_order() {
        let (assembled, _) = assemble(
            ".constant\nONE 1\nHEX 0x10\nCHAR 'a'\nNEG -5\n.end-constant\n.main\n.end-main\n",
        );
        let values: Vec<(String, i32)> = assembled
            .program
            .constants
            .iter()
            .map(|c| (c.name.clone(), c.value))
            .collect();
        assert_eq!(
            values,
            vec![
                ("ONE".to_string(), 1),
                ("HEX".to_string(), 16),
                ("CHAR".to_string(), 97),
                ("NEG".to_string(), -5),
            ]
        );
        assert!(assembled.program.constants.iter().all(|c| c.origin == ConstantOrigin::Declared));
    }

    #[test]
    fn test_duplicate_constant_keeps_first() {
        let (assembled, diagnostics) =
            assemble(".constant\nFOO 1\nFOO 2\n.end-constant\n.main\n.end-main\n");
        assert_eq!(assembled.errors, 1);
        assert_eq!(assembled.program.constants.len(), 1);
        assert_eq!(assembled.program.constant("FOO").unwrap().1.value, 1);
        assert_eq!(diagnostics.entries()[0].line, 3);
        assert_eq!(
            diagnostics.entries()[0].message,
            "constant: Redefinition of constant `FOO` from line 2"
        );
    }

    #[test]
    fn test_malformed_constants() {
        let (assembled, diagnostics) = assemble(
            ".constant\nLONELY\nBIG 0x1_0000_0000\nBAD 12z\n1X 3\nOK 1 extra\n.end-constant\n.main\n.end-main\n",
        );
        assert_eq!(assembled.errors, 4);
        assert_eq!(assembled.warnings, 1);
        assert_eq!(
            messages(&diagnostics),
            vec![
                "constant: Missing constant value",
                "constant: Value out of range: `0x1_0000_0000`",
                "constant: Invalid value: `12z`",
                "constant: Invalid constant name `1X`",
                "constant: Ignoring trailing tokens after `OK`",
            ]
        );
        assert_eq!(assembled.program.constants.len(), 1);
    }

    #[test]
    fn test_block_ordering_errors() {
        let (assembled, diagnostics) = assemble(
            ".method early()\nNOP\n.end-method\n\
             .main\nHALT\n.end-main\n\
             .constant\nLATE 1\n.end-constant\n\
             .main\nNOP\n.end-main\n",
        );
        assert_eq!(assembled.errors, 3);
        assert_eq!(
            messages(&diagnostics),
            vec![
                "Main must be declared before other methods",
                "Constant block must appear before methods",
                "Main was already declared",
            ]
        );
        assert_eq!(assembled.program.methods.len(), 1);
        assert!(assembled.program.constants.is_empty());
    }

    #[test]
    fn test_second_constant_block() {
        let (assembled, diagnostics) =
            assemble(".constant\nA 1\n.end-constant\n.constant\nB 2\n.end-constant\n.main\n.end-main\n");
        assert_eq!(assembled.errors, 1);
        assert_eq!(diagnostics.entries()[0].line, 4);
        assert!(assembled.program.constant("B").is_none());
    }

    #[test]
    fn test_unexpected_eof_is_fatal() {
        for source in [
            ".main\nHALT\n",
            ".constant\nA 1\n",
            ".main\n.var\na\n",
            ".constant\n.end-constant\n.constant\nB 1\n",
        ] {
            let (result, _) = run(source, &AssemblerConfig::new());
            assert!(
                matches!(result, Err(Fatal::UnexpectedEof { .. })),
                "expected fatal EOF for {:?}",
                source
            );
        }
    }

    #[test]
    fn test_unterminated_skip_is_fatal() {
        let (result, diagnostics) = run(".method f()\nNOP\n", &AssemblerConfig::new());
        match result {
            Err(Fatal::UnexpectedEof { line, expected, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(expected, METHOD_END);
            }
            other => panic!("Expected fatal EOF, got {:?}", other.map(|a| a.errors)),
        }
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_malformed_header_registers_nothing() {
        let (result, _) = run(".main\n.end-main\n.method foo(a,b\nNOP\n.end-method\n", &AssemblerConfig::new());
        match result {
            Err(Fatal::MethodHeader { line, source, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(source, HeaderError::MissingCloseParen);
            }
            other => panic!("Expected header error, got {:?}", other.map(|a| a.program.methods.len())),
        }
    }

    #[test]
    fn test_parameters_and_locals() {
        let (assembled, _) = assemble(
            ".main\n.end-main\n.method add(a, b)\n.var\nsum tmp\nextra\n.end-var\nILOAD a\nILOAD b\nIADD\nISTORE sum\nILOAD sum\nIRETURN\n.end-method\n",
        );
        assert!(assembled.succeeded());
        let add = assembled.program.method("add").unwrap();
        assert_eq!(add.parameter_count, 3);
        assert_eq!(add.local_count(), 3);
        assert_eq!(add.variable("sum").unwrap().slot, 3);
        assert_eq!(add.instructions[3].arguments, vec![Argument::Resolved(3)]);
    }

    #[test]
    fn test_variable_diagnostics() {
        let (assembled, diagnostics) = assemble(
            ".main\n.var\nok 9bad\nok\n.end-var\nILOAD ok\n.end-main\n.method f(1p, q, q)\nIRETURN\n.end-method\n",
        );
        assert_eq!(assembled.errors, 2);
        assert_eq!(assembled.warnings, 2);
        assert_eq!(
            messages(&diagnostics),
            vec![
                "Invalid variable name `9bad`",
                "Duplicate variable `ok`, references resolve to slot 1",
                "Invalid parameter name `1p`",
                "Duplicate parameter `q`",
            ]
        );
        let main = assembled.program.entry().unwrap();
        assert_eq!(main.instructions[0].arguments, vec![Argument::Resolved(1)]);
        assert_eq!(assembled.program.method("f").unwrap().parameter_count, 4);
    }

    #[test]
    fn test_late_or_repeated_var_block() {
        let (assembled, diagnostics) = assemble(
            ".main\n.var\na\n.end-var\n.var\nb\n.end-var\n.end-main\n.method f()\nNOP\n.var\nc\n.end-var\nIRETURN\n.end-method\n",
        );
        assert_eq!(assembled.errors, 2);
        assert_eq!(messages(&diagnostics), vec!["Unexpected .var block", "Unexpected .var block"]);
        assert!(assembled.program.entry().unwrap().variable("b").is_none());
        assert!(assembled.program.method("f").unwrap().variable("c").is_none());
    }

    #[test]
    fn test_labels() {
        let (assembled, diagnostics) = assemble(
            ".main\nstart: BIPUSH 1\nloop:\nPOP\nGOTO loop\nloop: NOP\nBIPUSH ':'\n.end-main\n",
        );
        assert_eq!(assembled.errors, 1);
        assert_eq!(messages(&diagnostics), vec!["Duplicate label `loop`, first defined on line 3"]);
        let main = assembled.program.entry().unwrap();
        assert_eq!(main.label("start").unwrap().offset, 0);
        assert_eq!(main.label("loop").unwrap().offset, 2);
        assert_eq!(main.instructions.len(), 5);
        assert_eq!(main.instructions[4].arguments, vec![Argument::Resolved(58)]);
    }

    #[test]
    fn test_invalid_label_name_keeps_instruction() {
        let (assembled, diagnostics) = assemble(".main\n1bad: NOP\nBIPUSH ':'\n.end-main\n");
        assert_eq!(assembled.errors, 1);
        assert_eq!(messages(&diagnostics), vec!["Invalid label name `1bad`"]);
        assert_eq!(diagnostics.entries()[0].line, 2);
        let main = assembled.program.entry().unwrap();
        assert!(main.labels.is_empty());
        let names: Vec<&str> = main.instructions.iter().map(|i| i.operation.name.as_str()).collect();
        assert_eq!(names, vec!["NOP", "BIPUSH"]);
    }

    #[test]
    fn test_stray_lines_warn() {
        let (assembled, diagnostics) = assemble("garbage\n.main\n.end-main\n.end-method\n");
        assert!(assembled.succeeded());
        assert_eq!(assembled.warnings, 2);
        assert_eq!(diagnostics.entries()[1].line, 4);
    }

    #[test]
    fn test_missing_main_fails_at_link() {
        let (assembled, diagnostics) = assemble(".constant\nA 1\n.end-constant\n");
        assert!(!assembled.succeeded());
        assert_eq!(messages(&diagnostics), vec!["linker: No main found"]);
    }

    #[test]
    fn test_into_result() {
        let (assembled, _) = assemble(".main\nNOPE\n.end-main\n");
        match assembled.into_result() {
            Err(AssembleError::Failed { count }) => assert_eq!(count, 1),
            other => panic!("Expected failure, got {:?}", other.map(|p| p.methods.len())),
        }
    }
}
