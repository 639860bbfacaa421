use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use ijvm::InstructionSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::codegen::CodeGenerator;
use crate::config::AssemblerConfig;
use crate::diagnostics::Diagnostics;
use crate::error::AssembleError;
use crate::parser::Assembler;

/// Output path meaning standard output
pub const STDOUT: &str = "-";

#[derive(Parser, Debug)]
#[command(name = "jasm", version, about = "Assemble JAS sources into IJVM images")]
pub struct Cli {
    /// JAS source file
    pub input: PathBuf,

    /// Instruction set definition, the standard IJVM set when omitted
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Where to write the image, `-` for standard output
    #[arg(short, long, value_name = "FILE", default_value = "out.ijvm")]
    pub output: String,

    /// Write the image even if errors were reported
    #[arg(short, long)]
    pub force: bool,

    /// Insert WIDE prefixes for variable slots above 255
    #[arg(short = 'w', long)]
    pub auto_wide: bool,

    /// Append method and label debug symbols to the image
    #[arg(short, long)]
    pub debug_symbols: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print the linked program as JSON
    #[arg(long)]
    pub dump_program: bool,
}

impl Cli {
    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig::new()
            .with_auto_wide(self.auto_wide)
            .with_force(self.force)
            .with_debug_symbols(self.debug_symbols)
    }
}

pub struct CliHandler;

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, cli: Cli) -> Result<()> {
        if cli.dump_program && cli.output == STDOUT {
            bail!("--dump-program cannot be combined with writing the image to standard output");
        }

        let set = match &cli.config {
            Some(path) => InstructionSet::from_path(path)
                .with_context(|| format!("Failed to load instruction set {}", path.display()))?,
            None => InstructionSet::builtin(),
        };
        let config = cli.assembler_config();

        let file = File::open(&cli.input)
            .with_context(|| format!("Failed to open {}", cli.input.display()))?;
        let name = display_name(&cli.input);

        let mut diagnostics = Diagnostics::new();
        let result = Assembler::new(&set, &config, &name, &mut diagnostics).assemble(BufReader::new(file));
        for diagnostic in diagnostics.entries() {
            eprintln!("{}", diagnostic);
        }
        let assembled = result?;

        if !assembled.succeeded() && !config.force {
            return Err(AssembleError::Failed { count: assembled.errors }.into());
        }

        if cli.dump_program {
            println!("{}", serde_json::to_string_pretty(&assembled.program)?);
        }

        let image = CodeGenerator::new()
            .with_lenient(config.force)
            .render(&assembled.program, config.debug_symbols)?;
        self.write_output(&cli.output, &image)?;

        if !assembled.succeeded() {
            eprintln!(
                "Wrote {} despite {} error(s)",
                cli.output, assembled.errors
            );
        }
        info!("Wrote {} byte(s) to {}", image.len(), cli.output);
        Ok(())
    }

    fn write_output(&self, output: &str, image: &[u8]) -> Result<()> {
        if output == STDOUT {
            let mut stdout = io::stdout().lock();
            stdout.write_all(image)?;
            stdout.flush()?;
        } else {
            fs::write(output, image).with_context(|| format!("Failed to write {}", output))?;
        }
        Ok(())
    }
}

/// File name used in diagnostics
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
