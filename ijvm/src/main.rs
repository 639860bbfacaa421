use anyhow::Context;
use clap::Parser;
use ijvm::{disassemble, Image, InstructionSet, VERSION};
use std::path::PathBuf;
use std::process;
use tracing::debug;

/// Inspect an IJVM image: header, constant pool, disassembly and debug symbols
#[derive(Parser, Debug)]
#[command(name = "ijvm-dump", version = VERSION)]
struct Cli {
    /// Image to inspect
    image: PathBuf,

    /// Instruction set definition used for disassembly
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    ijvm::logging::init(cli.verbose)?;

    let set = match &cli.config {
        Some(path) => InstructionSet::from_path(path)
            .with_context(|| format!("loading instruction set {}", path.display()))?,
        None => InstructionSet::builtin(),
    };
    debug!("Using instruction set `{}` ({} operations)", set.name(), set.len());

    let image = Image::read_file(&cli.image)
        .with_context(|| format!("reading image {}", cli.image.display()))?;
    let listing = disassemble(&image, &set)?;

    println!("constant pool offset: 0x{:08X}", image.constant_pool_offset);
    println!("data base:            0x{:08X}", image.data_base);
    println!("text size:            {} bytes", image.text.len());

    println!();
    println!("constants ({}):", image.constants.len());
    for (index, value) in image.constants.iter().enumerate() {
        println!("  #{:<4} {:>11}  0x{:08X}", index, value, value);
    }

    println!();
    println!("text:");
    for line in &listing {
        if let Some(name) = image.method_at(line.offset()) {
            println!("{}:", name);
        }
        println!("  {}", line);
    }

    if let Some(symbols) = &image.symbols {
        println!();
        println!("method symbols ({}):", symbols.methods.len());
        for symbol in &symbols.methods {
            println!("  {:04X}  {}", symbol.offset, symbol.name);
        }
        println!("label symbols ({}):", symbols.labels.len());
        for symbol in &symbols.labels {
            println!("  {:04X}  {}", symbol.offset, symbol.name);
        }
    }

    Ok(())
}
