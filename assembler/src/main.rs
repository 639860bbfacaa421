use clap::Parser;
use jasm::cli::{Cli, CliHandler};
use std::process;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = ijvm::logging::init(cli.verbose) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    let handler = CliHandler::new();
    if let Err(e) = handler.handle(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
