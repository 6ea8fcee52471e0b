//! Plotdown CLI — document traversal and configuration cascade.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "plotdown",
    version,
    about = "Process Markdown document trees into annotated block streams with SQL-backed data"
)]
struct Cli {
    #[command(subcommand)]
    command: plotdown::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = plotdown::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        let mut cause = std::error::Error::source(&e);
        while let Some(inner) = cause {
            eprintln!("  caused by: {}", inner);
            cause = inner.source();
        }
        std::process::exit(1);
    }
}
