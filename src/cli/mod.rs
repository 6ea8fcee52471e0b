//! PD-010: CLI subcommands — process, blocks.

use crate::core::error::{Error, Result};
use crate::core::types::{BlockKind, Variables};
use crate::core::walker::{self, ProcessOutput};
use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a document tree and print the annotated block stream
    Process {
        /// Entry Markdown file, relative to the base directory
        file: String,

        /// Base directory for relative paths
        #[arg(short, long, default_value = ".")]
        base_dir: PathBuf,

        /// Bind a variable before processing (NAME=VALUE, repeatable)
        #[arg(short, long = "var", value_name = "NAME=VALUE")]
        var: Vec<String>,

        /// Emit the full block stream as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Segment a single Markdown file into blocks without processing
    Blocks {
        /// Markdown file to segment
        file: String,

        /// Base directory for relative paths
        #[arg(short, long, default_value = ".")]
        base_dir: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Process {
            file,
            base_dir,
            var,
            json,
        } => cmd_process(&file, &base_dir, &var, json),
        Commands::Blocks { file, base_dir } => cmd_blocks(&file, &base_dir),
    }
}

fn cmd_process(file: &str, base_dir: &PathBuf, var: &[String], json: bool) -> Result<()> {
    let variables = parse_variable_args(var)?;
    let output = walker::process(base_dir, file, variables)?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&output).map_err(|e| Error::Render { source: e })?;
        println!("{}", rendered);
    } else {
        print_summary(&output);
    }
    Ok(())
}

fn cmd_blocks(file: &str, base_dir: &PathBuf) -> Result<()> {
    let ctx = walker::RunContext::new(base_dir, Variables::new());
    let path = ctx.resolve_path(file);
    let contents = std::fs::read_to_string(&path).map_err(|e| Error::FileAccess {
        location: Default::default(),
        source: e,
    })?;
    let display = ctx.display_path(&path);
    for block in crate::core::blocks::segment(&contents, std::path::Path::new(&display)) {
        let line = block.location.line.unwrap_or(0);
        println!("{:>5}  {:<14} {}", line, block.kind.to_string(), first_line(&block.text));
    }
    Ok(())
}

/// Display a processing run to stdout.
fn print_summary(output: &ProcessOutput) {
    let mut configured = 0;
    let mut result_sets = 0;
    for block in &output.blocks {
        if block.plotter_config().is_some() {
            configured += 1;
        }
        result_sets += block.query_results().len();
    }

    println!(
        "Processed: {} blocks ({} configured, {} result sets)",
        output.blocks.len(),
        configured,
        result_sets
    );
    println!();

    let mut current_path = String::new();
    for block in &output.blocks {
        let path = block.path().unwrap_or("<input>");
        if path != current_path {
            current_path = path.to_string();
            println!("{}:", current_path);
        }
        let marker = match (&block.kind, block.plotter_config().is_some()) {
            (_, true) => "*",
            (BlockKind::Heading { .. }, _) => "#",
            _ => " ",
        };
        let line = block.location.line.unwrap_or(0);
        println!("  {} {:>5}  {:<14} {}", marker, line, block.kind.to_string(), first_line(&block.text));
        for results in block.query_results() {
            println!(
                "        results: {} column(s), {} row(s)",
                results.columns.len(),
                results.rows.len()
            );
        }
    }

    if !output.variables.is_empty() {
        println!();
        println!("Variables:");
        for (name, value) in &output.variables {
            println!("  {} = {}", name, value);
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// Parse repeated `--var NAME=VALUE` arguments into a variable map.
pub fn parse_variable_args(args: &[String]) -> Result<Variables> {
    let mut variables = Variables::new();
    for argument in args {
        let (name, value) = argument.split_once('=').ok_or_else(|| Error::ArgumentFormat {
            argument: argument.clone(),
        })?;
        if name.is_empty() {
            return Err(Error::ArgumentFormat {
                argument: argument.clone(),
            });
        }
        variables.insert(name.to_string(), value.to_string());
    }
    Ok(variables)
}
