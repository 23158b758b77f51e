use clap::Parser;
use colored::*;
use ream_nodekeeper::cli::Cli;
use ream_nodekeeper::commands::execute_command;
use std::process;

fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Set up colored output
    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = execute_command(cli.command, cli.verbose) {
        eprintln!("{} {:#}", "Error:".bright_red().bold(), e);
        process::exit(1);
    }
}
