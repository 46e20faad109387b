use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error};

use crate::shell::input::LineReader;
use crate::shell::terminal::Terminal;
use crate::shell::Shell;
use crate::utils::config::Config;
use crate::utils::log::init_logger;

mod shell;
mod utils;

/// A small job-control shell.
#[derive(Parser, Debug)]
#[command(name = "shell", version, about)]
struct Cli {
    /// Do not print a prompt
    #[arg(short)]
    quiet: bool,

    /// Read commands from this file instead of standard input
    script: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::new();
    init_logger(&config);
    debug!("configuration loaded from {}", config.config_dir.display());

    let source: Box<dyn io::BufRead> = match &cli.script {
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(e) => {
                error!("cannot open script {}: {}", path.display(), e);
                eprintln!("{}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(BufReader::new(io::stdin())),
    };
    let prompting = !cli.quiet && cli.script.is_none();

    let terminal = Terminal::acquire();
    let mut shell = Shell::new(&config, &terminal, LineReader::new(source), prompting);
    match shell.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("shell stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}
