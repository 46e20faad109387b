use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use chrono::Local;
use env_logger::{Builder, Target};
use log::{warn, LevelFilter};

use crate::utils::config::Config;

/// Sends the shell's log records to `<log dir>/shell_<date>.log`. Program
/// output never goes through here. When the file cannot be opened the shell
/// logs warnings and errors to stderr instead.
pub fn init_logger(config: &Config) {
    match open_log_file(config) {
        Ok((path, file)) => {
            builder(config, config.logger_level)
                .target(Target::Pipe(Box::new(file)))
                .init();
            log::debug!("logging to {} at {}", path.display(), config.logger_level);
        }
        Err(e) => {
            builder(config, LevelFilter::Warn)
                .target(Target::Stderr)
                .init();
            warn!(
                "cannot open a log file in {}: {}; logging to stderr",
                config.logger_dir.display(),
                e
            );
        }
    }
}

fn open_log_file(config: &Config) -> io::Result<(PathBuf, File)> {
    fs::create_dir_all(&config.logger_dir)?;
    let date = Local::now().format("%Y-%m-%d");
    let path = config
        .logger_dir
        .join(format!("{}_{}.log", config.name, date));
    let file = File::options().create(true).append(true).open(&path)?;
    Ok((path, file))
}

fn builder(config: &Config, level: LevelFilter) -> Builder {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[PID:{}][{}] {} - {}",
                process::id(),
                record.level(),
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.args()
            )
        })
        .filter(Some(&config.name), level)
        .filter(None, LevelFilter::Warn.min(level));
    builder
}
