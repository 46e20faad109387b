use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::LevelFilter;

/// When the shell colors its own diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    /// `Auto` colors only an interactive session.
    pub fn enabled(self, interactive: bool) -> bool {
        match self {
            ColorMode::Auto => interactive,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

impl FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ColorMode::Auto),
            "always" => Ok(ColorMode::Always),
            "never" => Ok(ColorMode::Never),
            other => Err(format!("unknown color mode `{}`", other)),
        }
    }
}

pub struct Config {
    pub name: String,
    pub config_dir: PathBuf,
    pub logger_dir: PathBuf,
    pub logger_level: LevelFilter,
    pub color: ColorMode,
}

impl Config {
    fn get_config_dir() -> PathBuf {
        if let Ok(dir) = env::var("SHELL_CONFIG_DIR") {
            PathBuf::from(dir)
        } else if let Ok(home) = env::var("HOME") {
            PathBuf::from(home).join(".config/shell")
        } else {
            env::temp_dir().join("shell")
        }
    }

    fn with_dir(config_dir: PathBuf) -> Self {
        Config {
            name: env!("CARGO_PKG_NAME").to_string(),
            logger_dir: config_dir.join("logs"),
            config_dir,
            logger_level: LevelFilter::Info,
            color: ColorMode::Auto,
        }
    }

    /// Defaults, then `<config dir>/.env`, then the process environment.
    pub fn new() -> Self {
        let config_dir = Self::get_config_dir();
        load_env_file(&config_dir.join(".env"));

        let mut config = Config::with_dir(config_dir);
        config.apply(|key| env::var(key).ok());
        config
    }

    fn apply(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("SHELL_LOG_DIR") {
            self.logger_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("SHELL_LOG_LEVEL") {
            match parse_level(&level) {
                Some(level) => self.logger_level = level,
                None => eprintln!("shell: ignoring unknown log level `{}`", level),
            }
        }
        if let Some(color) = lookup("SHELL_COLOR") {
            match color.parse() {
                Ok(color) => self.color = color,
                Err(e) => eprintln!("shell: ignoring SHELL_COLOR: {}", e),
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::with_dir(Self::get_config_dir())
    }
}

/// Variables already in the environment win over the file.
fn load_env_file(path: &Path) {
    if path.is_file() {
        if let Err(e) = dotenv::from_path(path) {
            eprintln!("shell: {}: {}", path.display(), e);
        }
    }
}

pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}
