pub mod error;
pub mod executor;
pub mod input;
pub mod job_manager;
pub mod parser;
#[allow(clippy::module_inception)]
pub mod shell;
pub mod signals;
pub mod terminal;

pub use shell::Shell;
