pub mod builtin;
#[allow(clippy::module_inception)]
pub mod executor;
pub mod pipeline;

pub use executor::Executor;
