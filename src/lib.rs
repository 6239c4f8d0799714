pub mod aggregate;
pub mod config;
pub mod corpus;
pub mod error;
pub mod isolation;
pub mod loader;
pub mod log;
pub mod outcome;
pub mod report;
pub mod runner;
pub mod scheduler;

pub use error::{Error, Result};
pub use outcome::{ExecutionResult, Outcome};
