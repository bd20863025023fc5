//! Function execution: the backend contract, environment construction and
//! the sinks that capture a function's output.

pub mod backend;
pub mod command;
pub mod env;
pub mod output;

pub use backend::{ExecutionBackend, ExecutionError, ExecutionRequest, ExecutionResult, RunStatus};
pub use command::CommandBackend;
pub use env::{build_environment, EnvInput, Environment, InvalidPayload};
pub use output::{LoggerFactory, OutputBuffer, OutputLimitExceeded, TracingLoggerFactory};
