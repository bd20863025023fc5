//! Execution backend contract.

use crate::runner::output::OutputBuffer;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

/// Everything a backend needs to run one function invocation.
///
/// Built fresh by the dispatcher for every request and moved into the
/// backend; the dispatcher keeps its own handle on `stdout` to read the
/// captured output afterwards.
pub struct ExecutionRequest {
    /// Image reference of the function.
    pub image: String,
    /// Time the backend is allowed to take.
    pub timeout: Duration,
    /// Request ID used for log correlation.
    pub id: String,
    pub app_name: String,
    /// Memory limit in MiB.
    pub memory: u64,
    /// Environment passed to the function.
    pub env: HashMap<String, String>,
    /// Bounded sink for the function's standard output.
    pub stdout: OutputBuffer,
    /// Sink for diagnostic output. Never returned to the caller.
    pub stderr: Box<dyn Write + Send>,
}

impl std::fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("image", &self.image)
            .field("timeout", &self.timeout)
            .field("id", &self.id)
            .field("app_name", &self.app_name)
            .field("memory", &self.memory)
            .field("env", &self.env)
            .field("stdout", &self.stdout)
            .finish_non_exhaustive()
    }
}

/// Final state of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Error,
    Timeout,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Error => write!(f, "error"),
            RunStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Outcome reported by a backend. The output itself lives in the request's
/// stdout buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: RunStatus,
    /// Process exit code, when the backend has one.
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    pub fn success() -> Self {
        Self {
            status: RunStatus::Success,
            exit_code: Some(0),
        }
    }

    pub fn error(exit_code: Option<i32>) -> Self {
        Self {
            status: RunStatus::Error,
            exit_code,
        }
    }

    pub fn timeout() -> Self {
        Self {
            status: RunStatus::Timeout,
            exit_code: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// The backend could not run the function at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionError {
    /// Error message.
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExecutionError: {}", self.message)
    }
}

impl std::error::Error for ExecutionError {}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        ExecutionError::new(err.to_string())
    }
}

/// Runs function code in isolation.
///
/// Implementations must release everything they hold for an invocation when
/// the returned future is dropped: the dispatcher cancels the call that way on
/// timeout and when the client goes away.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Run the function described by `request` to completion.
    async fn run(&self, request: ExecutionRequest) -> Result<ExecutionResult, ExecutionError>;
}
