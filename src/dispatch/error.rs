//! Dispatch failures and their HTTP mapping.

use crate::http::{GatewayResponse, StatusCode};
use crate::runner::{ExecutionError, ExecutionResult, InvalidPayload};
use crate::store::StoreError;
use std::fmt;
use std::time::Duration;

/// Broad class of a [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is unusable (400).
    Client,
    /// The app or route does not exist (404).
    NotFound,
    /// The datastore or execution backend failed (500).
    Backend,
}

/// Terminal failure of one dispatch.
#[derive(Debug)]
pub enum DispatchError {
    /// No app name in the path or the request context.
    MissingApp,
    InvalidPayload(InvalidPayload),
    AppNotFound(String),
    RouteNotFound { app: String, path: String },
    Datastore(StoreError),
    /// The backend could not run the function.
    Execution(ExecutionError),
    /// The function ran but did not succeed.
    FunctionFailed(ExecutionResult),
    /// The function wrote more than the output buffer allows.
    OutputLimitExceeded(usize),
    /// The backend did not finish within the configured timeout.
    Timeout(Duration),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::MissingApp | DispatchError::InvalidPayload(_) => ErrorKind::Client,
            DispatchError::AppNotFound(_) | DispatchError::RouteNotFound { .. } => {
                ErrorKind::NotFound
            }
            DispatchError::Datastore(_)
            | DispatchError::Execution(_)
            | DispatchError::FunctionFailed(_)
            | DispatchError::OutputLimitExceeded(_)
            | DispatchError::Timeout(_) => ErrorKind::Backend,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Client => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Backend => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure happened while the function was executing.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            DispatchError::Execution(_)
                | DispatchError::FunctionFailed(_)
                | DispatchError::OutputLimitExceeded(_)
                | DispatchError::Timeout(_)
        )
    }

    /// Message returned to the client. Datastore details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            DispatchError::Datastore(_) => "Could not read from datastore".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::MissingApp => write!(f, "App name is required"),
            DispatchError::InvalidPayload(err) => write!(f, "{}", err),
            DispatchError::AppNotFound(app) => write!(f, "App '{}' not found", app),
            DispatchError::RouteNotFound { app, path } => {
                write!(f, "Route '{}' not found in app '{}'", path, app)
            }
            DispatchError::Datastore(err) => write!(f, "{}", err),
            DispatchError::Execution(err) => write!(f, "{}", err),
            DispatchError::FunctionFailed(result) => match result.exit_code {
                Some(code) => write!(f, "function finished with {} (exit code {})", result.status, code),
                None => write!(f, "function finished with {}", result.status),
            },
            DispatchError::OutputLimitExceeded(limit) => {
                write!(f, "function output exceeded {} bytes", limit)
            }
            DispatchError::Timeout(timeout) => {
                write!(f, "function timed out after {:?}", timeout)
            }
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<InvalidPayload> for DispatchError {
    fn from(err: InvalidPayload) -> Self {
        DispatchError::InvalidPayload(err)
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        DispatchError::Datastore(err)
    }
}

impl From<DispatchError> for GatewayResponse {
    /// Execution failures answer with an empty body; everything else carries
    /// a JSON message.
    fn from(err: DispatchError) -> Self {
        if err.is_execution_failure() {
            GatewayResponse::new(err.status())
        } else {
            GatewayResponse::error(err.status(), err.public_message())
        }
    }
}
