// Consistent exit codes for the inkstone CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   11 = authentication error
//   12 = request rejected (stale fix, invalid transition, bad selection)
//   13 = network error
//   14 = background task failed

use std::process;

use inkstone_engine::{BackendError, SessionError};

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Auth = 11,
    Rejected = 12,
    Network = 13,
    TaskFailed = 14,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(session_err) = cause.downcast_ref::<SessionError>() {
                return match session_err {
                    SessionError::Backend(backend_err) => Self::from_backend(backend_err),
                    SessionError::Rejected(_) => Self::Rejected,
                    SessionError::Closed => Self::Error,
                };
            }
            if let Some(backend_err) = cause.downcast_ref::<BackendError>() {
                return Self::from_backend(backend_err);
            }
            if cause.downcast_ref::<TaskFailed>().is_some() {
                return Self::TaskFailed;
            }
            if cause.downcast_ref::<UsageError>().is_some() {
                return Self::Usage;
            }
        }
        Self::Error
    }

    fn from_backend(err: &BackendError) -> Self {
        match err {
            BackendError::Unauthorized => Self::Auth,
            BackendError::Transport(_) | BackendError::StreamClosed => Self::Network,
            BackendError::Status { status: 401 | 403, .. } => Self::Auth,
            BackendError::Status { .. } | BackendError::Decode(_) => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

/// A background job ended in failure.
#[derive(Debug)]
pub struct TaskFailed {
    pub message: String,
}

impl std::fmt::Display for TaskFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task failed: {}", self.message)
    }
}

impl std::error::Error for TaskFailed {}

/// Arguments that parse but make no sense together.
#[derive(Debug)]
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}
