use std::path::PathBuf;

/// Errors that stop the runner.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("Callback request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The controller returned a non-2xx status code.
    #[error("Callback rejected ({status}): {body}")]
    Callback { status: u16, body: String },

    /// Files were found in the working directory before claiming a task.
    #[error("Working directory not empty: {}", .0.display())]
    WorkDirNotEmpty(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Worth retrying: transport failures and 5xx answers.
    pub fn is_transient(&self) -> bool {
        match self {
            RunnerError::Request(_) => true,
            RunnerError::Callback { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
