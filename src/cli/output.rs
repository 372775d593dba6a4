//! CLI output: error mapping from sync errors to a stable CLI surface.

use crate::error::{BackendError, SyncError};

/// Map session errors to a one-line message for the terminal.
pub fn map_error(e: &SyncError) -> String {
    match e.backend() {
        Some(BackendError::Transient(message)) => {
            format!("Backend unavailable: {} (try again)", message)
        }
        Some(BackendError::Validation(message)) => format!("Invalid input: {}", message),
        Some(BackendError::NotFound(message)) => format!("Not found: {}", message),
        Some(BackendError::Rejected(message)) => format!("Rejected: {}", message),
        None => e.to_string(),
    }
}
