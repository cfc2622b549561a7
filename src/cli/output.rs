//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::GenerationError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &GenerationError) -> String {
    match e {
        GenerationError::ConfigError(msg) => format!("Configuration error:\n{}", msg),
        GenerationError::StorageError(err) => format!("Storage error: {}", err),
        other => other.to_string(),
    }
}
