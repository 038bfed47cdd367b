//! Error types shared across Revunk crates.

use std::path::PathBuf;

/// Top-level error type for Revunk operations.
///
/// Parsing is tolerant; most of these surface at plan/export time so that
/// `format` and inspection keep working on scripts that cannot export yet.
#[derive(Debug, thiserror::Error)]
pub enum RevunkError {
    #[error("Malformed time '{token}': expected seconds, mm:ss, or hh:mm:ss")]
    MalformedTime { token: String },

    #[error("Missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("Export list is empty: add beats under 'export:'")]
    EmptyExport,

    #[error("Unresolved tempo {bpm} bpm{}", beat_suffix(.beat_index))]
    UnresolvedTempo { bpm: f64, beat_index: Option<u32> },

    #[error("Beat {beat_index} resolves to an empty source range")]
    EmptyBeat { beat_index: u32 },

    #[error("Beat {beat_index} resolves outside the representable time range")]
    TimeOutOfRange { beat_index: u32 },

    #[error("Metadata sidecar not found: {path}")]
    MetadataNotFound { path: PathBuf },

    #[error("Not enough beats detected: found {found}, need at least {required}")]
    NotEnoughBeats { found: usize, required: usize },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using RevunkError.
pub type RevunkResult<T> = Result<T, RevunkError>;

fn beat_suffix(beat_index: &Option<u32>) -> String {
    match beat_index {
        Some(beat) => format!(" at beat {beat}"),
        None => String::new(),
    }
}

impl RevunkError {
    pub fn malformed_time(token: impl Into<String>) -> Self {
        Self::MalformedTime {
            token: token.into(),
        }
    }

    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_tempo_message_names_beat() {
        let err = RevunkError::UnresolvedTempo {
            bpm: 0.0,
            beat_index: Some(33),
        };
        assert_eq!(err.to_string(), "Unresolved tempo 0 bpm at beat 33");

        let err = RevunkError::UnresolvedTempo {
            bpm: -5.0,
            beat_index: None,
        };
        assert_eq!(err.to_string(), "Unresolved tempo -5 bpm");
    }

    #[test]
    fn test_missing_field_message() {
        let err = RevunkError::missing_field("bpm");
        assert_eq!(err.to_string(), "Missing required field 'bpm'");
    }
}
