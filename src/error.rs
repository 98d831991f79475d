use thiserror::Error;

pub type Result<T> = std::result::Result<T, MatchError>;

#[derive(Error, Debug)]
pub enum MatchError {
    /// Malformed or missing schema on initial load; no session is created
    #[error("Validation error{}: {message}", location(.row, .field))]
    Validation {
        row: Option<usize>,
        field: Option<String>,
        message: String,
    },

    /// Bad external input for the current round; state is left untouched
    #[error("Invalid input: {0}")]
    RecoverableInput(String),

    /// The engine broke one of its own invariants; the session is aborted
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MatchError {
    pub fn validation(message: impl Into<String>) -> Self {
        MatchError::Validation {
            row: None,
            field: None,
            message: message.into(),
        }
    }

    pub fn validation_at(row: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        MatchError::Validation {
            row: Some(row),
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Whether the caller may retry the same round after fixing its input
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MatchError::RecoverableInput(_))
    }
}

fn location(row: &Option<usize>, field: &Option<String>) -> String {
    match (row, field) {
        (Some(row), Some(field)) => format!(" (row {}, column '{}')", row, field),
        (Some(row), None) => format!(" (row {})", row),
        (None, Some(field)) => format!(" (column '{}')", field),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_location() {
        let err = MatchError::validation_at(3, "importance", "not a number");
        assert_eq!(
            err.to_string(),
            "Validation error (row 3, column 'importance'): not a number"
        );
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_plain_validation_message() {
        let err = MatchError::validation("missing column 'entity'");
        assert_eq!(err.to_string(), "Validation error: missing column 'entity'");
    }

    #[test]
    fn test_recoverable_flag() {
        assert!(MatchError::RecoverableInput("bad token".into()).is_recoverable());
        assert!(!MatchError::InternalConsistency("x".into()).is_recoverable());
    }
}
