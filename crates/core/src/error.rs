use thiserror::Error;

pub type OutreachResult<T> = Result<T, OutreachError>;

#[derive(Error, Debug)]
pub enum OutreachError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Other(#[from] anyhow::Error),
}

impl OutreachError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Stable machine-readable code used in API error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) | Self::Serialization(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Storage and serialization failures; their detail is not shown to callers.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Internal(_) | Self::Serialization(_) | Self::Other(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_taxonomy() {
        assert_eq!(OutreachError::validation("x").code(), "VALIDATION_ERROR");
        assert_eq!(OutreachError::not_found("x").code(), "NOT_FOUND");
        assert_eq!(OutreachError::conflict("x").code(), "CONFLICT");
        assert_eq!(
            OutreachError::Internal("disk".into()).code(),
            "INTERNAL_ERROR"
        );
        assert_eq!(
            OutreachError::from(anyhow::anyhow!("boom")).code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_internal_classification() {
        assert!(OutreachError::Internal("x".into()).is_internal());
        assert!(!OutreachError::conflict("x").is_internal());
        let err: OutreachError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.is_internal());
    }
}
