use thiserror::Error;

/// Caller-facing failure kinds. Storage detail never travels inside these;
/// it is logged where the failure is mapped.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("item not found")]
    NotFound,
    #[error("internal error")]
    Internal,
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound => "The requested customer does not exist.",
            Self::Internal => "An unexpected internal error occurred.",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::ServiceError;

    #[test]
    fn codes_are_stable_labels() {
        assert_eq!(ServiceError::NotFound.code(), "not_found");
        assert_eq!(ServiceError::Internal.code(), "internal");
    }

    #[test]
    fn display_does_not_carry_storage_detail() {
        assert_eq!(ServiceError::NotFound.to_string(), "item not found");
        assert_eq!(ServiceError::Internal.to_string(), "internal error");
        assert_eq!(ServiceError::Internal.user_message(), "An unexpected internal error occurred.");
    }
}
