use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureReason {
    InvalidCredentials,
    Network,
    ServerError,
    /// Rejected before any request was sent
    InvalidInput,
    NotAuthenticated,
}

/// A recoverable authentication failure, surfaced to the view that
/// triggered it. `message` is meant to be shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AuthFailure {
    pub reason: AuthFailureReason,
    pub message: String,
}

impl AuthFailure {
    pub fn new(reason: AuthFailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(AuthFailureReason::InvalidInput, message)
    }

    pub fn not_authenticated() -> Self {
        Self::new(AuthFailureReason::NotAuthenticated, "Not signed in")
    }
}

impl From<ApiError> for AuthFailure {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => Self::new(
                AuthFailureReason::InvalidCredentials,
                "Invalid username or password, or the session has expired",
            ),
            ApiError::AccessDenied(msg) => Self::new(AuthFailureReason::InvalidCredentials, msg),
            ApiError::BadRequest(msg) => Self::new(AuthFailureReason::InvalidInput, msg),
            ApiError::Network(e) => Self::new(
                AuthFailureReason::Network,
                format!("Could not reach the server: {}", e),
            ),
            other => Self::new(AuthFailureReason::ServerError, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            AuthFailure::from(ApiError::Unauthorized).reason,
            AuthFailureReason::InvalidCredentials
        );
        let f = AuthFailure::from(ApiError::BadRequest("Old password is incorrect".into()));
        assert_eq!(f.reason, AuthFailureReason::InvalidInput);
        assert_eq!(f.to_string(), "Old password is incorrect");
        assert_eq!(
            AuthFailure::from(ApiError::ServerError("boom".into())).reason,
            AuthFailureReason::ServerError
        );
        assert_eq!(
            AuthFailure::from(ApiError::InvalidResponse("bad json".into())).reason,
            AuthFailureReason::ServerError
        );
    }
}
