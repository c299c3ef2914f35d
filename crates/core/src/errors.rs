use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes surfaced to the reasoning loop as data.
///
/// `Auth` and `UnknownOperation` are structural (they end the turn); the
/// rest are business failures the reasoning function may act on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Auth,
    NotFound,
    Validation,
    RateLimited,
    Transient,
    UnknownOperation,
}

/// Errors produced by the Zoho Projects client and the token store.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("backend authentication failed: {0}")]
    Auth(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("invalid value for `{field}`: {message}")]
    Validation { field: String, message: String },
    #[error("backend rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("transient backend failure: {0}")]
    Transient(String),
}

impl ApiError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Auth(_) => FailureKind::Auth,
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Validation { .. } => FailureKind::Validation,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Transient(_) => FailureKind::Transient,
        }
    }

    /// Recoverable failures are fed back to the reasoning function; the
    /// rest terminate the turn.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Auth(_))
    }
}

/// Structural failures of a full orchestrator turn.
///
/// Business-level operation failures never become a `TurnError`; they loop
/// back through the reasoning function as tool data.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("backend credentials are invalid or unrefreshable")]
    Auth,
    #[error("reasoning function requested unknown operation `{0}`")]
    UnknownOperation(String),
    #[error("reasoning function call failed: {0}")]
    Llm(String),
    #[error("turn exceeded the iteration limit")]
    IterationLimit { summary: String },
}

impl TurnError {
    /// Chat-safe rendering. Never includes credentials, backend payloads,
    /// or internal identifiers.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth => "I couldn't authenticate with Zoho Projects. \
                 Please ask an administrator to check the bot's credentials."
                .to_string(),
            Self::UnknownOperation(_) | Self::Llm(_) => {
                "Sorry, something went wrong while handling that request. \
                 Please try rephrasing it."
                    .to_string()
            }
            Self::IterationLimit { summary } => summary.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiError, FailureKind, TurnError};

    #[test]
    fn auth_is_the_only_unrecoverable_api_error() {
        let errors = [
            ApiError::Auth("refresh rejected".into()),
            ApiError::NotFound("project 42".into()),
            ApiError::Validation { field: "name".into(), message: "missing".into() },
            ApiError::RateLimited { retry_after_secs: Some(30) },
            ApiError::Transient("timeout".into()),
        ];

        let recoverable: Vec<bool> = errors.iter().map(ApiError::is_recoverable).collect();
        assert_eq!(recoverable, vec![false, true, true, true, true]);
    }

    #[test]
    fn kinds_match_variants() {
        assert_eq!(ApiError::Auth("x".into()).kind(), FailureKind::Auth);
        assert_eq!(
            ApiError::RateLimited { retry_after_secs: None }.kind(),
            FailureKind::RateLimited
        );
    }

    #[test]
    fn user_messages_never_leak_internals() {
        let auth = TurnError::Auth.user_message();
        assert!(auth.contains("administrator"));

        let unknown = TurnError::UnknownOperation("drop_all_tables".into()).user_message();
        assert!(!unknown.contains("drop_all_tables"));

        let llm = TurnError::Llm("api key sk-secret rejected".into()).user_message();
        assert!(!llm.contains("sk-secret"));
    }

    #[test]
    fn iteration_limit_surfaces_the_partial_summary() {
        let error = TurnError::IterationLimit {
            summary: "I ran 3 operations but could not finish.".into(),
        };
        assert_eq!(error.user_message(), "I ran 3 operations but could not finish.");
    }
}
