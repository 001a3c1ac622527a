//! Typed failures returned across the adapter boundary.

use crate::test_result::ErrorType;
use lms_gateway::{LmsSetupAttribute, LmsType};
use thiserror::Error;

/// Error returned by every fallible adapter operation.
///
/// Transport and parse failures never escape as raw errors; they are folded
/// into one of these variants at the adapter boundary.
#[derive(Debug, Error)]
pub enum LmsError {
    #[error("missing LMS setup attribute(s): {}", join_attributes(.0))]
    MissingAttribute(Vec<LmsSetupAttribute>),

    #[error(
        "failed to gain access token from {lms_type} API: tried token endpoints: {}",
        .attempted_paths.join(", ")
    )]
    TokenRequest {
        lms_type: LmsType,
        attempted_paths: Vec<String>,
    },

    #[error("quiz access API request failed: {0}")]
    QuizAccess(String),

    #[error("quiz restriction API request failed: {0}")]
    QuizRestriction(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("quiz not found: {0}")]
    QuizNotFound(String),

    #[error("examinee account not found: {0}")]
    AccountNotFound(String),

    #[error("LMS setup not found: {0}")]
    SetupNotFound(i64),

    #[error("LMS setup lookup failed: {0}")]
    SetupLookup(String),

    #[error("credential vault error: {0:#}")]
    Vault(anyhow::Error),
}

fn join_attributes(attributes: &[LmsSetupAttribute]) -> String {
    attributes
        .iter()
        .map(LmsSetupAttribute::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl LmsError {
    /// Connection-test classification of this error, where one applies.
    pub fn error_type(&self) -> Option<ErrorType> {
        match self {
            LmsError::MissingAttribute(_) => Some(ErrorType::MissingAttribute),
            LmsError::TokenRequest { .. } | LmsError::Vault(_) => Some(ErrorType::TokenRequest),
            LmsError::QuizAccess(_) => Some(ErrorType::QuizAccessApiRequest),
            LmsError::QuizRestriction(_) => Some(ErrorType::QuizRestrictionApiRequest),
            LmsError::InvalidRequest(_)
            | LmsError::QuizNotFound(_)
            | LmsError::AccountNotFound(_)
            | LmsError::SetupNotFound(_)
            | LmsError::SetupLookup(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_missing_attribute_display() {
        let err = LmsError::MissingAttribute(vec![
            LmsSetupAttribute::ApiUrl,
            LmsSetupAttribute::ClientSecret,
        ]);
        assert_eq!(
            err.to_string(),
            "missing LMS setup attribute(s): lmsUrl, lmsClientsecret"
        );
    }

    #[test]
    fn test_token_request_display_names_paths() {
        let err = LmsError::TokenRequest {
            lms_type: LmsType::OpenEdx,
            attempted_paths: vec!["/oauth2/access_token".to_string(), "/alt/token".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("OPENEDX"));
        assert!(message.contains("/oauth2/access_token, /alt/token"));
    }

    #[test]
    fn test_error_type_classification() {
        assert_eq!(
            LmsError::QuizRestriction("403".into()).error_type(),
            Some(ErrorType::QuizRestrictionApiRequest)
        );
        assert_eq!(
            LmsError::Vault(anyhow!("bad key")).error_type(),
            Some(ErrorType::TokenRequest)
        );
        assert_eq!(LmsError::QuizNotFound("x".into()).error_type(), None);
    }

    #[test]
    fn test_vault_error_keeps_context_chain() {
        let err = LmsError::Vault(anyhow!("inner").context("Failed to decrypt client secret"));
        assert_eq!(
            err.to_string(),
            "credential vault error: Failed to decrypt client secret: inner"
        );
    }
}
