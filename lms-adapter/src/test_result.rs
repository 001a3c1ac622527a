//! Outcome of an LMS connection test.

use crate::error::LmsError;
use lms_gateway::LmsSetupAttribute;
use serde::{Deserialize, Serialize};

/// Classification of a connection problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// Setup incomplete, or pointing at the wrong adapter
    MissingAttribute,
    /// No candidate endpoint yielded a usable token
    TokenRequest,
    /// Authenticated, but the listing call failed
    QuizAccessApiRequest,
    /// Listing reachable, but scope or permissions restrict results
    QuizRestrictionApiRequest,
}

/// A single classified connection problem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestError {
    #[serde(rename = "errorType")]
    pub error_type: ErrorType,
    #[serde(rename = "errorMessage")]
    pub message: String,
}

impl TestError {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
        }
    }
}

/// Result of [`LmsApi::test_connection`](crate::LmsApi::test_connection).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityResult {
    errors: Vec<TestError>,
    #[serde(rename = "missingLMSSetupAttribute")]
    missing_attributes: Vec<LmsSetupAttribute>,
}

impl ConnectivityResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn of_missing_attributes(attributes: Vec<LmsSetupAttribute>) -> Self {
        Self {
            errors: vec![TestError::new(
                ErrorType::MissingAttribute,
                "missing attribute(s)",
            )],
            missing_attributes: attributes,
        }
    }

    pub fn of_token_request_error(message: impl Into<String>) -> Self {
        Self::of_error(TestError::new(ErrorType::TokenRequest, message))
    }

    pub fn of_quiz_access_error(message: impl Into<String>) -> Self {
        Self::of_error(TestError::new(ErrorType::QuizAccessApiRequest, message))
    }

    pub fn of_quiz_restriction_error(message: impl Into<String>) -> Self {
        Self::of_error(TestError::new(ErrorType::QuizRestrictionApiRequest, message))
    }

    fn of_error(error: TestError) -> Self {
        Self {
            errors: vec![error],
            missing_attributes: Vec::new(),
        }
    }

    /// Attaches a failure revealed by a later listing call.
    ///
    /// Only quiz access and restriction errors are attached; anything else
    /// leaves the result unchanged.
    pub fn attach_listing_error(mut self, error: &LmsError) -> Self {
        if let Some(
            error_type @ (ErrorType::QuizAccessApiRequest | ErrorType::QuizRestrictionApiRequest),
        ) = error.error_type()
        {
            if !self.has_error(error_type) {
                self.errors.push(TestError::new(error_type, error.to_string()));
            }
        }
        self
    }

    pub fn errors(&self) -> &[TestError] {
        &self.errors
    }

    pub fn missing_attributes(&self) -> &[LmsSetupAttribute] {
        &self.missing_attributes
    }

    /// True iff no error was recorded.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// True if ok, or if the only error is a quiz restriction.
    pub fn is_quiz_access_ok(&self) -> bool {
        self.is_ok()
            || self
                .errors
                .iter()
                .all(|e| e.error_type == ErrorType::QuizRestrictionApiRequest)
    }

    pub fn has_error(&self, error_type: ErrorType) -> bool {
        self.errors.iter().any(|e| e.error_type == error_type)
    }
}

impl From<&LmsError> for ConnectivityResult {
    /// Classifies an error raised while testing. Errors without a
    /// classification count as token request failures.
    fn from(error: &LmsError) -> Self {
        match error {
            LmsError::MissingAttribute(attributes) => {
                Self::of_missing_attributes(attributes.clone())
            }
            other => Self::of_error(TestError::new(
                other.error_type().unwrap_or(ErrorType::TokenRequest),
                other.to_string(),
            )),
        }
    }
}
