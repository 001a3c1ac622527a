//! Staged connectivity self-test shared by all adapters.
//!
//! 1. the setup must belong to the adapter's backend type
//! 2. URL, client name and secret must be present (no network call)
//! 3. a fresh token must be obtainable
//!
//! Each stage short-circuits; the quiz listing is never exercised here.

use crate::error::LmsError;
use crate::test_result::ConnectivityResult;
use lms_gateway::{LmsConfig, LmsSetupAttribute, LmsType};
use std::future::Future;
use tracing::{info, warn};

pub struct ConnectionTester<'a> {
    expected_type: LmsType,
    lms_setup: &'a LmsConfig,
}

impl<'a> ConnectionTester<'a> {
    pub fn new(expected_type: LmsType, lms_setup: &'a LmsConfig) -> Self {
        Self {
            expected_type,
            lms_setup,
        }
    }

    /// Runs the offline stages.
    pub fn validate(&self) -> Result<(), LmsError> {
        if self.lms_setup.lms_type != self.expected_type {
            warn!(
                lms_setup = self.lms_setup.id,
                lms_type = %self.lms_setup.lms_type,
                expected = %self.expected_type,
                "LMS setup tested against an adapter of another type"
            );
            return Err(LmsError::MissingAttribute(vec![LmsSetupAttribute::LmsType]));
        }

        let missing = self.lms_setup.missing_attributes();
        if !missing.is_empty() {
            return Err(LmsError::MissingAttribute(missing));
        }

        Ok(())
    }

    /// Runs all stages. `acquire` performs the token stage and is only
    /// called when the offline stages pass.
    pub async fn run<F, Fut>(&self, acquire: F) -> ConnectivityResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), LmsError>>,
    {
        let outcome = match self.validate() {
            Ok(()) => acquire().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!(lms_setup = self.lms_setup.id, lms_type = %self.expected_type, "LMS connection test passed");
                ConnectivityResult::ok()
            }
            Err(e) => {
                info!(
                    lms_setup = self.lms_setup.id,
                    lms_type = %self.expected_type,
                    error = %e,
                    "LMS connection test failed"
                );
                ConnectivityResult::from(&e)
            }
        }
    }
}
