use crate::error::LmsError;
use crate::test_result::ConnectivityResult;
use crate::types::{ExamineeAccountDetails, Page, QuizData, QuizQuery};
use async_trait::async_trait;
use lms_gateway::{LmsConfig, LmsType};
use std::collections::BTreeSet;

/// Uniform contract every LMS backend implements.
///
/// Implementations are shared across tasks; calls may refresh the cached
/// access token and perform network I/O, and are safe to retry.
#[async_trait]
pub trait LmsApi: Send + Sync {
    /// The setup this adapter was built for.
    fn lms_setup(&self) -> &LmsConfig;

    /// Backend type this adapter speaks.
    fn lms_type(&self) -> LmsType;

    /// Staged connectivity self-test. Never fails; every problem is reported
    /// in the result.
    async fn test_connection(&self) -> ConnectivityResult;

    /// One page of quizzes matching `query`.
    async fn fetch_quizzes(&self, query: &QuizQuery) -> Result<Page<QuizData>, LmsError>;

    /// One result per requested id, in id order. A failing id does not fail
    /// the others.
    async fn fetch_quizzes_by_ids(&self, ids: &BTreeSet<String>) -> Vec<Result<QuizData, LmsError>>;

    async fn fetch_examinee_account_details(
        &self,
        user_id: &str,
    ) -> Result<ExamineeAccountDetails, LmsError>;
}
