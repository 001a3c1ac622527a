pub mod api;
pub mod mapper;

use async_trait::async_trait;
use futures::future::join_all;
use lms_gateway::{LmsConfig, LmsType};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use self::api::inspect_response;
use self::mapper::{account_from_user, quiz_from_course};
use super::AdapterContext;
use crate::adapter::LmsApi;
use crate::error::LmsError;
use crate::fetcher::{map_items, QuizPageFetcher, TokenPlacement};
use crate::test_result::ConnectivityResult;
use crate::tester::ConnectionTester;
use crate::token::{TokenGrant, TokenManager};
use crate::types::{ExamineeAccountDetails, Page, QuizData, QuizQuery};

pub const DEFAULT_TOKEN_PATH: &str = "/login/token.php";
pub const REST_ENDPOINT: &str = "/webservice/rest/server.php";
pub const COURSE_START_URL_PREFIX: &str = "/course/view.php?id=";
pub const SITE_COURSE_ID: &str = "1";

const FUNCTION_GET_COURSES: &str = "core_course_get_courses";
const FUNCTION_GET_USERS: &str = "core_user_get_users_by_field";

/// Moodle adapter: web-service tokens and the REST protocol.
///
/// The course API has no paging, so filtering, sorting and paging happen
/// here.
pub struct MoodleAdapter {
    lms_setup: Arc<LmsConfig>,
    fetcher: QuizPageFetcher,
}

impl MoodleAdapter {
    pub fn new(lms_setup: Arc<LmsConfig>, context: &AdapterContext) -> Self {
        let tokens = TokenManager::new(
            Arc::clone(&lms_setup),
            TokenGrant::MoodleWebService {
                service: context.moodle.service.clone(),
            },
            DEFAULT_TOKEN_PATH,
            &context.moodle.alternative_token_paths,
            context.http_client.clone(),
            Arc::clone(&context.vault),
            Arc::clone(&context.token_store),
        );
        let fetcher = QuizPageFetcher::new(
            context.http_client.clone(),
            Arc::new(tokens),
            TokenPlacement::QueryParam("wstoken"),
        )
        .with_inspector(inspect_response);

        Self { lms_setup, fetcher }
    }

    /// Calls a web-service function and returns its JSON result.
    async fn call(&self, function: &str, args: &[(&str, String)]) -> Result<Value, LmsError> {
        let mut query: Vec<(&str, String)> = vec![
            ("wsfunction", function.to_string()),
            ("moodlewsrestformat", "json".to_string()),
        ];
        query.extend_from_slice(args);

        let body = self
            .fetcher
            .get_json(self.lms_setup.base_url(), REST_ENDPOINT, &query)
            .await?;
        Ok(body)
    }

    fn courses_of(&self, body: &Value, function: &str) -> Result<Vec<QuizData>, LmsError> {
        let items = body.as_array().ok_or_else(|| {
            LmsError::QuizAccess(format!("{} returned an unexpected response", function))
        })?;

        let base_url = self.lms_setup.base_url();
        Ok(map_items(items, |item| quiz_from_course(base_url, item))
            .into_iter()
            .flatten()
            .collect())
    }

    async fn fetch_quiz(&self, id: &str) -> Result<QuizData, LmsError> {
        let body = self
            .call(FUNCTION_GET_COURSES, &[("options[ids][0]", id.to_string())])
            .await?;

        self.courses_of(&body, FUNCTION_GET_COURSES)?
            .into_iter()
            .find(|quiz| quiz.id() == id)
            .ok_or_else(|| LmsError::QuizNotFound(id.to_string()))
    }
}

#[async_trait]
impl LmsApi for MoodleAdapter {
    fn lms_setup(&self) -> &LmsConfig {
        &self.lms_setup
    }

    fn lms_type(&self) -> LmsType {
        LmsType::Moodle
    }

    async fn test_connection(&self) -> ConnectivityResult {
        ConnectionTester::new(LmsType::Moodle, &self.lms_setup)
            .run(|| async move { self.fetcher.tokens().acquire_fresh().await.map(|_| ()) })
            .await
    }

    async fn fetch_quizzes(&self, query: &QuizQuery) -> Result<Page<QuizData>, LmsError> {
        query.validate()?;

        let body = self.call(FUNCTION_GET_COURSES, &[]).await?;
        let mut quizzes: Vec<QuizData> = self
            .courses_of(&body, FUNCTION_GET_COURSES)?
            .into_iter()
            .filter(|quiz| query.matches(quiz))
            .collect();
        query.sort_quizzes(&mut quizzes);

        debug!(
            lms_setup = self.lms_setup.id,
            matching = quizzes.len(),
            "Fetched Moodle courses"
        );

        Ok(Page::paginate(
            quizzes,
            query.page_number,
            query.page_size,
            query.sort.clone(),
        ))
    }

    async fn fetch_quizzes_by_ids(&self, ids: &BTreeSet<String>) -> Vec<Result<QuizData, LmsError>> {
        join_all(ids.iter().map(|id| self.fetch_quiz(id))).await
    }

    async fn fetch_examinee_account_details(
        &self,
        user_id: &str,
    ) -> Result<ExamineeAccountDetails, LmsError> {
        let body = self
            .call(
                FUNCTION_GET_USERS,
                &[("field", "id".to_string()), ("values[0]", user_id.to_string())],
            )
            .await?;

        let user = body
            .as_array()
            .and_then(|users| users.first())
            .ok_or_else(|| LmsError::AccountNotFound(user_id.to_string()))?;

        account_from_user(user)
            .map_err(|e| LmsError::QuizAccess(format!("malformed user response: {:#}", e)))
    }
}
