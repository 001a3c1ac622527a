pub mod api;
pub mod mapper;

use async_trait::async_trait;
use futures::future::join_all;
use lms_gateway::{LmsConfig, LmsType};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use self::api::EdxPage;
use self::mapper::{account_from_value, quiz_from_course};
use super::AdapterContext;
use crate::adapter::LmsApi;
use crate::error::LmsError;
use crate::fetcher::{map_items, FetchError, QuizPageFetcher, TokenPlacement};
use crate::test_result::ConnectivityResult;
use crate::tester::ConnectionTester;
use crate::token::{TokenGrant, TokenManager};
use crate::types::{ExamineeAccountDetails, Page, QuizData, QuizQuery};

pub const DEFAULT_TOKEN_PATH: &str = "/oauth2/access_token";
pub const COURSES_ENDPOINT: &str = "/api/courses/v1/courses/";
pub const ACCOUNTS_ENDPOINT: &str = "/api/user/v1/accounts/";
pub const COURSE_START_URL_PREFIX: &str = "/courses/";

/// Open edX adapter: OAuth2 client credentials and the course catalogue
/// REST API.
pub struct OpenEdxAdapter {
    lms_setup: Arc<LmsConfig>,
    fetcher: QuizPageFetcher,
}

impl OpenEdxAdapter {
    pub fn new(lms_setup: Arc<LmsConfig>, context: &AdapterContext) -> Self {
        let tokens = TokenManager::new(
            Arc::clone(&lms_setup),
            TokenGrant::ClientCredentials,
            DEFAULT_TOKEN_PATH,
            &context.open_edx.alternative_token_paths,
            context.http_client.clone(),
            Arc::clone(&context.vault),
            Arc::clone(&context.token_store),
        );
        let fetcher = QuizPageFetcher::new(
            context.http_client.clone(),
            Arc::new(tokens),
            TokenPlacement::Bearer,
        );

        Self { lms_setup, fetcher }
    }

    async fn fetch_quiz(&self, id: &str) -> Result<QuizData, LmsError> {
        let path = format!("{}{}/", COURSES_ENDPOINT, urlencoding::encode(id));
        let body = self
            .fetcher
            .get_json(self.lms_setup.base_url(), &path, &[])
            .await
            .map_err(|e| match e {
                FetchError::NotFound(_) => LmsError::QuizNotFound(id.to_string()),
                other => other.into(),
            })?;

        quiz_from_course(self.lms_setup.base_url(), &body)
            .map_err(|e| LmsError::QuizAccess(format!("malformed course {}: {:#}", id, e)))
    }
}

#[async_trait]
impl LmsApi for OpenEdxAdapter {
    fn lms_setup(&self) -> &LmsConfig {
        &self.lms_setup
    }

    fn lms_type(&self) -> LmsType {
        LmsType::OpenEdx
    }

    async fn test_connection(&self) -> ConnectivityResult {
        ConnectionTester::new(LmsType::OpenEdx, &self.lms_setup)
            .run(|| async move { self.fetcher.tokens().acquire_fresh().await.map(|_| ()) })
            .await
    }

    async fn fetch_quizzes(&self, query: &QuizQuery) -> Result<Page<QuizData>, LmsError> {
        query.validate()?;

        // Open edX pages are 1-based
        let upstream_page = query.page_number.checked_add(1).ok_or_else(|| {
            LmsError::InvalidRequest(format!("page number {} is out of range", query.page_number))
        })?;
        let params = [
            ("page", upstream_page.to_string()),
            ("page_size", query.page_size.to_string()),
        ];
        let body = match self
            .fetcher
            .get_json(self.lms_setup.base_url(), COURSES_ENDPOINT, &params)
            .await
        {
            Ok(body) => body,
            // Open edX answers "Invalid page." past the last page
            Err(FetchError::NotFound(_)) if query.page_number > 0 => {
                debug!(
                    lms_setup = self.lms_setup.id,
                    page_number = query.page_number,
                    "Open edX course page past the end"
                );
                return Ok(Page::new(query.page_number, query.page_number, query.sort.clone(), Vec::new()));
            }
            Err(e) => return Err(e.into()),
        };

        let page: EdxPage = serde_json::from_value(body).map_err(|e| {
            LmsError::QuizAccess(format!("unexpected course list response: {}", e))
        })?;

        let base_url = self.lms_setup.base_url();
        let content: Vec<QuizData> = map_items(&page.results, |item| quiz_from_course(base_url, item))
            .into_iter()
            .filter(|quiz| query.matches(quiz))
            .collect();

        let number_of_pages = page
            .num_pages
            .or_else(|| {
                page.count
                    .map(|count| count.div_ceil(u64::from(query.page_size)))
                    .and_then(|pages| u32::try_from(pages).ok())
            })
            .unwrap_or(1)
            .max(1);

        debug!(
            lms_setup = self.lms_setup.id,
            page_number = query.page_number,
            items = content.len(),
            "Fetched Open edX course page"
        );

        Ok(Page::new(number_of_pages, query.page_number, query.sort.clone(), content))
    }

    async fn fetch_quizzes_by_ids(&self, ids: &BTreeSet<String>) -> Vec<Result<QuizData, LmsError>> {
        join_all(ids.iter().map(|id| self.fetch_quiz(id))).await
    }

    async fn fetch_examinee_account_details(
        &self,
        user_id: &str,
    ) -> Result<ExamineeAccountDetails, LmsError> {
        let path = format!("{}{}", ACCOUNTS_ENDPOINT, urlencoding::encode(user_id));
        let body = self
            .fetcher
            .get_json(self.lms_setup.base_url(), &path, &[])
            .await
            .map_err(|e| match e {
                FetchError::NotFound(_) => LmsError::AccountNotFound(user_id.to_string()),
                other => other.into(),
            })?;

        account_from_value(user_id, &body).map_err(|e| {
            warn!(lms_setup = self.lms_setup.id, error = %e, "Unexpected Open edX account response");
            LmsError::QuizAccess(format!("malformed account response: {:#}", e))
        })
    }
}
