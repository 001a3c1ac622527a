//! Offline backend serving a fixed demo catalogue.
//!
//! Accepts only the demo credentials; everything else fails the same way a
//! real token request would.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lms_gateway::credentials::CredentialVault;
use lms_gateway::{LmsConfig, LmsType};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use crate::adapter::LmsApi;
use crate::error::LmsError;
use crate::test_result::ConnectivityResult;
use crate::tester::ConnectionTester;
use crate::types::{ExamineeAccountDetails, Page, QuizData, QuizQuery};

pub const MOCK_CLIENT_NAME: &str = "lmsMockupClientId";
pub const MOCK_CLIENT_SECRET: &str = "lmsMockupSecret";
pub const MOCK_TOKEN_PATH: &str = "/mock/oauth2/token";
pub const QUIZ_START_URL_PREFIX: &str = "/quiz/";

/// (id, name, description, start, end) as `(y, m, d, h)` tuples
type CatalogueEntry = (
    &'static str,
    &'static str,
    &'static str,
    (i32, u32, u32, u32),
    Option<(i32, u32, u32, u32)>,
);

const CATALOGUE: &[CatalogueEntry] = &[
    ("quiz1", "Demo Quiz 1", "Demo Quiz Mockup", (2020, 1, 1, 9), Some((2021, 1, 1, 9))),
    ("quiz2", "Demo Quiz 2", "Demo Quiz Mockup", (2020, 1, 1, 9), Some((2025, 1, 1, 9))),
    ("quiz3", "Demo Quiz 3", "Demo Quiz Mockup", (2018, 7, 30, 9), Some((2018, 8, 1, 0))),
    ("quiz4", "Demo Quiz 4", "Demo Quiz Mockup", (2018, 1, 1, 0), Some((2025, 1, 1, 0))),
    ("quiz5", "Demo Quiz 5", "Demo Quiz Mockup", (2018, 1, 1, 9), Some((2026, 12, 31, 9))),
    ("quiz6", "Demo Quiz 6", "Demo Quiz Mockup", (2019, 1, 1, 9), None),
    ("quiz7", "Demo Quiz 7", "Demo Quiz Mockup", (2026, 1, 1, 9), Some((2027, 1, 1, 9))),
];

fn instant((year, month, day, hour): (i32, u32, u32, u32)) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).single()
}

pub struct MockAdapter {
    lms_setup: Arc<LmsConfig>,
    vault: Arc<dyn CredentialVault>,
    quizzes: Vec<QuizData>,
}

impl MockAdapter {
    pub fn new(lms_setup: Arc<LmsConfig>, vault: Arc<dyn CredentialVault>) -> Self {
        let base_url = lms_setup.base_url();
        let quizzes = CATALOGUE
            .iter()
            .map(|(id, name, description, start, end)| {
                QuizData::new(
                    id.to_string(),
                    name.to_string(),
                    Some(description.to_string()),
                    instant(*start),
                    end.and_then(instant),
                    format!("{}{}{}", base_url, QUIZ_START_URL_PREFIX, id),
                )
            })
            .collect();

        Self {
            lms_setup,
            vault,
            quizzes,
        }
    }

    /// Stands in for the token request.
    fn authenticate(&self) -> Result<(), LmsError> {
        let secret = self
            .vault
            .decrypt(&self.lms_setup.client_secret)
            .map_err(|e| LmsError::Vault(e.context("Failed to decrypt client secret")))?;

        if self.lms_setup.client_name == MOCK_CLIENT_NAME && secret == MOCK_CLIENT_SECRET {
            return Ok(());
        }

        debug!(lms_setup = self.lms_setup.id, "Mock LMS refused credentials");
        Err(LmsError::TokenRequest {
            lms_type: LmsType::Mock,
            attempted_paths: vec![MOCK_TOKEN_PATH.to_string()],
        })
    }
}

#[async_trait]
impl LmsApi for MockAdapter {
    fn lms_setup(&self) -> &LmsConfig {
        &self.lms_setup
    }

    fn lms_type(&self) -> LmsType {
        LmsType::Mock
    }

    async fn test_connection(&self) -> ConnectivityResult {
        ConnectionTester::new(LmsType::Mock, &self.lms_setup)
            .run(|| async move { self.authenticate() })
            .await
    }

    async fn fetch_quizzes(&self, query: &QuizQuery) -> Result<Page<QuizData>, LmsError> {
        query.validate()?;
        self.authenticate()?;

        let mut quizzes: Vec<QuizData> = self
            .quizzes
            .iter()
            .filter(|quiz| query.matches(quiz))
            .cloned()
            .collect();
        query.sort_quizzes(&mut quizzes);

        Ok(Page::paginate(
            quizzes,
            query.page_number,
            query.page_size,
            query.sort.clone(),
        ))
    }

    async fn fetch_quizzes_by_ids(&self, ids: &BTreeSet<String>) -> Vec<Result<QuizData, LmsError>> {
        let authenticated = self.authenticate();
        ids.iter()
            .map(|id| match &authenticated {
                Err(LmsError::TokenRequest {
                    lms_type,
                    attempted_paths,
                }) => Err(LmsError::TokenRequest {
                    lms_type: *lms_type,
                    attempted_paths: attempted_paths.clone(),
                }),
                Err(LmsError::Vault(e)) => Err(LmsError::Vault(anyhow!("{:#}", e))),
                Err(e) => Err(LmsError::QuizAccess(e.to_string())),
                Ok(()) => self
                    .quizzes
                    .iter()
                    .find(|quiz| quiz.id() == id)
                    .cloned()
                    .ok_or_else(|| LmsError::QuizNotFound(id.clone())),
            })
            .collect()
    }

    async fn fetch_examinee_account_details(
        &self,
        user_id: &str,
    ) -> Result<ExamineeAccountDetails, LmsError> {
        self.authenticate()?;

        Ok(ExamineeAccountDetails {
            id: user_id.to_string(),
            name: format!("Mock Examinee {}", user_id),
            username: user_id.to_string(),
            email: None,
            attributes: BTreeMap::from([("source".to_string(), "mock".to_string())]),
        })
    }
}
