//! Concrete LMS backends and the closed set that dispatches to them.

pub mod mock;
pub mod moodle;
pub mod open_edx;

use crate::adapter::LmsApi;
use crate::error::LmsError;
use crate::test_result::ConnectivityResult;
use crate::types::{ExamineeAccountDetails, Page, QuizData, QuizQuery};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lms_gateway::config::{GatewayConfig, MoodleConfig, OpenEdxConfig};
use lms_gateway::credentials::{CredentialVault, TokenStore};
use lms_gateway::{LmsConfig, LmsType};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use self::mock::MockAdapter;
use self::moodle::MoodleAdapter;
use self::open_edx::OpenEdxAdapter;

/// Shared dependencies every adapter is built from.
#[derive(Clone)]
pub struct AdapterContext {
    pub http_client: reqwest::Client,
    /// Master vault holding the setups' client secrets
    pub vault: Arc<dyn CredentialVault>,
    pub token_store: Arc<dyn TokenStore>,
    pub open_edx: OpenEdxConfig,
    pub moodle: MoodleConfig,
}

impl AdapterContext {
    /// Builds the context, including an HTTP client with the configured
    /// timeouts and user agent.
    pub fn new(
        config: &GatewayConfig,
        vault: Arc<dyn CredentialVault>,
        token_store: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http.timeout())
            .connect_timeout(config.http.connect_timeout())
            .user_agent(config.http.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(http_client, config, vault, token_store))
    }

    /// Builds the context around an existing HTTP client.
    pub fn with_client(
        http_client: reqwest::Client,
        config: &GatewayConfig,
        vault: Arc<dyn CredentialVault>,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            http_client,
            vault,
            token_store,
            open_edx: config.open_edx.clone(),
            moodle: config.moodle.clone(),
        }
    }
}

/// An adapter for one LMS setup, selected by its [`LmsType`].
pub enum LmsAdapter {
    OpenEdx(OpenEdxAdapter),
    Moodle(MoodleAdapter),
    Mock(MockAdapter),
}

impl LmsAdapter {
    pub fn create(lms_setup: LmsConfig, context: &AdapterContext) -> Self {
        let lms_setup = Arc::new(lms_setup);
        match lms_setup.lms_type {
            LmsType::OpenEdx => LmsAdapter::OpenEdx(OpenEdxAdapter::new(lms_setup, context)),
            LmsType::Moodle => LmsAdapter::Moodle(MoodleAdapter::new(lms_setup, context)),
            LmsType::Mock => LmsAdapter::Mock(MockAdapter::new(lms_setup, Arc::clone(&context.vault))),
        }
    }

    fn api(&self) -> &dyn LmsApi {
        match self {
            LmsAdapter::OpenEdx(adapter) => adapter,
            LmsAdapter::Moodle(adapter) => adapter,
            LmsAdapter::Mock(adapter) => adapter,
        }
    }
}

#[async_trait]
impl LmsApi for LmsAdapter {
    fn lms_setup(&self) -> &LmsConfig {
        self.api().lms_setup()
    }

    fn lms_type(&self) -> LmsType {
        self.api().lms_type()
    }

    async fn test_connection(&self) -> ConnectivityResult {
        self.api().test_connection().await
    }

    async fn fetch_quizzes(&self, query: &QuizQuery) -> Result<Page<QuizData>, LmsError> {
        self.api().fetch_quizzes(query).await
    }

    async fn fetch_quizzes_by_ids(&self, ids: &BTreeSet<String>) -> Vec<Result<QuizData, LmsError>> {
        self.api().fetch_quizzes_by_ids(ids).await
    }

    async fn fetch_examinee_account_details(
        &self,
        user_id: &str,
    ) -> Result<ExamineeAccountDetails, LmsError> {
        self.api().fetch_examinee_account_details(user_id).await
    }
}

/// Accepts strings and numbers; anything else, and blank strings, become `None`.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts integers, floats (truncated) and numeric strings; anything else
/// becomes `None`.
pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate_float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate_float))
        }
        _ => None,
    })
}

fn truncate_float(value: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
    (value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64)
        .then_some(value.trunc() as i64)
}

/// Non-negative counterpart of [`lenient_i64`].
pub(crate) fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_i64(deserializer)?.and_then(|n| u64::try_from(n).ok()))
}

/// Values above `u32::MAX` become `None`.
pub(crate) fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_i64(deserializer)?.and_then(|n| u32::try_from(n).ok()))
}

/// Parses an RFC 3339 timestamp; malformed values become `None`.
pub(crate) fn parse_rfc3339(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Unix seconds to an instant; zero and negative values mean "not set".
pub(crate) fn from_unix_seconds(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds
        .filter(|s| *s > 0)
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
}

/// Scalar fields of an account object, stringified, minus the `known` ones.
pub(crate) fn scalar_attributes(object: &Map<String, Value>, known: &[&str]) -> BTreeMap<String, String> {
    object
        .iter()
        .filter(|(key, _)| !known.contains(&key.as_str()))
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), value))
        })
        .collect()
}
