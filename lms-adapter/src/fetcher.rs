//! Authenticated JSON requests against an LMS REST API.
//!
//! Every call ensures a token first. A rejected token is discarded and the
//! request is retried once with a newly acquired token; there is no further
//! retry.

use crate::error::LmsError;
use crate::token::{AccessToken, TokenManager};
use anyhow::{anyhow, Context};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Where the access token goes on a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenPlacement {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// Query parameter with the given name (Moodle `wstoken`)
    QueryParam(&'static str),
}

/// Backend error signaled inside a successful response body.
#[derive(Debug, PartialEq, Eq)]
pub enum UpstreamFault {
    TokenRejected,
    Restricted(String),
    Failed(String),
}

/// Inspects a parsed body for a backend-specific error envelope.
pub type FaultInspector = fn(&Value) -> Option<UpstreamFault>;

/// Failure of a single fetch, before it is folded into [`LmsError`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Token(LmsError),

    #[error("{0} answered 404 Not Found")]
    NotFound(String),

    #[error("{0}")]
    Restricted(String),

    #[error("{0:#}")]
    Failed(anyhow::Error),
}

impl From<FetchError> for LmsError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::Token(e) => e,
            FetchError::Restricted(message) => LmsError::QuizRestriction(message),
            other @ (FetchError::NotFound(_) | FetchError::Failed(_)) => {
                LmsError::QuizAccess(other.to_string())
            }
        }
    }
}

enum Attempt {
    Body(Value),
    Rejected,
}

/// Issues authenticated GET requests and returns the parsed JSON body.
pub struct QuizPageFetcher {
    http_client: reqwest::Client,
    tokens: Arc<TokenManager>,
    placement: TokenPlacement,
    inspector: Option<FaultInspector>,
}

impl QuizPageFetcher {
    pub fn new(
        http_client: reqwest::Client,
        tokens: Arc<TokenManager>,
        placement: TokenPlacement,
    ) -> Self {
        Self {
            http_client,
            tokens,
            placement,
            inspector: None,
        }
    }

    pub fn with_inspector(mut self, inspector: FaultInspector) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// GETs `base_url + path` with `query` and returns the JSON body.
    ///
    /// `path` is what appears in logs and error messages; the full URL is
    /// never logged since it can carry the token.
    pub async fn get_json(
        &self,
        base_url: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, FetchError> {
        let token = self.tokens.ensure_token().await.map_err(FetchError::Token)?;

        match self.attempt(base_url, path, query, &token).await? {
            Attempt::Body(body) => Ok(body),
            Attempt::Rejected => {
                self.tokens.invalidate(&token);
                let token = self.tokens.ensure_token().await.map_err(FetchError::Token)?;
                match self.attempt(base_url, path, query, &token).await? {
                    Attempt::Body(body) => Ok(body),
                    Attempt::Rejected => {
                        self.tokens.invalidate(&token);
                        Err(FetchError::Failed(anyhow!(
                            "{} rejected a newly acquired access token",
                            path
                        )))
                    }
                }
            }
        }
    }

    async fn attempt(
        &self,
        base_url: &str,
        path: &str,
        query: &[(&str, String)],
        token: &AccessToken,
    ) -> Result<Attempt, FetchError> {
        let url = format!("{}{}", base_url, path);
        let mut request = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .query(query);
        request = match self.placement {
            TokenPlacement::Bearer => request.bearer_auth(token.value()),
            TokenPlacement::QueryParam(name) => request.query(&[(name, token.value())]),
        };

        debug!(path = %path, "Sending LMS API request");

        let response = request.send().await.map_err(|e| {
            FetchError::Failed(anyhow!("Failed to send request to {}: {}", path, e.without_url()))
        })?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Ok(Attempt::Rejected),
            StatusCode::FORBIDDEN => {
                return Err(FetchError::Restricted(format!(
                    "{} answered 403 Forbidden",
                    path
                )))
            }
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound(path.to_string())),
            s if !s.is_success() => {
                return Err(FetchError::Failed(anyhow!("{} answered {}", path, s)));
            }
            _ => {}
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| anyhow!("{}", e.without_url()))
            .with_context(|| format!("Failed to parse response of {}", path))
            .map_err(FetchError::Failed)?;

        match self.inspector.and_then(|inspect| inspect(&body)) {
            None => Ok(Attempt::Body(body)),
            Some(UpstreamFault::TokenRejected) => Ok(Attempt::Rejected),
            Some(UpstreamFault::Restricted(message)) => {
                warn!(path = %path, message = %message, "LMS restricted API access");
                Err(FetchError::Restricted(message))
            }
            Some(UpstreamFault::Failed(message)) => Err(FetchError::Failed(anyhow!(
                "{} reported an error: {}",
                path,
                message
            ))),
        }
    }
}

/// Splits a JSON array into the items that deserialize as `T`.
///
/// Malformed items are logged and skipped so one bad entry does not fail a
/// whole page.
pub fn map_items<T, F>(items: &[Value], mut map: F) -> Vec<T>
where
    F: FnMut(&Value) -> anyhow::Result<T>,
{
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match map(item) {
            Ok(mapped) => Some(mapped),
            Err(e) => {
                warn!(index = index, error = %format!("{:#}", e), "Skipping malformed LMS item");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{TokenGrant, TokenStatus};
    use lms_gateway::credentials::{AesGcmVault, CredentialVault, MemoryTokenStore};
    use lms_gateway::{LmsConfig, LmsType};
    use mockito::{Matcher, Mock, Server, ServerGuard};

    async fn token_mock(server: &mut ServerGuard, body: &str, hits: usize) -> Mock {
        server
            .mock("POST", "/oauth2/access_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    fn fetcher(url: &str, placement: TokenPlacement) -> QuizPageFetcher {
        let vault = Arc::new(AesGcmVault::new([5u8; 32]));
        let setup = Arc::new(LmsConfig {
            id: 2,
            institution_id: 1,
            name: "test".to_string(),
            lms_type: LmsType::OpenEdx,
            api_url: url.to_string(),
            client_name: "client".to_string(),
            client_secret: vault.encrypt("secret").unwrap(),
            active: true,
        });
        let tokens = Arc::new(TokenManager::new(
            setup,
            TokenGrant::ClientCredentials,
            "/oauth2/access_token",
            &[],
            reqwest::Client::new(),
            vault,
            Arc::new(MemoryTokenStore::new()),
        ));
        QuizPageFetcher::new(reqwest::Client::new(), tokens, placement)
    }

    #[tokio::test]
    async fn test_bearer_request() {
        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server, r#"{"access_token": "abc"}"#, 1).await;
        let api = server
            .mock("GET", "/api/items")
            .match_header("authorization", "Bearer abc")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results": []}"#)
            .create_async()
            .await;

        let fetcher = fetcher(&server.url(), TokenPlacement::Bearer);
        let body = fetcher
            .get_json(&server.url(), "/api/items", &[("page", "2".to_string())])
            .await
            .unwrap();
        assert!(body["results"].is_array());
        api.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_param_token() {
        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server, r#"{"access_token": "qtok"}"#, 1).await;
        let api = server
            .mock("GET", "/rest")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("wstoken".into(), "qtok".into()),
                Matcher::UrlEncoded("wsfunction".into(), "f".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let fetcher = fetcher(&server.url(), TokenPlacement::QueryParam("wstoken"));
        fetcher
            .get_json(&server.url(), "/rest", &[("wsfunction", "f".to_string())])
            .await
            .unwrap();
        api.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_reacquires_once_and_retries() {
        let mut server = Server::new_async().await;
        let token = token_mock(&mut server, r#"{"access_token": "tok"}"#, 2).await;
        let rejected = server
            .mock("GET", "/api/items")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;

        let fetcher = fetcher(&server.url(), TokenPlacement::Bearer);
        let err = fetcher.get_json(&server.url(), "/api/items", &[]).await.unwrap_err();
        assert!(matches!(err, FetchError::Failed(_)));
        assert_eq!(fetcher.tokens().status(), TokenStatus::Rejected);

        token.assert_async().await;
        rejected.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server, r#"{"access_token": "tok"}"#, 1).await;
        let _forbidden = server
            .mock("GET", "/forbidden")
            .with_status(403)
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;
        let _broken = server
            .mock("GET", "/broken")
            .with_status(500)
            .create_async()
            .await;
        let _garbage = server
            .mock("GET", "/garbage")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let fetcher = fetcher(&server.url(), TokenPlacement::Bearer);
        let url = server.url();

        let err = fetcher.get_json(&url, "/forbidden", &[]).await.unwrap_err();
        assert!(matches!(LmsError::from(err), LmsError::QuizRestriction(_)));

        let err = fetcher.get_json(&url, "/missing", &[]).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(ref p) if p == "/missing"));

        let err = fetcher.get_json(&url, "/broken", &[]).await.unwrap_err();
        let err = LmsError::from(err);
        assert!(matches!(err, LmsError::QuizAccess(_)));
        assert!(err.to_string().contains("500"));

        let err = fetcher.get_json(&url, "/garbage", &[]).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse response of /garbage"));
    }

    #[tokio::test]
    async fn test_token_failure_passes_through() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/oauth2/access_token")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = fetcher(&server.url(), TokenPlacement::Bearer);
        let err = fetcher.get_json(&server.url(), "/api", &[]).await.unwrap_err();
        assert!(matches!(
            LmsError::from(err),
            LmsError::TokenRequest { .. }
        ));
    }

    #[tokio::test]
    async fn test_inspector_faults() {
        fn inspect(body: &Value) -> Option<UpstreamFault> {
            match body["errorcode"].as_str()? {
                "invalidtoken" => Some(UpstreamFault::TokenRejected),
                "nopermissions" => Some(UpstreamFault::Restricted("no permission".into())),
                other => Some(UpstreamFault::Failed(other.to_string())),
            }
        }

        let mut server = Server::new_async().await;
        let _token = token_mock(&mut server, r#"{"access_token": "tok"}"#, 1).await;
        let _restricted = server
            .mock("GET", "/restricted")
            .with_status(200)
            .with_body(r#"{"exception": "x", "errorcode": "nopermissions"}"#)
            .create_async()
            .await;
        let _ok = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body(r#"[{"id": 1}]"#)
            .create_async()
            .await;

        let fetcher = fetcher(&server.url(), TokenPlacement::Bearer).with_inspector(inspect);
        let url = server.url();

        let err = fetcher.get_json(&url, "/restricted", &[]).await.unwrap_err();
        assert!(matches!(err, FetchError::Restricted(_)));

        let body = fetcher.get_json(&url, "/ok", &[]).await.unwrap();
        assert_eq!(body[0]["id"], 1);
    }

    #[test]
    fn test_map_items_skips_malformed() {
        let items: Vec<Value> = serde_json::from_str(r#"[{"id": "a"}, {"name": "no id"}, {"id": "b"}]"#).unwrap();
        let ids = map_items(&items, |item| {
            item["id"]
                .as_str()
                .map(str::to_string)
                .context("missing id")
        });
        assert_eq!(ids, vec!["a", "b"]);
    }
}
