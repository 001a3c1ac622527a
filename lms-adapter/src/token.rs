//! Access token acquisition and reuse for one LMS setup.
//!
//! # State machine
//!
//! ```text
//! NoToken ──acquire──▶ Valid ──expiry──▶ Expired ──acquire──▶ Valid
//!                        │
//!                        └──401──▶ Rejected ──acquire──▶ Valid
//! ```
//!
//! State is only written once an acquisition has completed, so a failed or
//! abandoned request leaves the previous non-valid state in place.
//!
//! Acquisition order:
//! 1. valid in-memory token
//! 2. persisted token from the [`TokenStore`], decrypted with the setup-scoped vault
//! 3. token request against each candidate path in order, first success wins

use crate::adapters::lenient_i64;
use crate::error::LmsError;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use lms_gateway::credentials::{AesGcmVault, CredentialVault, StoredToken, TokenStore};
use lms_gateway::LmsConfig;
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Tokens this close to their expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Bearer credential issued by an LMS.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Tokens without a reported expiry never expire locally; the LMS
    /// rejecting them is discovered on use.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at <= Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS))
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// How a token is requested from a candidate endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenGrant {
    /// OAuth2 `grant_type=client_credentials` with client id and secret.
    ClientCredentials,
    /// Moodle web-service token: user name, password and service name.
    MoodleWebService { service: String },
}

/// Observable token state, without the token itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
    NoToken,
    Valid,
    Expired,
    Rejected,
}

enum TokenState {
    NoToken,
    Valid(AccessToken),
    Expired,
    Rejected,
}

/// Standard OAuth 2.0 token response
#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    expires_in: Option<i64>,
}

/// Expiry instant for an `expires_in` lifetime; `None` when it cannot be
/// represented, which leaves the token without a local expiry.
fn expiry_after(seconds: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(seconds).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}

/// Moodle `login/token.php` response
#[derive(Deserialize)]
struct MoodleTokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errorcode: Option<String>,
}

/// Owns the access token of one LMS setup.
///
/// Shared by all concurrent calls on an adapter. The state lock is held only
/// for reads and writes of the state; the acquisition gate serializes token
/// requests so concurrent callers never acquire at the same time.
pub struct TokenManager {
    lms_setup: Arc<LmsConfig>,
    grant: TokenGrant,
    token_paths: Vec<String>,
    http_client: reqwest::Client,
    vault: Arc<dyn CredentialVault>,
    token_store: Arc<dyn TokenStore>,
    state: Mutex<TokenState>,
    acquire_gate: tokio::sync::Mutex<()>,
}

impl TokenManager {
    /// Creates a token manager.
    ///
    /// Candidate paths are the default path followed by the alternatives, in
    /// order, without blanks or duplicates.
    pub fn new(
        lms_setup: Arc<LmsConfig>,
        grant: TokenGrant,
        default_path: &str,
        alternative_paths: &[String],
        http_client: reqwest::Client,
        vault: Arc<dyn CredentialVault>,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        let mut token_paths: Vec<String> = Vec::with_capacity(alternative_paths.len() + 1);
        for path in std::iter::once(default_path).chain(alternative_paths.iter().map(String::as_str)) {
            let path = path.trim();
            if path.is_empty() {
                continue;
            }
            let path = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            };
            if !token_paths.contains(&path) {
                token_paths.push(path);
            }
        }

        Self {
            lms_setup,
            grant,
            token_paths,
            http_client,
            vault,
            token_store,
            state: Mutex::new(TokenState::NoToken),
            acquire_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Candidate token paths in the order they are tried.
    pub fn token_paths(&self) -> &[String] {
        &self.token_paths
    }

    pub fn status(&self) -> TokenStatus {
        let mut state = self.state();
        Self::expire_if_due(&mut state);
        match *state {
            TokenState::NoToken => TokenStatus::NoToken,
            TokenState::Valid(_) => TokenStatus::Valid,
            TokenState::Expired => TokenStatus::Expired,
            TokenState::Rejected => TokenStatus::Rejected,
        }
    }

    /// Returns a usable token, acquiring one if needed.
    pub async fn ensure_token(&self) -> Result<AccessToken, LmsError> {
        if let Some(token) = self.current() {
            return Ok(token);
        }

        let _gate = self.acquire_gate.lock().await;

        // Another caller may have finished acquiring while we waited
        if let Some(token) = self.current() {
            return Ok(token);
        }

        if let Some(token) = self.load_stored_token() {
            self.set_state(TokenState::Valid(token.clone()));
            return Ok(token);
        }

        let token = self.request_token().await?;
        self.set_state(TokenState::Valid(token.clone()));
        self.store_token(&token);
        Ok(token)
    }

    /// Requests a new token, ignoring any in-memory or persisted one.
    pub async fn acquire_fresh(&self) -> Result<AccessToken, LmsError> {
        let _gate = self.acquire_gate.lock().await;

        let token = self.request_token().await?;
        self.set_state(TokenState::Valid(token.clone()));
        self.store_token(&token);
        Ok(token)
    }

    /// Discards a token the LMS rejected.
    ///
    /// Has no effect if a newer token replaced it in the meantime.
    pub fn invalidate(&self, token: &AccessToken) {
        {
            let mut state = self.state();
            if let TokenState::Valid(current) = &*state {
                if current != token {
                    return;
                }
                *state = TokenState::Rejected;
            }
        }

        warn!(
            lms_setup = self.lms_setup.id,
            lms_type = %self.lms_setup.lms_type,
            "Access token rejected by LMS, discarding it"
        );

        if let Err(e) = self.token_store.remove(self.lms_setup.id) {
            warn!(lms_setup = self.lms_setup.id, error = %e, "Failed to remove stored access token");
        }
    }

    fn state(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, new_state: TokenState) {
        *self.state() = new_state;
    }

    fn expire_if_due(state: &mut TokenState) {
        if matches!(state, TokenState::Valid(token) if token.is_expired()) {
            *state = TokenState::Expired;
        }
    }

    fn current(&self) -> Option<AccessToken> {
        let mut state = self.state();
        Self::expire_if_due(&mut state);
        match &*state {
            TokenState::Valid(token) => Some(token.clone()),
            _ => None,
        }
    }

    /// Vault for persisted tokens, keyed by the setup's secret pair.
    ///
    /// Any change of client name or secret makes previously stored tokens
    /// undecryptable, which discards them.
    fn token_vault(&self) -> AesGcmVault {
        AesGcmVault::derive(&self.lms_setup.client_secret, &self.lms_setup.client_name)
    }

    fn load_stored_token(&self) -> Option<AccessToken> {
        let setup_id = self.lms_setup.id;
        let stored = match self.token_store.load(setup_id) {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                warn!(lms_setup = setup_id, error = %e, "Failed to load stored access token");
                return None;
            }
        };

        let token = match self.token_vault().decrypt(&stored.ciphertext) {
            Ok(value) => AccessToken::new(value, stored.expires_at),
            Err(e) => {
                warn!(lms_setup = setup_id, error = %e, "Failed to decrypt stored access token");
                self.discard_stored_token();
                return None;
            }
        };

        if token.is_expired() {
            debug!(lms_setup = setup_id, "Stored access token expired");
            self.discard_stored_token();
            return None;
        }

        debug!(lms_setup = setup_id, "Reusing stored access token");
        Some(token)
    }

    fn store_token(&self, token: &AccessToken) {
        let stored = match self.token_vault().encrypt(token.value()) {
            Ok(ciphertext) => StoredToken {
                ciphertext,
                expires_at: token.expires_at(),
            },
            Err(e) => {
                warn!(lms_setup = self.lms_setup.id, error = %e, "Failed to encrypt access token for later use");
                return;
            }
        };

        if let Err(e) = self.token_store.save(self.lms_setup.id, &stored) {
            warn!(lms_setup = self.lms_setup.id, error = %e, "Failed to store access token for later use");
        }
    }

    fn discard_stored_token(&self) {
        if let Err(e) = self.token_store.remove(self.lms_setup.id) {
            warn!(lms_setup = self.lms_setup.id, error = %e, "Failed to remove stored access token");
        }
    }

    /// Tries every candidate path in order and returns the first token.
    async fn request_token(&self) -> Result<AccessToken, LmsError> {
        let client_secret = self
            .vault
            .decrypt(&self.lms_setup.client_secret)
            .context("Failed to decrypt client secret")
            .map_err(LmsError::Vault)?;

        for path in &self.token_paths {
            match self.request_token_at(path, &client_secret).await {
                Ok(token) => {
                    info!(
                        lms_setup = self.lms_setup.id,
                        lms_type = %self.lms_setup.lms_type,
                        path = %path,
                        "Access token acquired"
                    );
                    return Ok(token);
                }
                Err(e) => {
                    info!(
                        lms_setup = self.lms_setup.id,
                        path = %path,
                        error = %format!("{:#}", e),
                        "Failed to request access token on token path"
                    );
                }
            }
        }

        Err(LmsError::TokenRequest {
            lms_type: self.lms_setup.lms_type,
            attempted_paths: self.token_paths.clone(),
        })
    }

    async fn request_token_at(&self, path: &str, client_secret: &str) -> Result<AccessToken> {
        let url = format!("{}{}", self.lms_setup.base_url(), path);
        let client_name = self.lms_setup.client_name.as_str();

        let form: Vec<(&str, &str)> = match &self.grant {
            TokenGrant::ClientCredentials => vec![
                ("grant_type", "client_credentials"),
                ("client_id", client_name),
                ("client_secret", client_secret),
            ],
            TokenGrant::MoodleWebService { service } => vec![
                ("username", client_name),
                ("password", client_secret),
                ("service", service.as_str()),
            ],
        };

        let response = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send token request: {}", e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Token endpoint answered {}", status);
        }

        match &self.grant {
            TokenGrant::ClientCredentials => {
                let body: OAuthTokenResponse = response
                    .json()
                    .await
                    .context("Failed to parse token response")?;
                if body.access_token.trim().is_empty() {
                    bail!("Token response contained an empty access token");
                }
                let expires_at = body.expires_in.and_then(expiry_after);
                Ok(AccessToken::new(body.access_token, expires_at))
            }
            TokenGrant::MoodleWebService { .. } => {
                let body: MoodleTokenResponse = response
                    .json()
                    .await
                    .context("Failed to parse token response")?;
                match body.token {
                    Some(token) if !token.trim().is_empty() => Ok(AccessToken::new(token, None)),
                    _ => bail!(
                        "Moodle refused token request: {} ({})",
                        body.error.as_deref().unwrap_or("no token in response"),
                        body.errorcode.as_deref().unwrap_or("unknown")
                    ),
                }
            }
        }
    }
}
