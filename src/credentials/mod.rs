//! Credential vault and persisted access tokens.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       Token Manager (lms-adapter)        │
//! │  - decrypts the client secret            │
//! │  - encrypts tokens with a scoped vault   │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       CredentialVault                    │
//! │  - AES-256-GCM, unique nonce per value   │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       TokenStore                         │
//! │  - memory or SQLite                      │
//! │  - ciphertext only, keyed by setup id    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use lms_gateway::credentials::{AesGcmVault, CredentialVault, SqliteTokenStore, StoredToken, TokenStore};
//!
//! # fn main() -> anyhow::Result<()> {
//! let master = AesGcmVault::from_base64_key(&std::env::var("LMS_ENCRYPTION_KEY")?)?;
//! let secret = master.encrypt("client-secret")?;
//!
//! // Tokens are encrypted with a vault scoped to one setup
//! let scoped = AesGcmVault::derive(&secret, "client-name");
//! let store = SqliteTokenStore::new("tokens.db")?;
//! store.save(1, &StoredToken { ciphertext: scoped.encrypt("token")?, expires_at: None })?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod encryption;
mod storage;

pub use encryption::{validate_key, AesGcmVault};
pub use storage::{MemoryTokenStore, SqliteTokenStore, TokenStore};

/// Opaque encrypt/decrypt capability for secrets at rest.
///
/// Injected wherever secrets are handled so tests can substitute it.
pub trait CredentialVault: Send + Sync {
    /// Encrypts a plaintext secret into an opaque ciphertext string.
    fn encrypt(&self, plaintext: &str) -> Result<String>;

    /// Decrypts a ciphertext produced by [`CredentialVault::encrypt`].
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// A persisted access token.
///
/// `ciphertext` is produced by a setup-scoped vault; the plain token value is
/// never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub ciphertext: String,

    /// When the token expires (UTC), if the LMS reported it
    pub expires_at: Option<DateTime<Utc>>,
}
