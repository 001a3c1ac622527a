//! LMS Adapter - One contract for talking to Learning Management Systems.
//!
//! Each configured LMS setup is served by an adapter that acquires access
//! tokens, tests connectivity and fetches course/quiz metadata, returning
//! canonical types or a typed [`LmsError`].
//!
//! # Architecture
//!
//! ```text
//!      caller (exam administration)
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       AdapterRegistry                    │
//! │  - one cached adapter per setup          │
//! │  - rebuilt when the setup changes        │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       LmsAdapter (Open edX/Moodle/Mock)  │
//! │  - ConnectionTester (staged self-test)   │
//! │  - QuizPageFetcher (authenticated GET)   │
//! │  - backend mapper (JSON → QuizData)      │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │       TokenManager                       │
//! │  - candidate token paths, in order       │
//! │  - encrypted token cache (TokenStore)    │
//! └─────────────────────────────────────────┘
//!          ↓
//!       LMS REST API
//! ```
//!
//! # Core Types
//!
//! - [`LmsApi`] - Contract every backend implements
//! - [`LmsAdapter`] - Closed set of backends, selected by [`LmsType`](lms_gateway::LmsType)
//! - [`ConnectivityResult`] - Outcome of a connection test
//! - [`QuizData`], [`Page`], [`QuizQuery`] - Canonical listing types
//!
//! # Usage
//!
//! ```no_run
//! use lms_adapter::{AdapterContext, AdapterRegistry, LmsApi, QuizQuery, StaticConfigRepository};
//! use lms_gateway::config::GatewayConfig;
//! use lms_gateway::credentials::{AesGcmVault, MemoryTokenStore};
//! use std::sync::Arc;
//!
//! # async fn run(setups: Vec<lms_gateway::LmsConfig>) -> anyhow::Result<()> {
//! let vault = Arc::new(AesGcmVault::from_base64_key(&std::env::var("LMS_ENCRYPTION_KEY")?)?);
//! let context = AdapterContext::new(&GatewayConfig::default(), vault, Arc::new(MemoryTokenStore::new()))?;
//! let registry = AdapterRegistry::new(context, Arc::new(StaticConfigRepository::new(setups)));
//!
//! let adapter = registry.resolve_by_id(1)?;
//! if adapter.test_connection().await.is_ok() {
//!     let page = adapter.fetch_quizzes(&QuizQuery::page(0, 25)).await?;
//!     println!("{} quizzes", page.page_size());
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod adapters;
pub mod error;
pub mod fetcher;
pub mod registry;
pub mod test_result;
pub mod tester;
pub mod token;
pub mod types;

pub use adapter::LmsApi;
pub use adapters::{AdapterContext, LmsAdapter};
pub use error::LmsError;
pub use registry::{AdapterRegistry, LmsConfigRepository, StaticConfigRepository};
pub use test_result::{ConnectivityResult, ErrorType, TestError};
pub use token::{AccessToken, TokenManager, TokenStatus};
pub use types::{ExamineeAccountDetails, Page, QuizData, QuizQuery};
