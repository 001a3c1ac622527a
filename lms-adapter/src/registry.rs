//! Adapter registry - resolves LMS setups to cached adapters.
//!
//! One adapter (and with it one token manager) is kept per setup id. A
//! changed setup record replaces the cached adapter, so tokens acquired with
//! old credentials are never reused in memory.

use crate::adapter::LmsApi;
use crate::adapters::{AdapterContext, LmsAdapter};
use crate::error::LmsError;
use anyhow::Result;
use lms_gateway::LmsConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Source of LMS setup records.
pub trait LmsConfigRepository: Send + Sync {
    fn lms_setup(&self, id: i64) -> Result<Option<LmsConfig>>;
}

/// Fixed set of setups, e.g. loaded from a file at startup.
#[derive(Debug, Default)]
pub struct StaticConfigRepository {
    setups: HashMap<i64, LmsConfig>,
}

impl StaticConfigRepository {
    pub fn new(setups: impl IntoIterator<Item = LmsConfig>) -> Self {
        Self {
            setups: setups.into_iter().map(|setup| (setup.id, setup)).collect(),
        }
    }
}

impl LmsConfigRepository for StaticConfigRepository {
    fn lms_setup(&self, id: i64) -> Result<Option<LmsConfig>> {
        Ok(self.setups.get(&id).cloned())
    }
}

pub struct AdapterRegistry {
    context: AdapterContext,
    repository: Arc<dyn LmsConfigRepository>,
    adapters: RwLock<HashMap<i64, Arc<LmsAdapter>>>,
}

impl AdapterRegistry {
    pub fn new(context: AdapterContext, repository: Arc<dyn LmsConfigRepository>) -> Self {
        Self {
            context,
            repository,
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the adapter for `lms_setup`, building it on first use or when
    /// the setup changed since the cached adapter was built.
    pub fn resolve(&self, lms_setup: &LmsConfig) -> Arc<LmsAdapter> {
        if let Some(adapter) = self.cached(lms_setup) {
            return adapter;
        }

        let mut adapters = self.adapters.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have built it while we waited for the lock
        if let Some(adapter) = adapters.get(&lms_setup.id) {
            if adapter.lms_setup() == lms_setup {
                return Arc::clone(adapter);
            }
            info!(lms_setup = lms_setup.id, "LMS setup changed, replacing adapter");
        }

        let adapter = Arc::new(LmsAdapter::create(lms_setup.clone(), &self.context));
        adapters.insert(lms_setup.id, Arc::clone(&adapter));
        debug!(lms_setup = lms_setup.id, lms_type = %lms_setup.lms_type, "Created LMS adapter");
        adapter
    }

    /// Looks the setup up in the repository and resolves its adapter.
    pub fn resolve_by_id(&self, id: i64) -> Result<Arc<LmsAdapter>, LmsError> {
        let lms_setup = self
            .repository
            .lms_setup(id)
            .map_err(|e| LmsError::SetupLookup(format!("{:#}", e)))?
            .ok_or(LmsError::SetupNotFound(id))?;
        Ok(self.resolve(&lms_setup))
    }

    /// Drops the cached adapter of a setup. Returns true if one was cached.
    pub fn evict(&self, id: i64) -> bool {
        self.adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.adapters.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(&self, lms_setup: &LmsConfig) -> Option<Arc<LmsAdapter>> {
        let adapters = self.adapters.read().unwrap_or_else(PoisonError::into_inner);
        adapters
            .get(&lms_setup.id)
            .filter(|adapter| adapter.lms_setup() == lms_setup)
            .cloned()
    }
}
