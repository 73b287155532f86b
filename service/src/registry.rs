use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use domain::error::{Error, Result};
use domain::model::vo::Credential;
use domain::service::{Adaptor, FileAccess, Scheduler};
use uuid::Uuid;

use crate::copy::{CopyEngine, DEFAULT_BLOCK_SIZE};

/// Routes scheduler and file-access creation to the adaptor registered for a
/// name or location scheme, and owns everything it hands out: schedulers are
/// tracked so `end` can close stragglers, copy engines are deduplicated per
/// file-access root.
pub struct AdaptorRegistry {
    adaptors: DashMap<String, Arc<dyn Adaptor>>,
    schedulers: DashMap<Uuid, Arc<dyn Scheduler>>,
    engines: DashMap<String, Arc<CopyEngine>>,
    block_size: usize,
}

impl AdaptorRegistry {
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            adaptors: DashMap::new(),
            schedulers: DashMap::new(),
            engines: DashMap::new(),
            block_size,
        }
    }

    pub fn register(&self, adaptor: Arc<dyn Adaptor>) {
        tracing::debug!(adaptor = adaptor.name(), "registering adaptor");
        self.adaptors.insert(adaptor.name().to_owned(), adaptor);
    }

    pub fn adaptor_names(&self) -> Vec<String> {
        self.adaptors.iter().map(|e| e.key().clone()).collect()
    }

    pub fn adaptor(&self, name: &str) -> Result<Arc<dyn Adaptor>> {
        self.adaptors
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NoSuchScheduler(format!("no adaptor named {name}")))
    }

    pub fn adaptor_for_scheme(&self, scheme: &str) -> Result<Arc<dyn Adaptor>> {
        self.adaptors
            .iter()
            .find(|e| e.value().supported_schemes().contains(&scheme))
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NoSuchScheduler(format!("no adaptor for scheme {scheme}")))
    }

    pub async fn create_scheduler(
        &self,
        adaptor: &str,
        location: &str,
        credential: &Credential,
        properties: &HashMap<String, String>,
    ) -> Result<Arc<dyn Scheduler>> {
        let adaptor = self.adaptor(adaptor)?;
        let scheduler = adaptor.create_scheduler(location, credential, properties).await?;
        self.schedulers.insert(Uuid::new_v4(), scheduler.clone());
        Ok(scheduler)
    }

    pub async fn create_file_access(
        &self,
        adaptor: &str,
        location: &str,
        credential: &Credential,
    ) -> Result<Arc<dyn FileAccess>> {
        self.adaptor(adaptor)?.create_file_access(location, credential).await
    }

    /// The copy engine serializing transfers for this access root. At most
    /// one engine exists per root.
    pub fn copy_engine(&self, access: Arc<dyn FileAccess>) -> Arc<CopyEngine> {
        self.engines
            .entry(access.root().to_owned())
            .or_insert_with(|| CopyEngine::new(access, self.block_size))
            .clone()
    }

    /// Closes every scheduler and copy engine created through this registry.
    pub async fn end(&self) {
        let schedulers: Vec<_> = self.schedulers.iter().map(|e| e.value().clone()).collect();
        self.schedulers.clear();
        for scheduler in schedulers {
            if let Err(e) = scheduler.close().await {
                tracing::warn!(
                    adaptor = scheduler.adaptor_name(),
                    "failed to close scheduler: {e}"
                );
            }
        }

        let engines: Vec<_> = self.engines.iter().map(|e| e.value().clone()).collect();
        self.engines.clear();
        for engine in engines {
            engine.close().await;
        }
    }
}

impl Default for AdaptorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
