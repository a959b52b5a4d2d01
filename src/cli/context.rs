// Wiring from configuration to live stores, services and sessions

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::{spawn_expiry_sweeper, CacheStore, FileCacheStore, MemoryCacheStore};
use crate::config::{CacheBackend, CacheConfig, MigrateConfig};
use crate::executor::{HttpPhaseService, PhaseExecutor};
use crate::orchestrator::MigrationOrchestrator;
use crate::project::{ProjectRef, UserIdentity};
use crate::session::MigrationSession;
use crate::workflow::WorkflowCache;

/// Everything a command needs, built once per invocation
pub struct AppContext {
    pub config: MigrateConfig,
    pub cache: WorkflowCache,
    sweeper: Option<JoinHandle<()>>,
}

impl AppContext {
    pub async fn new(config: MigrateConfig) -> Result<Self> {
        let store = open_store(&config.cache).await?;
        let sweeper = config
            .cache
            .sweep_interval()
            .map(|every| spawn_expiry_sweeper(store.clone(), every));
        let cache = WorkflowCache::new(store).with_ttl(config.cache.progress_ttl());

        Ok(Self {
            config,
            cache,
            sweeper,
        })
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        self.cache.store()
    }

    /// User from the command line, then configuration, then the login name.
    pub fn resolve_user(&self, explicit: Option<String>) -> Result<UserIdentity> {
        explicit
            .or_else(|| self.config.identity.user.clone())
            .or_else(|| std::env::var("USER").ok())
            .filter(|user| !user.trim().is_empty())
            .map(UserIdentity::new)
            .ok_or_else(|| anyhow!("No user identity: pass --user or set identity.user"))
    }

    pub fn session(&self, user: UserIdentity) -> Result<MigrationSession> {
        let service = HttpPhaseService::new(&self.config.service)
            .context("Failed to build phase service client")?;
        let executor = PhaseExecutor::new(Arc::new(service), self.config.service.phase_timeout());
        let orchestrator = MigrationOrchestrator::new(executor, self.cache.clone());
        Ok(MigrationSession::new(orchestrator, user))
    }

    /// Lock the project against runs from other processes. The lock is held
    /// until the returned value is dropped.
    pub fn project_lock(&self, project: &ProjectRef) -> Result<fd_lock::RwLock<File>> {
        std::fs::create_dir_all(&self.config.cache.directory)?;
        let path = self
            .config
            .cache
            .directory
            .join(format!("{}__{}.lock", project.owner(), project.repo()));
        let file = File::create(&path)
            .with_context(|| format!("Failed to create lock file {}", path.display()))?;
        Ok(fd_lock::RwLock::new(file))
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

pub async fn open_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
        CacheBackend::File => {
            Arc::new(FileCacheStore::open(&config.directory, &config.namespace).await?)
        }
        CacheBackend::Sqlite => open_sqlite(config).await?,
    };
    info!(backend = ?config.backend, namespace = %config.namespace, "Opened cache store");
    Ok(store)
}

#[cfg(feature = "database")]
async fn open_sqlite(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    std::fs::create_dir_all(&config.directory)?;
    let store =
        crate::cache::SqliteCacheStore::open(&config.sqlite_url(), &config.namespace, 5).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "database"))]
async fn open_sqlite(_config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    Err(anyhow!(
        "The sqlite cache backend requires building with the `database` feature"
    ))
}
