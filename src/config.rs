use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for phase-migrate
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MigrateConfig {
    /// Where workflow state is persisted
    pub cache: CacheConfig,
    /// Remote phase execution service
    pub service: ServiceConfig,
    /// Caller identity
    pub identity: IdentityConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    File,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Storage medium: memory, file or sqlite
    pub backend: CacheBackend,
    /// Root directory for the file backend, lock files and the sqlite database
    pub directory: PathBuf,
    /// Store namespace; separate namespaces never see each other's keys
    pub namespace: String,
    /// Expire cached workflow artifacts after this many hours
    pub progress_ttl_hours: Option<u64>,
    /// Periodically evict expired entries
    pub sweep_interval_seconds: Option<u64>,
}

impl CacheConfig {
    pub fn progress_ttl(&self) -> Option<Duration> {
        self.progress_ttl_hours
            .map(|hours| Duration::from_secs(hours.saturating_mul(3600)))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_seconds
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs)
    }

    pub fn sqlite_url(&self) -> String {
        format!(
            "sqlite://{}?mode=rwc",
            self.directory.join("phase-migrate.db").display()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Base URL of the phase execution API
    pub base_url: String,
    /// Bearer token (can be set via env var)
    pub token: Option<String>,
    /// Upper bound for a single phase call
    pub phase_timeout_seconds: u64,
    /// TCP connect timeout
    pub connect_timeout_seconds: u64,
    /// Client-side rate limit
    pub requests_per_minute: u32,
}

impl ServiceConfig {
    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IdentityConfig {
    /// Stable user id passed to the remote service
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Default log filter when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable output
    pub json_output: bool,
    /// Log cache and phase counters on shutdown
    pub metrics_enabled: bool,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                backend: CacheBackend::File,
                directory: PathBuf::from(".phase-migrate"),
                namespace: "default".to_string(),
                progress_ttl_hours: None,
                sweep_interval_seconds: None,
            },
            service: ServiceConfig {
                base_url: "http://localhost:8080/api".to_string(),
                token: None, // Will be read from env var or .phase-migrate-rc
                phase_timeout_seconds: 600,
                connect_timeout_seconds: 10,
                requests_per_minute: 60,
            },
            identity: IdentityConfig { user: None },
            observability: ObservabilityConfig {
                log_level: "warn".to_string(),
                json_output: false,
                metrics_enabled: true,
            },
        }
    }
}

impl MigrateConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (phase-migrate.toml, .phase-migrate-rc)
    /// 3. Environment variables (prefixed with PHASE_MIGRATE_)
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`MigrateConfig::load`], with an extra file layered over the
    /// default ones.
    pub fn load_from(extra: Option<&Path>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&MigrateConfig::default())?);

        if Path::new("phase-migrate.toml").exists() {
            builder = builder.add_source(File::with_name("phase-migrate"));
        }

        if Path::new(".phase-migrate-rc").exists() {
            builder = builder.add_source(
                File::with_name(".phase-migrate-rc").format(config::FileFormat::Toml),
            );
        }

        if let Some(path) = extra {
            builder = builder.add_source(File::from(path).required(true));
        }

        // PHASE_MIGRATE_SERVICE__BASE_URL -> service.base_url
        builder = builder.add_source(
            Environment::with_prefix("PHASE_MIGRATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut migrate_config: MigrateConfig = builder
            .build()?
            .try_deserialize()
            .context("Invalid phase-migrate configuration")?;

        if migrate_config.service.token.is_none() {
            if let Ok(token) = std::env::var("PHASE_MIGRATE_TOKEN") {
                migrate_config.service.token = Some(token);
            }
        }

        Ok(migrate_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<MigrateConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = MigrateConfig::load_env_file();
        MigrateConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static MigrateConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("phase-migrate.toml");

        let config = MigrateConfig::default();
        config.save_to_file(&path).unwrap();

        let loaded = MigrateConfig::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.cache, config.cache);
        assert_eq!(loaded.observability, config.observability);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[cache]
backend = "memory"
progress_ttl_hours = 48

[service]
phase_timeout_seconds = 90
"#,
        )
        .unwrap();

        let loaded = MigrateConfig::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.cache.backend, CacheBackend::Memory);
        assert_eq!(loaded.cache.progress_ttl(), Some(Duration::from_secs(48 * 3600)));
        assert_eq!(loaded.service.phase_timeout(), Duration::from_secs(90));
        assert_eq!(loaded.cache.namespace, "default");
    }

    #[test]
    fn test_zero_sweep_interval_disables_sweeper() {
        let mut cache = MigrateConfig::default().cache;
        cache.sweep_interval_seconds = Some(0);
        assert_eq!(cache.sweep_interval(), None);
        cache.sweep_interval_seconds = Some(30);
        assert_eq!(cache.sweep_interval(), Some(Duration::from_secs(30)));
    }
}
