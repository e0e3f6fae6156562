//! Configuration loading and validation for shelf.
//!
//! Layered sources, weakest first: built-in defaults, the per-user
//! configuration file (`shelf.toml` in the platform config directory), a
//! `shelf.toml` in the working directory, then `SHELF_*` environment
//! variables with `__` as the section separator - so
//! `SHELF_REMOTE__API_KEY` overrides `[remote] api_key`.
//!
//! Every section has a sensible default; a missing file is not an error.

pub mod error;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{ErrorKind, Result};

/// Local structured store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the SQLite database file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: data_dir().join("library.db") }
    }
}

/// Hosted backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the backend, e.g. `https://xyz.supabase.co/`.
    pub base_url: String,
    /// Static api key; sent as both `apikey` header and bearer token.
    pub api_key: String,
    /// Transport timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            // Local development stack; production overrides via file/env.
            base_url: "http://localhost:54321/".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

impl RemoteConfig {
    pub fn base(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|_| exn::Exn::from(ErrorKind::InvalidUrl(self.base_url.clone())))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Network interception worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Directory holding all byte-cache generations.
    pub cache_root: PathBuf,
    /// Version tag of the current cache generation. Bump on deployment to
    /// evict every older generation.
    pub generation: String,
    /// Origin the storefront itself is served from.
    pub site_origin: String,
    /// Shell resources (paths on the site origin) pre-cached at install.
    pub shell: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_root: data_dir().join("cache"),
            generation: "library-v1".to_string(),
            site_origin: "http://localhost:5173/".to_string(),
            shell: vec!["/".to_string(), "/index.html".to_string(), "/manifest.json".to_string()],
        }
    }
}

impl GatewayConfig {
    pub fn site(&self) -> Result<Url> {
        Url::parse(&self.site_origin).map_err(|_| exn::Exn::from(ErrorKind::InvalidUrl(self.site_origin.clone())))
    }

    /// Shell paths resolved against the site origin.
    pub fn shell_urls(&self) -> Result<Vec<Url>> {
        let site = self.site()?;
        self.shell
            .iter()
            .map(|path| {
                site.join(path).map_err(|_| exn::Exn::from(ErrorKind::InvalidUrl(path.clone())))
            })
            .collect()
    }
}

/// Sync engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Hard deadline per remote attempt, in seconds.
    pub deadline_secs: u64,
    /// Read retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff base delay in milliseconds (doubles per retry).
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 10,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl SyncConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from all layered sources.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().map_err(|err| {
            debug!(error = %err, "configuration rejected");
            exn::Exn::from(ErrorKind::Invalid)
        })?;
        Ok(config)
    }

    fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(dirs) = directories::ProjectDirs::from("", "", "shelf") {
            figment = figment.merge(Toml::file(dirs.config_dir().join("shelf.toml")));
        }
        figment
            .merge(Toml::file("shelf.toml"))
            .merge(Env::prefixed("SHELF_").split("__"))
    }
}

/// Platform data directory, with a relative fallback for containers and
/// other environments without a home directory.
fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "shelf")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("shelf-data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_complete() {
        let config = Config::default();
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.gateway.generation, "library-v1");
        assert_eq!(config.gateway.shell.len(), 3);
        assert!(config.remote.base().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "shelf.toml",
                r#"
                    [remote]
                    base_url = "https://backend.example.com/"
                    api_key = "from-file"
                    timeout_secs = 5

                    [gateway]
                    generation = "library-v2"
                "#,
            )?;
            let config = Config::from_figment(Config::figment()).expect("config should load");
            assert_eq!(config.remote.api_key, "from-file");
            assert_eq!(config.remote.timeout(), Duration::from_secs(5));
            assert_eq!(config.gateway.generation, "library-v2");
            // Untouched sections keep their defaults.
            assert_eq!(config.sync.deadline(), Duration::from_secs(10));
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("shelf.toml", "[remote]\napi_key = \"from-file\"\n")?;
            jail.set_env("SHELF_REMOTE__API_KEY", "from-env");
            jail.set_env("SHELF_SYNC__MAX_RETRIES", "7");
            let config = Config::from_figment(Config::figment()).expect("config should load");
            assert_eq!(config.remote.api_key, "from-env");
            assert_eq!(config.sync.max_retries, 7);
            Ok(())
        });
    }

    #[test]
    fn test_shell_urls_resolve_against_site_origin() {
        let config = Config::default();
        let urls = config.gateway.shell_urls().unwrap();
        assert_eq!(urls[1].as_str(), "http://localhost:5173/index.html");
    }

    #[test]
    fn test_invalid_url_is_reported() {
        let mut config = Config::default();
        config.remote.base_url = "not a url".to_string();
        let err = config.remote.base().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidUrl(_)));
    }
}
