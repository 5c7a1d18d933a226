//! Configuration for tezgate.
//!
//! Settings are loaded with priority: env var > TOML config file > default.
//! `./.env` and `~/.tezgate/.env` are loaded via dotenvy early in startup,
//! so values there behave like real env vars.

mod gateway;
pub(crate) mod helpers;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::confirm::{OrchestratorSettings, SurfaceGeometry};
use crate::error::ConfigError;
use crate::network::{KnownNetwork, default_networks};
use crate::settings::Settings;
use crate::storage::default_data_dir;

pub use self::gateway::GatewayConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub confirmation: ConfirmationConfig,
    pub storage: StorageConfig,
    pub vault: VaultConfig,
    pub rpc: RpcConfig,
    pub networks: Vec<KnownNetwork>,
}

#[derive(Debug, Clone)]
pub struct ConfirmationConfig {
    pub timeout: Duration,
    pub geometry: SurfaceGeometry,
}

impl ConfirmationConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let timeout_secs = helpers::parse_optional_env::<u64>(
            "TEZGATE_CONFIRMATION_TIMEOUT_SECS",
            "a positive integer",
        )?
        .unwrap_or(settings.confirmation.timeout_secs);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TEZGATE_CONFIRMATION_TIMEOUT_SECS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        let s = &settings.confirmation;
        if s.width == 0 || s.height == 0 {
            return Err(ConfigError::InvalidValue {
                key: "confirmation.width/height".to_string(),
                message: "surface size must be non-zero".to_string(),
            });
        }
        let geometry = SurfaceGeometry {
            width: s.width,
            height: s.height,
            min_offset: s.min_offset,
            ..SurfaceGeometry::default()
        };

        Ok(Self {
            timeout: Duration::from_secs(timeout_secs),
            geometry,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Keep everything in memory; nothing survives a restart.
    pub ephemeral: bool,
}

impl StorageConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            data_dir: helpers::optional_env("TEZGATE_DATA_DIR")?
                .map(PathBuf::from)
                .or_else(|| settings.storage.data_dir.clone())
                .unwrap_or_else(default_data_dir),
            ephemeral: helpers::parse_bool_env("TEZGATE_EPHEMERAL")?.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub url: String,
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

impl VaultConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let url = helpers::optional_env("TEZGATE_VAULT_URL")?
            .unwrap_or_else(|| settings.vault.url.clone());
        url::Url::parse(&url).map_err(|e| ConfigError::InvalidValue {
            key: "TEZGATE_VAULT_URL".to_string(),
            message: format!("must be an absolute URL: {e}"),
        })?;

        let timeout_ms = helpers::parse_optional_env::<u64>(
            "TEZGATE_VAULT_TIMEOUT_MS",
            "a positive integer",
        )?
        .unwrap_or(settings.vault.timeout_ms);

        Ok(Self {
            url,
            token: helpers::optional_env("TEZGATE_VAULT_TOKEN")?.map(SecretString::from),
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub timeout: Duration,
}

impl RpcConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let timeout_ms =
            helpers::parse_optional_env::<u64>("TEZGATE_RPC_TIMEOUT_MS", "a positive integer")?
                .unwrap_or(settings.rpc.timeout_ms);
        Ok(Self {
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

fn resolve_networks(settings: &Settings) -> Result<Vec<KnownNetwork>, ConfigError> {
    if settings.networks.is_empty() {
        return Ok(default_networks());
    }
    for (i, network) in settings.networks.iter().enumerate() {
        if network.id.trim().is_empty() || network.rpc_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: format!("networks[{i}]"),
                message: "id and rpc_base_url are required".to_string(),
            });
        }
    }
    Ok(settings.networks.clone())
}

impl Config {
    /// Load configuration from env vars and the TOML config file.
    ///
    /// If `toml_path` is `Some`, the file must exist. Otherwise
    /// `~/.tezgate/config.toml` is used when present.
    pub fn load(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        crate::bootstrap::load_env_files();

        let mut settings = Settings::default();
        Self::apply_toml_overlay(&mut settings, toml_path)?;
        Self::build(&settings)
    }

    fn apply_toml_overlay(
        settings: &mut Settings,
        explicit_path: Option<&Path>,
    ) -> Result<(), ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(toml_settings)) => {
                settings.merge_from(&toml_settings);
                tracing::debug!("Loaded TOML config from {}", path.display());
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Failed to load config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                tracing::warn!("Failed to load default config file: {}", e);
            }
        }
        Ok(())
    }

    pub fn build(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            gateway: GatewayConfig::resolve(settings)?,
            confirmation: ConfirmationConfig::resolve(settings)?,
            storage: StorageConfig::resolve(settings)?,
            vault: VaultConfig::resolve(settings)?,
            rpc: RpcConfig::resolve(settings)?,
            networks: resolve_networks(settings)?,
        })
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            surface_base_url: self.gateway.public_base_url.clone(),
            timeout: self.confirmation.timeout,
            geometry: self.confirmation.geometry,
        }
    }
}
