//! User settings persisted as TOML at `~/.tezgate/config.toml`.
//!
//! Settings are the middle layer of configuration: env vars override them,
//! and they override built-in defaults. Secrets (auth and vault tokens) are
//! never read from this file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::network::KnownNetwork;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub confirmation: ConfirmationSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub vault: VaultSettings,

    #[serde(default)]
    pub rpc: RpcSettings,

    /// Known networks. Empty means the built-in list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<KnownNetwork>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Externally reachable base URL for approval surfaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,

    /// Extra origins allowed to call the requester endpoint from a browser.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_origins: Vec<String>,
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    7474
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            public_base_url: None,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationSettings {
    #[serde(default = "default_confirmation_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_surface_width")]
    pub width: u32,

    #[serde(default = "default_surface_height")]
    pub height: u32,

    #[serde(default = "default_surface_min_offset")]
    pub min_offset: i32,
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_surface_width() -> u32 {
    380
}

fn default_surface_height() -> u32 {
    600
}

fn default_surface_min_offset() -> i32 {
    20
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_confirmation_timeout_secs(),
            width: default_surface_width(),
            height: default_surface_height(),
            min_offset: default_surface_min_offset(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Data directory (default: ~/.tezgate/data).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultSettings {
    #[serde(default = "default_vault_url")]
    pub url: String,

    #[serde(default = "default_vault_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_vault_url() -> String {
    "http://127.0.0.1:6732".to_string()
}

fn default_vault_timeout_ms() -> u64 {
    60_000
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            url: default_vault_url(),
            timeout_ms: default_vault_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcSettings {
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rpc_timeout_ms() -> u64 {
    30_000
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

impl Settings {
    /// Default TOML config file path (~/.tezgate/config.toml).
    pub fn default_toml_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tezgate")
            .join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be parsed.
    pub fn load_toml(path: &Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        toml::from_str(&data)
            .map(Some)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))
    }

    /// Write the settings as a commented TOML file.
    pub fn save_toml(&self, path: &Path) -> Result<(), String> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize settings: {}", e))?;

        let content = format!(
            "# tezgate configuration file.\n\
             #\n\
             # Priority: env var > this file > defaults.\n\
             # Tokens are read from TEZGATE_GATEWAY_AUTH_TOKEN and\n\
             # TEZGATE_VAULT_TOKEN only.\n\
             \n\
             {raw}"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
        }

        std::fs::write(path, content)
            .map_err(|e| format!("failed to write {}: {}", path.display(), e))
    }

    /// Merge values from `other` into `self`, preferring `other` for
    /// fields that differ from the default.
    pub fn merge_from(&mut self, other: &Self) {
        let default_json = match serde_json::to_value(Self::default()) {
            Ok(v) => v,
            Err(_) => return,
        };
        let other_json = match serde_json::to_value(other) {
            Ok(v) => v,
            Err(_) => return,
        };
        let mut self_json = match serde_json::to_value(&*self) {
            Ok(v) => v,
            Err(_) => return,
        };

        merge_non_default(&mut self_json, &other_json, &default_json);

        if let Ok(merged) = serde_json::from_value(self_json) {
            *self = merged;
        }
    }
}

fn merge_non_default(
    target: &mut serde_json::Value,
    other: &serde_json::Value,
    defaults: &serde_json::Value,
) {
    match (target, other, defaults) {
        (
            serde_json::Value::Object(t),
            serde_json::Value::Object(o),
            serde_json::Value::Object(d),
        ) => {
            for (key, other_val) in o {
                let default_val = d.get(key).cloned().unwrap_or(serde_json::Value::Null);
                if let Some(target_val) = t.get_mut(key) {
                    merge_non_default(target_val, other_val, &default_val);
                } else if other_val != &default_val {
                    t.insert(key.clone(), other_val.clone());
                }
            }
        }
        (target, other, defaults) => {
            if other != defaults {
                *target = other.clone();
            }
        }
    }
}
