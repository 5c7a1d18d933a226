use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// HTTP/WebSocket gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token for session administration and the intercom socket.
    /// Random hex generated at startup if unset.
    pub auth_token: Option<SecretString>,
    /// Base URL approval surfaces are opened at.
    pub public_base_url: String,
    pub allowed_origins: Vec<String>,
}

impl GatewayConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let host = optional_env("TEZGATE_GATEWAY_HOST")?
            .unwrap_or_else(|| settings.gateway.host.clone());
        let port = parse_optional_env("TEZGATE_GATEWAY_PORT", "a valid port number")?
            .unwrap_or(settings.gateway.port);

        let public_base_url = optional_env("TEZGATE_PUBLIC_BASE_URL")?
            .or_else(|| settings.gateway.public_base_url.clone())
            .unwrap_or_else(|| format!("http://{host}:{port}"));
        url::Url::parse(&public_base_url).map_err(|e| ConfigError::InvalidValue {
            key: "TEZGATE_PUBLIC_BASE_URL".to_string(),
            message: format!("must be an absolute URL: {e}"),
        })?;

        let allowed_origins = match optional_env("TEZGATE_ALLOWED_ORIGINS")? {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => settings.gateway.allowed_origins.clone(),
        };

        Ok(Self {
            host,
            port,
            auth_token: optional_env("TEZGATE_GATEWAY_AUTH_TOKEN")?.map(SecretString::from),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            allowed_origins,
        })
    }
}
