// Configuration for the Gramline relay.
//
// Deployment parameters only — bind host, bind port, CORS allow-list. The
// protocol contract itself carries no configuration. Values come from
// defaults, then environment (HOST / PORT / CORS_ORIGINS), then CLI flags.

use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind host for the WebSocket + HTTP listener
    pub host: IpAddr,

    /// Bind port
    pub port: u16,

    /// Allowed CORS origins; empty means any origin (development default)
    pub cors_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: [0, 0, 0, 0].into(),
            port: 4000,
            cors_origins: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Defaults overlaid with HOST / PORT / CORS_ORIGINS environment
    /// variables, matching the deployment contract of the original service.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("HOST") {
            config.host = host
                .parse()
                .with_context(|| format!("invalid HOST: {host}"))?;
        }
        if let Ok(port) = std::env::var("PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("invalid PORT: {port}"))?;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.cors_origins = parse_origins(&origins);
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Wildcard CORS, i.e. no explicit allow-list configured.
    pub fn allow_any_origin(&self) -> bool {
        self.cors_origins.is_empty()
    }
}

/// Comma-separated origins; a lone "*" collapses to the wildcard.
pub fn parse_origins(raw: &str) -> Vec<String> {
    if raw.trim() == "*" {
        return Vec::new();
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
