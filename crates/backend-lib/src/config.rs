// ============================
// munch-backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

/// Application settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level
    pub log_level: String,
    /// Allowed CORS origin for the browser client
    pub cors_origin: String,
    /// Room id allocation
    pub room: RoomSettings,
    /// Restaurant lookup upstream
    pub places: PlacesSettings,
}

/// Room code allocation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    /// Length of allocated room codes
    pub id_length: usize,
    /// How long an allocated-but-unjoined code stays reserved
    pub reservation_ttl_secs: u64,
}

/// Google Places upstream settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlacesSettings {
    /// API key; empty disables the upstream (rooms seed empty)
    pub api_key: String,
    /// Base URL, overridable for tests
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Wait before redeeming a next-page token; the upstream needs a few
    /// seconds before a token becomes valid
    pub page_token_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3500".parse().unwrap(),
            log_level: "info".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
            room: RoomSettings::default(),
            places: PlacesSettings::default(),
        }
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            id_length: 4,
            reservation_ttl_secs: 300,
        }
    }
}

impl Default for PlacesSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://maps.googleapis.com".to_string(),
            request_timeout_secs: 10,
            page_token_delay_ms: 3000,
        }
    }
}

impl Settings {
    /// Load settings from `config.toml` and `MUNCH_`-prefixed environment
    /// variables, falling back to defaults for anything unset.
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load settings from an explicit config file path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MUNCH_").split("__"))
            .extract()?;
        Ok(settings)
    }
}
