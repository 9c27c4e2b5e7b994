//! Gateway configuration.
//!
//! A nested structure read at startup: transport tuning for the gRPC
//! server and the security block for both credential families. Values can
//! come from a TOML file, from environment variables, or be built in code;
//! every field has a default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FarcallConfig {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Connection-lifecycle tuning, plumbed to the transport builder.
/// Zero values mean "unlimited".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_inbound_message_size")]
    pub max_inbound_message_size: usize,

    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: u32,

    #[serde(default = "default_keepalive_time_secs")]
    pub keepalive_time_secs: u64,

    #[serde(default = "default_keepalive_timeout_secs")]
    pub keepalive_timeout_secs: u64,

    #[serde(default)]
    pub permit_keepalive_without_calls: bool,

    #[serde(default)]
    pub max_connection_idle_secs: u64,

    #[serde(default)]
    pub max_connection_age_secs: u64,

    #[serde(default = "default_true")]
    pub enable_reflection: bool,
}

fn default_true() -> bool {
    true
}
fn default_port() -> u16 {
    9090
}
fn default_max_inbound_message_size() -> usize {
    4 * 1024 * 1024
}
fn default_max_concurrent_calls() -> u32 {
    100
}
fn default_keepalive_time_secs() -> u64 {
    300
}
fn default_keepalive_timeout_secs() -> u64 {
    20
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_port(),
            max_inbound_message_size: default_max_inbound_message_size(),
            max_concurrent_calls: default_max_concurrent_calls(),
            keepalive_time_secs: default_keepalive_time_secs(),
            keepalive_timeout_secs: default_keepalive_timeout_secs(),
            permit_keepalive_without_calls: false,
            max_connection_idle_secs: 0,
            max_connection_age_secs: 0,
            enable_reflection: true,
        }
    }
}

/// Credential enforcement settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Global off-switch: when false, secured members accept every call.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub token: TokenAuthConfig,

    #[serde(default)]
    pub key: KeyAuthConfig,
}

/// Bearer-token family settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAuthConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Expected `iss` claim.
    #[serde(default)]
    pub issuer_uri: Option<String>,

    /// Remote key-set endpoint, consulted by key id.
    #[serde(default)]
    pub jwks_uri: Option<String>,

    /// Accepted `aud` values; empty disables the audience check.
    #[serde(default)]
    pub audiences: Vec<String>,

    #[serde(default = "default_token_cache_ttl_secs")]
    pub token_cache_ttl_secs: u64,

    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,
}

fn default_token_cache_ttl_secs() -> u64 {
    300
}
fn default_clock_skew_secs() -> u64 {
    60
}

impl Default for TokenAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            issuer_uri: None,
            jwks_uri: None,
            audiences: Vec::new(),
            token_cache_ttl_secs: default_token_cache_ttl_secs(),
            clock_skew_secs: default_clock_skew_secs(),
        }
    }
}

/// Shared-key family settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyAuthConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Valid keys; the sequence permits rotation without downtime.
    #[serde(default)]
    pub keys: Vec<String>,

    #[serde(default = "default_key_header")]
    pub header_name: String,
}

fn default_key_header() -> String {
    "x-api-key".to_owned()
}

impl Default for KeyAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            keys: Vec::new(),
            header_name: default_key_header(),
        }
    }
}

impl FarcallConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("read {}: {err}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|err| Error::Config(format!("parse {}: {err}", path.display())))
    }

    /// Apply `FARCALL_*` environment overrides (merges with current values).
    pub fn from_env(mut self) -> Self {
        if let Ok(port) = std::env::var("FARCALL_PORT") {
            if let Ok(p) = port.parse() {
                self.transport.port = p;
            }
        }
        if let Ok(enabled) = std::env::var("FARCALL_TRANSPORT_ENABLED") {
            self.transport.enabled = enabled.to_lowercase() != "false";
        }
        if let Ok(enabled) = std::env::var("FARCALL_SECURITY_ENABLED") {
            self.security.enabled = enabled.to_lowercase() == "true";
        }
        if let Ok(issuer) = std::env::var("FARCALL_ISSUER_URI") {
            self.security.token.enabled = true;
            self.security.token.issuer_uri = Some(issuer);
        }
        if let Ok(jwks) = std::env::var("FARCALL_JWKS_URI") {
            self.security.token.enabled = true;
            self.security.token.jwks_uri = Some(jwks);
        }
        if let Ok(audiences) = std::env::var("FARCALL_AUDIENCES") {
            self.security.token.audiences = audiences
                .split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(keys) = std::env::var("FARCALL_API_KEYS") {
            self.security.key.enabled = true;
            self.security.key.keys = keys
                .split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect();
        }
        self
    }
}
