//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relay/config.json`) and environment.
//! Every field has a default, so an empty `{}` or a missing file is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Routing gateway that receives forwarded payloads.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// HTTP surface that exposes the dispatcher (`relay serve`).
    #[serde(default)]
    pub function: FunctionConfig,

    /// Acknowledgment stub listener (`relay stub`).
    #[serde(default)]
    pub stub: StubConfig,
}

/// Where forwarding calls go and how long they may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Gateway host name. Overridden by RELAY_GATEWAY_HOST env.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Gateway port (default 8080). Overridden by RELAY_GATEWAY_PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Upper bound for one forwarding call, connect included.
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

/// Bind settings for the dispatcher's HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfig {
    #[serde(default = "default_function_bind")]
    pub bind: String,

    #[serde(default = "default_function_port")]
    pub port: u16,
}

/// Bind settings and per-connection timeouts for the acknowledgment stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StubConfig {
    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_stub_bind")]
    pub bind: String,

    /// Port (default 8080).
    #[serde(default = "default_stub_port")]
    pub port: u16,

    /// Time allowed to receive request headers, and separately the body; a body
    /// still incomplete after this is acknowledged anyway.
    #[serde(default = "default_stub_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Time a single response write may stay blocked on the peer.
    #[serde(default = "default_stub_write_timeout_secs")]
    pub write_timeout_secs: u64,

    /// How long a keep-alive connection may wait for its next request.
    #[serde(default = "default_stub_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_gateway_host() -> String {
    "hydrogen-hydrogen-gateway.hydrogen.svc.cluster.local".to_string()
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_timeout_secs() -> u64 {
    10
}

fn default_function_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_function_port() -> u16 {
    8081
}

fn default_stub_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_stub_port() -> u16 {
    8080
}

fn default_stub_read_timeout_secs() -> u64 {
    15
}

fn default_stub_write_timeout_secs() -> u64 {
    15
}

fn default_stub_idle_timeout_secs() -> u64 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            bind: default_function_bind(),
            port: default_function_port(),
        }
    }
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            bind: default_stub_bind(),
            port: default_stub_port(),
            read_timeout_secs: default_stub_read_timeout_secs(),
            write_timeout_secs: default_stub_write_timeout_secs(),
            idle_timeout_secs: default_stub_idle_timeout_secs(),
        }
    }
}

impl StubConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Trimmed, non-empty value of an env var.
fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the gateway host: env RELAY_GATEWAY_HOST overrides config.
pub fn resolve_gateway_host(config: &Config) -> String {
    env_non_empty("RELAY_GATEWAY_HOST").unwrap_or_else(|| config.gateway.host.trim().to_string())
}

/// Resolve the gateway port: env RELAY_GATEWAY_PORT overrides config. Unparseable values are ignored.
pub fn resolve_gateway_port(config: &Config) -> u16 {
    match env_non_empty("RELAY_GATEWAY_PORT") {
        Some(p) => p.parse().unwrap_or_else(|_| {
            log::warn!("ignoring invalid RELAY_GATEWAY_PORT {:?}", p);
            config.gateway.port
        }),
        None => config.gateway.port,
    }
}

/// Base URL of the gateway, e.g. `http://gateway:8080`. IPv6 literals are bracketed.
pub fn gateway_base_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{}]:{}", host, port)
    } else {
        format!("http://{}:{}", host, port)
    }
}

/// Resolve the gateway base URL from config and env overrides.
pub fn resolve_gateway_base_url(config: &Config) -> String {
    gateway_base_url(&resolve_gateway_host(config), resolve_gateway_port(config))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, else the default path (or RELAY_CONFIG_PATH). Missing file => default config.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let c = Config::default();
        assert_eq!(
            c.gateway.host,
            "hydrogen-hydrogen-gateway.hydrogen.svc.cluster.local"
        );
        assert_eq!(c.gateway.port, 8080);
        assert_eq!(c.stub.read_timeout(), Duration::from_secs(15));
        assert_eq!(c.stub.write_timeout(), Duration::from_secs(15));
        assert_eq!(c.stub.idle_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn empty_object_uses_defaults() {
        let c: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(c.gateway.port, 8080);
        assert_eq!(c.function.bind, "127.0.0.1");
        assert_eq!(c.stub.bind, "0.0.0.0");
    }

    #[test]
    fn camel_case_keys() {
        let c: Config = serde_json::from_str(
            r#"{"gateway":{"host":"gw.local","timeoutSecs":3},"stub":{"idleTimeoutSecs":5}}"#,
        )
        .unwrap();
        assert_eq!(c.gateway.host, "gw.local");
        assert_eq!(c.gateway.port, 8080);
        assert_eq!(c.gateway.timeout(), Duration::from_secs(3));
        assert_eq!(c.stub.idle_timeout_secs, 5);
        assert_eq!(c.stub.read_timeout_secs, 15);
    }

    #[test]
    fn base_url_format() {
        assert_eq!(gateway_base_url("gw", 8080), "http://gw:8080");
    }

    #[test]
    fn base_url_brackets_ipv6_hosts() {
        assert_eq!(gateway_base_url("::1", 8080), "http://[::1]:8080");
        assert_eq!(gateway_base_url("[fd00::2]", 9000), "http://[fd00::2]:9000");
        assert_eq!(gateway_base_url("10.0.0.1", 80), "http://10.0.0.1:80");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("relay-config-does-not-exist.json");
        let (c, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(c.gateway.port, 8080);
    }
}
