//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use vigil_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_SWEEP_INTERVAL_SECS};

/// Which push transport alerts are delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushTransportKind {
    /// No provider; submissions report push as disabled.
    Disabled,
    /// Alerts are written to the log.
    Log,
}

impl FromStr for PushTransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" | "off" | "" => Ok(Self::Disabled),
            "log" => Ok(Self::Log),
            other => Err(format!("unknown push transport '{other}'")),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Vigil Node"`
    pub instance_name: String,

    /// Push transport used for zone alerts and device subscriptions.
    /// Env: `PUSH_TRANSPORT` (`disabled` | `log`)
    /// Default: `disabled`
    pub push_transport: PushTransportKind,

    /// How often expired reports are swept from memory.
    /// Env: `SWEEP_INTERVAL_SECS`
    /// Default: one hour.
    pub sweep_interval: Duration,

    /// Sustained report submissions per second allowed per client.
    /// Env: `RATE_LIMIT_PER_SEC`
    /// Default: `2.0`
    pub rate_limit_per_sec: f64,

    /// Report submission burst allowed per client.
    /// Env: `RATE_LIMIT_BURST`
    /// Default: `10.0`
    pub rate_limit_burst: f64,

    /// Sustained subscription requests per second allowed per client.
    /// Env: `SUBSCRIBE_RATE_LIMIT_PER_SEC`
    /// Default: `0.2`
    pub subscribe_rate_limit_per_sec: f64,

    /// Subscription burst allowed per client.
    /// Env: `SUBSCRIBE_RATE_LIMIT_BURST`
    /// Default: `5.0`
    pub subscribe_rate_limit_burst: f64,

    /// Maximum JSON request body in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            instance_name: "Vigil Node".to_string(),
            push_transport: PushTransportKind::Disabled,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            rate_limit_per_sec: 2.0,
            rate_limit_burst: 10.0,
            subscribe_rate_limit_per_sec: 0.2,
            subscribe_rate_limit_burst: 5.0,
            max_body_size: 16 * 1024, // 16 KiB
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(name) = lookup("INSTANCE_NAME") {
            if !name.trim().is_empty() {
                config.instance_name = name;
            }
        }

        if let Some(val) = lookup("PUSH_TRANSPORT") {
            match val.parse() {
                Ok(kind) => config.push_transport = kind,
                Err(e) => tracing::warn!(error = %e, "Invalid PUSH_TRANSPORT, push disabled"),
            }
        }

        if let Some(val) = lookup("SWEEP_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.sweep_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid SWEEP_INTERVAL_SECS, using default"),
            }
        }

        if let Some(rate) = parse_positive(&lookup, "RATE_LIMIT_PER_SEC") {
            config.rate_limit_per_sec = rate;
        }

        if let Some(burst) = parse_positive(&lookup, "RATE_LIMIT_BURST") {
            config.rate_limit_burst = burst;
        }

        if let Some(rate) = parse_positive(&lookup, "SUBSCRIBE_RATE_LIMIT_PER_SEC") {
            config.subscribe_rate_limit_per_sec = rate;
        }

        if let Some(burst) = parse_positive(&lookup, "SUBSCRIBE_RATE_LIMIT_BURST") {
            config.subscribe_rate_limit_burst = burst;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_positive<F>(lookup: &F, key: &str) -> Option<f64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Some(v),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid rate limit setting, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.push_transport, PushTransportKind::Disabled);
        assert_eq!(config.sweep_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("INSTANCE_NAME", "Downtown"),
            ("PUSH_TRANSPORT", "LOG"),
            ("SWEEP_INTERVAL_SECS", "60"),
            ("RATE_LIMIT_PER_SEC", "5"),
            ("RATE_LIMIT_BURST", "20"),
            ("SUBSCRIBE_RATE_LIMIT_PER_SEC", "0.5"),
            ("SUBSCRIBE_RATE_LIMIT_BURST", "2"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.instance_name, "Downtown");
        assert_eq!(config.push_transport, PushTransportKind::Log);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.rate_limit_per_sec, 5.0);
        assert_eq!(config.rate_limit_burst, 20.0);
        assert_eq!(config.subscribe_rate_limit_per_sec, 0.5);
        assert_eq!(config.subscribe_rate_limit_burst, 2.0);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("PUSH_TRANSPORT", "carrier-pigeon"),
            ("SWEEP_INTERVAL_SECS", "0"),
            ("RATE_LIMIT_PER_SEC", "-1"),
            ("SUBSCRIBE_RATE_LIMIT_BURST", "lots"),
        ]);
        let default = ServerConfig::default();
        assert_eq!(config.http_addr, default.http_addr);
        assert_eq!(config.push_transport, PushTransportKind::Disabled);
        assert_eq!(config.sweep_interval, default.sweep_interval);
        assert_eq!(config.rate_limit_per_sec, default.rate_limit_per_sec);
        assert_eq!(config.subscribe_rate_limit_burst, default.subscribe_rate_limit_burst);
    }
}
