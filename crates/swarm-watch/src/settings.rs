use anyhow::{Context, Result};
use std::time::Duration;
use swarm_channel::{ChannelConfig, ReconnectPolicy, DEFAULT_CHANNEL_URL};
use url::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_LOG_DIR: &str = ".swarm/logs";
const DEFAULT_RECONNECT_MAX_SECS: u64 = 10;

/// Channel options as given on the command line; empty/zero means "not set".
#[derive(Debug, Clone, Default)]
pub struct ChannelFlags {
    pub url: String,
    pub max_frame_bytes: Option<usize>,
    pub reconnect: bool,
    pub reconnect_max_secs: u64,
}

pub fn channel_config(flags: &ChannelFlags) -> Result<ChannelConfig> {
    channel_config_with(flags, env_value)
}

pub fn resolve_api_url(flag: &str) -> Result<Url> {
    resolve_api_url_with(flag, env_value)
}

pub fn resolve_log_dir(flag: &str) -> String {
    resolve_string(flag, "SWARM_LOG_DIR", DEFAULT_LOG_DIR, env_value)
}

pub fn resolve_log_level() -> String {
    env_value("SWARM_LOG_LEVEL").unwrap_or_else(|| "info".to_string())
}

fn channel_config_with(
    flags: &ChannelFlags,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ChannelConfig> {
    let url = resolve_string(&flags.url, "SWARM_CHANNEL_URL", DEFAULT_CHANNEL_URL, &lookup);
    let mut config = ChannelConfig::parse(&url)?;

    let max_frame_bytes = match flags.max_frame_bytes {
        Some(value) => Some(value),
        None => lookup("SWARM_MAX_FRAME_BYTES")
            .map(|raw| {
                raw.trim()
                    .parse::<usize>()
                    .with_context(|| format!("invalid SWARM_MAX_FRAME_BYTES: {raw}"))
            })
            .transpose()?,
    };
    if let Some(value) = max_frame_bytes {
        config = config.with_max_frame_bytes(value)?;
    }

    let reconnect = flags.reconnect
        || lookup("SWARM_RECONNECT")
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(false);
    if reconnect {
        let max_secs = if flags.reconnect_max_secs > 0 {
            flags.reconnect_max_secs
        } else {
            match lookup("SWARM_RECONNECT_MAX_SECS") {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .with_context(|| format!("invalid SWARM_RECONNECT_MAX_SECS: {raw}"))?,
                None => DEFAULT_RECONNECT_MAX_SECS,
            }
        };
        let mut policy = ReconnectPolicy {
            max: Duration::from_secs(max_secs),
            ..ReconnectPolicy::default()
        };
        if policy.initial > policy.max {
            policy.initial = policy.max;
        }
        config = config.with_reconnect(Some(policy));
    }
    Ok(config)
}

fn resolve_api_url_with(flag: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Url> {
    let raw = resolve_string(flag, "SWARM_API_URL", DEFAULT_API_URL, lookup);
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid api url: {raw}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => anyhow::bail!("unsupported api url scheme '{other}' (expected http or https)"),
    }
}

fn resolve_string(
    flag: &str,
    key: &str,
    default: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
