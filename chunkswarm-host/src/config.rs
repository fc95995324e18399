//! Load config from file and environment.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Host configuration. File: ~/.config/chunkswarm/config.toml or /etc/chunkswarm/config.toml.
/// Env overrides: CHUNKSWARM_INTERESTED_TIMEOUT_MS, CHUNKSWARM_REQUEST_TIMEOUT_MS,
/// CHUNKSWARM_ORIGIN_URL.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Coordinator tuning (`[swarm]` table).
    pub swarm: chunkswarm_core::Config,
    /// Base URL used when the swarm cannot deliver. No fallback when unset.
    pub origin_url: Option<String>,
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> HostConfig {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

/// Parse one config file.
pub fn load_from(path: &Path) -> anyhow::Result<HostConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))
}

fn apply_env(c: &mut HostConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(ms) = var("CHUNKSWARM_INTERESTED_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
        c.swarm.interested_timeout_ms = ms;
    }
    if let Some(ms) = var("CHUNKSWARM_REQUEST_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
        c.swarm.request_timeout_ms = ms;
    }
    if let Some(url) = var("CHUNKSWARM_ORIGIN_URL") {
        c.origin_url = Some(url);
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/chunkswarm/config.toml"));
    }
    out.push(PathBuf::from("/etc/chunkswarm/config.toml"));
    out
}

fn load_file() -> Option<HostConfig> {
    // Only the first existing file is considered.
    let path = config_paths().into_iter().find(|p| p.exists())?;
    match load_from(&path) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!("ignoring config: {e:#}");
            None
        }
    }
}
