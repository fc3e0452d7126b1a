use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SNAP_ORIGIN: &str = "local:http://localhost:8080";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSettings {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_snap_origin")]
    pub snap_origin: String,
    #[serde(default)]
    pub snap_version_hint: Option<String>,
    #[serde(default)]
    pub bridge: BridgeSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeSettings {
    #[serde(default = "default_bridge_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub extra_env: HashMap<String, String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            snap_origin: default_snap_origin(),
            snap_version_hint: None,
            bridge: BridgeSettings::default(),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            command: default_bridge_command(),
            args: Vec::new(),
            extra_env: HashMap::new(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl BridgeSettings {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            ..Self::default()
        }
    }
}

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join("session.json")
}

pub fn load_settings(config_dir: &Path) -> Result<SessionSettings> {
    let path = settings_path(config_dir);
    if !path.exists() {
        return Ok(SessionSettings::default());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("read session settings: {}", path.display()))?;
    let settings: SessionSettings = serde_json::from_str(&raw)
        .with_context(|| format!("parse session settings: {}", path.display()))?;
    Ok(settings)
}

pub fn save_settings(config_dir: &Path, settings: &SessionSettings) -> Result<()> {
    let path = settings_path(config_dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config dir: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(&path, json)
        .with_context(|| format!("write session settings: {}", path.display()))?;
    Ok(())
}

const fn default_schema_version() -> u32 {
    1
}

fn default_snap_origin() -> String {
    DEFAULT_SNAP_ORIGIN.to_string()
}

fn default_bridge_command() -> String {
    #[cfg(target_os = "windows")]
    let bridge_binary = "snapwire-wallet-worker.exe";
    #[cfg(not(target_os = "windows"))]
    let bridge_binary = "snapwire-wallet-worker";

    std::env::var("SNAPWIRE_WALLET_BRIDGE_BIN")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| bridge_binary.to_string())
}

const fn default_poll_interval_ms() -> u64 {
    10
}
