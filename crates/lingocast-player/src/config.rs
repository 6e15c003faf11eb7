use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use lingocast_core::{OrchestratorConfig, QueueConfig};
use lingocast_media::ViewerConfig;
use lingocast_models::Language;
use lingocast_util::validation::{validate_backend_url, validate_language};
use lingocast_ws::{ChannelConfig, DEFAULT_BACKEND_URL};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub viewer: ViewerSection,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BackendConfig {
    /// WebSocket endpoint of the translation backend.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PlayerConfig {
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default = "default_transcript_lines")]
    pub transcript_lines: usize,
    /// Pending narration clips kept before the oldest is dropped (0 = unbounded).
    #[serde(default)]
    pub max_pending_fragments: usize,
    #[serde(default = "default_fragment_timeout")]
    pub fragment_timeout_secs: u64,
    /// Play narration through the default output device.
    #[serde(default = "default_true")]
    pub audio: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            transcript_lines: default_transcript_lines(),
            max_pending_fragments: 0,
            fragment_timeout_secs: default_fragment_timeout(),
            audio: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ViewerSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Video player program; mpv, ffplay or vlc from PATH when unset.
    pub command: Option<String>,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for ViewerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_ws_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_language() -> String {
    Language::default().code().to_string()
}
fn default_transcript_lines() -> usize {
    10
}
fn default_fragment_timeout() -> u64 {
    60
}
fn default_probe_timeout() -> u64 {
    10
}

fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# Lingocast Player Configuration
# Generated automatically on first run. Edit as needed.

[backend]
ws_url = "{ws_url}"
connect_timeout_secs = {connect_timeout}

[player]
# One of: mr, hi, ta, te, bn, gu, kn, ml, pa, ur
default_language = "{language}"
transcript_lines = {transcript_lines}
# 0 keeps every narration clip; otherwise the oldest pending clip is dropped.
max_pending_fragments = {max_pending}
fragment_timeout_secs = {fragment_timeout}
audio = {audio}

[viewer]
enabled = {viewer_enabled}
# command = "mpv"
probe_timeout_secs = {probe_timeout}
"#,
        ws_url = config.backend.ws_url,
        connect_timeout = config.backend.connect_timeout_secs,
        language = config.player.default_language,
        transcript_lines = config.player.transcript_lines,
        max_pending = config.player.max_pending_fragments,
        fragment_timeout = config.player.fragment_timeout_secs,
        audio = config.player.audio,
        viewer_enabled = config.viewer.enabled,
        probe_timeout = config.viewer.probe_timeout_secs,
    )
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content).with_context(|| format!("invalid config file '{path}'"))?
        } else {
            tracing::info!(
                "Config file not found at '{}', generating defaults...",
                path
            );
            let config = Config::default();

            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(path, generate_config_template(&config))?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };

        // Environment variable overrides
        if let Ok(value) = std::env::var("LINGOCAST_WS_URL") {
            config.backend.ws_url = value;
        }
        if let Ok(value) = std::env::var("LINGOCAST_LANG") {
            config.player.default_language = value;
        }
        if let Ok(value) = std::env::var("LINGOCAST_VIEWER") {
            let normalized = value.trim().to_ascii_lowercase();
            match normalized.as_str() {
                "" => {}
                "0" | "false" | "off" | "none" => config.viewer.enabled = false,
                _ => {
                    config.viewer.enabled = true;
                    config.viewer.command = Some(value.trim().to_string());
                }
            }
        }

        Ok(config)
    }

    pub fn default_language(&self) -> Result<Language> {
        validate_language(&self.player.default_language)
            .context("invalid player.default_language")
    }

    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig> {
        let endpoint =
            validate_backend_url(&self.backend.ws_url).context("invalid backend.ws_url")?;
        Ok(OrchestratorConfig {
            channel: ChannelConfig {
                endpoint: endpoint.to_string(),
                connect_timeout: Duration::from_secs(self.backend.connect_timeout_secs.max(1)),
                ..ChannelConfig::default()
            },
            queue: QueueConfig {
                max_pending: match self.player.max_pending_fragments {
                    0 => None,
                    n => Some(n),
                },
                fragment_timeout: Duration::from_secs(self.player.fragment_timeout_secs.max(1)),
            },
            transcript_lines: self.player.transcript_lines,
        })
    }

    pub fn viewer_config(&self) -> ViewerConfig {
        ViewerConfig {
            enabled: self.viewer.enabled,
            command: self.viewer.command.clone(),
            probe_timeout: Duration::from_secs(self.viewer.probe_timeout_secs.max(1)),
        }
    }
}
