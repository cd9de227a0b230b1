//! Configuration types for the parley pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the voice turn-taking pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Reply-generation service settings.
    pub reply: ReplyConfig,
    /// Speech synthesis service settings.
    pub synthesis: SynthesisConfig,
    /// Self-echo suppression settings.
    pub echo_guard: EchoGuardConfig,
    /// Audio output settings.
    pub audio: AudioConfig,
    /// Speech recognizer settings forwarded to the host.
    pub recognizer: RecognizerConfig,
}

/// Reply-generation (streaming LLM) service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// Endpoint accepting `{ query, inputs, user }` and answering with an event stream.
    pub url: String,
    /// Caller identity forwarded as `user`.
    pub user: String,
    /// Upper bound on connecting and receiving response headers, in seconds.
    pub connect_timeout_secs: u64,
    /// Extra variables forwarded as `inputs`.
    pub inputs: serde_json::Map<String, serde_json::Value>,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8888/api/dify-stream".to_owned(),
            user: "web-user".to_owned(),
            connect_timeout_secs: 30,
            inputs: serde_json::Map::new(),
        }
    }
}

/// Speech synthesis service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Endpoint accepting `{ text, voice? }` and answering with audio bytes.
    pub url: String,
    /// Preferred voice name; omitted from requests when unset.
    pub voice: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8888/api/azure-tts".to_owned(),
            voice: None,
            timeout_secs: 30,
        }
    }
}

/// Echo guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoGuardConfig {
    /// How long speech-start events are ignored after playback begins.
    pub window_ms: u64,
}

impl Default for EchoGuardConfig {
    fn default() -> Self {
        Self { window_ms: 1200 }
    }
}

impl EchoGuardConfig {
    /// The suppression window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Audio output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name. `None` uses the system default.
    pub output_device: Option<String>,
    /// Hand undecodable audio to an external player before giving up.
    pub fallback_player: bool,
    /// Explicit fallback player command. `None` probes well-known players on `PATH`.
    pub fallback_command: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_device: None,
            fallback_player: true,
            fallback_command: None,
        }
    }
}

/// Speech recognizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// BCP-47 language tag for recognition.
    pub language: String,
    /// Ask the recognizer for interim (non-final) hypotheses.
    pub interim_results: bool,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            language: "zh-CN".to_owned(),
            interim_results: false,
        }
    }
}

impl SpeechConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::error::SpeechError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SpeechError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that both collaborator endpoints are usable.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Config`](crate::error::SpeechError::Config) naming the bad field.
    pub fn validate(&self) -> crate::error::Result<()> {
        for (field, url) in [("reply.url", &self.reply.url), ("synthesis.url", &self.synthesis.url)] {
            let trimmed = url.trim();
            if trimmed.is_empty() {
                return Err(crate::error::SpeechError::Config(format!("{field} is empty")));
            }
            if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                return Err(crate::error::SpeechError::Config(format!(
                    "{field} must be an http(s) URL, got {trimmed}"
                )));
            }
        }
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/parley/config.toml`.
    pub fn default_config_path() -> PathBuf {
        config_dir().join("config.toml")
    }
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/parley/` by default. Override with
/// the `PARLEY_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("PARLEY_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("parley"))
        .unwrap_or_else(|| PathBuf::from("/tmp/parley-config"))
}
