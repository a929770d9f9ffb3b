use crate::audio::{RoutingOptions, VirtualSinkSpec};
use crate::global;
use crate::video::CameraOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub framerate: u32,
    /// v4l2loopback device number (`/dev/video<N>`)
    pub device: u32,
    pub card_label: String,
    pub border: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub mic_sink_name: String,
    /// Spaces are replaced with underscores; pactl rejects them
    pub mic_sink_description: String,
    pub app_sink_name: String,
    pub app_sink_description: String,
    /// Sink the application sink mirrors to, next to the mic sink
    pub default_sink: String,
    /// Binary name of the recording application whose input gets pinned
    /// to the virtual microphone. Empty disables the watch.
    pub recording_target: String,
    pub watch_interval_ms: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            framerate: 60,
            device: 50,
            card_label: "Mon2Cam".to_string(),
            border: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mic_sink_name: "VirtualSinkMIC".to_string(),
            mic_sink_description: "Mon2Cam_microphone_sink".to_string(),
            app_sink_name: "VirtualSinkAPP".to_string(),
            app_sink_description: "Mon2Cam_application_sink".to_string(),
            default_sink: "@DEFAULT_SINK@".to_string(),
            recording_target: "Discord".to_string(),
            watch_interval_ms: 2000,
        }
    }
}

impl AudioConfig {
    pub fn routing_options(&self) -> RoutingOptions {
        let target = self.recording_target.trim();
        RoutingOptions {
            mic_sink: VirtualSinkSpec {
                name: self.mic_sink_name.clone(),
                description: self.mic_sink_description.clone(),
            },
            app_sink: VirtualSinkSpec {
                name: self.app_sink_name.clone(),
                description: self.app_sink_description.clone(),
            },
            default_sink: self.default_sink.clone(),
            recording_target: (!target.is_empty()).then(|| target.to_string()),
            watch_interval: Duration::from_millis(self.watch_interval_ms.max(100)),
        }
    }
}

impl VideoConfig {
    pub fn camera_options(&self) -> CameraOptions {
        CameraOptions {
            framerate: self.framerate,
            device: self.device,
            card_label: self.card_label.clone(),
            border: self.border,
            ..Default::default()
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load `config_path`, writing the defaults there first if it is missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config, Config::default());
        assert!(path.exists());
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[audio]\nrecording_target = \"zoom\"\nwatch_interval_ms = 500\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.audio.recording_target, "zoom");
        assert_eq!(config.audio.mic_sink_name, "VirtualSinkMIC");
        assert_eq!(config.video.device, 50);
        let routing = config.audio.routing_options();
        assert_eq!(routing.watch_interval, Duration::from_millis(500));
        assert_eq!(routing.recording_target.as_deref(), Some("zoom"));
    }

    #[test]
    fn test_empty_recording_target_disables_watch() {
        let audio = AudioConfig {
            recording_target: "  ".to_string(),
            ..Default::default()
        };
        assert!(audio.routing_options().recording_target.is_none());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[video]\nframerate = \"fast\"\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
