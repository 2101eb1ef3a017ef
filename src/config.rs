use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::scoring::ScoringConfig;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the scoring server listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Pose estimation model file
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// Baseline snapshot file, persisted on install and preloaded on start
    #[serde(default = "default_baseline_path")]
    pub baseline_path: String,
    /// Extra per-frame logging
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Scoring server address
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Directory of frames to stream
    #[serde(default = "default_frames_dir")]
    pub frames_dir: String,
    /// Capture tick rate (Hz)
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Outbound frames downsampled to at most this width
    #[serde(default = "default_max_send_width")]
    pub max_send_width: u32,
    /// JPEG quality for outbound frames
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Request the server-side comparison overlay
    #[serde(default)]
    pub want_overlay: bool,
}

fn default_listen_addr() -> String { "0.0.0.0:9610".to_string() }
fn default_model_path() -> String { "models/movenet_lightning.onnx".to_string() }
fn default_baseline_path() -> String { "baseline.json".to_string() }
fn default_server_addr() -> String { "127.0.0.1:9610".to_string() }
fn default_frames_dir() -> String { "frames".to_string() }
fn default_tick_hz() -> u32 { 60 }
fn default_max_send_width() -> u32 { 640 }
fn default_jpeg_quality() -> u8 { 70 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            model_path: default_model_path(),
            baseline_path: default_baseline_path(),
            verbose: false,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            frames_dir: default_frames_dir(),
            tick_hz: default_tick_hz(),
            max_send_width: default_max_send_width(),
            jpeg_quality: default_jpeg_quality(),
            want_overlay: false,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.scoring.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }
}
