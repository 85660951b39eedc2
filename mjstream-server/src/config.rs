//! Server configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use mjstream_core::{FrameSpec, SessionConfig};

/// Top-level configuration for the streaming server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Frame geometry and encoding.
    pub video: VideoConfig,
    /// Pipeline tuning.
    pub pipeline: PipelineConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Listen address (IP:port).
    pub listen_addr: String,
}

/// Frame geometry and encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Frame width in pixels. Must be even (2×2 tile grid).
    pub width: u32,
    /// Frame height in pixels. Must be even.
    pub height: u32,
    /// Seconds per clock-hand revolution.
    pub spin_duration_sec: u32,
    /// JPEG quality, 1..=100.
    pub quality: u8,
    /// Optional background image path. Empty = flat sky fill.
    pub background: String,
}

/// Pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frame workers per session.
    pub worker_count: usize,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            video: VideoConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7333".into(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        // 2/3 scale of 1080p.
        Self {
            width: 1280,
            height: 720,
            spin_duration_sec: 1,
            quality: 90,
            background: String::new(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { worker_count: 3 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The per-session settings this configuration describes.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            spec: FrameSpec::new(self.video.width, self.video.height, self.video.spin_duration_sec),
            worker_count: self.pipeline.worker_count,
            quality: self.video.quality,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
