use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::SettingsError,
    interpolation::{DEFAULT_SMOOTH_RADIUS, InterpolatorKind},
    mesh::{ColorRamp, MAX_QUALITY, ViewMode},
};

/// Process-wide engine configuration, injected into the scene at startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Quality used for new models and reloads that do not name one.
    pub quality: u8,
    /// Frames to wait after raising the loading flag before heavy work is
    /// dispatched, so that one frame showing the loading state is rendered.
    pub frame_delay: u32,
    /// Interpolator answering cursor height queries.
    pub height_lookup: InterpolatorKind,
    pub smooth_radius: usize,
    pub undo_enabled: bool,
    pub view_mode: ViewMode,
    pub color_ramp: Option<ColorRamp>,
    /// `tracing_subscriber::EnvFilter` directive used by the binaries when
    /// `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: 0,
            frame_delay: 2,
            height_lookup: InterpolatorKind::Linear,
            smooth_radius: DEFAULT_SMOOTH_RADIUS,
            undo_enabled: true,
            view_mode: ViewMode::Map2d,
            color_ramp: None,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str::<Settings>(text)?.sanitized())
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_yaml::from_str::<Settings>(text)?.sanitized())
    }

    /// Loads a `.json`, `.yaml` or `.yml` settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    fn sanitized(mut self) -> Self {
        self.quality = self.quality.min(MAX_QUALITY);
        self.smooth_radius = self.smooth_radius.max(1);
        self
    }
}
