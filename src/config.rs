// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use log::info;
use serde::{Deserialize, Serialize};
use crate::drivers::buffer::{CropRegion, Resolution};
use crate::drivers::ffmpeg::FfmpegTools;
use crate::drivers::plot::PlotStyle;
use crate::error::{OverlayError, Result};
use crate::render::{GraphLayer, OverlayLayout};
use crate::sync::DataExhaustedPolicy;
/// One overlay job, usually read from a JSON file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSpec {
    pub measurement_path: PathBuf,
    pub video_path: PathBuf,
    pub output_path: PathBuf,
    /// Video stream to decode; the first video stream when unset.
    pub stream_index: Option<usize>,
    /// Seconds cut from the start of the video. Frames keep their original
    /// video time for the data lookup, so this does not shift the data clock.
    pub trim_offset: f64,
    pub crop: Option<CropRegion>,
    pub operator: Option<String>,
    pub sample_id: Option<String>,
    pub calibration: CalibrationSettings,
    pub overlay: OverlaySettings,
    /// Writes the loaded series as CSV before rendering.
    pub export_csv: Option<PathBuf>,
    pub on_data_exhausted: DataExhaustedPolicy,
    pub tools: FfmpegTools,
}
/// Job-level replacement for the calibration stored in the measurement file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub enabled: Option<bool>,
    /// `[a0, a1, a2, a3]`, lowest degree first.
    pub coefficients: Option<[f64; 4]>,
}
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub layout: OverlayLayout,
    /// Adds the `dT/dt` text line (calibrated series only).
    pub show_rate: bool,
    pub additional_text: Option<String>,
    pub rate: RateSettings,
    pub logo: LogoSettings,
    pub graph: GraphSettings,
}
/// Rolling-mean windows, in samples, for the temperature rate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateSettings {
    pub value_window: usize,
    pub rate_window: usize,
}
impl Default for RateSettings {
    fn default() -> Self {
        Self {
            value_window: 5,
            rate_window: 5,
        }
    }
}
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoSettings {
    /// PNG drawn unscaled in the bottom-right corner.
    pub path: Option<PathBuf>,
}
impl LogoSettings {
    pub fn load(&self) -> Result<Option<image::RgbaImage>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let logo = image::open(path)
            .map_err(|e| OverlayError::Config(format!("cannot load logo {path:?}: {e}")))?
            .to_rgba8();
        info!("Logo {:?}: {}x{}", path, logo.width(), logo.height());
        Ok(Some(logo))
    }
}
/// Scrolling `dT/dt` graph, sized relative to the output frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub enabled: bool,
    pub width_ratio: f64,
    pub height_ratio: f64,
    /// Seconds of history shown.
    pub time_window: f64,
    pub style: PlotStyle,
}
impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            width_ratio: 0.3,
            height_ratio: 0.25,
            time_window: 30.0,
            style: PlotStyle::default(),
        }
    }
}
impl GraphSettings {
    pub fn layer(&self, output: Resolution) -> Option<GraphLayer> {
        if !self.enabled {
            return None;
        }
        Some(GraphLayer {
            width: (output.width as f64 * self.width_ratio).round() as u32,
            height: (output.height as f64 * self.height_ratio).round() as u32,
            style: self.style.clone(),
        })
    }
}
fn invalid(message: impl Into<String>) -> OverlayError {
    OverlayError::Config(message.into())
}
impl JobSpec {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| invalid(format!("cannot read job file {path:?}: {e}")))?;
        let spec: JobSpec = serde_json::from_str(&text)
            .map_err(|e| invalid(format!("job file {path:?}: {e}")))?;
        spec.validate()?;
        Ok(spec)
    }
    /// Rejects settings that would only fail later, mid-run.
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("measurement_path", &self.measurement_path),
            ("video_path", &self.video_path),
            ("output_path", &self.output_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(invalid(format!("{name} is required")));
            }
        }
        if self.output_path == self.video_path {
            return Err(invalid("output_path must differ from video_path"));
        }
        if !self.trim_offset.is_finite() || self.trim_offset < 0.0 {
            return Err(invalid(format!(
                "trim_offset must be a finite number of seconds >= 0, got {}",
                self.trim_offset
            )));
        }
        if let Some(crop) = &self.crop {
            if crop.width == 0 || crop.height == 0 {
                return Err(invalid(format!("crop {crop} is empty")));
            }
        }
        if let Some(coeffs) = &self.calibration.coefficients {
            if coeffs.iter().any(|c| !c.is_finite()) {
                return Err(invalid("calibration coefficients must be finite"));
            }
        }
        let layout = &self.overlay.layout;
        if !(1..=3).contains(&layout.time_precision) {
            return Err(invalid(format!(
                "time_precision must be between 1 and 3, got {}",
                layout.time_precision
            )));
        }
        if layout.large_font_px == 0 || layout.small_font_px == 0 {
            return Err(invalid("font sizes must be positive"));
        }
        let rate = &self.overlay.rate;
        if rate.value_window == 0 || rate.rate_window == 0 {
            return Err(invalid("rate windows must be at least one sample"));
        }
        let graph = &self.overlay.graph;
        if graph.enabled {
            let ratio_ok = |r: f64| r > 0.0 && r <= 1.0;
            if !ratio_ok(graph.width_ratio) || !ratio_ok(graph.height_ratio) {
                return Err(invalid("graph ratios must be in (0, 1]"));
            }
            if !(graph.time_window.is_finite() && graph.time_window > 0.0) {
                return Err(invalid("graph time_window must be positive"));
            }
        }
        Ok(())
    }
}
