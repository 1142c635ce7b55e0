use std::fs;
use std::path::Path;
use std::time::Duration;

use mreye_core::{ConfigError, ScreenGeometry};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Everything a session needs that is not part of the block sequence. Every field
/// has a default matching the recording rig, so an empty JSON object is a valid
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub display: DisplayConfig,
    pub acquisition: AcquisitionConfig,
    pub eye: EyeCalibration,
    pub reward: RewardConfig,
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let text = fs::read_to_string(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| SessionError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the acquisition, reward and display loops cannot run
    /// with, before any of them starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let acquisition = &self.acquisition;
        check(
            "acquisition.sampling_rate",
            acquisition.sampling_rate,
            "a finite rate above 0",
            |v| v.is_finite() && v > 0.0,
        )?;
        check(
            "acquisition.chunk_size",
            acquisition.chunk_size as f64,
            "at least 1",
            |v| v >= 1.0,
        )?;
        check(
            "acquisition.trigger_threshold",
            acquisition.trigger_threshold,
            "a finite voltage",
            f64::is_finite,
        )?;
        check(
            "acquisition.tr_interval_s",
            acquisition.tr_interval_s,
            "a finite interval above 0",
            |v| v.is_finite() && v > 0.0,
        )?;
        check(
            "acquisition.pulse_width_s",
            acquisition.pulse_width_s,
            "above 0 and shorter than tr_interval_s",
            |v| v > 0.0 && v < acquisition.tr_interval_s,
        )?;
        check(
            "display.frame_rate",
            self.display.frame_rate,
            "a finite rate above 0",
            |v| v.is_finite() && v > 0.0,
        )?;
        check(
            "reward.duration_s",
            self.reward.duration_s,
            "a finite duration of at least 0",
            |v| v.is_finite() && v >= 0.0,
        )?;
        check(
            "reward.amplitude_v",
            self.reward.amplitude_v,
            "a finite voltage",
            f64::is_finite,
        )?;
        let eye = &self.eye;
        for (setting, value) in [
            ("eye.gain_x", eye.gain_x),
            ("eye.gain_y", eye.gain_y),
            ("eye.offset_x", eye.offset_x),
            ("eye.offset_y", eye.offset_y),
        ] {
            check(setting, value, "a finite number", f64::is_finite)?;
        }
        Ok(())
    }
}

fn check(
    setting: &'static str,
    value: f64,
    expected: &'static str,
    valid: impl FnOnce(f64) -> bool,
) -> Result<(), ConfigError> {
    if valid(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidSetting {
            setting,
            value,
            expected,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub subject: ScreenGeometry,
    pub frame_rate: f64,
    /// Second window mirroring the subject screen, `[x, y, width, height]`.
    pub experimenter_rect: Option<[i32; 4]>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            subject: ScreenGeometry::default(),
            frame_rate: 60.0,
            experimenter_rect: None,
        }
    }
}

impl DisplayConfig {
    pub const DEFAULT_EXPERIMENTER_RECT: [i32; 4] = [0, 0, 888, 500];

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub sampling_rate: f64,
    pub chunk_size: usize,
    pub trigger_threshold: f64,
    /// Simulated acquisition only: seconds between trigger pulses.
    pub tr_interval_s: f64,
    /// Simulated acquisition only: how long the trigger line stays low.
    pub pulse_width_s: f64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 2000.0,
            chunk_size: 50,
            trigger_threshold: 2.0,
            tr_interval_s: 2.0,
            pulse_width_s: 0.1,
        }
    }
}

impl AcquisitionConfig {
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_size as f64 / self.sampling_rate)
    }
}

/// Affine map from raw eye-tracker volts to degrees: `(raw + offset) * gain`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeCalibration {
    pub gain_x: f64,
    pub gain_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for EyeCalibration {
    fn default() -> Self {
        Self {
            gain_x: 10.0,
            gain_y: 10.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

impl EyeCalibration {
    pub fn to_degrees(&self, raw_x: f64, raw_y: f64) -> (f64, f64) {
        (
            (raw_x + self.offset_x) * self.gain_x,
            (raw_y + self.offset_y) * self.gain_y,
        )
    }

    /// Raw volts that map to the given position; used to synthesize gaze.
    pub fn to_raw(&self, deg_x: f64, deg_y: f64) -> (f64, f64) {
        (
            deg_x / self.gain_x - self.offset_x,
            deg_y / self.gain_y - self.offset_y,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Duration of each polarity of the pulse.
    pub duration_s: f64,
    pub amplitude_v: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            duration_s: 0.1,
            amplitude_v: 5.0,
        }
    }
}
