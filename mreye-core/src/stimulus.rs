use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Defines stimuli as they appear in a block definition.
///
/// Positions and sizes are in degrees of visual angle relative to the screen
/// centre; the renderer converts them to pixels once, when the stimulus is added
/// to the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StimulusSpec {
    Circle {
        x: f64,
        y: f64,
        #[serde(rename = "r")]
        radius: f64,
        #[serde(rename = "c")]
        color: [u8; 3],
        z: i32,
    },
    Video {
        path: String,
        x: f64,
        y: f64,
        z: i32,
        #[serde(rename = "loop", default = "default_loop")]
        looping: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fps: Option<f64>,
    },
    /// Any `type` tag this build does not know how to draw.
    #[serde(other)]
    Unsupported,
}

fn default_loop() -> bool {
    true
}

impl StimulusSpec {
    pub fn z(&self) -> i32 {
        match self {
            StimulusSpec::Circle { z, .. } | StimulusSpec::Video { z, .. } => *z,
            StimulusSpec::Unsupported => 0,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StimulusSpec::Circle { .. } => "circle",
            StimulusSpec::Video { .. } => "video",
            StimulusSpec::Unsupported => "unsupported",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StimulusSpec::Circle { radius, .. } if !(*radius >= 0.0) => {
                Err(ConfigError::InvalidRadius(*radius))
            }
            StimulusSpec::Video { fps: Some(fps), .. } if !(*fps > 0.0) => {
                Err(ConfigError::InvalidFrameRate(*fps))
            }
            StimulusSpec::Unsupported => Err(ConfigError::UnknownStimulusKind),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sequence_file_field_names() {
        let json = r#"[
            {"type": "circle", "x": 0, "y": 0, "c": [0, 0, 255], "r": 0.25, "z": 1},
            {"type": "video", "path": "stimuli/a", "x": 1.5, "y": -2, "z": 0}
        ]"#;
        let specs: Vec<StimulusSpec> = serde_json::from_str(json).unwrap();
        assert_eq!(
            specs[0],
            StimulusSpec::Circle {
                x: 0.0,
                y: 0.0,
                radius: 0.25,
                color: [0, 0, 255],
                z: 1
            }
        );
        match &specs[1] {
            StimulusSpec::Video { looping, fps, .. } => {
                assert!(*looping, "video loops unless told otherwise");
                assert_eq!(*fps, None);
            }
            other => panic!("expected video, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_kept_as_unsupported() {
        let spec: StimulusSpec =
            serde_json::from_str(r#"{"type": "rectangle", "x": 0, "y": 0}"#).unwrap();
        assert_eq!(spec, StimulusSpec::Unsupported);
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::UnknownStimulusKind)
        ));
    }

    #[test]
    fn negative_radius_is_rejected() {
        let spec = StimulusSpec::Circle {
            x: 0.0,
            y: 0.0,
            radius: -1.0,
            color: [255, 255, 255],
            z: 0,
        };
        assert!(spec.validate().is_err());
    }
}
