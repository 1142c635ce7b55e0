use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::stimulus::StimulusSpec;

/// Gaze criterion a block's trigger cycles are scored against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixationCriterion {
    #[serde(rename = "x")]
    pub target_x: f64,
    #[serde(rename = "y")]
    pub target_y: f64,
    pub radius: f64,
    #[serde(rename = "proportion")]
    pub min_proportion: f64,
}

/// One phase of the session: shown until `trigger_target` trigger pulses have
/// completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    #[serde(rename = "n_triggers")]
    pub trigger_target: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stimuli: Vec<StimulusSpec>,
    #[serde(
        rename = "fixation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fixation_criterion: Option<FixationCriterion>,
}

impl Block {
    pub fn new(name: impl Into<String>, trigger_target: u32) -> Self {
        Self {
            name: name.into(),
            trigger_target,
            stimuli: Vec::new(),
            fixation_criterion: None,
        }
    }

    pub fn with_stimulus(mut self, stimulus: StimulusSpec) -> Self {
        self.stimuli.push(stimulus);
        self
    }

    pub fn with_fixation(mut self, criterion: FixationCriterion) -> Self {
        self.fixation_criterion = Some(criterion);
        self
    }

    /// Rejects definitions that could never run correctly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check().map_err(|source| ConfigError::InBlock {
            block: self.name.clone(),
            source: Box::new(source),
        })
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.trigger_target == 0 {
            return Err(ConfigError::ZeroTriggerTarget(self.name.clone()));
        }
        if let Some(criterion) = &self.fixation_criterion {
            if !(0.0..=1.0).contains(&criterion.min_proportion) {
                return Err(ConfigError::InvalidProportion(criterion.min_proportion));
            }
            if !(criterion.radius >= 0.0) {
                return Err(ConfigError::InvalidRadius(criterion.radius));
            }
        }
        self.stimuli.iter().try_for_each(StimulusSpec::validate)
    }
}
