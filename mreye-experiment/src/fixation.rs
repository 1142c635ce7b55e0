use mreye_core::FixationCriterion;

use crate::config::EyeCalibration;

/// Counts of gaze samples since the last trigger edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixationAccumulator {
    pub fixated_samples: u64,
    pub total_samples: u64,
}

/// Scores how well gaze stayed on target during one trigger cycle.
#[derive(Debug, Clone)]
pub struct FixationEvaluator {
    calibration: EyeCalibration,
    counts: FixationAccumulator,
}

impl FixationEvaluator {
    pub fn new(calibration: EyeCalibration) -> Self {
        Self {
            calibration,
            counts: FixationAccumulator::default(),
        }
    }

    pub fn accumulate(&mut self, gaze_x: &[f64], gaze_y: &[f64], criterion: &FixationCriterion) {
        let fixated = gaze_x
            .iter()
            .zip(gaze_y)
            .filter(|&(&raw_x, &raw_y)| {
                let (x, y) = self.calibration.to_degrees(raw_x, raw_y);
                (x - criterion.target_x).hypot(y - criterion.target_y) <= criterion.radius
            })
            .count();
        self.counts.fixated_samples += fixated as u64;
        self.counts.total_samples += gaze_x.len().min(gaze_y.len()) as u64;
    }

    /// Fraction of samples on target; 0 when nothing has been observed.
    pub fn evaluate(&self) -> f64 {
        if self.counts.total_samples == 0 {
            return 0.0;
        }
        self.counts.fixated_samples as f64 / self.counts.total_samples as f64
    }

    /// Whether the current cycle earns a reward. An empty cycle never does.
    pub fn meets(&self, criterion: &FixationCriterion) -> bool {
        self.counts.total_samples > 0 && self.evaluate() >= criterion.min_proportion
    }

    pub fn counts(&self) -> FixationAccumulator {
        self.counts
    }

    pub fn reset(&mut self) {
        self.counts = FixationAccumulator::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(min_proportion: f64) -> FixationCriterion {
        FixationCriterion {
            target_x: 0.0,
            target_y: 0.0,
            radius: 5.0,
            min_proportion,
        }
    }

    #[test]
    fn empty_cycle_scores_zero() {
        let evaluator = FixationEvaluator::new(EyeCalibration::default());
        assert_eq!(evaluator.evaluate(), 0.0);
        assert!(!evaluator.meets(&criterion(0.0)));
    }

    #[test]
    fn counts_samples_inside_radius_after_calibration() {
        let mut evaluator = FixationEvaluator::new(EyeCalibration::default());
        // gain 10: 0.3 V -> 3 deg (inside), 0.6 V -> 6 deg (outside), 0.5 V -> 5 deg (on edge)
        evaluator.accumulate(&[0.0, 0.3, 0.6, 0.5], &[0.0, 0.0, 0.0, 0.0], &criterion(0.5));
        assert_eq!(
            evaluator.counts(),
            FixationAccumulator {
                fixated_samples: 3,
                total_samples: 4
            }
        );
        assert_eq!(evaluator.evaluate(), 0.75);
    }

    #[test]
    fn accumulates_across_chunks_until_reset() {
        let mut evaluator = FixationEvaluator::new(EyeCalibration::default());
        let c = criterion(0.8);
        evaluator.accumulate(&[0.0; 10], &[0.0; 10], &c);
        evaluator.accumulate(&[1.0; 10], &[1.0; 10], &c);
        assert_eq!(evaluator.evaluate(), 0.5);
        assert!(!evaluator.meets(&c));

        evaluator.reset();
        evaluator.accumulate(&[0.0; 9], &[0.0; 9], &c);
        evaluator.accumulate(&[1.0], &[1.0], &c);
        assert!((evaluator.evaluate() - 0.9).abs() < 1e-12);
        assert!(evaluator.meets(&c));
    }

    #[test]
    fn offset_target_uses_euclidean_distance() {
        let mut evaluator = FixationEvaluator::new(EyeCalibration {
            gain_x: 1.0,
            gain_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        });
        let c = FixationCriterion {
            target_x: 3.0,
            target_y: 4.0,
            radius: 1.0,
            min_proportion: 1.0,
        };
        evaluator.accumulate(&[3.0, 0.0, 3.5], &[4.0, 0.0, 4.5], &c);
        assert_eq!(evaluator.counts().fixated_samples, 2);
        let counts = evaluator.counts();
        assert!(counts.fixated_samples <= counts.total_samples);
    }
}
