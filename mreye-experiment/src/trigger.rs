//! Trigger-line edge detection.
//!
//! The trigger channel idles high and drops low for each scanner pulse. A chunk is
//! expected to be short compared to the pulse width, so it holds at most one edge
//! of each direction. Extra crossings are not reported as edges; they are counted
//! so the caller can flag the violated assumption.

/// Logic level of the trigger line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerLevel {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeEvent {
    Falling,
    Rising,
}

/// Edges found in one chunk, in sample order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkEdges {
    pub events: Vec<EdgeEvent>,
    /// Threshold crossings past the first edge of each direction.
    pub suppressed: usize,
}

#[derive(Debug, Clone)]
pub struct TriggerEdgeDetector {
    threshold: f64,
    level: TriggerLevel,
}

impl TriggerEdgeDetector {
    pub const DEFAULT_THRESHOLD: f64 = 2.0;

    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            level: TriggerLevel::High,
        }
    }

    pub fn level(&self) -> TriggerLevel {
        self.level
    }

    pub fn observe(&mut self, trigger: &[f64]) -> ChunkEdges {
        let mut edges = ChunkEdges::default();
        let mut fell = false;
        let mut rose = false;

        for &sample in trigger {
            match self.level {
                TriggerLevel::High if sample < self.threshold => {
                    self.level = TriggerLevel::Low;
                    if fell {
                        edges.suppressed += 1;
                    } else {
                        fell = true;
                        edges.events.push(EdgeEvent::Falling);
                    }
                }
                TriggerLevel::Low if sample > self.threshold => {
                    self.level = TriggerLevel::High;
                    if rose {
                        edges.suppressed += 1;
                    } else {
                        rose = true;
                        edges.events.push(EdgeEvent::Rising);
                    }
                }
                _ => {}
            }
        }

        // A suppressed crossing can leave the line on the other side of the
        // threshold than the last reported edge; keep the reported level.
        if edges.suppressed > 0 {
            self.level = match edges.events.last() {
                Some(EdgeEvent::Falling) => TriggerLevel::Low,
                Some(EdgeEvent::Rising) => TriggerLevel::High,
                None => self.level,
            };
        }
        edges
    }
}

impl Default for TriggerEdgeDetector {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}
