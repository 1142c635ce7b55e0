use crate::error::ConfigError;

/// Number of analog input channels: horizontal gaze, vertical gaze, trigger.
pub const CHANNELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    GazeX = 0,
    GazeY = 1,
    Trigger = 2,
}

/// A 3 × N block of analog samples, stored channel-major.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogSampleChunk {
    data: Vec<f64>,
    len: usize,
}

impl AnalogSampleChunk {
    pub fn new(gaze_x: &[f64], gaze_y: &[f64], trigger: &[f64]) -> Result<Self, ConfigError> {
        let len = trigger.len();
        if gaze_x.len() != len || gaze_y.len() != len {
            return Err(ConfigError::ChunkShape {
                gaze_x: gaze_x.len(),
                gaze_y: gaze_y.len(),
                trigger: len,
            });
        }
        let mut data = Vec::with_capacity(len * CHANNELS);
        data.extend_from_slice(gaze_x);
        data.extend_from_slice(gaze_y);
        data.extend_from_slice(trigger);
        Ok(Self { data, len })
    }

    /// Builds a chunk from an already channel-major buffer of `CHANNELS * len` values.
    pub fn from_channel_major(data: Vec<f64>) -> Result<Self, ConfigError> {
        if data.len() % CHANNELS != 0 {
            let len = data.len() / CHANNELS;
            return Err(ConfigError::ChunkShape {
                gaze_x: len,
                gaze_y: len,
                trigger: data.len() - 2 * len,
            });
        }
        let len = data.len() / CHANNELS;
        Ok(Self { data, len })
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn channel(&self, channel: Channel) -> &[f64] {
        let start = channel as usize * self.len;
        &self.data[start..start + self.len]
    }

    pub fn gaze_x(&self) -> &[f64] {
        self.channel(Channel::GazeX)
    }

    pub fn gaze_y(&self) -> &[f64] {
        self.channel(Channel::GazeY)
    }

    pub fn trigger(&self) -> &[f64] {
        self.channel(Channel::Trigger)
    }

    /// The whole chunk, channel-major.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}
