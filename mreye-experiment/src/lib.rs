pub mod acquisition;
pub mod config;
pub mod error;
pub mod event_log;
pub mod fixation;
pub mod orchestrator;
pub mod reward;
pub mod scheduler;
pub mod sequence;
pub mod trigger;

pub use acquisition::{
    AcquisitionBoundary, AnalogRecorder, ReplayAcquisition, SimulatedAcquisition, SimulatedGaze,
    StopHandle,
};
pub use config::{AcquisitionConfig, DisplayConfig, EyeCalibration, RewardConfig, SessionConfig};
pub use error::SessionError;
pub use event_log::{EventLog, SessionEvent};
pub use fixation::{FixationAccumulator, FixationEvaluator};
pub use orchestrator::{Flow, Orchestrator, SessionSummary};
pub use reward::{
    DispatchOutcome, OutputBoundary, RewardDispatcher, RewardStats, SimulatedOutput, reward_waveform,
};
pub use scheduler::{Advance, PulseOutcome, SchedulerState, SequenceScheduler};
pub use sequence::{
    default_order, generate_sequence, load_sequence, read_order_file, save_sequence,
};
pub use trigger::{ChunkEdges, EdgeEvent, TriggerEdgeDetector, TriggerLevel};
