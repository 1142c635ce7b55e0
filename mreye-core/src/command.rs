use crate::stimulus::StimulusSpec;

/// Messages from the orchestrator to the display renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    AddObjects(Vec<StimulusSpec>),
    Clear,
    Terminate,
}
