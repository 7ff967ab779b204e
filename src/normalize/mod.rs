pub mod phase;
pub mod tool_call;

pub use phase::{NormalizedDelta, Phase, PhaseNormalizer};
pub use tool_call::ToolCallAssembler;
