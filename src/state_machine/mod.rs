pub mod handlers;
mod stage;
mod state;
mod transition;

pub use stage::Stage;
pub use state::{AnalysisOutput, ExtractionResult, ProcessingState, Sentiment, Urgency};
pub use transition::{Action, ActionKind, SkillOperation, ToolOperation, next_action};
