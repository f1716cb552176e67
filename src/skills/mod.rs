//! Analysis skills: the LLM-backed extractor and its offline keyword fallback.

mod keywords;
mod llm;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::executor::{SkillContext, SkillExecutor, SkillOutput};
use crate::state_machine::SkillOperation;

pub use keywords::KeywordSkillExecutor;
pub use llm::LlmSkillExecutor;

/// Model family used for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Haiku,
    Sonnet,
    Opus,
}

impl ModelTier {
    /// The Messages API model identifier for this tier.
    pub fn api_model(self) -> &'static str {
        match self {
            ModelTier::Haiku => "claude-haiku-4-5-20251001",
            ModelTier::Sonnet => "claude-sonnet-4-5-20250929",
            ModelTier::Opus => "claude-opus-4-6",
        }
    }
}

impl FromStr for ModelTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "haiku" => Ok(ModelTier::Haiku),
            "sonnet" => Ok(ModelTier::Sonnet),
            "opus" => Ok(ModelTier::Opus),
            other => Err(format!("unknown model tier: {other}")),
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTier::Haiku => write!(f, "haiku"),
            ModelTier::Sonnet => write!(f, "sonnet"),
            ModelTier::Opus => write!(f, "opus"),
        }
    }
}

/// The skill executor picked at startup: LLM when an API key is configured,
/// keyword scoring otherwise.
pub enum AnySkill<M> {
    Llm(LlmSkillExecutor<M>),
    Keywords(KeywordSkillExecutor),
}

impl<M: crate::anthropic::MessageSender> SkillExecutor for AnySkill<M> {
    async fn run(
        &self,
        operation: SkillOperation,
        context: &SkillContext,
    ) -> Result<SkillOutput, ExecutionError> {
        match self {
            AnySkill::Llm(skill) => skill.run(operation, context).await,
            AnySkill::Keywords(skill) => skill.run(operation, context).await,
        }
    }
}

impl<M> AnySkill<M> {
    pub fn describe(&self) -> String {
        match self {
            AnySkill::Llm(skill) => format!("LLM ({})", skill.model()),
            AnySkill::Keywords(_) => "keyword scoring (no API key)".to_string(),
        }
    }
}
