use std::time::Duration;

use tracing::debug;

use super::ModelTier;
use crate::anthropic::{Message, MessageSender, MessagesRequest};
use crate::error::ExecutionError;
use crate::executor::{SkillContext, SkillExecutor, SkillOutput};
use crate::state_machine::{AnalysisOutput, SkillOperation};

// Longer items are cut before prompting.
const MAX_CONTENT_CHARS: usize = 20_000;

const SYSTEM_PROMPT: &str = "You extract structured data from business correspondence. \
     You never decide what happens to the document; you only describe it.";

/// Extracts an [`AnalysisOutput`] by asking a model for strict JSON.
pub struct LlmSkillExecutor<M> {
    sender: M,
    model: ModelTier,
    max_tokens: u32,
    timeout: Duration,
}

impl<M: MessageSender> LlmSkillExecutor<M> {
    pub fn new(sender: M, model: ModelTier, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            sender,
            model,
            max_tokens,
            timeout,
        }
    }

    async fn analyze(&self, context: &SkillContext) -> Result<AnalysisOutput, ExecutionError> {
        let req = MessagesRequest {
            model: self.model.api_model().to_string(),
            max_tokens: self.max_tokens,
            system: Some(SYSTEM_PROMPT.to_string()),
            messages: vec![Message {
                role: "user".into(),
                content: analysis_prompt(context),
            }],
        };

        let response = tokio::time::timeout(self.timeout, self.sender.send_message(&req))
            .await
            .map_err(|_| ExecutionError::Timeout(self.timeout))??;
        debug!(
            item = %context.identifier,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "analysis response received"
        );

        parse_analysis(&response.text())
    }
}

impl<M> LlmSkillExecutor<M> {
    pub fn model(&self) -> ModelTier {
        self.model
    }
}

impl<M: MessageSender> SkillExecutor for LlmSkillExecutor<M> {
    async fn run(
        &self,
        operation: SkillOperation,
        context: &SkillContext,
    ) -> Result<SkillOutput, ExecutionError> {
        match operation {
            SkillOperation::AnalyzeItem => self.analyze(context).await.map(SkillOutput::Analysis),
        }
    }
}

fn analysis_prompt(context: &SkillContext) -> String {
    let content: String = context.content.chars().take(MAX_CONTENT_CHARS).collect();
    format!(
        "Analyze this message. Respond with ONLY valid JSON, no other text.\n\
         Format: {{\"topic\": \"<short label, e.g. Login Error>\", \
         \"category\": \"<department, e.g. Sales, HR, Tech Support, Accounting>\", \
         \"contacts\": \"<email addresses or phone numbers found, comma separated>\", \
         \"urgency\": \"<Low|Medium|High>\", \
         \"sentiment\": \"<Positive|Neutral|Negative>\", \
         \"summary\": \"<one sentence for management review>\"}}\n\
         \n\
         Urgency is High for words like ASAP, urgent, failure or outage.\n\
         \n\
         File: {}\n\
         ---\n\
         {content}",
        context.identifier
    )
}

/// Parse a model reply into an analysis, tolerating a Markdown code fence or
/// prose around the JSON object.
pub fn parse_analysis(text: &str) -> Result<AnalysisOutput, ExecutionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExecutionError::Parse("empty response".into()));
    }
    let json = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => return Err(ExecutionError::Parse(format!("no JSON object in: {trimmed}"))),
    };
    serde_json::from_str(json).map_err(|e| ExecutionError::Parse(e.to_string()))
}
