//! LLM-backed question generator

use super::*;
use crate::llm::{GenerateRequest, LlmManager};
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_PROMPT: &str =
    "You write multiple-choice trivia questions for a two-player party game. \
    Every question has exactly four short, distinct answer options and exactly one correct answer. \
    Facts must be verifiable and not time-sensitive. \
    Respond with JSON only: an object with a \"questions\" array. Each element has the fields \
    \"question\" (string), \"options\" (array of 4 strings), \"correctIndex\" (0-3), \
    \"category\" (string) and \"difficulty\" (\"easy\", \"medium\" or \"hard\").";

/// The generator is never asked for more than this in one call
const MAX_BATCH: usize = 20;

pub struct LlmGenerator {
    llm: Arc<LlmManager>,
    timeout: Duration,
    max_tokens: u32,
}

impl LlmGenerator {
    pub fn new(llm: Arc<LlmManager>, timeout: Duration, max_tokens: u32) -> Self {
        Self {
            llm,
            timeout,
            max_tokens,
        }
    }

    fn prompt(request: &QuestionRequest) -> String {
        let count = request.count.clamp(1, MAX_BATCH);
        let difficulty = request
            .difficulty
            .map(|d| d.as_str())
            .unwrap_or("a mix of easy, medium and hard");
        let category = request.category.as_deref().unwrap_or("any mix of topics");
        format!(
            "Write {} trivia questions.\nDifficulty: {}\nCategory: {}\nVary the position of the correct answer.",
            count, difficulty, category
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeneratedBatch {
    Wrapped { questions: Vec<RawQuestion> },
    Bare(Vec<RawQuestion>),
}

/// Pull the question list out of a model reply, tolerating prose or code
/// fences around the JSON
fn parse_reply(text: &str) -> Result<Vec<RawQuestion>, QuestionError> {
    let start = text.find(&['{', '['][..]);
    let end = text.rfind(&['}', ']'][..]);
    let json = match (start, end) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => return Err(QuestionError::Parse("no JSON in model reply".to_string())),
    };

    match serde_json::from_str::<GeneratedBatch>(json) {
        Ok(GeneratedBatch::Wrapped { questions }) | Ok(GeneratedBatch::Bare(questions)) => {
            Ok(questions)
        }
        Err(e) => Err(QuestionError::Parse(e.to_string())),
    }
}

#[async_trait]
impl QuestionStage for LlmGenerator {
    fn name(&self) -> &str {
        "generator"
    }

    async fn fetch(&self, request: &QuestionRequest) -> Result<Vec<RawQuestion>, QuestionError> {
        let response = self
            .llm
            .generate_first(GenerateRequest {
                system_prompt: Some(SYSTEM_PROMPT.to_string()),
                prompt: Self::prompt(request),
                max_tokens: Some(self.max_tokens),
                timeout: self.timeout,
                json: true,
            })
            .await?;

        let mut raw = parse_reply(&response.text)?;
        // Generated ids are not trusted; the quality gate assigns fingerprints
        for record in &mut raw {
            record.id = None;
        }
        Ok(raw)
    }
}
