//! Background answer-key check for freshly sourced questions.
//!
//! Each question is put to the LLM a few times. When the majority of the
//! replies picks a different option than the answer key, the question is
//! blocklisted so no pipeline stage hands it out again. Runs off the request
//! path; match creation never waits for it.

use super::*;
use crate::llm::{GenerateRequest, LlmManager};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const SYSTEM_PROMPT: &str =
    "You answer multiple-choice trivia. Reply with the number of the correct option only.";

pub struct DeepChecker {
    llm: Arc<LlmManager>,
    blocklist: Arc<Blocklist>,
    samples: usize,
    timeout: Duration,
    /// Shared by every check; one unit per question
    budget: RollingBudget,
}

impl DeepChecker {
    pub fn new(
        llm: Arc<LlmManager>,
        blocklist: Arc<Blocklist>,
        samples: usize,
        timeout: Duration,
        budget: RollingBudget,
    ) -> Self {
        Self {
            llm,
            blocklist,
            samples: samples.max(1),
            timeout,
            budget,
        }
    }

    fn prompt(question: &Question) -> String {
        let options = question
            .options
            .iter()
            .enumerate()
            .map(|(i, option)| format!("{}) {}", i, option))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Answer using only a single number (0-3):\n{}\n{}",
            question.question, options
        )
    }

    /// Most frequent option across the samples. `None` when no reply named an
    /// option or the top two are tied.
    async fn majority_answer(&self, question: &Question) -> Option<usize> {
        let mut votes: HashMap<usize, usize> = HashMap::new();
        for _ in 0..self.samples {
            let reply = self
                .llm
                .generate_first(GenerateRequest {
                    system_prompt: Some(SYSTEM_PROMPT.to_string()),
                    prompt: Self::prompt(question),
                    max_tokens: Some(4),
                    timeout: self.timeout,
                    json: false,
                })
                .await;
            match reply {
                Ok(response) => {
                    if let Some(choice) = parse_choice(&response.text) {
                        *votes.entry(choice).or_default() += 1;
                    }
                }
                Err(e) => tracing::debug!("Deep check sample for {} failed: {}", question.id, e),
            }
        }

        let mut ranked: Vec<(usize, usize)> = votes.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        match ranked.as_slice() {
            [] => None,
            [(first, n), (_, m), ..] if n == m => {
                tracing::debug!(
                    "Deep check for {} inconclusive ({} tied)",
                    question.id,
                    first
                );
                None
            }
            [(first, _), ..] => Some(*first),
        }
    }

    /// Check every question and blocklist the ones the model disagrees with.
    /// Returns the flagged ids.
    pub async fn check(&self, questions: &[Question]) -> Vec<QuestionId> {
        let mut flagged = Vec::new();
        for (checked, question) in questions.iter().enumerate() {
            if !self.budget.try_acquire().await {
                tracing::debug!(
                    "Deep check budget exhausted, {} questions unchecked",
                    questions.len() - checked
                );
                break;
            }
            match self.majority_answer(question).await {
                Some(answer) if answer != question.correct_index => {
                    tracing::warn!(
                        "Deep check flagged {} (key {}, model {}): {:.80}",
                        question.id,
                        question.correct_index,
                        answer,
                        question.question
                    );
                    self.blocklist.report(&question.id).await;
                    flagged.push(question.id.clone());
                }
                _ => {}
            }
        }
        flagged
    }

    /// Run [`check`](Self::check) in the background
    pub fn spawn(self: &Arc<Self>, questions: Vec<Question>) -> JoinHandle<Vec<QuestionId>> {
        let checker = self.clone();
        tokio::spawn(async move { checker.check(&questions).await })
    }
}

/// First digit in range in a model reply such as "2", "2)" or "Answer: 2"
fn parse_choice(text: &str) -> Option<usize> {
    text.chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| d as usize)
        .find(|d| *d < OPTION_COUNT)
}
