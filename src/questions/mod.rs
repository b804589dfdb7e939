//! Question sourcing.
//!
//! The game only sees [`QuestionSource`]. The production implementation is
//! [`QuestionPipeline`], which walks a fixed chain of stages (cache, LLM
//! generator, Open Trivia DB, static pool) until it has enough questions.
//! Network questions are double-checked in the background by [`DeepChecker`].

mod blocklist;
mod budget;
mod deep_check;
mod generator;
mod opentdb;
mod pipeline;
pub mod quality;
mod static_pool;

pub use blocklist::Blocklist;
pub use budget::RollingBudget;
pub use deep_check::DeepChecker;
pub use generator::LlmGenerator;
pub use opentdb::OpenTriviaDb;
pub use pipeline::QuestionPipeline;
pub use static_pool::StaticPool;

use crate::llm::LlmError;
use crate::types::*;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;

/// What a caller wants from the question source
#[derive(Debug, Clone, Default)]
pub struct QuestionRequest {
    pub count: usize,
    pub match_id: Option<MatchId>,
    pub difficulty: Option<Difficulty>,
    pub category: Option<String>,
    /// Ids the caller already holds
    pub exclude: HashSet<QuestionId>,
}

impl QuestionRequest {
    pub fn new(count: usize, settings: &MatchSettings) -> Self {
        Self {
            count,
            difficulty: settings.difficulty,
            category: settings.category.clone(),
            ..Default::default()
        }
    }

    /// Refill request for a running match, excluding everything it has seen
    pub fn for_match(m: &Match, count: usize) -> Self {
        Self {
            count,
            match_id: Some(m.id.clone()),
            difficulty: m.settings.difficulty,
            category: m.settings.category.clone(),
            exclude: m.questions.iter().map(|q| q.id.clone()).collect(),
        }
    }
}

/// Supplies validated questions on demand
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Best effort: may return fewer than `request.count` questions, never errors
    async fn get_questions(&self, request: QuestionRequest) -> Vec<Question>;
}

/// A question as a stage produced it, before the quality gate
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuestion {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, alias = "correct", alias = "correct_index")]
    pub correct_index: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum QuestionError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Response parsing failed: {0}")]
    Parse(String),

    #[error("Upstream returned response code {0}")]
    Upstream(i64),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// One network-backed step in the pipeline
#[async_trait]
pub trait QuestionStage: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, request: &QuestionRequest) -> Result<Vec<RawQuestion>, QuestionError>;
}
