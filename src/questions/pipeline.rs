//! Fixed-order question pipeline: cache, network stages, static pool

use super::*;
use crate::config::ServerConfig;
use crate::llm::{LlmConfig, LlmManager};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Upper bound on questions kept around for other matches
const CACHE_CAPACITY: usize = 500;

struct BudgetedStage {
    stage: Box<dyn QuestionStage>,
    /// `None` = unlimited
    budget: Option<RollingBudget>,
}

/// Collects one request's worth of questions, enforcing dedup and exclusions
struct Batch<'a> {
    request: &'a QuestionRequest,
    questions: Vec<Question>,
    ids: HashSet<QuestionId>,
    fingerprints: HashSet<String>,
}

impl<'a> Batch<'a> {
    fn new(request: &'a QuestionRequest) -> Self {
        Self {
            request,
            questions: Vec::with_capacity(request.count),
            ids: HashSet::new(),
            fingerprints: HashSet::new(),
        }
    }

    fn missing(&self) -> usize {
        self.request.count.saturating_sub(self.questions.len())
    }

    fn is_full(&self) -> bool {
        self.missing() == 0
    }

    /// Hands the question back when it is not taken (full, excluded or duplicate)
    fn offer(&mut self, question: Question) -> Result<(), Question> {
        if self.is_full()
            || self.request.exclude.contains(&question.id)
            || self.ids.contains(&question.id)
        {
            return Err(question);
        }
        let fingerprint = quality::fingerprint(&question.question, &question.options);
        if self.fingerprints.contains(&fingerprint) {
            return Err(question);
        }
        self.ids.insert(question.id.clone());
        self.fingerprints.insert(fingerprint);
        self.questions.push(question);
        Ok(())
    }
}

pub struct QuestionPipeline {
    cache: Mutex<Vec<Question>>,
    stages: Vec<BudgetedStage>,
    fallback: StaticPool,
    blocklist: Arc<Blocklist>,
    /// Background answer-key check for network questions
    deep_check: Option<Arc<DeepChecker>>,
}

impl QuestionPipeline {
    /// Pipeline with only the static pool behind the cache
    pub fn new(blocklist: Arc<Blocklist>) -> Self {
        Self {
            cache: Mutex::new(Vec::new()),
            stages: Vec::new(),
            fallback: StaticPool::new(),
            blocklist,
            deep_check: None,
        }
    }

    /// Append a network stage. Stages run in the order they were added.
    pub fn with_stage(
        mut self,
        stage: impl QuestionStage + 'static,
        budget: Option<RollingBudget>,
    ) -> Self {
        self.stages.push(BudgetedStage {
            stage: Box::new(stage),
            budget,
        });
        self
    }

    pub fn with_deep_check(mut self, checker: DeepChecker) -> Self {
        self.deep_check = Some(Arc::new(checker));
        self
    }

    /// Production chain: generator (if an LLM is available), Open Trivia DB
    /// (if enabled), static pool
    pub fn from_config(
        config: &ServerConfig,
        llm: Option<Arc<LlmManager>>,
        llm_config: &LlmConfig,
        blocklist: Arc<Blocklist>,
    ) -> Self {
        let mut pipeline = Self::new(blocklist);

        if let Some(llm) = llm {
            if config.deep_check_enabled {
                let checker = DeepChecker::new(
                    llm.clone(),
                    pipeline.blocklist.clone(),
                    config.deep_check_samples,
                    llm_config.default_timeout,
                    RollingBudget::per_minute(config.deep_check_budget_per_minute),
                );
                pipeline = pipeline.with_deep_check(checker);
            }
            pipeline = pipeline.with_stage(
                LlmGenerator::new(
                    llm,
                    llm_config.default_timeout,
                    llm_config.default_max_tokens,
                ),
                Some(RollingBudget::per_minute(config.question_budget_per_minute)),
            );
        }

        if config.opentdb_enabled {
            pipeline = pipeline.with_stage(
                OpenTriviaDb::new(config.opentdb_base_url.clone()),
                Some(RollingBudget::per_minute(config.question_budget_per_minute)),
            );
        }

        tracing::info!(
            "Question pipeline: cache -> {} -> static ({} built-in)",
            pipeline
                .stages
                .iter()
                .map(|s| s.stage.name())
                .collect::<Vec<_>>()
                .join(" -> "),
            pipeline.fallback.len()
        );

        pipeline
    }

    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn take_from_cache(&self, batch: &mut Batch<'_>) {
        let mut cache = self.cache.lock().await;
        let mut kept = Vec::with_capacity(cache.len());
        for question in cache.drain(..) {
            // Flagged after it was cached
            if self.blocklist.is_blocked(&question.id).await {
                continue;
            }
            if batch.is_full() || !quality::matches_request(&question, batch.request) {
                kept.push(question);
                continue;
            }
            // Excluded here can still serve another match
            if let Err(question) = batch.offer(question) {
                kept.push(question);
            }
        }
        *cache = kept;
    }

    async fn put_back(&self, surplus: Vec<Question>) {
        if surplus.is_empty() {
            return;
        }
        let mut cache = self.cache.lock().await;
        for question in surplus {
            if !cache.iter().any(|q| q.id == question.id) {
                cache.push(question);
            }
        }
        if cache.len() > CACHE_CAPACITY {
            let overflow = cache.len() - CACHE_CAPACITY;
            cache.drain(..overflow);
        }
    }

    /// Filter and offer validated questions. With `keep_surplus`, whatever
    /// did not fit goes to the cache.
    async fn accept(
        &self,
        batch: &mut Batch<'_>,
        questions: Vec<Question>,
        keep_surplus: bool,
    ) -> usize {
        let before = batch.questions.len();
        let mut surplus = Vec::new();
        for question in questions {
            if self.blocklist.is_blocked(&question.id).await {
                continue;
            }
            if !quality::matches_request(&question, batch.request) {
                continue;
            }
            if let Err(extra) = batch.offer(question) {
                if keep_surplus && batch.is_full() {
                    surplus.push(extra);
                }
            }
        }
        self.put_back(surplus).await;
        batch.questions.len() - before
    }
}

#[async_trait]
impl QuestionSource for QuestionPipeline {
    async fn get_questions(&self, request: QuestionRequest) -> Vec<Question> {
        let mut batch = Batch::new(&request);
        let match_id = request.match_id.as_deref().unwrap_or("-");

        self.take_from_cache(&mut batch).await;
        if !batch.questions.is_empty() {
            tracing::debug!(
                "Match {}: {} questions from cache",
                match_id,
                batch.questions.len()
            );
        }

        for entry in &self.stages {
            if batch.is_full() {
                break;
            }
            let name = entry.stage.name();
            if let Some(budget) = &entry.budget {
                if !budget.try_acquire().await {
                    tracing::debug!("Match {}: {} budget exhausted, skipping", match_id, name);
                    continue;
                }
            }

            let stage_request = QuestionRequest {
                count: batch.missing(),
                ..request.clone()
            };
            match entry.stage.fetch(&stage_request).await {
                Ok(raw) => {
                    let validated = quality::gate(raw, name);
                    if let Some(checker) = &self.deep_check {
                        if !validated.is_empty() {
                            checker.spawn(validated.clone());
                        }
                    }
                    let added = self.accept(&mut batch, validated, true).await;
                    tracing::info!("Match {}: {} questions from {}", match_id, added, name);
                }
                Err(e) => {
                    tracing::warn!("Match {}: question stage {} failed: {}", match_id, name, e);
                }
            }
        }

        if !batch.is_full() {
            let candidates = self.fallback.candidates(&request);
            let added = self.accept(&mut batch, candidates, false).await;
            tracing::info!("Match {}: {} questions from static pool", match_id, added);
        }

        // A running match must not run dry: once nothing unseen is left,
        // replay the static pool minus anything blocked
        if batch.questions.is_empty() && request.match_id.is_some() {
            let replay = QuestionRequest {
                exclude: HashSet::new(),
                ..request.clone()
            };
            let mut replayed = Batch::new(&replay);
            let candidates = self.fallback.candidates(&replay);
            let added = self.accept(&mut replayed, candidates, false).await;
            if added > 0 {
                tracing::info!(
                    "Match {}: no unseen questions left, replaying {} from static pool",
                    match_id,
                    added
                );
                return replayed.questions;
            }
        }

        if !batch.is_full() {
            tracing::warn!(
                "Match {}: only {} of {} questions available",
                match_id,
                batch.questions.len(),
                request.count
            );
        }

        batch.questions
    }
}
