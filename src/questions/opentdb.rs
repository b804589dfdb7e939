//! Open Trivia DB fallback (https://opentdb.com), requested base64-encoded

use super::*;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::seq::SliceRandom;
use std::time::Duration;

/// The API hands out at most this many questions per call
const MAX_AMOUNT: usize = 50;

/// Category names the API knows, mapped to its numeric ids
const CATEGORY_IDS: &[(&str, u32)] = &[
    ("general", 9),
    ("books", 10),
    ("literature", 10),
    ("film", 11),
    ("music", 12),
    ("television", 14),
    ("video games", 15),
    ("science", 17),
    ("computers", 18),
    ("mathematics", 19),
    ("mythology", 20),
    ("sports", 21),
    ("geography", 22),
    ("history", 23),
    ("politics", 24),
    ("art", 25),
    ("animals", 27),
    ("vehicles", 28),
];

fn category_id(category: &str) -> Option<u32> {
    let wanted = category.trim().to_lowercase();
    CATEGORY_IDS
        .iter()
        .find(|(name, _)| wanted.starts_with(name))
        .map(|(_, id)| *id)
}

#[derive(Debug, Deserialize)]
struct TriviaResponse {
    response_code: i64,
    #[serde(default)]
    results: Vec<TriviaResult>,
}

#[derive(Debug, Deserialize)]
struct TriviaResult {
    category: String,
    difficulty: String,
    question: String,
    correct_answer: String,
    incorrect_answers: Vec<String>,
}

fn decode(field: &str) -> Result<String, QuestionError> {
    let bytes = STANDARD
        .decode(field)
        .map_err(|e| QuestionError::Parse(format!("bad base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| QuestionError::Parse(e.to_string()))
}

impl TriviaResult {
    fn into_raw(self) -> Result<RawQuestion, QuestionError> {
        let correct = decode(&self.correct_answer)?;
        let mut options = self
            .incorrect_answers
            .iter()
            .map(|a| decode(a))
            .collect::<Result<Vec<_>, _>>()?;
        options.push(correct.clone());
        options.shuffle(&mut rand::rng());
        let correct_index = options.iter().position(|o| *o == correct).map(|i| i as i64);

        Ok(RawQuestion {
            id: None,
            question: decode(&self.question)?,
            options,
            correct_index,
            category: Some(decode(&self.category)?),
            difficulty: Some(decode(&self.difficulty)?),
        })
    }
}

pub struct OpenTriviaDb {
    base_url: String,
    client: reqwest::Client,
}

impl OpenTriviaDb {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, request: &QuestionRequest) -> Option<String> {
        let amount = request.count.clamp(1, MAX_AMOUNT);
        let mut url = format!(
            "{}/api.php?amount={}&type=multiple&encode=base64",
            self.base_url, amount
        );
        if let Some(difficulty) = request.difficulty {
            url.push_str(&format!("&difficulty={}", difficulty.as_str()));
        }
        if let Some(category) = &request.category {
            // An unknown category would only return questions we then discard
            let id = category_id(category)?;
            url.push_str(&format!("&category={}", id));
        }
        Some(url)
    }
}

#[async_trait]
impl QuestionStage for OpenTriviaDb {
    fn name(&self) -> &str {
        "opentdb"
    }

    async fn fetch(&self, request: &QuestionRequest) -> Result<Vec<RawQuestion>, QuestionError> {
        let Some(url) = self.url(request) else {
            tracing::debug!(
                "Open Trivia DB has no category matching {:?}",
                request.category
            );
            return Ok(Vec::new());
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| QuestionError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QuestionError::Http(format!(
                "Open Trivia DB returned status: {}",
                response.status()
            )));
        }

        let body: TriviaResponse = response
            .json()
            .await
            .map_err(|e| QuestionError::Parse(e.to_string()))?;

        parse_response(body)
    }
}

fn parse_response(body: TriviaResponse) -> Result<Vec<RawQuestion>, QuestionError> {
    // 0 = success, 1 = not enough questions for the query (partial results are fine)
    if body.response_code > 1 {
        return Err(QuestionError::Upstream(body.response_code));
    }

    let mut raw = Vec::with_capacity(body.results.len());
    for result in body.results {
        match result.into_raw() {
            Ok(record) => raw.push(record),
            Err(e) => tracing::warn!("Skipping undecodable Open Trivia DB record: {}", e),
        }
    }
    Ok(raw)
}
