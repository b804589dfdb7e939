//! Quality gate, content fingerprints and difficulty/category inference

use super::{QuestionRequest, RawQuestion};
use crate::types::*;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

pub const MIN_QUESTION_LEN: usize = 8;
pub const MIN_CATEGORY_LEN: usize = 2;
pub const FALLBACK_CATEGORY: &str = "General Knowledge";

/// Lowercase, punctuation folded to spaces, whitespace collapsed
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// sha256 over the normalised question and its sorted normalised options.
/// Option order does not change the fingerprint.
pub fn fingerprint(question: &str, options: &[String]) -> String {
    let mut normalized: Vec<String> = options.iter().map(|o| normalize(o)).collect();
    normalized.sort();

    let mut hasher = Sha256::new();
    hasher.update(normalize(question).as_bytes());
    for option in &normalized {
        hasher.update([0x1f]);
        hasher.update(option.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn is_numeric_option(option: &str) -> bool {
    let digits = option.chars().filter(|c| c.is_ascii_digit()).count();
    let visible = option.chars().filter(|c| !c.is_whitespace()).count();
    digits > 0 && digits * 2 >= visible
}

/// Long questions, long options and all-numeric answers push towards hard;
/// short questions towards easy.
pub fn infer_difficulty(question: &str, options: &[String]) -> Difficulty {
    let len = question.trim().chars().count();
    let mut score: i32 = match len {
        0..=39 => -1,
        40..=70 => 0,
        71..=100 => 1,
        _ => 2,
    };

    if !options.is_empty() {
        if options.iter().all(|o| is_numeric_option(o)) {
            score += 1;
        }
        let total: usize = options.iter().map(|o| o.chars().count()).sum();
        if total / options.len() > 20 {
            score += 1;
        }
    }

    match score {
        s if s < 0 => Difficulty::Easy,
        0 => Difficulty::Medium,
        _ => Difficulty::Hard,
    }
}

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Geography",
        &[
            "capital",
            "country",
            "countries",
            "river",
            "mountain",
            "continent",
            "ocean",
            "island",
            "islands",
            "desert",
            "border",
            "lake",
            "city",
            "largest",
        ],
    ),
    (
        "Science",
        &[
            "element", "planet", "atom", "chemical", "physics", "biology", "cell", "gas", "bones",
            "speed", "energy", "molecule", "species", "blood", "dna",
        ],
    ),
    (
        "History",
        &[
            "war",
            "century",
            "empire",
            "king",
            "queen",
            "emperor",
            "revolution",
            "ancient",
            "founded",
            "dynasty",
            "treaty",
            "president",
            "battle",
        ],
    ),
    (
        "Sports",
        &[
            "olympic",
            "olympics",
            "football",
            "soccer",
            "tennis",
            "team",
            "players",
            "marathon",
            "championship",
            "touchdown",
            "goal",
            "volleyball",
            "basketball",
        ],
    ),
    (
        "Art & Culture",
        &[
            "painted", "painting", "composed", "composer", "novel", "film", "movie", "song",
            "album", "author", "wrote", "opera", "guitar", "band",
        ],
    ),
];

/// Category with the most keyword hits; ties go to the earlier table
pub fn infer_category(question: &str) -> String {
    let normalized = normalize(question);
    let words: HashSet<&str> = normalized.split_whitespace().collect();

    let mut best: Option<(&str, usize)> = None;
    for (category, keywords) in CATEGORY_KEYWORDS {
        let hits = keywords.iter().filter(|k| words.contains(*k)).count();
        if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
            best = Some((*category, hits));
        }
    }

    best.map(|(category, _)| category)
        .unwrap_or(FALLBACK_CATEGORY)
        .to_string()
}

/// Turn a raw record into a playable question, or say why it is unusable
pub fn validate(raw: RawQuestion) -> Result<Question, String> {
    let question = raw.question.trim().to_string();
    if question.chars().count() < MIN_QUESTION_LEN {
        return Err(format!("question text too short: {:?}", question));
    }

    let options: Vec<String> = raw.options.iter().map(|o| o.trim().to_string()).collect();
    if options.len() != OPTION_COUNT {
        return Err(format!(
            "expected {} options, got {}",
            OPTION_COUNT,
            options.len()
        ));
    }
    if options.iter().any(String::is_empty) {
        return Err("empty answer option".to_string());
    }
    let distinct: HashSet<String> = options.iter().map(|o| o.to_lowercase()).collect();
    if distinct.len() != OPTION_COUNT {
        return Err("answer options must be distinct".to_string());
    }

    let correct_index = raw
        .correct_index
        .filter(|idx| (0..OPTION_COUNT as i64).contains(idx))
        .ok_or_else(|| format!("correct index out of range: {:?}", raw.correct_index))?
        as usize;

    let category = match raw.category.map(|c| c.trim().to_string()) {
        Some(c) if !c.is_empty() => c,
        _ => infer_category(&question),
    };
    if category.chars().count() < MIN_CATEGORY_LEN {
        return Err(format!("category too short: {:?}", category));
    }

    let difficulty = raw
        .difficulty
        .as_deref()
        .and_then(Difficulty::parse)
        .unwrap_or_else(|| infer_difficulty(&question, &options));

    let id = match raw.id.map(|id| id.trim().to_string()) {
        Some(id) if !id.is_empty() => id,
        _ => format!("fp-{}", &fingerprint(&question, &options)[..16]),
    };

    Ok(Question {
        id,
        question,
        options,
        correct_index,
        category,
        difficulty,
        reported: false,
    })
}

/// Validate a batch, logging and dropping whatever fails
pub fn gate(raw: Vec<RawQuestion>, source: &str) -> Vec<Question> {
    raw.into_iter()
        .filter_map(|record| match validate(record) {
            Ok(question) => Some(question),
            Err(reason) => {
                tracing::warn!("Dropped invalid question from {}: {}", source, reason);
                None
            }
        })
        .collect()
}

/// Whether a question fits the requested difficulty and category
pub fn matches_request(question: &Question, request: &QuestionRequest) -> bool {
    if let Some(difficulty) = request.difficulty {
        if question.difficulty != difficulty {
            return false;
        }
    }
    match &request.category {
        Some(wanted) => question
            .category
            .to_lowercase()
            .contains(&wanted.to_lowercase()),
        None => true,
    }
}
