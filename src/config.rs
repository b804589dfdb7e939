//! Server configuration loaded from environment variables

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Matches with every player disconnected are dropped after this much inactivity
    pub match_idle_timeout: Duration,
    pub session_max_age: Duration,
    /// How long a disconnected session keeps its seat
    pub session_grace: Duration,
    pub cleanup_interval: Duration,
    /// Delay between a match finishing and its deletion
    pub finished_match_ttl: Duration,
    pub initial_question_count: usize,
    pub min_playable_questions: usize,
    pub question_refill_threshold: usize,
    pub question_refill_batch: usize,
    pub blocklist_path: PathBuf,
    pub opentdb_enabled: bool,
    pub opentdb_base_url: String,
    pub question_budget_per_minute: u32,
    /// Re-ask the LLM about network questions and blocklist disagreements
    pub deep_check_enabled: bool,
    pub deep_check_samples: usize,
    pub deep_check_budget_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 3001,
            match_idle_timeout: Duration::from_secs(30 * 60),
            session_max_age: Duration::from_secs(2 * 60 * 60),
            session_grace: Duration::from_secs(15 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
            finished_match_ttl: Duration::from_secs(60),
            initial_question_count: 30,
            min_playable_questions: 5,
            question_refill_threshold: 5,
            question_refill_batch: 10,
            blocklist_path: PathBuf::from("reported_questions.json"),
            opentdb_enabled: true,
            opentdb_base_url: "https://opentdb.com".to_string(),
            question_budget_per_minute: 10,
            deep_check_enabled: true,
            deep_check_samples: 3,
            deep_check_budget_per_minute: 30,
        }
    }
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.parse().ok())
}

pub(crate) fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

fn env_flag(key: &str) -> Option<bool> {
    env_string(key).map(|v| v != "0" && v.to_lowercase() != "false")
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            bind_addr: env_string("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: env_parse("PORT").unwrap_or(defaults.port),
            match_idle_timeout: env_secs("MATCH_IDLE_TIMEOUT_SECS")
                .unwrap_or(defaults.match_idle_timeout),
            session_max_age: env_secs("SESSION_MAX_AGE_SECS").unwrap_or(defaults.session_max_age),
            session_grace: env_secs("SESSION_GRACE_SECS").unwrap_or(defaults.session_grace),
            cleanup_interval: env_secs("CLEANUP_INTERVAL_SECS")
                .unwrap_or(defaults.cleanup_interval),
            finished_match_ttl: env_secs("FINISHED_MATCH_TTL_SECS")
                .unwrap_or(defaults.finished_match_ttl),
            initial_question_count: env_parse("INITIAL_QUESTION_COUNT")
                .unwrap_or(defaults.initial_question_count),
            min_playable_questions: env_parse("MIN_PLAYABLE_QUESTIONS")
                .unwrap_or(defaults.min_playable_questions),
            question_refill_threshold: env_parse("QUESTION_REFILL_THRESHOLD")
                .unwrap_or(defaults.question_refill_threshold),
            question_refill_batch: env_parse("QUESTION_REFILL_BATCH")
                .unwrap_or(defaults.question_refill_batch),
            blocklist_path: env_string("BLOCKLIST_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.blocklist_path),
            opentdb_enabled: env_flag("OPENTDB_ENABLED").unwrap_or(defaults.opentdb_enabled),
            opentdb_base_url: env_string("OPENTDB_BASE_URL").unwrap_or(defaults.opentdb_base_url),
            question_budget_per_minute: env_parse("QUESTION_BUDGET_PER_MINUTE")
                .unwrap_or(defaults.question_budget_per_minute),
            deep_check_enabled: env_flag("DEEP_CHECK_ENABLED")
                .unwrap_or(defaults.deep_check_enabled),
            deep_check_samples: env_parse("DEEP_CHECK_SAMPLES")
                .unwrap_or(defaults.deep_check_samples),
            deep_check_budget_per_minute: env_parse("DEEP_CHECK_BUDGET_PER_MINUTE")
                .unwrap_or(defaults.deep_check_budget_per_minute),
        };

        if config.min_playable_questions == 0 {
            tracing::warn!("MIN_PLAYABLE_QUESTIONS=0 lets matches start without questions");
        }

        config
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind_addr, self.port).parse()
    }
}
