//! Durable set of reported question ids, persisted as a JSON array

use crate::types::QuestionId;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug)]
pub struct Blocklist {
    /// `None` keeps the list in memory only
    path: Option<PathBuf>,
    ids: RwLock<BTreeSet<QuestionId>>,
}

impl Blocklist {
    /// Load from `path`. A missing or unreadable file yields an empty list.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let ids = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Vec<QuestionId>>(&content) {
                Ok(ids) => {
                    tracing::info!("Loaded {} reported questions from {:?}", ids.len(), path);
                    ids.into_iter().collect()
                }
                Err(e) => {
                    tracing::error!("Blocklist {:?} is not a JSON array of ids: {}", path, e);
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No blocklist at {:?}, starting empty", path);
                BTreeSet::new()
            }
            Err(e) => {
                tracing::error!("Failed to read blocklist {:?}: {}", path, e);
                BTreeSet::new()
            }
        };

        Self {
            path: Some(path),
            ids: RwLock::new(ids),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            ids: RwLock::new(BTreeSet::new()),
        }
    }

    pub async fn is_blocked(&self, id: &str) -> bool {
        self.ids.read().await.contains(id)
    }

    pub async fn len(&self) -> usize {
        self.ids.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ids.read().await.is_empty()
    }

    /// Add an id and rewrite the file. Write failures are logged, not returned.
    pub async fn report(&self, id: &str) {
        if id.is_empty() {
            return;
        }

        // Held across the write so concurrent reports land in order
        let mut ids = self.ids.write().await;
        if !ids.insert(id.to_string()) {
            return;
        }
        let Some(path) = &self.path else {
            tracing::info!("Question {} reported ({} blocked)", id, ids.len());
            return;
        };

        let snapshot: Vec<&QuestionId> = ids.iter().collect();
        let json = match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize blocklist: {}", e);
                return;
            }
        };

        let tmp = path.with_extension("json.tmp");
        let result = async {
            tokio::fs::write(&tmp, json).await?;
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        match result {
            Ok(()) => tracing::info!("Question {} reported ({} blocked)", id, ids.len()),
            Err(e) => tracing::error!("Failed to persist blocklist to {:?}: {}", path, e),
        }
    }
}
