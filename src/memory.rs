use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::inference_client::InferenceClient;
use crate::schema::Plan;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub goal: String,
    pub plan: Plan,
    pub embedding: Vec<f32>,
}

/// Semantic memory: retrieval over embeddings of past successful goals, used to
/// seed the planner prompt. Persisted as a single on-disk JSON file with
/// load-all-on-startup, rewrite-all-on-append semantics behind a single-writer lock.
pub struct SemanticMemory {
    path: PathBuf,
    entries: Mutex<Vec<MemoryEntry>>,
    inference: Arc<InferenceClient>,
    embedding_model: String,
    embed_timeout: Duration,
    relevance_threshold: f32,
}

impl SemanticMemory {
    pub fn load(
        path: impl AsRef<Path>,
        inference: Arc<InferenceClient>,
        embedding_model: String,
        embed_timeout: Duration,
        relevance_threshold: f32,
    ) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| match serde_json::from_str::<Vec<MemoryEntry>>(&raw) {
                Ok(entries) => Some(entries),
                Err(e) => {
                    tracing::warn!(error = %e, "semantic memory file corrupt, starting empty");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            path,
            entries: Mutex::new(entries),
            inference,
            embedding_model,
            embed_timeout,
            relevance_threshold,
        }
    }

    pub async fn add(&self, goal: &str, plan: &Plan, cancel: &CancellationToken) -> AppResult<()> {
        let embedding = self
            .inference
            .embed(&self.embedding_model, goal, self.embed_timeout, cancel)
            .await?;

        if embedding.is_empty() {
            tracing::warn!(goal, "embedding call returned empty vector, not storing");
            return Ok(());
        }

        let entry = MemoryEntry {
            goal: goal.to_string(),
            plan: plan.clone(),
            embedding,
        };

        let mut entries = self.entries.lock().await;
        entries.push(entry);
        self.persist(&entries)
    }

    pub async fn retrieve(
        &self,
        goal: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<MemoryEntry>> {
        let entries = self.entries.lock().await;
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        drop(entries);

        let query_embedding = self
            .inference
            .embed(&self.embedding_model, goal, self.embed_timeout, cancel)
            .await?;
        if query_embedding.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.lock().await;
        let mut scored: Vec<(f32, &MemoryEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query_embedding, &e.embedding), e))
            .filter(|(score, _)| *score >= self.relevance_threshold)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored.into_iter().take(top_k).map(|(_, e)| e.clone()).collect())
    }

    fn persist(&self, entries: &[MemoryEntry]) -> AppResult<()> {
        let serialized = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, serialized).map_err(AppError::from)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn loading_missing_file_yields_empty_store() {
        let inference = Arc::new(InferenceClient::new("http://localhost:11434"));
        let store = SemanticMemory::load(
            "/tmp/steer_memory_does_not_exist.json",
            inference,
            "nomic-embed-text".to_string(),
            Duration::from_secs(5),
            0.7,
        );
        assert!(store.entries.try_lock().unwrap().is_empty());
    }

    #[test]
    fn loading_corrupt_file_yields_empty_store() {
        let path = std::env::temp_dir().join("steer_memory_corrupt.json");
        std::fs::write(&path, "not json").unwrap();
        let inference = Arc::new(InferenceClient::new("http://localhost:11434"));
        let store = SemanticMemory::load(
            &path,
            inference,
            "nomic-embed-text".to_string(),
            Duration::from_secs(5),
            0.7,
        );
        assert!(store.entries.try_lock().unwrap().is_empty());
        let _ = std::fs::remove_file(&path);
    }
}
