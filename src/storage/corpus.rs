use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;
use crate::model::RetrievedChunk;
use crate::retrieval::VectorIndex;

/// One indexed passage as stored on disk (one JSON object per line).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub text: String,
    #[serde(default)]
    pub source: String,
    pub embedding: Vec<f32>,
}

/// In-memory vector index loaded from a JSONL file.
pub struct JsonlCorpus {
    path: PathBuf,
    entries: Vec<CorpusEntry>,
}

impl JsonlCorpus {
    /// Loads the index. A missing file yields an empty corpus; malformed rows
    /// are skipped with a warning.
    pub fn load<P: Into<PathBuf>>(path: P) -> Result<Self, RetrievalError> {
        let path = path.into();
        if !path.exists() {
            log::warn!("corpus {} not found, starting empty", path.display());
            return Ok(Self::from_entries(path, Vec::new()));
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            RetrievalError::corpus(&format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut entries = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CorpusEntry>(line) {
                Ok(entry) if !entry.embedding.is_empty() => entries.push(entry),
                Ok(_) => log::warn!("{}:{} has an empty embedding", path.display(), line_no + 1),
                Err(e) => log::warn!("{}:{} skipped: {}", path.display(), line_no + 1, e),
            }
        }

        log::info!("loaded {} passages from {}", entries.len(), path.display());
        Ok(Self::from_entries(path, entries))
    }

    pub fn from_entries<P: Into<PathBuf>>(path: P, entries: Vec<CorpusEntry>) -> Self {
        Self {
            path: path.into(),
            entries,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl VectorIndex for JsonlCorpus {
    async fn count(&self) -> Result<usize, RetrievalError> {
        Ok(self.entries.len())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        threshold: f32,
        source_filter: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        if !self.entries.is_empty()
            && !self
                .entries
                .iter()
                .any(|entry| entry.embedding.len() == vector.len())
        {
            return Err(RetrievalError::search(&format!(
                "query has {} dimensions but no passage in {} matches",
                vector.len(),
                self.path().display()
            )));
        }

        let mut scored: Vec<RetrievedChunk> = self
            .entries
            .iter()
            .filter(|entry| match source_filter {
                Some(sources) if !sources.is_empty() => sources.contains(&entry.source),
                _ => true,
            })
            .filter_map(|entry| {
                let similarity = cosine_similarity(vector, &entry.embedding)?;
                (similarity >= threshold).then(|| RetrievedChunk {
                    text: entry.text.clone(),
                    similarity,
                    source_label: entry.source.clone(),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Cosine similarity clamped to `[0, 1]`; `None` on dimension mismatch or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0))
}
