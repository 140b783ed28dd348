// ABOUTME: Embedding and vector-similarity seams used by the semantic agent
// ABOUTME: Includes an in-memory cosine index for tests and small deployments

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{AgentError, Result};

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Answers "which entity names lie near this vector".
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Names with similarity `>= min_similarity`, best first, at most `limit`.
    async fn search(
        &self,
        vector: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<(String, f32)>>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

/// Brute-force cosine index over stored `(name, vector)` pairs.
#[derive(Debug, Default)]
pub struct InMemorySimilarityIndex {
    dimension: RwLock<Option<usize>>,
    entries: RwLock<Vec<(String, Vec<f32>)>>,
}

impl InMemorySimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embed every name with `embedder` and index the result.
    pub async fn build<'a>(
        embedder: &dyn EmbeddingService,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let index = Self::new();
        for name in names {
            let vector = embedder.embed(name).await?;
            index.insert(name, vector)?;
        }
        Ok(index)
    }

    pub fn insert(&self, name: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        let mut dimension = self.dimension.write();
        match *dimension {
            Some(expected) if expected != vector.len() => {
                return Err(AgentError::Similarity(format!(
                    "vector has {} dimensions, index expects {}",
                    vector.len(),
                    expected
                )));
            }
            None => *dimension = Some(vector.len()),
            _ => {}
        }
        self.entries.write().push((name.into(), vector));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SimilarityIndex for InMemorySimilarityIndex {
    async fn search(
        &self,
        vector: &[f32],
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<(String, f32)>> {
        if let Some(expected) = *self.dimension.read() {
            if expected != vector.len() {
                return Err(AgentError::Similarity(format!(
                    "query has {} dimensions, index expects {}",
                    vector.len(),
                    expected
                )));
            }
        }

        let mut hits: Vec<(String, f32)> = self
            .entries
            .read()
            .iter()
            .map(|(name, stored)| (name.clone(), cosine_similarity(vector, stored)))
            .filter(|(_, score)| *score >= min_similarity)
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(limit);
        Ok(hits)
    }
}
