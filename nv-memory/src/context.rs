use crate::error::{MemoryError, Result};
use crate::plots::cited_plots;
use crate::record::EmbeddingStore;
use crate::similarity::{ScoredChunk, l2_distance, rank_chunks, similarity_from_distance, split_chunks};
use nv_llm::{Embedder, LlmError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContextHit {
    pub text: String,
    pub score: f32,
    pub source: PathBuf,
    pub cited_plots: Vec<String>,
}

/// Retrieved history ready to splice into a prompt.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RetrievedContext {
    pub text: String,
    pub cited_plots: Vec<String>,
    pub hits: Vec<ContextHit>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Searches every stored record for the lines closest to a query.
pub struct ContextAssembler {
    store: EmbeddingStore,
    embedder: Arc<dyn Embedder>,
}

impl ContextAssembler {
    pub fn new(store: EmbeddingStore, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Global top-`top_k` chunks across all records. Never fails: an
    /// unreadable store, a failed query embedding, or a broken record all
    /// degrade to less (or no) context.
    #[tracing::instrument(level = "debug", skip_all, fields(top_k = top_k))]
    pub async fn build_context(&self, query: &str, top_k: usize) -> RetrievedContext {
        if top_k == 0 || query.trim().is_empty() {
            return RetrievedContext::default();
        }

        let records = match self.store.list().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, dir = %self.store.dir().display(), "embedding store unreadable");
                return RetrievedContext::default();
            }
        };
        if records.is_empty() {
            return RetrievedContext::default();
        }

        let query_vec = match self.embed_query(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed");
                return RetrievedContext::default();
            }
        };

        let mut pooled = Vec::new();
        for (index, path) in records.iter().enumerate() {
            match self.search_record(path, index, &query_vec, top_k).await {
                Ok(chunks) => pooled.extend(chunks),
                Err(e) => {
                    tracing::warn!(error = %e, record = %path.display(), "skipping record");
                }
            }
        }

        rank_chunks(&mut pooled);
        pooled.truncate(top_k);

        let hits: Vec<ContextHit> = pooled
            .into_iter()
            .map(|chunk| ContextHit {
                cited_plots: cited_plots(&chunk.text),
                source: records[chunk.record].clone(),
                score: chunk.score,
                text: chunk.text,
            })
            .collect();

        let mut cited: Vec<String> = Vec::new();
        for plot in hits.iter().flat_map(|h| h.cited_plots.iter()) {
            if !cited.contains(plot) {
                cited.push(plot.clone());
            }
        }

        tracing::debug!(records = records.len(), hits = hits.len(), "context assembled");
        RetrievedContext {
            text: render(&hits),
            cited_plots: cited,
            hits,
        }
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            MemoryError::Embedding(LlmError::ResponseFormat(
                "no vector returned for query".to_string(),
            ))
        })
    }

    /// This record's own best `top_k`; the global best `top_k` is always
    /// contained in the union of per-record bests. Chunks are re-embedded from
    /// the stored text, so the record's saved vector is never consulted.
    async fn search_record(
        &self,
        path: &Path,
        index: usize,
        query_vec: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let record = self.store.load(path).await?;
        let chunks = split_chunks(&record.text);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(&chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(MemoryError::DimensionMismatch {
                expected: chunks.len(),
                got: vectors.len(),
            });
        }

        let mut scored = Vec::with_capacity(chunks.len());
        for (chunk, (text, vector)) in chunks.into_iter().zip(vectors).enumerate() {
            let distance = l2_distance(query_vec, &vector)?;
            scored.push(ScoredChunk {
                text,
                score: similarity_from_distance(distance),
                record: index,
                chunk,
            });
        }
        rank_chunks(&mut scored);
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn render(hits: &[ContextHit]) -> String {
    if hits.is_empty() {
        return String::new();
    }
    let mut out = String::from("Relevant context from previous conversations:\n");
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!("[{}] (similarity: {:.2}) {}\n", i + 1, hit.score, hit.text));
        if !hit.cited_plots.is_empty() {
            out.push_str(&format!("    Referenced plots: {}\n", hit.cited_plots.join(", ")));
        }
    }
    out
}
