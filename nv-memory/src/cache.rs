use async_trait::async_trait;
use nv_llm::{Embedder, LlmError};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type Key = [u8; 32];

/// Memoizes embeddings by content hash. Stored records are immutable, so
/// their chunks are re-embedded identically on every query without this.
pub struct CachingEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<HashMap<Key, Vec<f32>>>,
}

impl CachingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }
}

fn key(text: &str) -> Key {
    Sha256::digest(text.as_bytes()).into()
}

#[async_trait]
impl Embedder for CachingEmbedder {
    async fn embed(&self, texts: &[String]) -> nv_llm::Result<Vec<Vec<f32>>> {
        let keys: Vec<Key> = texts.iter().map(|t| key(t)).collect();

        let mut misses: Vec<String> = Vec::new();
        let mut miss_keys: Vec<Key> = Vec::new();
        {
            let cache = self.cache.lock().await;
            for (text, k) in texts.iter().zip(keys.iter()) {
                if !cache.contains_key(k) && !miss_keys.contains(k) {
                    misses.push(text.clone());
                    miss_keys.push(*k);
                }
            }
        }

        if !misses.is_empty() {
            let vectors = self.inner.embed(&misses).await?;
            if vectors.len() != misses.len() {
                return Err(LlmError::ResponseFormat(format!(
                    "embedder returned {} vectors for {} inputs",
                    vectors.len(),
                    misses.len()
                )));
            }
            let mut cache = self.cache.lock().await;
            for (k, v) in miss_keys.into_iter().zip(vectors) {
                cache.insert(k, v);
            }
        }

        let cache = self.cache.lock().await;
        keys.iter()
            .map(|k| {
                cache.get(k).cloned().ok_or_else(|| {
                    LlmError::ResponseFormat("embedding cache lost an entry".to_string())
                })
            })
            .collect()
    }
}
