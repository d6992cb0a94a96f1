//! Retrieval of specification fragments.
//!
//! Production deployments back [`Retriever`] with a vector store. The bundled
//! [`InMemoryRetriever`] ranks chunks by keyword overlap, which is enough for
//! tests and local demos.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Query + corpus tag → top-K text chunks.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, corpus: &str, top_k: usize) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
struct Chunk {
    text: String,
    words: HashSet<String>,
}

/// Keyword-matching retriever over chunks held in memory.
#[derive(Clone, Default)]
pub struct InMemoryRetriever {
    corpora: Arc<RwLock<HashMap<String, Vec<Chunk>>>>,
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append chunks to a corpus, creating it if needed.
    pub fn add_chunks<I, S>(&self, corpus: &str, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut corpora = self.corpora.write().unwrap_or_else(PoisonError::into_inner);
        let entry = corpora.entry(corpus.to_string()).or_default();
        for chunk in chunks {
            let text = chunk.into();
            let words = extract_words(&text);
            entry.push(Chunk { text, words });
        }
    }

    /// Builder form of [`add_chunks`](Self::add_chunks).
    pub fn with_chunks<I, S>(self, corpus: &str, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_chunks(corpus, chunks);
        self
    }

    pub fn corpus_len(&self, corpus: &str) -> usize {
        let corpora = self.corpora.read().unwrap_or_else(PoisonError::into_inner);
        corpora.get(corpus).map_or(0, Vec::len)
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn search(&self, query: &str, corpus: &str, top_k: usize) -> Result<Vec<String>> {
        let corpora = self.corpora.read().unwrap_or_else(PoisonError::into_inner);
        let Some(chunks) = corpora.get(corpus) else {
            return Err(PipelineError::Retrieval {
                corpus: corpus.to_string(),
                reason: "unknown corpus".to_string(),
            });
        };

        let query_words = extract_words(query);
        let mut scored: Vec<(usize, usize)> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i, overlap(&query_words, &chunk.words)))
            .filter(|(_, score)| *score > 0)
            .collect();

        // stable sort keeps insertion order between equal scores
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        let results: Vec<String> = scored
            .into_iter()
            .take(top_k)
            .map(|(i, _)| chunks[i].text.clone())
            .collect();

        debug!(
            "Retrieved {} of {} chunks from corpus {}",
            results.len(),
            chunks.len(),
            corpus
        );
        Ok(results)
    }
}

/// Lowercased words, split on anything that is not alphanumeric.
fn extract_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Number of shared words, iterating over the smaller set.
fn overlap(words1: &HashSet<String>, words2: &HashSet<String>) -> usize {
    let (smaller, larger) = if words1.len() < words2.len() {
        (words1, words2)
    } else {
        (words2, words1)
    };
    smaller.iter().filter(|word| larger.contains(*word)).count()
}
