//! Grounding selection: naive truncation or semantic top-k retrieval.
//!
//! The two modes are alternatives, never combined. Truncation is the
//! default: zero-cost and deterministic, but documents past the character
//! budget become invisible to the model. Semantic mode trades an embedding
//! round-trip per query for relevance that survives corpus growth.

use anyhow::{bail, Result};

use crate::chunk::chunk_corpus;
use crate::config::Config;
use crate::corpus::Corpus;
use crate::embedding::EmbeddingClient;
use crate::index::VectorIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    Truncate,
    Semantic,
}

impl RetrievalMode {
    pub fn from_config(mode: &str) -> Result<Self> {
        match mode {
            "truncate" => Ok(RetrievalMode::Truncate),
            "semantic" => Ok(RetrievalMode::Semantic),
            other => bail!("unknown retrieval mode: {}", other),
        }
    }
}

/// The first `budget` characters of `corpus`, always a literal prefix.
/// Counts characters, not bytes, so multibyte text never splits mid-char.
pub fn truncate_chars(corpus: &str, budget: usize) -> &str {
    match corpus.char_indices().nth(budget) {
        Some((byte_pos, _)) => &corpus[..byte_pos],
        None => corpus,
    }
}

/// Per-corpus-version retrieval state. In semantic mode this owns the
/// embedding client and the vector index built over the corpus chunks; in
/// truncate mode it is stateless. Rebuilt together with the corpus.
pub struct Retriever {
    mode: RetrievalMode,
    embedder: Option<EmbeddingClient>,
    index: Option<VectorIndex>,
}

impl Retriever {
    /// Prepare retrieval for one corpus version. Semantic mode chunks and
    /// embeds the whole corpus here, so queries only embed the question.
    pub async fn build(config: &Config, corpus: &Corpus) -> Result<Self> {
        let mode = RetrievalMode::from_config(&config.retrieval.mode)?;
        match mode {
            RetrievalMode::Truncate => Ok(Self {
                mode,
                embedder: None,
                index: None,
            }),
            RetrievalMode::Semantic => {
                let embedder = EmbeddingClient::from_config(&config.embedding)?;
                let chunks = chunk_corpus(
                    &corpus.text,
                    config.retrieval.chunk_chars,
                    config.retrieval.overlap_chars,
                );
                let index = VectorIndex::build(&embedder, chunks).await?;
                println!(
                    "indexed {} chunks with {} ({} dims)",
                    index.len(),
                    embedder.model_name(),
                    embedder.dims()
                );
                Ok(Self {
                    mode,
                    embedder: Some(embedder),
                    index: Some(index),
                })
            }
        }
    }

    pub fn mode(&self) -> RetrievalMode {
        self.mode
    }

    /// Select the grounding context for one question.
    pub async fn grounding(&self, config: &Config, corpus: &Corpus, question: &str) -> Result<String> {
        match self.mode {
            RetrievalMode::Truncate => Ok(truncate_chars(
                &corpus.text,
                config.retrieval.truncate_budget,
            )
            .to_string()),
            RetrievalMode::Semantic => {
                let embedder = self
                    .embedder
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("semantic retriever missing embedder"))?;
                let index = self
                    .index
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("semantic retriever missing index"))?;
                let query_vec = embedder.embed_one(question).await?;
                let hits = index.search(&query_vec, config.retrieval.top_k);
                let passages: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
                Ok(passages.join("\n\n"))
            }
        }
    }
}
