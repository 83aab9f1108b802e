//! In-memory vector index over corpus chunks.
//!
//! Exact linear-scan cosine similarity. At the corpus sizes this system
//! handles (tens to low hundreds of chunks) a linear scan beats any
//! approximate structure on both simplicity and tuning cost. The index is
//! built once per corpus version and replaced wholesale on refresh, never
//! mutated in place.

use anyhow::{bail, Result};

use crate::chunk::Chunk;
use crate::embedding::{cosine_similarity, EmbeddingClient};

/// A chunk paired with its similarity score for one query.
#[derive(Debug, Clone)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

#[derive(Debug)]
pub struct VectorIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Build an index from pre-computed vectors. `vectors[i]` must embed
    /// `chunks[i]`.
    pub fn new(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != vectors.len() {
            bail!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        Ok(Self { chunks, vectors })
    }

    /// Embed every chunk through `client` and build the index. Each chunk is
    /// embedded exactly once; there is no incremental update.
    pub async fn build(client: &EmbeddingClient, chunks: Vec<Chunk>) -> Result<Self> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(client.batch_size()) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            vectors.extend(client.embed_batch(&texts).await?);
        }
        Self::new(chunks, vectors)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top-`k` chunks by cosine similarity to `query`, descending. Ties
    /// resolve in original corpus order (earlier chunk wins). If `k` exceeds
    /// the chunk count, all chunks are returned, ranked.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk<'_>> {
        let mut scored: Vec<ScoredChunk<'_>> = self
            .chunks
            .iter()
            .zip(self.vectors.iter())
            .map(|(chunk, vec)| ScoredChunk {
                chunk,
                score: cosine_similarity(query, vec),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.index.cmp(&b.chunk.index))
        });
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            index,
            text: text.to_string(),
        }
    }

    fn index_of(vectors: Vec<Vec<f32>>) -> VectorIndex {
        let chunks = (0..vectors.len())
            .map(|i| chunk(i, &format!("chunk {}", i)))
            .collect();
        VectorIndex::new(chunks, vectors).unwrap()
    }

    #[test]
    fn self_match_is_top_result() {
        // Ten distinct directions; querying with chunk 3's own vector must
        // return chunk 3 first (self-similarity is maximal).
        let vectors: Vec<Vec<f32>> = (0..10)
            .map(|i| {
                let angle = i as f32 * 0.3;
                vec![angle.cos(), angle.sin()]
            })
            .collect();
        let query = vectors[3].clone();
        let index = index_of(vectors);

        let results = index.search(&query, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.index, 3);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ties_resolve_in_corpus_order() {
        // Chunks 1 and 2 are identical vectors: equal similarity to any
        // query, so the earlier chunk must win.
        let index = index_of(vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 0.0],
        ]);
        let results = index.search(&[1.0, 0.0], 3);
        assert_eq!(results[0].chunk.index, 1);
        assert_eq!(results[1].chunk.index, 2);
        assert_eq!(results[2].chunk.index, 0);
    }

    #[test]
    fn oversized_k_returns_all_ranked() {
        let index = index_of(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let results = index.search(&[1.0, 0.0], 50);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.index, 0);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let err = VectorIndex::new(vec![chunk(0, "x")], vec![]).unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn ranking_is_descending() {
        let index = index_of(vec![
            vec![1.0, 0.0],
            vec![0.7, 0.7],
            vec![0.0, 1.0],
        ]);
        let results = index.search(&[1.0, 0.0], 3);
        let scores: Vec<f32> = results.iter().map(|r| r.score).collect();
        assert!(scores[0] >= scores[1] && scores[1] >= scores[2]);
    }
}
