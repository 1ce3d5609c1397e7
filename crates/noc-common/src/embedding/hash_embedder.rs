//! Feature-hashing embedder: deterministic, no model server, useful for
//! tests and offline smoke runs.

use std::hash::{Hash, Hasher};

use siphasher::sip::SipHasher13;

use super::{Embedder, EmbeddingError};

// Fixed seeds keep embeddings stable across processes and Rust versions.
// Changing them changes every vector, so any persisted index must be
// rebuilt; bump the version string alongside.
const HASH_SEED_K0: u64 = 0x6e6f_635f_6d61_7463;
const HASH_SEED_K1: u64 = 0x6865_7220_7631_0000;

#[derive(Debug)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn hash_token(&self, token: &str) -> usize {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K0, HASH_SEED_K1);
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.dimension
    }

    /// Sign hashing: each token adds +1 or -1 to its bucket, which keeps
    /// the expected dot product of unrelated texts near zero.
    fn token_sign(&self, token: &str) -> f32 {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K1, HASH_SEED_K0);
        token.hash(&mut hasher);
        if hasher.finish() % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let idx = self.hash_token(token);
            vector[idx] += self.token_sign(token);
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn model_version(&self) -> &str {
        "v1"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| self.embed_one(&text.to_lowercase()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn produces_normalized_vectors() {
        let embedder = HashEmbedder::new(256);

        let vectors = embedder.embed(&["design and develop software".into()]).unwrap();

        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "L2 norm should be 1.0, got {norm}");
    }

    #[test]
    fn is_deterministic() {
        let embedder = HashEmbedder::new(256);
        let texts = vec!["supervise nursing staff".to_string()];

        assert_eq!(embedder.embed(&texts).unwrap(), embedder.embed(&texts).unwrap());
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedder = HashEmbedder::new(64);

        let vectors = embedder.embed(&["".into()]).unwrap();

        assert!(vectors[0].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn overlapping_texts_are_more_similar_than_disjoint_ones() {
        let embedder = HashEmbedder::new(256);
        let vectors = embedder
            .embed(&[
                "develop and maintain software applications".into(),
                "develop software applications for clients".into(),
                "administer medications to hospital patients".into(),
            ])
            .unwrap();

        let overlapping = cosine_similarity(&vectors[0], &vectors[1]);
        let disjoint = cosine_similarity(&vectors[0], &vectors[2]);

        assert!(
            overlapping > disjoint,
            "overlap {overlapping} should beat disjoint {disjoint}"
        );
    }
}
