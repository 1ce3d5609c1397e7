use crate::index::VectorMatrix;

/// Cosine similarity in [-1.0, 1.0].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        tracing::warn!(
            a_len = a.len(),
            b_len = b.len(),
            "embedding dimension mismatch; returning zero similarity"
        );
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Pairwise cosine similarities: one row per query, one column per index row.
pub fn pairwise_cosine(queries: &[Vec<f32>], index: &VectorMatrix) -> Vec<Vec<f32>> {
    queries
        .iter()
        .map(|query| {
            index
                .rows()
                .map(|row| cosine_similarity(query, row))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_returns_one_for_identical_vectors() {
        let a = vec![1.0, 2.0, 3.0];

        let sim = cosine_similarity(&a, &a);

        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_returns_minus_one_for_opposite_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];

        let sim = cosine_similarity(&a, &b);

        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_handles_zero_vectors() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 0.0];

        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&a, &a), 0.0);
    }

    #[test]
    fn cosine_similarity_returns_zero_on_dimension_mismatch() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0];

        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn pairwise_cosine_shape_matches_inputs() {
        let index = VectorMatrix::from_rows(2, vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let queries = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];

        let sims = pairwise_cosine(&queries, &index);

        assert_eq!(sims.len(), 3);
        assert_eq!(sims[0].len(), 2);
        assert!((sims[0][0] - 1.0).abs() < 1e-6);
        assert!(sims[0][1].abs() < 1e-6);
        assert!((sims[2][0] - sims[2][1]).abs() < 1e-6);
    }
}
