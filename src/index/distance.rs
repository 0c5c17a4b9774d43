// file: src/index/distance.rs
// description: cosine similarity kernels for the vector index
// reference: https://en.wikipedia.org/wiki/Cosine_similarity

pub fn magnitude(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let mut sum = 0.0;
    let mut i = 0;

    // Unrolled by 4
    while i + 3 < n {
        sum += a[i] * b[i] + a[i + 1] * b[i + 1] + a[i + 2] * b[i + 2] + a[i + 3] * b[i + 3];
        i += 4;
    }

    while i < n {
        sum += a[i] * b[i];
        i += 1;
    }

    sum
}

/// Cosine similarity in [-1, 1]; zero-magnitude inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32], mag_a: f32, mag_b: f32) -> f32 {
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot(a, b) / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_bounds() {
        let a = [1.0, 0.0, 0.0, 0.0, 2.0];
        let b = [-1.0, 0.0, 0.0, 0.0, -2.0];
        let same = cosine_similarity(&a, &a, magnitude(&a), magnitude(&a));
        let opposite = cosine_similarity(&a, &b, magnitude(&a), magnitude(&b));
        assert!((same - 1.0).abs() < 1e-6);
        assert!((opposite + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let a = [0.0; 4];
        let b = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(cosine_similarity(&a, &b, magnitude(&a), magnitude(&b)), 0.0);
    }
}
