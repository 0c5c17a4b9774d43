// file: src/embedding/hashing.rs
// description: deterministic offline feature-hashing embedder
// reference: signed feature hashing into a fixed-width vector

use async_trait::async_trait;

use super::EmbeddingService;
use crate::error::{Result, SearchError};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Maps lower-cased tokens onto signed buckets and L2-normalises the result.
///
/// Blood-group tokens such as `o+` or `ab-` survive tokenisation intact, and a
/// trailing plural `s` is folded so "donors" and "donor" share a bucket.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut tokens = tokenize(text);

        // Text without word characters still gets a stable, non-zero vector.
        if tokens.is_empty() {
            tokens.push(text.trim().to_lowercase());
        }

        for token in &tokens {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        } else {
            // Colliding tokens cancelled out; fall back to the first bucket hit.
            let hash = fnv1a(text.as_bytes());
            vector[(hash % self.dimension as u64) as usize] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(SearchError::EmbeddingService(
                "cannot embed empty text".to_string(),
            ));
        }
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '-'))
        .filter_map(|raw| {
            if is_blood_group(raw) {
                return Some(raw.to_string());
            }
            let word = raw.trim_matches(|c| c == '+' || c == '-');
            if word.is_empty() {
                None
            } else {
                Some(fold_plural(word).to_string())
            }
        })
        .collect()
}

fn is_blood_group(token: &str) -> bool {
    matches!(token, "a+" | "a-" | "b+" | "b-" | "ab+" | "ab-" | "o+" | "o-")
}

fn fold_plural(word: &str) -> &str {
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        &word[..word.len() - 1]
    } else {
        word
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_tokenize_keeps_blood_groups() {
        assert_eq!(
            tokenize("O+ donors in Udaipur, AB- patients"),
            vec!["o+", "donor", "in", "udaipur", "ab-", "patient"]
        );
        assert_eq!(tokenize("address -- glass"), vec!["address", "glass"]);
    }

    #[test]
    fn test_embedding_is_normalised_and_deterministic() {
        let embedder = HashingEmbedder::new(256);
        let a = embedder.embed_sync("Donor: Asha, Blood Group O+, City Udaipur");
        let b = embedder.embed_sync("Donor: Asha, Blood Group O+, City Udaipur");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_related_text_scores_higher() {
        let embedder = HashingEmbedder::new(1024);
        let query = embedder.embed_sync("O+ donors in Udaipur");
        let donor = embedder.embed_sync("Donor: Asha, Age 29, Blood Group O+, City Udaipur");
        let request = embedder.embed_sync("Request: Patient Meera, Blood Group AB-, Status pending");
        assert!(cosine(&query, &donor) > cosine(&query, &request));
    }

    #[test]
    fn test_punctuation_only_text_is_not_zero() {
        let embedder = HashingEmbedder::new(32);
        let vector = embedder.embed_sync("???");
        assert!(vector.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_empty_text_is_rejected() {
        let embedder = HashingEmbedder::new(32);
        assert!(tokio_test::block_on(embedder.embed("")).is_err());
        assert_eq!(
            tokio_test::block_on(embedder.embed("O+")).unwrap(),
            embedder.embed_sync("O+")
        );
    }
}
