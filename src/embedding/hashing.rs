//! 결정적 해싱 임베딩 (테스트 전용)
//!
//! 소문자 영숫자 토큰 → 불용어 제거 → 간단한 접미사 정리 → SHA-256 버킷 해싱.
//! 의미 모델은 아니지만 키워드가 겹치는 문장끼리 높은 코사인 유사도를 가집니다.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

/// 기본 차원
pub const DEFAULT_HASHING_DIMENSION: usize = 512;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "in", "on", "at", "to",
    "for", "of", "with", "by", "from", "as", "and", "or", "but", "not", "no", "so", "if", "then",
    "it", "its", "this", "that", "these", "those", "what", "which", "who", "whom", "how", "why",
    "when", "where", "do", "does", "did", "can", "could", "should", "would", "will", "there",
];

/// 특징 해싱 임베딩
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new() -> Self {
        Self {
            dimension: DEFAULT_HASHING_DIMENSION,
        }
    }

    pub fn with_dimension(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Hashing embedding dimension must be greater than 0");
        }
        Ok(Self { dimension })
    }

    /// 텍스트 → 정규화 전 빈도 벡터
    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            vector[self.bucket(&token)] += 1.0;
        }
        vector
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(prefix) % self.dimension as u64) as usize
    }
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing-local"
    }
}

/// 토큰화: 영숫자 단위 분리, 1글자/불용어 제거, 접미사 정리
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() > 1 && !STOP_WORDS.contains(&t.as_str()))
        .map(|t| stem(&t))
        .collect()
}

/// 아주 가벼운 영어 접미사 정리 (boils → boil, degrees → degree)
fn stem(token: &str) -> String {
    let len = token.chars().count();
    if !token.is_ascii() || len <= 3 {
        return token.to_string();
    }

    if let Some(base) = token.strip_suffix("ing") {
        if base.len() >= 3 {
            return base.to_string();
        }
    }
    if let Some(base) = token.strip_suffix("ed") {
        if base.len() >= 3 {
            return base.to_string();
        }
    }
    if token.ends_with('s') && !token.ends_with("ss") && !token.ends_with("us") {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::cosine_similarity;

    #[test]
    fn test_tokenize_filters_and_stems() {
        let tokens = tokenize("What temperature does water boil?");
        assert_eq!(tokens, vec!["temperature", "water", "boil"]);

        let tokens = tokenize("Water boils at 100 degrees Celsius.");
        assert_eq!(tokens, vec!["water", "boil", "100", "degree", "celsius"]);
    }

    #[test]
    fn test_stem_keeps_short_and_non_ascii() {
        assert_eq!(stem("gas"), "gas");
        assert_eq!(stem("glass"), "glass");
        assert_eq!(stem("status"), "status");
        assert_eq!(stem("물질들"), "물질들");
        assert_eq!(stem("running"), "runn");
    }

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = HashingEmbedding::new();
        let a = embedder.embed("The sky is blue.").await.expect("embed");
        let b = embedder.embed("The sky is blue.").await.expect("embed");
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_HASHING_DIMENSION);
    }

    #[tokio::test]
    async fn test_keyword_overlap_scores_higher() {
        let embedder = HashingEmbedding::new();
        let query = embedder.embed("What temperature does water boil?").await.expect("embed");
        let water = embedder
            .embed("Water boils at 100 degrees Celsius.")
            .await
            .expect("embed");
        let sky = embedder.embed("The sky is blue.").await.expect("embed");

        assert!(cosine_similarity(&query, &water) > 0.3);
        assert!(cosine_similarity(&query, &water) > cosine_similarity(&query, &sky));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedding::with_dimension(0).is_err());
    }
}
