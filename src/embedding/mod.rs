//! 임베딩 모듈 - 텍스트 벡터화 프로바이더
//!
//! 인덱스는 [`EmbeddingProvider`] 트레이트만 알고 있으며, 구현체는 주입됩니다.
//!
//! - [`GeminiEmbedding`]: Gemini API (네트워크, API 키 필요)
//! - [`FastEmbedding`]: fastembed 로컬 문장 모델 (오프라인, 기본 all-MiniLM-L6-v2)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config.embedding)?;
//! let vector = embedder.embed("Hello, world!").await?;
//! ```

mod gemini;
#[cfg(test)]
mod hashing;
mod local;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::{EmbeddingBackend, EmbeddingConfig};

pub use gemini::{get_api_key, has_api_key, GeminiEmbedding, DEFAULT_DIMENSION};
#[cfg(test)]
pub(crate) use hashing::{HashingEmbedding, DEFAULT_HASHING_DIMENSION};
pub use local::{parse_model_name, FastEmbedding, DEFAULT_LOCAL_MODEL};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 세션 동안 같은 차원의 벡터를 반환해야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출, 하나라도 실패하면 전체 실패)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 따라 임베딩 프로바이더 생성
///
/// `Auto`는 Gemini API 키가 있으면 Gemini, 없으면 로컬 fastembed 모델을 씁니다.
/// 로컬 모델은 첫 실행 시 내려받으므로 블로킹 호출입니다.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let use_gemini = match config.provider {
        EmbeddingBackend::Gemini => {
            if !has_api_key() {
                bail!(
                    "GEMINI_API_KEY or GOOGLE_AI_API_KEY not set.\n\
                     Set: export GEMINI_API_KEY=your-api-key\n\
                     Or use the offline embedder: PALANK_QA_EMBEDDING=local"
                );
            }
            true
        }
        EmbeddingBackend::Auto => has_api_key(),
        EmbeddingBackend::Local => false,
    };

    let embedder: Arc<dyn EmbeddingProvider> = if use_gemini {
        let dimension = config.dimension.unwrap_or(DEFAULT_DIMENSION);
        Arc::new(GeminiEmbedding::from_env_with_dimension(dimension)?)
    } else {
        Arc::new(FastEmbedding::new(&config.local_model, config.cache_dir.clone())?)
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rejects_unknown_local_model() {
        let config = EmbeddingConfig {
            provider: EmbeddingBackend::Local,
            local_model: "no-such-model".to_string(),
            ..Default::default()
        };
        let err = create_embedder(&config).err().expect("unknown model must fail");
        assert!(err.to_string().contains("no-such-model"));
    }

    #[tokio::test]
    async fn test_default_embed_batch_is_sequential() {
        let embedder = HashingEmbedding::with_dimension(64).expect("embedder");
        let texts = vec!["first text".to_string(), "second text".to_string()];
        let vectors = embedder.embed_batch(&texts).await.expect("batch");
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == 64));
    }
}
