//! 로컬 임베딩 (fastembed, 오프라인)
//!
//! ONNX 문장 임베딩 모델을 로컬에서 실행합니다. 기본 모델은 all-MiniLM-L6-v2 (384차원).
//! 첫 사용 시 모델 파일을 내려받아 캐시합니다.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};

use super::EmbeddingProvider;

/// 기본 로컬 모델
pub const DEFAULT_LOCAL_MODEL: &str = "all-MiniLM-L6-v2";

/// fastembed 로컬 임베딩
///
/// `TextEmbedding::embed`가 `&mut self`를 요구하므로 Mutex로 감쌉니다.
pub struct FastEmbedding {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedding {
    /// 모델 로드 (블로킹: 다운로드와 ONNX 세션 생성)
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        let model_kind = parse_model_name(model_name)?;

        let mut options = InitOptions::new(model_kind).with_show_download_progress(true);
        if let Some(dir) = cache_dir {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create model cache directory: {:?}", dir))?;
            options = options.with_cache_dir(dir);
        }

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| anyhow!("Failed to load embedding model {}: {}", model_name, e))?;

        // 차원은 모델마다 다르므로 테스트 문장으로 확인
        let dimension = model
            .embed(vec!["test"], None)
            .map_err(|e| anyhow!("Failed to read model dimension: {}", e))?
            .first()
            .map(|v| v.len())
            .ok_or_else(|| anyhow!("Model returned no embedding"))?;

        tracing::debug!("Loaded local model {} ({} dims)", model_name, dimension);

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// 기본 모델 로드
    pub fn default_model(cache_dir: Option<PathBuf>) -> Result<Self> {
        Self::new(DEFAULT_LOCAL_MODEL, cache_dir)
    }

    /// 추론은 CPU 바운드라 블로킹 스레드에서 실행
    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().unwrap_or_else(PoisonError::into_inner);
            model
                .embed(texts, None)
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await
        .context("Embedding task failed")?
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let vectors = self.run(texts.to_vec()).await?;
        if vectors.len() != texts.len() {
            bail!(
                "Local model returned {} embeddings for {} texts",
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

/// 모델 이름 → fastembed 모델
pub fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name.trim().to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminilml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l6-v2-q" | "allminilml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        other => bail!(
            "Unknown local embedding model: {} (supported: all-MiniLM-L6-v2, \
             all-MiniLM-L6-v2-q, bge-small-en-v1.5, bge-base-en-v1.5)",
            other
        ),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_name() {
        assert!(matches!(
            parse_model_name("all-MiniLM-L6-v2"),
            Ok(fastembed::EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            parse_model_name(" BGE-small-en-v1.5 "),
            Ok(fastembed::EmbeddingModel::BGESmallENV15)
        ));
        assert!(parse_model_name("text-embedding-3-small").is_err());
    }

    #[tokio::test]
    #[ignore = "requires model download"]
    async fn test_paraphrase_is_closer_than_unrelated() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = FastEmbedding::default_model(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(embedder.dimension(), 384);

        let texts = vec![
            "Cars need gasoline to run.".to_string(),
            "The sky is blue.".to_string(),
        ];
        let docs = embedder.embed_batch(&texts).await.unwrap();
        let query = embedder.embed("What fuel do automobiles use?").await.unwrap();

        let cosine = |a: &[f32], b: &[f32]| {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
            dot / (norm(a) * norm(b))
        };
        let fuel = cosine(&query, &docs[0]);
        let sky = cosine(&query, &docs[1]);
        assert!(fuel > 0.3, "paraphrase similarity {}", fuel);
        assert!(fuel > sky);
    }
}
