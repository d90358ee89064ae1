//! 설정 모듈 - 타입이 있는 파이프라인 설정
//!
//! 모든 값은 문서화된 기본값을 가지며, `PALANK_QA_*` 환경변수로 덮어쓸 수 있습니다.
//! CLI 플래그는 그 위에 다시 적용됩니다.
//!
//! | 환경변수 | 필드 |
//! |---|---|
//! | `PALANK_QA_MODEL` | `generation.model` |
//! | `PALANK_QA_TEMPERATURE` | `generation.temperature` |
//! | `PALANK_QA_MAX_TOKENS` | `generation.max_tokens` |
//! | `PALANK_QA_SIMILARITY_THRESHOLD` | `retrieval.similarity_threshold` |
//! | `PALANK_QA_CHUNK_SIZE` | `chunk.target_size` |
//! | `PALANK_QA_EMBEDDING` | `embedding.provider` (`auto`, `gemini`, `local`) |
//! | `PALANK_QA_LOCAL_MODEL` | `embedding.local_model` |
//! | `PALANK_QA_MODEL_CACHE` | `embedding.cache_dir` |

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::knowledge::ChunkConfig;

/// 기본 생성 모델 (Groq)
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// 모델 불가 시 순서대로 탐색하는 대체 후보
pub const DEFAULT_FALLBACK_MODELS: &[&str] = &["llama-3.1-8b-instant", "llama-3.3-70b-versatile"];

// ============================================================================
// Sections
// ============================================================================

/// 검색 / 컨텍스트 조립 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 이 값을 초과하는 코사인 유사도만 PDF 결과로 인정
    pub similarity_threshold: f32,
    /// 컨텍스트에 포함할 PDF 청크 수
    pub pdf_results: usize,
    /// 컨텍스트에 포함할 웹 결과 수
    pub web_results: usize,
    /// 발췌문 하나의 최대 길이 (문자 수)
    pub max_excerpt_chars: usize,
    /// 렌더링된 전체 컨텍스트의 최대 길이 (문자 수)
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.3,
            pdf_results: 3,
            web_results: 3,
            max_excerpt_chars: 1500,
            max_context_chars: 6000,
        }
    }
}

/// 웹 검색 백엔드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    pub user_agent: String,
    /// DuckDuckGo instant answer API
    pub api_url: String,
    /// DuckDuckGo HTML 결과 페이지
    pub html_url: String,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
            api_url: "https://api.duckduckgo.com/".to_string(),
            html_url: "https://html.duckduckgo.com/html/".to_string(),
        }
    }
}

/// 답변 생성 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// 시작 모델 ID
    pub model: String,
    /// 샘플링 온도 (0.0 ~ 2.0)
    pub temperature: f32,
    /// 응답 최대 토큰
    pub max_tokens: u32,
    /// 모델 불가 시 탐색 순서
    pub fallback_models: Vec<String>,
    /// 생성 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            fallback_models: DEFAULT_FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            timeout_secs: 60,
        }
    }
}

/// 임베딩 프로바이더 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Gemini 키가 있으면 Gemini, 없으면 로컬 fastembed 모델
    Auto,
    Gemini,
    Local,
}

impl FromStr for EmbeddingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gemini" => Ok(Self::Gemini),
            "local" | "fastembed" => Ok(Self::Local),
            other => bail!("Unknown embedding provider '{}' (expected auto, gemini, local)", other),
        }
    }
}

/// 임베딩 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    /// 차원 (None이면 프로바이더 기본값, Gemini에만 적용)
    pub dimension: Option<usize>,
    /// 로컬 fastembed 모델 이름
    pub local_model: String,
    /// 모델 캐시 디렉토리 (None이면 fastembed 기본 위치)
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Auto,
            dimension: None,
            local_model: "all-MiniLM-L6-v2".to_string(),
            cache_dir: None,
        }
    }
}

// ============================================================================
// RagConfig
// ============================================================================

/// 전체 파이프라인 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub chunk: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub web: WebSearchConfig,
    pub generation: GenerationSettings,
    pub embedding: EmbeddingConfig,
}

impl RagConfig {
    /// 기본값 + 환경변수 덮어쓰기
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(model) = env_value("PALANK_QA_MODEL") {
            config.generation.model = model;
        }
        if let Some(temperature) = parse_env("PALANK_QA_TEMPERATURE")? {
            config.generation.temperature = temperature;
        }
        if let Some(max_tokens) = parse_env("PALANK_QA_MAX_TOKENS")? {
            config.generation.max_tokens = max_tokens;
        }
        if let Some(threshold) = parse_env("PALANK_QA_SIMILARITY_THRESHOLD")? {
            config.retrieval.similarity_threshold = threshold;
        }
        if let Some(size) = parse_env("PALANK_QA_CHUNK_SIZE")? {
            config.chunk.target_size = size;
        }
        if let Some(provider) = parse_env("PALANK_QA_EMBEDDING")? {
            config.embedding.provider = provider;
        }
        if let Some(model) = env_value("PALANK_QA_LOCAL_MODEL") {
            config.embedding.local_model = model;
        }
        if let Some(dir) = env_value("PALANK_QA_MODEL_CACHE") {
            config.embedding.cache_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }

    /// 값 범위 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk.target_size == 0 {
            bail!("chunk.target_size must be greater than 0");
        }
        if !(-1.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            bail!(
                "retrieval.similarity_threshold must be within [-1, 1], got {}",
                self.retrieval.similarity_threshold
            );
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            bail!(
                "generation.temperature must be within [0, 2], got {}",
                self.generation.temperature
            );
        }
        if self.generation.max_tokens == 0 {
            bail!("generation.max_tokens must be greater than 0");
        }
        if self.generation.model.trim().is_empty() {
            bail!("generation.model must not be empty");
        }
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 비어있지 않은 환경변수 값
pub(crate) fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_value(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: '{}'", name, raw)),
        None => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================
