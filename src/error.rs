//! 에러 분류 - 수집 / 검색 / 생성
//!
//! 라이브러리 경계에서는 타입이 있는 에러를 돌려주고,
//! 프로바이더 내부와 CLI는 `anyhow`를 그대로 사용합니다.
//!
//! - [`IngestionError`]: 청크 배치 임베딩 실패 → 해당 add만 중단, 기존 인덱스 유지
//! - [`SearchError`]: PDF/웹 검색 실패 → 호출 측에서 "결과 0건"으로 강등
//! - [`GenerationError`]: 모델 불가(복구 대상) / 일시적 실패 / 설정 오류(치명적)

use thiserror::Error;

/// 문서 수집(임베딩) 에러
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 임베딩 프로바이더 호출 실패
    #[error("embedding failed for a batch of {batch} chunks: {message}")]
    Embedding { batch: usize, message: String },

    /// 프로바이더가 입력 수와 다른 개수의 벡터를 반환
    #[error("embedding provider returned {actual} vectors for {expected} texts")]
    CountMismatch { expected: usize, actual: usize },

    /// 인덱스 차원과 다른 벡터
    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// 검색 에러 (PDF 인덱스 또는 웹 백엔드)
#[derive(Debug, Error)]
pub enum SearchError {
    /// 질의 임베딩 실패
    #[error("query embedding failed: {0}")]
    Embedding(String),

    /// HTTP 요청 실패 (타임아웃 포함)
    #[error("{engine} request failed: {message}")]
    Http { engine: String, message: String },

    /// 응답 파싱 실패
    #[error("{engine} response could not be parsed: {message}")]
    Parse { engine: String, message: String },
}

impl SearchError {
    pub(crate) fn http(engine: &str, err: impl std::fmt::Display) -> Self {
        Self::Http {
            engine: engine.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn parse(engine: &str, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            engine: engine.to_string(),
            message: err.to_string(),
        }
    }
}

/// 답변 생성 에러
#[derive(Debug, Error)]
pub enum GenerationError {
    /// 모델을 찾을 수 없거나 사용 중단됨 (대체 모델 복구 대상)
    #[error("model '{model}' is unavailable: {message}")]
    ModelUnavailable { model: String, message: String },

    /// 일반 요청 실패 (네트워크, 타임아웃, 5xx 등)
    #[error("generation request failed: {0}")]
    Request(String),

    /// 스트리밍 도중 실패
    #[error("generation stream failed: {0}")]
    Stream(String),

    /// 설정 오류 (API 키 누락 등) - 초기화 시점에 즉시 실패
    #[error("generation is not configured: {0}")]
    Config(String),
}

impl GenerationError {
    /// 복구 상태 머신을 트리거하는 에러인지
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, Self::ModelUnavailable { .. })
    }

    /// 재시도해도 의미 없는 설정 오류인지
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
