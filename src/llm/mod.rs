//! 생성 모듈 - LLM 완성(complete) / 스트리밍(stream) 프로바이더
//!
//! 오케스트레이터는 [`GenerationProvider`] 트레이트만 사용합니다.
//! "모델 없음/사용 중단"은 [`GenerationError::ModelUnavailable`]로 구분되어
//! 대체 모델 복구를 트리거합니다.

mod groq;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::error::GenerationError;

pub use groq::{classify_error, parse_sse_line, GroqProvider, SseEvent, GROQ_API_URL};

/// 순서가 보장되는 텍스트 조각 스트림 (소진 = 완료)
pub type FragmentStream = BoxStream<'static, Result<String, GenerationError>>;

/// 채팅 메시지
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// 생성 요청
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    /// 모델 가용성 확인용 최소 요청
    pub fn probe(model: &str) -> Self {
        Self {
            system_prompt: String::new(),
            user_prompt: "Test".to_string(),
            model: model.to_string(),
            temperature: 0.0,
            max_tokens: 5,
        }
    }

    /// 같은 프롬프트로 모델만 교체
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// system(비어있지 않을 때) + user 메시지
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if !self.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: self.system_prompt.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: self.user_prompt.clone(),
        });
        messages
    }
}

/// 생성 프로바이더 트레이트
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// 전체 응답 생성
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// 스트리밍 응답 생성
    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, GenerationError>;

    /// 모델이 동작하는지 최소 호출로 확인
    async fn probe(&self, model: &str) -> bool {
        match self.complete(&GenerationRequest::probe(model)).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Probe of model {} failed: {}", model, e);
                false
            }
        }
    }

    /// 프로바이더 이름
    fn name(&self) -> &str;
}
