//! 답변 오케스트레이터 - 프롬프트 구성, 생성, 모델 장애 복구
//!
//! 복구 흐름:
//! ```text
//! Idle → Pending ─(성공)→ Idle
//!           │
//!           └─(ModelUnavailable)→ Recovering: 후보 모델을 순서대로 probe
//!                 ├─ 첫 성공 모델을 활성화, 원 요청을 정확히 한 번 재시도
//!                 └─ 후보 없음 / 재시도 실패 → Failed (사과 메시지)
//! ```
//! 그 외 에러는 복구 없이 실패합니다. 인덱스 상태는 건드리지 않습니다.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;

use super::context::{ContextAssembler, ContextBlock};
use super::prompt::{build_prompt, Prompt};
use crate::config::GenerationSettings;
use crate::error::GenerationError;
use crate::knowledge::SearchHit;
use crate::llm::{FragmentStream, GenerationProvider, GenerationRequest};
use crate::web::WebResult;

/// 생성 실패 시 사용자에게 돌려주는 메시지
pub const APOLOGY: &str = "Sorry, I encountered an error while generating the response. \
The model might be temporarily unavailable. Please try again or switch to a different model.";

/// 생성된 답변
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// 답변을 생성한 모델
    pub model: String,
    /// 대체 모델로 복구되었는지
    pub recovered: bool,
}

/// 모델 가용성 확인 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub model: String,
    pub available: bool,
    pub active: bool,
}

/// 실행 중 변경 가능한 생성 파라미터
#[derive(Debug, Clone, Copy)]
struct Sampling {
    temperature: f32,
    max_tokens: u32,
}

/// 답변 오케스트레이터
pub struct AnswerOrchestrator {
    provider: Arc<dyn GenerationProvider>,
    assembler: ContextAssembler,
    sampling: Mutex<Sampling>,
    fallback_models: Vec<String>,
    active_model: Mutex<String>,
}

impl AnswerOrchestrator {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        settings: &GenerationSettings,
        assembler: ContextAssembler,
    ) -> Self {
        Self {
            provider,
            assembler,
            sampling: Mutex::new(Sampling {
                temperature: settings.temperature,
                max_tokens: settings.max_tokens,
            }),
            fallback_models: settings.fallback_models.clone(),
            active_model: Mutex::new(settings.model.clone()),
        }
    }

    /// 현재 활성 모델
    pub fn active_model(&self) -> String {
        self.active_model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn temperature(&self) -> f32 {
        self.sampling().temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.sampling().max_tokens
    }

    /// 생성 온도 변경 (0.0 ~ 2.0)
    pub fn set_temperature(&self, temperature: f32) -> Result<(), GenerationError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(GenerationError::Config(format!(
                "temperature must be within [0, 2], got {}",
                temperature
            )));
        }
        self.sampling_mut(|s| s.temperature = temperature);
        tracing::info!("Generation temperature set to {}", temperature);
        Ok(())
    }

    /// 최대 생성 토큰 수 변경
    pub fn set_max_tokens(&self, max_tokens: u32) -> Result<(), GenerationError> {
        if max_tokens == 0 {
            return Err(GenerationError::Config(
                "max_tokens must be greater than 0".to_string(),
            ));
        }
        self.sampling_mut(|s| s.max_tokens = max_tokens);
        tracing::info!("Generation max_tokens set to {}", max_tokens);
        Ok(())
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// 검색 결과 → 컨텍스트 블록
    pub fn assemble(&self, pdf_hits: &[SearchHit], web_hits: &[WebResult]) -> ContextBlock {
        self.assembler.assemble(pdf_hits, web_hits)
    }

    /// 모델 변경 (probe 통과 시에만 적용)
    pub async fn set_model(&self, model: &str) -> bool {
        let model = model.trim();
        if model.is_empty() {
            return false;
        }

        if self.provider.probe(model).await {
            self.set_active(model);
            tracing::info!("Switched generation model to {}", model);
            true
        } else {
            tracing::warn!("Model {} is not available, keeping {}", model, self.active_model());
            false
        }
    }

    /// 활성 모델과 대체 후보들의 가용성 확인
    pub async fn probe_models(&self) -> Vec<ModelStatus> {
        let active = self.active_model();
        let mut candidates = vec![active.clone()];
        for model in &self.fallback_models {
            if !candidates.contains(model) {
                candidates.push(model.clone());
            }
        }

        let mut statuses = Vec::with_capacity(candidates.len());
        for model in candidates {
            let available = self.provider.probe(&model).await;
            statuses.push(ModelStatus {
                active: model == active,
                model,
                available,
            });
        }
        statuses
    }

    // ========================================================================
    // Complete
    // ========================================================================

    /// 답변 생성 (실패 시 에러 반환)
    pub async fn try_answer(
        &self,
        question: &str,
        pdf_hits: &[SearchHit],
        web_hits: &[WebResult],
    ) -> Result<Answer, GenerationError> {
        let block = self.assemble(pdf_hits, web_hits);
        self.try_answer_with_context(question, &block).await
    }

    /// 답변 생성 (실패 시 사과 메시지, 에러 없음)
    pub async fn answer(
        &self,
        question: &str,
        pdf_hits: &[SearchHit],
        web_hits: &[WebResult],
    ) -> String {
        match self.try_answer(question, pdf_hits, web_hits).await {
            Ok(answer) => answer.text,
            Err(e) => {
                tracing::error!("Answer generation failed: {}", e);
                APOLOGY.to_string()
            }
        }
    }

    /// 조립된 블록으로 답변 생성
    pub async fn try_answer_with_context(
        &self,
        question: &str,
        block: &ContextBlock,
    ) -> Result<Answer, GenerationError> {
        let request = self.request(&build_prompt(question, block));
        tracing::debug!(
            "Generating answer with {} ({} context excerpt(s))",
            request.model,
            block.excerpts().len()
        );

        match self.provider.complete(&request).await {
            Ok(text) => Ok(Answer {
                text,
                model: request.model,
                recovered: false,
            }),
            Err(e) if e.is_model_unavailable() => {
                let model = self.recover(&request.model, &e).await?;
                let text = self.provider.complete(&request.with_model(&model)).await?;
                Ok(Answer {
                    text,
                    model,
                    recovered: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Stream
    // ========================================================================

    /// 스트리밍 답변 (시작 실패 시 에러 반환)
    pub async fn try_stream_answer(
        &self,
        question: &str,
        pdf_hits: &[SearchHit],
        web_hits: &[WebResult],
    ) -> Result<FragmentStream, GenerationError> {
        let block = self.assemble(pdf_hits, web_hits);
        self.try_stream_with_context(question, &block).await
    }

    /// 스트리밍 답변 (실패는 사과 조각으로 끝남)
    pub async fn stream_answer(
        &self,
        question: &str,
        pdf_hits: &[SearchHit],
        web_hits: &[WebResult],
    ) -> BoxStream<'static, String> {
        let block = self.assemble(pdf_hits, web_hits);
        self.stream_with_context(question, &block).await
    }

    /// 조립된 블록으로 스트리밍 시작
    ///
    /// 모델 복구는 스트림을 여는 시점에만 적용됩니다.
    pub async fn try_stream_with_context(
        &self,
        question: &str,
        block: &ContextBlock,
    ) -> Result<FragmentStream, GenerationError> {
        let request = self.request(&build_prompt(question, block));
        tracing::debug!("Streaming answer with {}", request.model);

        match self.provider.stream(&request).await {
            Ok(stream) => Ok(stream),
            Err(e) if e.is_model_unavailable() => {
                let model = self.recover(&request.model, &e).await?;
                self.provider.stream(&request.with_model(&model)).await
            }
            Err(e) => Err(e),
        }
    }

    /// 조립된 블록으로 스트리밍 (실패는 사과 조각으로 끝남)
    pub async fn stream_with_context(
        &self,
        question: &str,
        block: &ContextBlock,
    ) -> BoxStream<'static, String> {
        match self.try_stream_with_context(question, block).await {
            Ok(fragments) => apologize_on_error(fragments),
            Err(e) => {
                tracing::error!("Answer stream failed to start: {}", e);
                stream::once(future::ready(APOLOGY.to_string())).boxed()
            }
        }
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// 실패한 모델을 제외한 후보를 순서대로 probe, 첫 성공 모델을 활성화
    async fn recover(
        &self,
        failed_model: &str,
        cause: &GenerationError,
    ) -> Result<String, GenerationError> {
        tracing::warn!(
            "Model {} failed ({}), trying to find a working model...",
            failed_model,
            cause
        );

        for candidate in self.fallback_models.iter().filter(|m| m.as_str() != failed_model) {
            if self.provider.probe(candidate).await {
                self.set_active(candidate);
                tracing::info!("Auto-selected working model: {}", candidate);
                return Ok(candidate.clone());
            }
            tracing::debug!("Fallback model {} is not available", candidate);
        }

        tracing::error!("No working models found");
        Err(GenerationError::ModelUnavailable {
            model: failed_model.to_string(),
            message: "no fallback model passed the availability probe".to_string(),
        })
    }

    fn set_active(&self, model: &str) {
        *self.active_model.lock().unwrap_or_else(PoisonError::into_inner) = model.to_string();
    }

    fn sampling(&self) -> Sampling {
        *self.sampling.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sampling_mut(&self, update: impl FnOnce(&mut Sampling)) {
        update(&mut self.sampling.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn request(&self, prompt: &Prompt) -> GenerationRequest {
        let sampling = self.sampling();
        GenerationRequest {
            system_prompt: prompt.system.clone(),
            user_prompt: prompt.user.clone(),
            model: self.active_model(),
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
        }
    }
}

/// 스트림 도중 에러가 나면 사과 조각을 내보내고 종료
fn apologize_on_error(fragments: FragmentStream) -> BoxStream<'static, String> {
    fragments
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            match item {
                Ok(text) => future::ready(Some(text)),
                Err(e) => {
                    tracing::error!("Answer stream interrupted: {}", e);
                    *failed = true;
                    future::ready(Some(APOLOGY.to_string()))
                }
            }
        })
        .boxed()
}
