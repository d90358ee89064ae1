//! Groq 생성 프로바이더 (OpenAI 호환 chat completions)
//!
//! ref: https://console.groq.com/docs/api-reference#chat-create
//!
//! 스트리밍은 SSE(`data: {...}`) 줄 단위로 파싱하며 `[DONE]`에서 종료합니다.
//! 스트림을 중간에 버리면 응답 본문도 함께 드롭되어 연결이 닫힙니다.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};

use super::{FragmentStream, GenerationProvider, GenerationRequest};
use crate::config::env_value;
use crate::error::GenerationError;

/// Groq OpenAI 호환 엔드포인트
pub const GROQ_API_URL: &str = "https://api.groq.com/openai/v1";

const API_KEY_VAR: &str = "GROQ_API_KEY";

/// "모델 없음"으로 취급하는 에러 코드
const MODEL_UNAVAILABLE_CODES: [&str; 2] = ["model_not_found", "model_decommissioned"];

// ============================================================================
// GroqProvider
// ============================================================================

/// Groq 프로바이더
#[derive(Clone)]
pub struct GroqProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GroqProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GroqProvider {
    /// API 키와 타임아웃으로 생성
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::Config("Groq API key is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url: GROQ_API_URL.to_string(),
            client,
        })
    }

    /// `GROQ_API_KEY` 환경변수로 생성 (없으면 즉시 설정 오류)
    pub fn from_env(timeout: Duration) -> Result<Self, GenerationError> {
        let api_key = env_value(API_KEY_VAR).ok_or_else(|| {
            GenerationError::Config(format!(
                "{} not set.\n\
                 Set: export {}=your-api-key\n\
                 Get your API key at: https://console.groq.com/keys",
                API_KEY_VAR, API_KEY_VAR
            ))
        })?;
        Self::new(api_key, timeout)
    }

    /// OpenAI 호환 서버 주소로 변경
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn body(request: &GenerationRequest, stream: bool) -> Value {
        json!({
            "model": request.model,
            "messages": request.messages(),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": stream,
        })
    }

    async fn send(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Self::body(request, stream))
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), &body, &request.model))
    }
}

#[async_trait]
impl GenerationProvider for GroqProvider {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let response = self.send(request, false).await?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(format!("Invalid completion response: {}", e)))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                GenerationError::Request("Completion response has no content".to_string())
            })
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, GenerationError> {
        let response = self.send(request, true).await?;
        let body = response.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed();
        Ok(sse_fragments(body))
    }

    fn name(&self) -> &str {
        "groq"
    }
}

// ============================================================================
// Error Classification
// ============================================================================

/// HTTP 에러 응답 → [`GenerationError`]
///
/// - 404, `model_not_found`, `model_decommissioned`, 모델 관련 "not found"/"decommissioned" 메시지
///   → `ModelUnavailable`
/// - 401/403 → `Config` (키 문제)
/// - 그 외 → `Request`
pub fn classify_error(status: u16, body: &str, model: &str) -> GenerationError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().map(|v| &v["error"]);
    let code = error.and_then(|e| e["code"].as_str()).unwrap_or_default();
    let message = error
        .and_then(|e| e["message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string());

    let lowered = message.to_lowercase();
    let mentions_missing_model = lowered.contains("model")
        && (lowered.contains("not found")
            || lowered.contains("does not exist")
            || lowered.contains("decommissioned"));

    if status == 404 || MODEL_UNAVAILABLE_CODES.contains(&code) || mentions_missing_model {
        return GenerationError::ModelUnavailable {
            model: model.to_string(),
            message,
        };
    }

    if status == 401 || status == 403 {
        return GenerationError::Config(format!(
            "Groq rejected the API key ({}): {}",
            status, message
        ));
    }

    GenerationError::Request(format!("Groq API error ({}): {}", status, message))
}

// ============================================================================
// SSE Parsing
// ============================================================================

/// SSE 한 줄의 해석 결과
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// 비어있지 않은 delta.content
    Fragment(String),
    /// `[DONE]`
    Done,
    /// 스트림 내 에러 객체
    Error(String),
    /// 주석, 빈 줄, 내용 없는 delta
    Skip,
}

/// SSE 한 줄 파싱
pub fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let Ok(json) = serde_json::from_str::<Value>(data) else {
        return SseEvent::Skip;
    };

    if let Some(message) = json["error"]["message"].as_str() {
        return SseEvent::Error(message.to_string());
    }

    match json["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => SseEvent::Fragment(content.to_string()),
        _ => SseEvent::Skip,
    }
}

/// 바이트 스트림 → 조각 스트림 상태
struct SseState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, GenerationError>>,
    done: bool,
}

impl SseState {
    /// 버퍼의 완성된 줄을 모두 해석
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
            if self.done {
                self.buffer.clear();
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        match parse_sse_line(line) {
            SseEvent::Fragment(text) => self.pending.push_back(Ok(text)),
            SseEvent::Done => self.done = true,
            SseEvent::Error(message) => {
                self.pending.push_back(Err(GenerationError::Stream(message)));
                self.done = true;
            }
            SseEvent::Skip => {}
        }
    }
}

/// SSE 바이트 스트림을 텍스트 조각 스트림으로 변환
pub(crate) fn sse_fragments(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> FragmentStream {
    let state = SseState {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(&bytes);
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(GenerationError::Stream(e.to_string())), state));
                }
                None => {
                    // 마지막 줄에 개행이 없을 수 있음
                    let rest = std::mem::take(&mut state.buffer);
                    if !rest.is_empty() {
                        state.handle_line(&String::from_utf8_lossy(&rest));
                    }
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}

// ============================================================================
// Tests
// ============================================================================
