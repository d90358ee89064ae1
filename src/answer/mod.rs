//! 답변 모듈 - 컨텍스트 조립, 프롬프트, 생성 오케스트레이션

mod context;
mod orchestrator;
mod prompt;

pub use context::{
    truncate_chars, ContextAssembler, ContextBlock, Excerpt, SourceKind, MIN_EXCERPT_CHARS,
};
pub use orchestrator::{AnswerOrchestrator, Answer, ModelStatus, APOLOGY};
pub use prompt::{build_prompt, Prompt, SYSTEM_PROMPT};
