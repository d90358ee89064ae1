//! palank-qa - PDF + 웹 검색 기반 근거 제시형 질의응답
//!
//! 문서를 청크로 나눠 임베딩 인덱스에 넣고, 질문마다 문서 검색과
//! 웹 검색을 동시에 수행한 뒤, 출처가 표시된 컨텍스트로 LLM 답변을 생성합니다.
//!
//! ```rust,ignore
//! let session = Arc::new(Session::new(create_embedder(&config.embedding)?, &config));
//! session.ingest_document("physics.pdf", &text).await?;
//! let turn = pipeline.ask("At what temperature does water boil?", SearchSources::default()).await;
//! ```

pub mod answer;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod session;
pub mod web;

// Re-exports
pub use answer::{
    build_prompt, Answer, AnswerOrchestrator, ContextAssembler, ContextBlock, Excerpt, Prompt,
    SourceKind, APOLOGY,
};
pub use config::{
    EmbeddingBackend, EmbeddingConfig, GenerationSettings, RagConfig, RetrievalConfig,
    WebSearchConfig,
};
pub use embedding::{create_embedder, EmbeddingProvider, FastEmbedding, GeminiEmbedding};
pub use error::{GenerationError, IngestionError, SearchError};
pub use extractor::{extract_document, DocumentKind, ExtractedDocument};
pub use knowledge::{
    chunk_text, default_chunker, ChunkConfig, Chunk, Chunker, EmbeddingIndex, IndexStats,
    SearchHit, SentenceChunker,
};
pub use llm::{FragmentStream, GenerationProvider, GenerationRequest, GroqProvider};
pub use pipeline::{QaPipeline, Retrieval, SearchSources, StreamingAnswer, TurnRecorder};
pub use session::{ConversationTurn, IngestReport, Session, SessionStats};
pub use web::{SearchBackend, WebResult, WebRetriever};
