//! 세션 - 임베딩 인덱스, 수집 문서 목록, 대화 기록의 명시적 소유자
//!
//! 프로세스 전역 캐시 대신 세션 객체를 만들어 주입합니다.
//! `reset()`은 인덱스와 기록을 모두 비웁니다.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::answer::ContextBlock;
use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::IngestionError;
use crate::knowledge::{sentence_chunker, Chunk, Chunker, EmbeddingIndex, IndexStats};
use crate::web::WebResult;

// ============================================================================
// Types
// ============================================================================

/// 질문/답변 한 턴 (생성 후 변경되지 않음)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub pdf_sources: Vec<String>,
    pub web_sources: Vec<WebResult>,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// 답변과 사용된 컨텍스트로 턴 생성
    pub fn new(question: &str, answer: String, block: &ContextBlock, model: String) -> Self {
        Self {
            question: question.trim().to_string(),
            answer,
            pdf_sources: block.pdf_sources(),
            web_sources: block.web_sources(),
            model,
            timestamp: Utc::now(),
        }
    }
}

/// 수집된 문서 정보
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub chunks: usize,
    pub chars: usize,
    pub ingested_at: DateTime<Utc>,
}

/// 문서 수집 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub chunks_added: usize,
    pub total_chunks: usize,
}

/// 세션 통계
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub index: IndexStats,
    pub documents: usize,
    pub turns: usize,
}

// ============================================================================
// Session
// ============================================================================

/// 질의응답 세션
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    index: EmbeddingIndex,
    chunker: Box<dyn Chunker>,
    documents: RwLock<Vec<DocumentRecord>>,
    history: RwLock<Vec<ConversationTurn>>,
}

impl Session {
    /// 설정(청크 크기, 유사도 임계값)으로 세션 생성
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: &RagConfig) -> Self {
        let index = EmbeddingIndex::with_threshold(embedder, config.retrieval.similarity_threshold);
        Self::with_parts(index, sentence_chunker(config.chunk.clone()))
    }

    pub fn with_parts(index: EmbeddingIndex, chunker: Box<dyn Chunker>) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!("Session {} started with {}", id, chunker.name());
        Self {
            id,
            created_at: Utc::now(),
            index,
            chunker,
            documents: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    /// 문서 텍스트를 청크로 나눠 인덱스에 추가
    ///
    /// 임베딩 실패 시 인덱스와 문서 목록은 변경되지 않습니다.
    pub async fn ingest_document(
        &self,
        doc_id: &str,
        text: &str,
    ) -> Result<IngestReport, IngestionError> {
        let chunks: Vec<Chunk> = self
            .chunker
            .chunk(text)
            .into_iter()
            .enumerate()
            .map(|(ordinal, chunk)| Chunk::new(chunk, doc_id, ordinal))
            .collect();

        if chunks.is_empty() {
            tracing::warn!("Document {} produced no text chunks", doc_id);
            return Ok(IngestReport {
                doc_id: doc_id.to_string(),
                chunks_added: 0,
                total_chunks: self.index.len(),
            });
        }

        let chunks_added = self.index.add_chunks(chunks).await?;

        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DocumentRecord {
                doc_id: doc_id.to_string(),
                chunks: chunks_added,
                chars: text.chars().count(),
                ingested_at: Utc::now(),
            });

        let total_chunks = self.index.len();
        tracing::info!(
            "Ingested {}: {} chunks (index total: {})",
            doc_id,
            chunks_added,
            total_chunks
        );

        Ok(IngestReport {
            doc_id: doc_id.to_string(),
            chunks_added,
            total_chunks,
        })
    }

    /// 대화 기록에 턴 추가
    pub fn record_turn(&self, turn: ConversationTurn) {
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(turn);
    }

    /// 대화 기록 스냅샷 (오래된 순)
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 최근 `n`개 턴 (오래된 순)
    pub fn recent_turns(&self, n: usize) -> Vec<ConversationTurn> {
        let history = self.history.read().unwrap_or_else(PoisonError::into_inner);
        let start = history.len().saturating_sub(n);
        history[start..].to_vec()
    }

    /// 수집된 문서 목록
    pub fn documents(&self) -> Vec<DocumentRecord> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 대화 기록을 JSON 배열로 직렬화
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.history())
    }

    /// 대화 기록을 줄 단위 JSON으로 직렬화
    pub fn export_jsonl(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for turn in self.history() {
            out.push_str(&serde_json::to_string(&turn)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.id.to_string(),
            created_at: self.created_at,
            index: self.index.stats(),
            documents: self.documents.read().unwrap_or_else(PoisonError::into_inner).len(),
            turns: self.history.read().unwrap_or_else(PoisonError::into_inner).len(),
        }
    }

    /// 인덱스, 문서 목록, 대화 기록 전체 삭제
    pub fn reset(&self) {
        self.index.clear();
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::info!("Session {} cleared", self.id);
    }
}
