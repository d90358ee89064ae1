//! 질의응답 파이프라인 - 검색 → 컨텍스트 조립 → 답변 → 기록
//!
//! PDF 인덱스 검색과 웹 검색은 동시에 실행됩니다.
//! PDF 검색 실패는 "결과 0건 + degraded"로 강등되고 웹 결과로 계속 진행합니다.

use std::sync::Arc;

use futures::stream::BoxStream;
use serde::Serialize;

use crate::answer::{AnswerOrchestrator, ContextBlock, APOLOGY};
use crate::config::RetrievalConfig;
use crate::knowledge::SearchHit;
use crate::session::{ConversationTurn, Session};
use crate::web::{WebResult, WebRetriever};

/// 검색 대상 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchSources {
    pub pdf: bool,
    pub web: bool,
}

impl Default for SearchSources {
    fn default() -> Self {
        Self { pdf: true, web: true }
    }
}

/// 검색 결과 묶음
#[derive(Debug, Clone, Default, Serialize)]
pub struct Retrieval {
    pub pdf_hits: Vec<SearchHit>,
    pub web_hits: Vec<WebResult>,
    /// PDF 검색이 실패해 결과가 비어 있는지
    pub pdf_degraded: bool,
}

/// 스트리밍 답변과 기록용 마무리 핸들
pub struct StreamingAnswer {
    pub fragments: BoxStream<'static, String>,
    pub recorder: TurnRecorder,
}

/// 전체 답변이 모이면 턴을 기록
pub struct TurnRecorder {
    session: Arc<Session>,
    question: String,
    block: ContextBlock,
    model: String,
}

impl TurnRecorder {
    /// 이번 답변에 사용된 컨텍스트
    pub fn context(&self) -> &ContextBlock {
        &self.block
    }

    /// 완성된 답변으로 턴을 기록하고 반환
    pub fn finish(self, answer: String) -> ConversationTurn {
        let turn = ConversationTurn::new(&self.question, answer, &self.block, self.model);
        self.session.record_turn(turn.clone());
        turn
    }
}

/// 질의응답 파이프라인
pub struct QaPipeline {
    session: Arc<Session>,
    web: Option<Arc<WebRetriever>>,
    orchestrator: Arc<AnswerOrchestrator>,
    options: RetrievalConfig,
}

impl QaPipeline {
    /// `web`이 `None`이면 웹 검색을 하지 않습니다.
    pub fn new(
        session: Arc<Session>,
        web: Option<Arc<WebRetriever>>,
        orchestrator: Arc<AnswerOrchestrator>,
        options: RetrievalConfig,
    ) -> Self {
        Self {
            session,
            web,
            orchestrator,
            options,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn orchestrator(&self) -> &Arc<AnswerOrchestrator> {
        &self.orchestrator
    }

    /// PDF 인덱스와 웹을 동시에 검색
    pub async fn retrieve(&self, question: &str, sources: SearchSources) -> Retrieval {
        let pdf = async {
            if !sources.pdf {
                return (Vec::new(), false);
            }
            match self.session.index().search(question, self.options.pdf_results).await {
                Ok(hits) => (hits, false),
                Err(e) => {
                    tracing::warn!("PDF search failed, continuing without document context: {}", e);
                    (Vec::new(), true)
                }
            }
        };

        let web = async {
            match (&self.web, sources.web) {
                (Some(retriever), true) => {
                    retriever
                        .search_multiple_sources(question, self.options.web_results)
                        .await
                }
                _ => Vec::new(),
            }
        };

        let ((pdf_hits, pdf_degraded), web_hits) = tokio::join!(pdf, web);
        tracing::debug!(
            "Retrieved {} PDF hit(s), {} web result(s)",
            pdf_hits.len(),
            web_hits.len()
        );

        Retrieval {
            pdf_hits,
            web_hits,
            pdf_degraded,
        }
    }

    /// 질문 하나를 처리하고 대화 기록에 남김
    pub async fn ask(&self, question: &str, sources: SearchSources) -> ConversationTurn {
        let retrieval = self.retrieve(question, sources).await;
        let block = self
            .orchestrator
            .assemble(&retrieval.pdf_hits, &retrieval.web_hits);

        let generated = self
            .orchestrator
            .try_answer_with_context(question, &block)
            .await;
        let (answer, model) = match generated {
            Ok(answer) => (answer.text, answer.model),
            Err(e) => {
                tracing::error!("Answer generation failed: {}", e);
                (APOLOGY.to_string(), self.orchestrator.active_model())
            }
        };

        let turn = ConversationTurn::new(question, answer, &block, model);
        self.session.record_turn(turn.clone());
        turn
    }

    /// 스트리밍으로 질문 처리 (기록은 `TurnRecorder::finish`에서)
    pub async fn ask_stream(&self, question: &str, sources: SearchSources) -> StreamingAnswer {
        let retrieval = self.retrieve(question, sources).await;
        let block = self
            .orchestrator
            .assemble(&retrieval.pdf_hits, &retrieval.web_hits);

        let fragments = self.orchestrator.stream_with_context(question, &block).await;

        StreamingAnswer {
            fragments,
            recorder: TurnRecorder {
                session: Arc::clone(&self.session),
                question: question.to_string(),
                block,
                model: self.orchestrator.active_model(),
            },
        }
    }
}
