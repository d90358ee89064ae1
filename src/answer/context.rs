//! 컨텍스트 조립 - PDF/웹 결과를 라벨이 붙은 예산 내 블록으로
//!
//! 입력은 이미 임계값이 적용된 결과라고 가정합니다.
//! PDF 발췌가 먼저, 웹 발췌가 뒤에 오며 각 발췌는 `max_excerpt_chars`,
//! 렌더링된 전체 블록은 `max_context_chars` 이내로 유지됩니다.

use serde::Serialize;

use crate::config::RetrievalConfig;
use crate::knowledge::SearchHit;
use crate::web::WebResult;

/// 블록 예산이 부족할 때 잘라서라도 넣는 최소 발췌 길이
pub const MIN_EXCERPT_CHARS: usize = 120;

const TRUNCATION_SUFFIX: &str = "...";

const PDF_HEADER: &str = "=== INFORMATION FROM PDF DOCUMENTS ===";
const WEB_HEADER: &str = "\n=== INFORMATION FROM WEB SOURCES ===";

// ============================================================================
// Types
// ============================================================================

/// 발췌 출처 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Web,
}

/// 컨텍스트 발췌 (인용 표시용 출처 정보 포함)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Excerpt {
    pub kind: SourceKind,
    /// `PDF Source N` / `Web Source N - Title`
    pub label: String,
    pub text: String,
    pub title: Option<String>,
    pub url: Option<String>,
    /// PDF 발췌의 코사인 유사도
    pub score: Option<f32>,
}

/// 조립된 컨텍스트 블록
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextBlock {
    excerpts: Vec<Excerpt>,
    web_results: Vec<WebResult>,
    omitted: usize,
}

impl ContextBlock {
    pub fn excerpts(&self) -> &[Excerpt] {
        &self.excerpts
    }

    pub fn is_empty(&self) -> bool {
        self.excerpts.is_empty()
    }

    /// 예산 때문에 빠진 발췌 수
    pub fn omitted(&self) -> usize {
        self.omitted
    }

    /// 프롬프트에 들어가는 직렬화 형태
    pub fn render(&self) -> String {
        render_excerpts(&self.excerpts)
    }

    /// 이번 답변에 사용된 PDF 발췌
    pub fn pdf_sources(&self) -> Vec<String> {
        self.excerpts
            .iter()
            .filter(|e| e.kind == SourceKind::Pdf)
            .map(|e| e.text.clone())
            .collect()
    }

    /// 이번 답변에 사용된 웹 결과
    pub fn web_sources(&self) -> Vec<WebResult> {
        self.web_results.clone()
    }

    fn count(&self, kind: SourceKind) -> usize {
        self.excerpts.iter().filter(|e| e.kind == kind).count()
    }

    fn rendered_len_with(&self, candidate: &Excerpt) -> usize {
        let mut trial = self.excerpts.clone();
        trial.push(candidate.clone());
        render_excerpts(&trial).chars().count()
    }
}

fn render_excerpts(excerpts: &[Excerpt]) -> String {
    let mut parts: Vec<String> = Vec::new();

    let pdf: Vec<&Excerpt> = excerpts.iter().filter(|e| e.kind == SourceKind::Pdf).collect();
    if !pdf.is_empty() {
        parts.push(PDF_HEADER.to_string());
        parts.extend(pdf.iter().map(|e| format!("{}: {}", e.label, e.text)));
    }

    let web: Vec<&Excerpt> = excerpts.iter().filter(|e| e.kind == SourceKind::Web).collect();
    if !web.is_empty() {
        parts.push(WEB_HEADER.to_string());
        for e in web {
            parts.push(format!("{}: {}", e.label, e.text));
            if let Some(url) = &e.url {
                parts.push(format!("URL: {}", url));
            }
        }
    }

    parts.join("\n")
}

// ============================================================================
// ContextAssembler
// ============================================================================

/// 컨텍스트 조립기
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    pdf_results: usize,
    web_results: usize,
    max_excerpt_chars: usize,
    max_context_chars: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(&RetrievalConfig::default())
    }
}

impl ContextAssembler {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            pdf_results: config.pdf_results,
            web_results: config.web_results,
            max_excerpt_chars: config.max_excerpt_chars,
            max_context_chars: config.max_context_chars,
        }
    }

    pub fn max_context_chars(&self) -> usize {
        self.max_context_chars
    }

    /// PDF 결과 + 웹 결과 → 컨텍스트 블록
    pub fn assemble(&self, pdf_hits: &[SearchHit], web_hits: &[WebResult]) -> ContextBlock {
        let mut block = ContextBlock::default();

        for hit in pdf_hits.iter().take(self.pdf_results) {
            let excerpt = Excerpt {
                kind: SourceKind::Pdf,
                label: format!("PDF Source {}", block.count(SourceKind::Pdf) + 1),
                text: truncate_chars(hit.text.trim(), self.max_excerpt_chars),
                title: None,
                url: None,
                score: Some(hit.score),
            };
            if let Some(excerpt) = self.fit(&block, excerpt) {
                block.excerpts.push(excerpt);
            } else {
                block.omitted += 1;
            }
        }

        for result in web_hits.iter().take(self.web_results) {
            let excerpt = Excerpt {
                kind: SourceKind::Web,
                label: format!(
                    "Web Source {} - {}",
                    block.count(SourceKind::Web) + 1,
                    result.title
                ),
                text: truncate_chars(result.snippet.trim(), self.max_excerpt_chars),
                title: Some(result.title.clone()),
                url: result.url.clone(),
                score: None,
            };
            if let Some(excerpt) = self.fit(&block, excerpt) {
                block.excerpts.push(excerpt);
                block.web_results.push(result.clone());
            } else {
                block.omitted += 1;
            }
        }

        if block.omitted > 0 {
            tracing::info!(
                "Context budget of {} chars reached, omitted {} excerpt(s)",
                self.max_context_chars,
                block.omitted
            );
        }
        tracing::debug!(
            "Assembled context: {} PDF, {} web excerpt(s)",
            block.count(SourceKind::Pdf),
            block.count(SourceKind::Web)
        );

        block
    }

    /// 예산 안에 들어가면 그대로, 넘치면 잘라서(최소 길이 이상일 때만) 반환
    fn fit(&self, block: &ContextBlock, mut excerpt: Excerpt) -> Option<Excerpt> {
        let total = block.rendered_len_with(&excerpt);
        if total <= self.max_context_chars {
            return Some(excerpt);
        }

        let overflow = total - self.max_context_chars;
        let allowed = excerpt.text.chars().count().checked_sub(overflow)?;
        if allowed < MIN_EXCERPT_CHARS {
            return None;
        }

        excerpt.text = truncate_chars(&excerpt.text, allowed);
        Some(excerpt)
    }
}

/// 문자 단위로 자르고 `...`를 붙임 (결과 길이 `max_chars` 이하)
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let suffix_len = TRUNCATION_SUFFIX.len();
    if max_chars <= suffix_len {
        return text.chars().take(max_chars).collect();
    }

    let truncated: String = text.chars().take(max_chars - suffix_len).collect();
    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}
