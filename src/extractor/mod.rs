//! 문서 추출 모듈
//!
//! 파일에서 질의응답용 평문 텍스트를 추출합니다.
//! - 텍스트 파일: 직접 읽기
//! - PDF 파일: pdf-extract로 텍스트 레이어 추출 (스캔본은 경고만 남김)

pub mod pdf;

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;

/// 이보다 적은 비공백 문자가 나온 PDF는 스캔본으로 간주
pub const SCANNED_PDF_MIN_CHARS: usize = 100;

const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md", "markdown", "rst", "csv", "log", "json"];

// ============================================================================
// Types
// ============================================================================

/// 문서 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// 확장자로 종류 판별 (지원하지 않으면 `None`)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if ext == "pdf" {
            Some(Self::Pdf)
        } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Text)
        } else {
            None
        }
    }
}

/// 추출된 문서
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedDocument {
    /// 문서 식별자 (파일 이름)
    pub doc_id: String,
    pub kind: DocumentKind,
    pub text: String,
    /// PDF 페이지 수 (텍스트 파일은 1)
    pub pages: usize,
    /// 텍스트 레이어가 거의 없는 PDF (외부 OCR 필요)
    pub likely_scanned: bool,
}

// ============================================================================
// Extraction
// ============================================================================

/// 파일에서 텍스트 추출
pub async fn extract_document(path: &Path) -> Result<ExtractedDocument> {
    let Some(kind) = DocumentKind::from_path(path) else {
        bail!(
            "Unsupported file type: {:?} (supported: pdf, {})",
            path,
            TEXT_EXTENSIONS.join(", ")
        );
    };

    let doc_id = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let document = match kind {
        DocumentKind::Text => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read text file: {:?}", path))?;
            ExtractedDocument {
                doc_id,
                kind,
                text,
                pages: 1,
                likely_scanned: false,
            }
        }
        DocumentKind::Pdf => {
            // PDF 파싱은 CPU 바운드
            let owned = path.to_path_buf();
            let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&owned))
                .await
                .context("PDF extraction task failed")??;

            let text = pages.join("\n");
            let likely_scanned = is_likely_scanned(&text);
            if likely_scanned {
                tracing::warn!(
                    "PDF {:?} has almost no extractable text. It is probably a scanned document and needs external OCR.",
                    path
                );
            }

            ExtractedDocument {
                doc_id,
                kind,
                text,
                pages: pages.len(),
                likely_scanned,
            }
        }
    };

    tracing::debug!(
        "Extracted {} chars from {} ({} page(s))",
        document.text.chars().count(),
        document.doc_id,
        document.pages
    );
    Ok(document)
}

/// 비공백 문자가 기준보다 적은지
pub fn is_likely_scanned(text: &str) -> bool {
    text.chars().filter(|c| !c.is_whitespace()).count() < SCANNED_PDF_MIN_CHARS
}

// ============================================================================
// Tests
// ============================================================================
