//! PDF 텍스트 추출
//!
//! pdf-extract 크레이트로 텍스트 레이어만 읽습니다. OCR은 하지 않습니다.

use std::path::Path;

use anyhow::{Context, Result};

/// PDF에서 페이지별 텍스트 추출
///
/// 페이지를 나눌 수 없으면 전체 텍스트를 한 페이지로 반환합니다.
/// 텍스트 레이어가 없으면 빈 벡터를 반환합니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        return Ok(vec![]);
    }

    Ok(split_pdf_pages(&text))
}

/// 폼피드(`\x0c`) 기준 페이지 분리 (빈 페이지 제외)
fn split_pdf_pages(text: &str) -> Vec<String> {
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.is_empty() {
        vec![text.trim().to_string()]
    } else {
        pages
    }
}
