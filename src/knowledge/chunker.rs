//! Text Chunking Module
//!
//! 추출된 문서 텍스트를 문장 경계를 존중하는 청크로 나눕니다.
//!
//! 1. 공백 정규화 (연속 공백 → 공백 하나)
//! 2. 문장 종결부호(`.`, `!`, `?`) 뒤에서 분할 (부호는 문장에 남김)
//! 3. 목표 크기에 도달하기 직전까지 문장을 탐욕적으로 누적
//!
//! 청크는 마지막 문장 하나만큼 목표 크기를 넘을 수 있습니다 (문장을 자르지 않음).

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 기본 목표 청크 크기 (문자 수)
pub const DEFAULT_CHUNK_SIZE: usize = 500;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 목표 청크 크기 (문자 수)
    pub target_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// SentenceChunker
// ============================================================================

/// 문장 단위 탐욕 청커
pub struct SentenceChunker {
    config: ChunkConfig,
}

impl SentenceChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.config.target_size)
    }

    fn name(&self) -> &'static str {
        "SentenceChunker"
    }
}

// ============================================================================
// Chunking
// ============================================================================

/// 텍스트를 문장 경계 기준 청크로 분할
///
/// 결과 청크를 공백 하나로 이어 붙이면 공백 정규화된 입력과 같습니다.
///
/// # Arguments
/// * `text` - 분할할 텍스트
/// * `target_size` - 목표 청크 크기 (문자 수)
pub fn chunk_text(text: &str, target_size: usize) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return vec![];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for segment in split_sentences(&normalized) {
        let segment_len = segment.chars().count();

        if current.is_empty() {
            current.push_str(segment);
            current_len = segment_len;
            continue;
        }

        // 공백 하나 + 다음 문장을 붙였을 때 목표 크기에 도달하면 청크 종료
        if current_len + 1 + segment_len < target_size {
            current.push(' ');
            current.push_str(segment);
            current_len += 1 + segment_len;
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(segment);
            current_len = segment_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// 연속 공백을 공백 하나로 축약하고 양끝 공백 제거
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 정규화된 텍스트를 문장 조각으로 분할
///
/// 종결부호 연속(`?!`, `...`) 뒤에 공백이 올 때만 분할하므로 `3.14` 같은 토큰은 유지됩니다.
fn split_sentences(normalized: &str) -> Vec<&str> {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    let boundary =
        BOUNDARY.get_or_init(|| Regex::new(r"[.!?]+ ").expect("valid sentence boundary regex"));

    let mut segments = Vec::new();
    let mut start = 0;

    for m in boundary.find_iter(normalized) {
        // 종결부호까지 포함, 뒤따르는 공백은 제외
        let end = m.end() - 1;
        let segment = normalized[start..end].trim();
        if !segment.is_empty() {
            segments.push(segment);
        }
        start = m.end();
    }

    let tail = normalized[start..].trim();
    if !tail.is_empty() {
        segments.push(tail);
    }

    segments
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(SentenceChunker::with_defaults())
}

/// 설정을 지정한 문장 청커 생성
pub fn sentence_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(SentenceChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Rust is a systems language.  It is fast!\n\nIs it safe? \
        Yes, memory safety is enforced at compile time. The borrow checker \
        tracks ownership...   Lifetimes   describe how long references live. \
        Version 1.75 shipped async fn in traits";

    #[test]
    fn test_chunker_empty() {
        assert!(chunk_text("", 500).is_empty());
        assert!(chunk_text("   \n\t  ", 500).is_empty());
    }

    #[test]
    fn test_chunker_short() {
        assert_eq!(chunk_text("Short.", 500), vec!["Short.".to_string()]);
    }

    #[test]
    fn test_chunks_reconstruct_normalized_input() {
        for size in [1, 10, 40, 80, 500] {
            let chunks = chunk_text(SAMPLE, size);
            assert_eq!(chunks.join(" "), normalize_whitespace(SAMPLE), "size {}", size);
        }
    }

    #[test]
    fn test_no_blank_chunks() {
        for size in [1, 5, 30, 500] {
            for chunk in chunk_text(SAMPLE, size) {
                assert!(!chunk.trim().is_empty());
                assert_eq!(chunk, chunk.trim());
            }
        }
    }

    #[test]
    fn test_greedy_boundaries() {
        // "Aaaa." (5) + " " + "Bbbb." (5) = 11 < 12 → 합쳐짐, 다음 문장 추가 시 17 ≥ 12 → 분리
        let chunks = chunk_text("Aaaa. Bbbb. Cccc.", 12);
        assert_eq!(chunks, vec!["Aaaa. Bbbb.".to_string(), "Cccc.".to_string()]);

        // 정확히 목표 크기에 도달하면 분리
        let chunks = chunk_text("Aaaa. Bbbb.", 11);
        assert_eq!(chunks, vec!["Aaaa.".to_string(), "Bbbb.".to_string()]);
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let long = "This single sentence is far longer than the tiny target size allows.";
        let chunks = chunk_text(long, 10);
        assert_eq!(chunks, vec![long.to_string()]);
    }

    #[test]
    fn test_decimal_not_split() {
        let chunks = chunk_text("Pi is 3.14 roughly. Next.", 12);
        assert_eq!(
            chunks,
            vec!["Pi is 3.14 roughly.".to_string(), "Next.".to_string()]
        );
    }

    #[test]
    fn test_unicode_counts_characters() {
        // 문자 수 기준: "가나다." (4) + " " + "라마바." (4) = 9 < 10
        let chunks = chunk_text("가나다. 라마바.", 10);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_chunker_trait() {
        let chunker = sentence_chunker(ChunkConfig { target_size: 20 });
        assert_eq!(chunker.name(), "SentenceChunker");
        let chunks = chunker.chunk("One. Two. Three. Four. Five.");
        assert!(chunks.len() > 1);
        assert_eq!(default_chunker().chunk("Short.").len(), 1);
    }
}
