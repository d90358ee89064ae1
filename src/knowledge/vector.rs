//! Vector Store - 청크 타입, 코사인 유사도, 평면(flat) 내적 인덱스
//!
//! 모든 벡터는 저장 전에 L2 정규화되므로 내적이 곧 코사인 유사도(-1.0 ~ 1.0)입니다.
//! 유클리드 거리가 아닌 유사도(높을수록 관련성 높음)를 반환합니다.


use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// 문서 청크 (인덱싱/검색 단위)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 청크 텍스트
    pub text: String,
    /// 원본 문서 식별자
    pub source_doc_id: String,
    /// 문서 내 청크 순번 (0-based)
    pub ordinal: usize,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source_doc_id: impl Into<String>, ordinal: usize) -> Self {
        Self {
            text: text.into(),
            source_doc_id: source_doc_id.into(),
            ordinal,
        }
    }
}

/// 검색 결과 (질의마다 생성, 저장하지 않음)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// 청크 텍스트
    pub text: String,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub score: f32,
    /// 원본 문서 식별자
    pub source_doc_id: String,
    /// 문서 내 청크 순번
    pub ordinal: usize,
}

// ============================================================================
// FlatIndex
// ============================================================================

/// 정규화된 벡터의 평면 인덱스 (exact inner-product 검색)
///
/// `chunks[i]`와 `vectors[i * dimension .. (i + 1) * dimension]`가 항상 짝을 이룹니다.
#[derive(Debug, Default)]
pub struct FlatIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<f32>,
    dimension: Option<usize>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 첫 배치가 정한 벡터 차원
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// 이미 검증된 배치 추가
    ///
    /// 호출 측이 `chunks.len() == embeddings.len()` 및 차원 일치를 보장해야 합니다.
    pub(crate) fn append(&mut self, chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) {
        debug_assert_eq!(chunks.len(), embeddings.len());
        if let Some(first) = embeddings.first() {
            self.dimension.get_or_insert(first.len());
        }

        self.vectors.reserve(embeddings.iter().map(Vec::len).sum());
        for mut embedding in embeddings {
            l2_normalize(&mut embedding);
            self.vectors.extend_from_slice(&embedding);
        }
        self.chunks.extend(chunks);
    }

    /// 정규화된 질의 벡터로 상위 k개 검색 (임계값 필터 전)
    ///
    /// 동점은 먼저 추가된 청크가 앞섭니다.
    pub fn top_k(&self, normalized_query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let Some(dimension) = self.dimension else {
            return vec![];
        };
        if k == 0 || normalized_query.len() != dimension {
            return vec![];
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(dimension)
            .map(|stored| dot(stored, normalized_query))
            .enumerate()
            .filter(|(_, score)| !score.is_nan())
            .collect();

        // sort_by는 안정 정렬이므로 동점 시 삽입 순서 유지
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }

    pub fn chunk(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    /// 전체 삭제 (차원 고정도 해제)
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.vectors.clear();
        self.dimension = None;
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// L2 정규화 (제자리). 영벡터는 그대로 둡니다.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위이며, 길이가 다르거나 영벡터면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product = dot(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// ============================================================================
// Tests
// ============================================================================
