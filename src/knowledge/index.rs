//! Embedding Index - 세션이 보유하는 청크 임베딩 인덱스
//!
//! - `add`: 빈 텍스트 제거 → 배치 임베딩 → 한 번의 쓰기 락으로 커밋 (all-or-nothing)
//! - `search`: 질의 임베딩 → 코사인 유사도 상위 k → 임계값 초과만 반환
//!
//! 임베딩은 락 밖에서 계산하고, 커밋 시점에만 쓰기 락을 잡습니다.
//! 검색은 읽기 락으로 일관된 스냅샷을 봅니다.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use crate::error::{IngestionError, SearchError};

use super::vector::{l2_normalize, Chunk, FlatIndex, SearchHit};

/// 기본 유사도 임계값
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.3;

/// 출처 없이 `add`로 들어온 텍스트의 문서 ID
const UNATTRIBUTED_DOC: &str = "inline";

/// 인덱스 통계
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub has_index: bool,
    pub dimension: Option<usize>,
    pub provider: String,
}

/// 임베딩 인덱스
pub struct EmbeddingIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    similarity_threshold: f32,
    inner: RwLock<FlatIndex>,
}

impl EmbeddingIndex {
    /// 기본 임계값(0.3)으로 생성
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_threshold(embedder, DEFAULT_SIMILARITY_THRESHOLD)
    }

    pub fn with_threshold(embedder: Arc<dyn EmbeddingProvider>, similarity_threshold: f32) -> Self {
        Self {
            embedder,
            similarity_threshold,
            inner: RwLock::new(FlatIndex::new()),
        }
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    /// 텍스트 배치 추가 (출처 없음)
    ///
    /// # Returns
    /// 실제로 추가된 청크 수 (빈 텍스트 제외)
    pub async fn add(&self, texts: &[String]) -> Result<usize, IngestionError> {
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk::new(text.clone(), UNATTRIBUTED_DOC, i))
            .collect();
        self.add_chunks(chunks).await
    }

    /// 청크 배치 추가
    ///
    /// 임베딩 실패, 개수 불일치, 차원 불일치 시 배치 전체를 거부하고 기존 상태를 유지합니다.
    pub async fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<usize, IngestionError> {
        let chunks: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| !c.text.trim().is_empty())
            .collect();
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        tracing::debug!("Generating embeddings for {} chunks", texts.len());

        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| IngestionError::Embedding {
                batch: texts.len(),
                message: format!("{:#}", e),
            })?;

        if embeddings.len() != chunks.len() {
            return Err(IngestionError::CountMismatch {
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        // 첫 배치가 차원을 고정
        let expected = inner
            .dimension()
            .unwrap_or_else(|| embeddings[0].len());
        if let Some(bad) = embeddings.iter().find(|e| e.len() != expected || e.is_empty()) {
            return Err(IngestionError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        let added = chunks.len();
        inner.append(chunks, embeddings);
        tracing::debug!("Index now holds {} chunks", inner.len());

        Ok(added)
    }

    /// 유사 청크 검색
    ///
    /// 인덱스가 비어있으면 임베딩 호출 없이 빈 결과를 반환합니다.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, SearchError> {
        if k == 0 || self.is_empty() {
            return Ok(vec![]);
        }

        let mut query_vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| SearchError::Embedding(format!("{:#}", e)))?;
        l2_normalize(&mut query_vector);

        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        // 임베딩 중에 clear()가 실행됐을 수 있음
        if inner.is_empty() {
            return Ok(vec![]);
        }
        if inner.dimension() != Some(query_vector.len()) {
            return Err(SearchError::Embedding(format!(
                "query dimension {} does not match index dimension {:?}",
                query_vector.len(),
                inner.dimension()
            )));
        }

        let hits = inner
            .top_k(&query_vector, k)
            .into_iter()
            .filter(|(_, score)| *score > self.similarity_threshold)
            .filter_map(|(position, score)| {
                inner.chunk(position).map(|chunk| SearchHit {
                    text: chunk.text.clone(),
                    score,
                    source_doc_id: chunk.source_doc_id.clone(),
                    ordinal: chunk.ordinal,
                })
            })
            .collect();

        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 인덱스 통계
    pub fn stats(&self) -> IndexStats {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        IndexStats {
            total_chunks: inner.len(),
            has_index: !inner.is_empty(),
            dimension: inner.dimension(),
            provider: self.embedder.name().to_string(),
        }
    }

    /// 전체 삭제
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;
    use crate::embedding::HashingEmbedding;

    fn local_index() -> EmbeddingIndex {
        EmbeddingIndex::new(Arc::new(HashingEmbedding::new()))
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// 지정한 호출 이후부터 실패하는 임베더
    struct FlakyEmbedder {
        calls: AtomicUsize,
        fail_from: usize,
        dimension: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.fail_from {
                anyhow::bail!("embedding backend unavailable");
            }
            Ok(vec![text.len() as f32 + 1.0; self.dimension])
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    /// 호출마다 차원이 바뀌는 임베더
    struct ShiftingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for ShiftingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0; 3 + call])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "shifting"
        }
    }

    /// 매 호출마다 지연되는 임베더
    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok(vec![1.0, 0.5, 0.25])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_search_before_add_is_empty() {
        let index = local_index();
        let hits = index.search("anything", 5).await.expect("search");
        assert!(hits.is_empty());
        assert_eq!(
            index.stats(),
            IndexStats {
                total_chunks: 0,
                has_index: false,
                dimension: None,
                provider: "hashing-local".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_water_boiling_scenario() {
        let index = local_index();
        let corpus = texts(&[
            "The sky is blue.",
            "Grass is green.",
            "Water boils at 100 degrees Celsius.",
        ]);
        assert_eq!(index.add(&corpus).await.expect("add"), 3);

        let hits = index
            .search("What temperature does water boil?", 1)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Water boils at 100 degrees Celsius.");
        assert!(hits[0].score > 0.3);
    }

    #[tokio::test]
    async fn test_identical_text_is_top_hit() {
        let index = local_index();
        let corpus = texts(&[
            "Rust guarantees memory safety without garbage collection.",
            "Photosynthesis converts light energy into chemical energy.",
            "The Pacific is the largest ocean on Earth.",
        ]);
        index.add(&corpus).await.expect("add");

        let hits = index.search(&corpus[1], 3).await.expect("search");
        assert_eq!(hits[0].text, corpus[1]);
        assert!(hits[0].score > 0.999);
    }

    #[tokio::test]
    async fn test_results_are_members_above_threshold() {
        let index = local_index();
        let corpus = texts(&[
            "Cats are small domesticated carnivores.",
            "Dogs are loyal domesticated animals.",
            "Volcanoes erupt molten rock called lava.",
            "Lava cools into igneous rock.",
        ]);
        index.add(&corpus).await.expect("add");

        for query in ["domesticated animals", "lava rock", "quantum chromodynamics"] {
            let hits = index.search(query, 4).await.expect("search");
            assert!(hits.len() <= 4);
            for hit in hits {
                assert!(corpus.contains(&hit.text));
                assert!(hit.score > index.similarity_threshold());
            }
        }
    }

    #[tokio::test]
    async fn test_blank_texts_filtered() {
        let index = local_index();
        let added = index
            .add(&texts(&["", "   ", "Real content here.", "\n\t"]))
            .await
            .expect("add");
        assert_eq!(added, 1);
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_index_accumulates_batches() {
        let index = local_index();
        index.add(&texts(&["Alpha centauri star system."])).await.expect("add");
        index.add(&texts(&["Beta decay in nuclear physics."])).await.expect("add");

        let stats = index.stats();
        assert_eq!(stats.total_chunks, 2);
        assert!(stats.has_index);
        assert_eq!(stats.dimension, Some(crate::embedding::DEFAULT_HASHING_DIMENSION));

        // 첫 배치의 청크도 여전히 검색됨
        let hits = index.search("Alpha centauri star system.", 1).await.expect("search");
        assert_eq!(hits[0].text, "Alpha centauri star system.");
    }

    #[tokio::test]
    async fn test_failed_embedding_leaves_state_intact() {
        let index = EmbeddingIndex::new(Arc::new(FlakyEmbedder {
            calls: AtomicUsize::new(0),
            fail_from: 2,
            dimension: 4,
        }));

        assert_eq!(index.add(&texts(&["one", "two"])).await.expect("first batch"), 2);

        let err = index.add(&texts(&["three", "four"])).await.err();
        assert!(matches!(err, Some(IngestionError::Embedding { batch: 2, .. })));
        assert_eq!(index.len(), 2);
        assert_eq!(index.stats().dimension, Some(4));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejects_batch() {
        let index = EmbeddingIndex::new(Arc::new(ShiftingEmbedder {
            calls: AtomicUsize::new(0),
        }));

        // 배치 내부 차원 불일치 (3, 4)
        let err = index.add(&texts(&["a1", "b2"])).await.err();
        assert!(matches!(
            err,
            Some(IngestionError::DimensionMismatch { expected: 3, actual: 4 })
        ));
        assert!(index.is_empty());
        assert_eq!(index.stats().dimension, None);
    }

    #[tokio::test]
    async fn test_attributed_chunks_and_clear() {
        let index = local_index();
        index
            .add_chunks(vec![
                Chunk::new("Mitochondria produce ATP.", "biology.pdf", 0),
                Chunk::new("Ribosomes build proteins.", "biology.pdf", 1),
            ])
            .await
            .expect("add");

        let hits = index.search("Ribosomes build proteins.", 1).await.expect("search");
        assert_eq!(hits[0].source_doc_id, "biology.pdf");
        assert_eq!(hits[0].ordinal, 1);

        index.clear();
        assert!(index.search("Ribosomes", 1).await.expect("search").is_empty());
        assert_eq!(index.stats().dimension, None);
    }

    #[tokio::test]
    async fn test_concurrent_adds_stay_consistent() {
        let index = Arc::new(local_index());
        let mut handles = Vec::new();
        for i in 0..8 {
            let index = Arc::clone(&index);
            handles.push(tokio::spawn(async move {
                let batch = vec![
                    format!("Document {} first sentence.", i),
                    format!("Document {} second sentence.", i),
                ];
                index.add(&batch).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("add");
        }
        assert_eq!(index.len(), 16);
    }

    #[tokio::test]
    async fn test_search_during_clear_returns_empty() {
        let index = EmbeddingIndex::new(Arc::new(SlowEmbedder));
        index.add(&texts(&["Water boils at 100 C."])).await.expect("add");

        let clear = async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            index.clear();
        };
        let (hits, ()) = tokio::join!(index.search("boiling point", 3), clear);

        assert!(hits.expect("search must not fail after clear").is_empty());
        assert!(index.is_empty());
    }
}
