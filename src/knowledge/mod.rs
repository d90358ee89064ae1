//! Knowledge 모듈 - 문서 청킹과 임베딩 인덱스
//!
//! - Chunker: 문장 경계 기반 탐욕 청킹
//! - Vector: 청크/검색 결과 타입, 코사인 유사도, 평면 내적 인덱스
//! - Index: 임베딩 프로바이더를 주입받는 세션용 인덱스

mod chunker;
mod index;
mod vector;

// Re-exports
pub use chunker::{
    chunk_text, default_chunker, normalize_whitespace, sentence_chunker, ChunkConfig, Chunker,
    SentenceChunker, DEFAULT_CHUNK_SIZE,
};
pub use index::{EmbeddingIndex, IndexStats, DEFAULT_SIMILARITY_THRESHOLD};
pub use vector::{cosine_similarity, l2_normalize, Chunk, FlatIndex, SearchHit};
