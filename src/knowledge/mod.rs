//! Knowledge 모듈 - 하이브리드 검색 지식 저장소
//!
//! - vector: 청크 데이터 모델 + 저장소 트레이트
//! - memory: 인메모리 청크 저장소 (정밀 탐색)
//! - lance: LanceDB 영속 청크 저장소 (ANN)
//! - store: 원본 문서 레지스트리 (SQLite)
//! - hybrid: 시맨틱 + 키워드 통합 검색
//! - chunker: 겹치는 윈도우 텍스트 분할
//! - processor: 인제스천 파이프라인 (청킹 -> 임베딩 -> 저장)

mod chunker;
mod hybrid;
mod lance;
mod memory;
mod processor;
mod store;
mod vector;

// Re-exports
pub use chunker::{default_chunker, window_chunker, ChunkConfig, Chunker, WindowChunker};
pub use hybrid::{HybridRetriever, RetrievalError, ScoredChunk, DEFAULT_TOP_K};
pub use lance::LanceChunkStore;
pub use memory::MemoryChunkStore;
pub use processor::{DocumentProcessor, IngestOutcome, SourceContent};
pub use store::{
    get_data_dir, DocumentRegistry, NewSourceDocument, RegistryStats, SourceDocument,
};
pub use vector::{
    cosine_similarity, metadata_source, Chunk, ChunkMetadata, ChunkRecord, ChunkStore,
    NearestResult, EMBEDDING_DIMENSION, META_PAGE, META_SOURCE,
};
