//! docqa-rag - 문서 질의응답 하이브리드 RAG 시스템
//!
//! 문서를 청크로 분할해 임베딩과 함께 저장하고,
//! 시맨틱(벡터) 검색과 키워드 스캔을 가중 합산으로 통합하는
//! 하이브리드 검색으로 질문에 답합니다.

pub mod cli;
pub mod collector;
pub mod embedding;
pub mod extractor;
pub mod knowledge;
pub mod nlp;
pub mod response;

// Re-exports
pub use embedding::{create_embedder, EmbeddingProvider, OllamaEmbedding};
pub use knowledge::{
    cosine_similarity, default_chunker, get_data_dir, metadata_source, window_chunker, Chunk,
    ChunkConfig, ChunkMetadata, ChunkRecord, ChunkStore, Chunker, DocumentProcessor,
    DocumentRegistry, HybridRetriever, IngestOutcome, LanceChunkStore, MemoryChunkStore,
    NearestResult, NewSourceDocument, RegistryStats, RetrievalError, ScoredChunk, SourceContent,
    SourceDocument, WindowChunker, DEFAULT_TOP_K, EMBEDDING_DIMENSION,
};
pub use nlp::SarvamClient;
pub use response::{GeneratedAnswer, ResponseGenerator};
