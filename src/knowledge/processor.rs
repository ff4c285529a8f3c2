//! Document Processor - 인제스천 파이프라인의 저장 단계
//!
//! 추출된 문서 콘텐츠를 받아 청킹, 임베딩, 저장을 수행합니다.
//! 추출(파일 파싱)은 extractor 모듈이, 검색은 HybridRetriever가 담당하며
//! 이 모듈은 둘 사이에서 청크를 만들어 저장소에 기록합니다.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::embedding::EmbeddingProvider;

use super::chunker::{default_chunker, Chunker};
use super::store::{DocumentRegistry, NewSourceDocument};
use super::vector::{Chunk, ChunkMetadata, ChunkStore, META_PAGE, META_SOURCE};

// ============================================================================
// Types
// ============================================================================

/// 인제스천 입력 콘텐츠 (추출 결과의 한 단위, PDF는 페이지별)
#[derive(Debug, Clone)]
pub struct SourceContent {
    /// 추출된 텍스트
    pub text: String,
    /// 페이지 번호 (1부터, 페이지 개념이 없으면 None)
    pub page: Option<usize>,
}

impl SourceContent {
    /// 페이지 없는 단일 콘텐츠 생성
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page: None,
        }
    }
}

/// 인제스천 결과
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// 레지스트리 문서 ID
    pub doc_id: i64,
    /// 생성된 청크 수
    pub chunk_count: usize,
    /// 콘텐츠가 변경되지 않아 건너뛰었는지 여부
    pub skipped: bool,
}

// ============================================================================
// DocumentProcessor
// ============================================================================

/// 문서 처리기
///
/// 원본 문서 하나를 안정적인 ID를 가진 청크들로 변환하여 저장합니다.
/// 청크 ID는 문서 이름 해시 + 순번에서 유도되므로 재인제스천해도
/// 동일하게 생성됩니다.
pub struct DocumentProcessor {
    registry: DocumentRegistry,
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
}

impl DocumentProcessor {
    /// 새 문서 처리기 생성 (기본 청커 사용)
    pub fn new(
        registry: DocumentRegistry,
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            registry,
            store,
            embedder,
            chunker: default_chunker(),
        }
    }

    /// 청커를 지정하여 생성
    pub fn with_chunker(
        registry: DocumentRegistry,
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Box<dyn Chunker>,
    ) -> Self {
        Self {
            registry,
            store,
            embedder,
            chunker,
        }
    }

    /// 내부 레지스트리 접근
    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// 문서 인제스천
    ///
    /// 콘텐츠를 청킹하고 각 청크를 임베딩하여 청크 저장소에 기록한 뒤,
    /// 레지스트리에 문서를 등록합니다. 같은 이름의 문서가 이미 있고
    /// 콘텐츠 해시도 같으면 건너뜁니다 (`force`로 강제 재처리).
    ///
    /// # Arguments
    /// * `name` - 문서 이름 (청크 메타데이터의 source 값)
    /// * `origin` - 출처 (파일 경로 등)
    /// * `contents` - 추출된 콘텐츠 (PDF는 페이지별 여러 개)
    /// * `force` - 콘텐츠가 같아도 재처리
    pub async fn ingest(
        &self,
        name: &str,
        origin: &str,
        contents: &[SourceContent],
        force: bool,
    ) -> Result<IngestOutcome> {
        let content_sha = content_hash(contents);
        let content_chars: usize = contents.iter().map(|c| c.text.chars().count()).sum();

        // 기존 문서 확인 - 해시가 같으면 건너뜀, 다르면 이전 청크 제거
        if let Some(existing) = self.registry.get_by_name(name)? {
            if existing.content_sha == content_sha && !force {
                tracing::debug!("Skipping unchanged document: {}", name);
                return Ok(IngestOutcome {
                    doc_id: existing.id,
                    chunk_count: existing.chunk_count as usize,
                    skipped: true,
                });
            }

            let removed = self
                .store
                .delete_by_source(name)
                .await
                .context("Failed to remove stale chunks")?;
            tracing::debug!("Removed {} stale chunks for {}", removed, name);
        }

        // 청킹: 페이지 경계를 넘지 않는 윈도우 생성
        let mut windows: Vec<(String, Option<usize>)> = Vec::new();
        for content in contents {
            for window in self.chunker.chunk(&content.text) {
                windows.push((window, content.page));
            }
        }

        if windows.is_empty() {
            tracing::warn!("No chunks generated for document: {}", name);
            let doc_id = self.registry.add_document(NewSourceDocument {
                name: name.to_string(),
                origin: origin.to_string(),
                content_sha,
                chunk_count: 0,
                content_chars: content_chars as i64,
            })?;
            return Ok(IngestOutcome {
                doc_id,
                chunk_count: 0,
                skipped: false,
            });
        }

        // 임베딩 생성
        let texts: Vec<String> = windows.iter().map(|(text, _)| text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .context("Failed to embed chunks")?;

        // 청크 구성: ID = 문서 이름 해시 프리픽스 + 순번
        let id_prefix = source_id_prefix(name);
        let mut chunks = Vec::with_capacity(windows.len());

        for (index, ((content, page), embedding)) in
            windows.into_iter().zip(embeddings).enumerate()
        {
            let mut metadata = ChunkMetadata::new();
            metadata.insert(META_SOURCE.to_string(), json!(name));
            if let Some(page) = page {
                metadata.insert(META_PAGE.to_string(), json!(page));
            }

            chunks.push(Chunk {
                id: format!("{}#{}", id_prefix, index),
                content,
                metadata,
                embedding,
            });
        }

        let stored = self
            .store
            .add_batch(&chunks)
            .await
            .context("Failed to store chunks")?;

        let doc_id = self.registry.add_document(NewSourceDocument {
            name: name.to_string(),
            origin: origin.to_string(),
            content_sha,
            chunk_count: stored as i64,
            content_chars: content_chars as i64,
        })?;

        tracing::info!("Ingested document: {} (id={}, chunks={})", name, doc_id, stored);

        Ok(IngestOutcome {
            doc_id,
            chunk_count: stored,
            skipped: false,
        })
    }

    /// 문서 삭제
    ///
    /// 청크 저장소와 레지스트리에서 모두 삭제합니다.
    pub async fn delete_document(&self, doc_id: i64) -> Result<bool> {
        let Some(doc) = self.registry.get_document(doc_id)? else {
            return Ok(false);
        };

        // 청크 먼저 삭제
        self.store
            .delete_by_source(&doc.name)
            .await
            .context("Failed to delete chunks")?;

        self.registry.delete_document(doc_id)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문서 이름에서 청크 ID 프리픽스 유도 (SHA-256 앞 16자)
///
/// 경로 길이나 특수 문자와 무관하게 안정적인 ID를 만듭니다.
fn source_id_prefix(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// 콘텐츠 전체의 SHA-256 해시 (16진수)
fn content_hash(contents: &[SourceContent]) -> String {
    let mut hasher = Sha256::new();
    for content in contents {
        hasher.update(content.text.as_bytes());
        hasher.update([0u8]); // 파트 경계 구분
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::memory::MemoryChunkStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// 텍스트 길이 기반 고정 벡터를 반환하는 임베딩 스텁
    struct StubEmbedding;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn test_processor(dir: &TempDir) -> (DocumentProcessor, Arc<MemoryChunkStore>) {
        let registry = DocumentRegistry::open(&dir.path().join("registry.db")).unwrap();
        let store = Arc::new(MemoryChunkStore::new());
        let processor = DocumentProcessor::new(registry, store.clone(), Arc::new(StubEmbedding));
        (processor, store)
    }

    #[tokio::test]
    async fn test_ingest_creates_chunks() {
        let dir = TempDir::new().unwrap();
        let (processor, store) = test_processor(&dir);

        let contents = vec![SourceContent::plain("word ".repeat(500))];
        let outcome = processor
            .ingest("long.txt", "file:///tmp/long.txt", &contents, false)
            .await
            .unwrap();

        assert!(!outcome.skipped);
        assert!(outcome.chunk_count > 1);
        assert_eq!(store.count().await.unwrap(), outcome.chunk_count);

        // 메타데이터와 ID 확인
        let all = store.all().await.unwrap();
        let prefix = source_id_prefix("long.txt");
        for (i, record) in all.iter().enumerate() {
            assert_eq!(record.id, format!("{}#{}", prefix, i));
            assert_eq!(
                record.metadata.get(META_SOURCE),
                Some(&json!("long.txt"))
            );
        }
    }

    #[tokio::test]
    async fn test_ingest_pages_carry_page_metadata() {
        let dir = TempDir::new().unwrap();
        let (processor, store) = test_processor(&dir);

        let contents = vec![
            SourceContent {
                text: "First page text".to_string(),
                page: Some(1),
            },
            SourceContent {
                text: "Second page text".to_string(),
                page: Some(2),
            },
        ];
        processor
            .ingest("paged.pdf", "file:///tmp/paged.pdf", &contents, false)
            .await
            .unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].metadata.get(META_PAGE), Some(&json!(1)));
        assert_eq!(all[1].metadata.get(META_PAGE), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_ingest_skips_unchanged() {
        let dir = TempDir::new().unwrap();
        let (processor, store) = test_processor(&dir);

        let contents = vec![SourceContent::plain("stable content")];
        let first = processor
            .ingest("a.txt", "file:///tmp/a.txt", &contents, false)
            .await
            .unwrap();
        assert!(!first.skipped);

        let second = processor
            .ingest("a.txt", "file:///tmp/a.txt", &contents, false)
            .await
            .unwrap();
        assert!(second.skipped);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ingest_force_reprocesses() {
        let dir = TempDir::new().unwrap();
        let (processor, store) = test_processor(&dir);

        let contents = vec![SourceContent::plain("stable content")];
        processor
            .ingest("a.txt", "file:///tmp/a.txt", &contents, false)
            .await
            .unwrap();

        let outcome = processor
            .ingest("a.txt", "file:///tmp/a.txt", &contents, true)
            .await
            .unwrap();
        assert!(!outcome.skipped);
        // 이전 청크가 제거되어 중복이 없어야 함
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ingest_changed_content_replaces_chunks() {
        let dir = TempDir::new().unwrap();
        let (processor, store) = test_processor(&dir);

        processor
            .ingest(
                "a.txt",
                "file:///tmp/a.txt",
                &[SourceContent::plain("old content")],
                false,
            )
            .await
            .unwrap();

        processor
            .ingest(
                "a.txt",
                "file:///tmp/a.txt",
                &[SourceContent::plain("new content")],
                false,
            )
            .await
            .unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "new content");
    }

    #[tokio::test]
    async fn test_ingest_empty_content() {
        let dir = TempDir::new().unwrap();
        let (processor, store) = test_processor(&dir);

        let outcome = processor
            .ingest("empty.txt", "file:///tmp/empty.txt", &[SourceContent::plain("")], false)
            .await
            .unwrap();

        assert_eq!(outcome.chunk_count, 0);
        assert_eq!(store.count().await.unwrap(), 0);
        // 레지스트리에는 기록됨
        assert!(processor.registry().get_by_name("empty.txt").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_document() {
        let dir = TempDir::new().unwrap();
        let (processor, store) = test_processor(&dir);

        let outcome = processor
            .ingest(
                "a.txt",
                "file:///tmp/a.txt",
                &[SourceContent::plain("some content")],
                false,
            )
            .await
            .unwrap();

        let deleted = processor.delete_document(outcome.doc_id).await.unwrap();
        assert!(deleted);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(processor.registry().get_document(outcome.doc_id).unwrap().is_none());

        let deleted = processor.delete_document(9999).await.unwrap();
        assert!(!deleted);
    }

    #[test]
    fn test_source_id_prefix_stable() {
        let a = source_id_prefix("doc.txt");
        let b = source_id_prefix("doc.txt");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let c = source_id_prefix("other.txt");
        assert_ne!(a, c);
    }
}
