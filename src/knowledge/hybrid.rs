//! 하이브리드 검색 - 시맨틱 + 키워드 검색 통합
//!
//! 임베딩 기반 시맨틱 검색과 키워드 선형 스캔을 각각 수행한 뒤,
//! 청크 콘텐츠를 키로 가중 점수를 합산하여 하나의 순위 목록으로 통합합니다.
//!
//! - 시맨틱: score = 1 - distance (거리는 코사인 기준 0~1 가정,
//!   범위를 벗어나는 프로바이더에서는 점수도 범위를 벗어날 수 있음)
//! - 키워드: score = 청크 콘텐츠에 부분 문자열로 등장하는 키워드 수
//! - 통합: combined = semantic * 0.7 + keyword * 0.3

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;

use crate::embedding::EmbeddingProvider;

use super::vector::{ChunkMetadata, ChunkStore};

// ============================================================================
// Types
// ============================================================================

/// 시맨틱 검색 결과 가중치
const SEMANTIC_WEIGHT: f32 = 0.7;
/// 키워드 검색 결과 가중치
const KEYWORD_WEIGHT: f32 = 0.3;
/// 기본 검색 결과 수
pub const DEFAULT_TOP_K: usize = 5;

/// 검색 오류 분류
///
/// 하위 검색 하나라도 실패하면 hybrid_search 전체가 실패합니다.
/// 남은 한쪽 결과로 조용히 대체하지 않습니다 - 가중치 계약이 달라지기 때문입니다.
/// 빈 결과는 오류가 아니라 정상 출력입니다.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// 임베딩 프로바이더가 쿼리 벡터를 생성하지 못함
    #[error("임베딩 생성 실패: {0}")]
    Embedding(String),
    /// 청크 저장소가 nearest/all 요청을 처리하지 못함
    #[error("청크 저장소 접근 실패: {0}")]
    StoreUnavailable(String),
}

/// 점수가 매겨진 청크 (쿼리 범위의 일시적 결과)
///
/// metadata는 쿼리 시점에 저장소에 존재하는(했던) 청크의 것입니다.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// 청크 텍스트
    pub content: String,
    /// 청크 메타데이터
    pub metadata: ChunkMetadata,
    /// 관련도 점수 (높을수록 관련)
    pub score: f32,
}

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기
///
/// 주입된 청크 저장소와 임베딩 프로바이더 위에서 동작합니다.
/// 저장소를 변경하지 않는 읽기 전용 컴포넌트입니다.
pub struct HybridRetriever {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl HybridRetriever {
    /// 새 하이브리드 검색기 생성
    ///
    /// 인제스천과 같은 임베딩 모델을 사용해야 유사도가 의미를 가집니다.
    pub fn new(store: Arc<dyn ChunkStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// 시맨틱 유사도 검색
    ///
    /// 쿼리를 임베딩한 뒤 저장소의 근접 검색을 호출하고,
    /// 거리를 점수로 변환합니다 (score = 1 - distance).
    ///
    /// # Returns
    /// 점수 내림차순으로 최대 k개. 빈 저장소면 빈 목록 (오류 아님).
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let nearest = self
            .store
            .nearest(&query_embedding, k)
            .await
            .map_err(|e| RetrievalError::StoreUnavailable(e.to_string()))?;

        // 저장소가 거리 오름차순으로 반환하므로 점수는 이미 내림차순
        Ok(nearest
            .into_iter()
            .map(|result| ScoredChunk {
                content: result.chunk.content,
                metadata: result.chunk.metadata,
                score: 1.0 - result.distance,
            })
            .collect())
    }

    /// 키워드 검색
    ///
    /// 쿼리를 소문자화하여 공백으로 분리한 키워드(중복 허용)마다,
    /// 소문자화한 청크 콘텐츠에 부분 문자열로 등장하면 1점씩 더합니다.
    /// 0점 청크는 제외합니다.
    ///
    /// 전체 청크를 선형 스캔하므로 쿼리당 O(총 청크 수 × 키워드 수)입니다.
    /// 하이브리드 검색 비용의 대부분이 여기서 발생합니다.
    ///
    /// # Returns
    /// 점수 내림차순으로 최대 k개. 동점은 저장 순서 유지 (stable sort).
    /// 키워드가 없는 쿼리(공백뿐)면 빈 목록.
    pub async fn keyword_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let keywords: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        if keywords.is_empty() {
            return Ok(vec![]);
        }

        let records = self
            .store
            .all()
            .await
            .map_err(|e| RetrievalError::StoreUnavailable(e.to_string()))?;

        let mut results = Vec::new();
        for record in records {
            let content_lower = record.content.to_lowercase();
            let score = keywords
                .iter()
                .filter(|keyword| content_lower.contains(keyword.as_str()))
                .count();

            if score > 0 {
                results.push(ScoredChunk {
                    content: record.content,
                    metadata: record.metadata,
                    score: score as f32,
                });
            }
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);

        Ok(results)
    }

    /// 하이브리드 검색 (가중 점수 통합)
    ///
    /// 시맨틱과 키워드 검색을 각각 동일한 k로 수행한 뒤 통합합니다.
    /// 두 하위 검색 모두 k로 제한되므로, 양쪽에서 k위 밖인 청크는
    /// 통합 결과에 포함될 수 없습니다 (의도된 단순화).
    ///
    /// 통합 키는 청크 콘텐츠 문자열입니다 - 텍스트가 같으면 ID가 달라도
    /// 같은 항목으로 취급합니다 (콘텐츠 기반 중복 제거, 문서화된 동작).
    ///
    /// 메타데이터는 통합 후 저장소를 한 번 더 스캔하여 결합하며,
    /// 스캔 시점에 콘텐츠가 사라졌으면 빈 메타데이터로 대체합니다 (오류 아님).
    ///
    /// 고정된 저장소 상태 + 쿼리 + k에 대해 결과는 완전히 결정적입니다:
    /// 시맨틱 기여를 목록 순서대로 먼저, 키워드 기여를 그다음에 누적합니다.
    pub async fn hybrid_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let semantic_results = self.similarity_search(query, k).await?;
        let keyword_results = self.keyword_search(query, k).await?;

        tracing::debug!(
            "Fusing {} semantic + {} keyword results (k={})",
            semantic_results.len(),
            keyword_results.len(),
            k
        );

        // 콘텐츠 -> 통합 점수. 등장 순서는 별도 벡터로 유지하여
        // HashMap 순회 순서에 의존하지 않습니다.
        let mut combined: HashMap<String, f32> = HashMap::new();
        let mut encounter_order: Vec<String> = Vec::new();

        for result in &semantic_results {
            accumulate(
                &mut combined,
                &mut encounter_order,
                &result.content,
                result.score * SEMANTIC_WEIGHT,
            );
        }

        for result in &keyword_results {
            accumulate(
                &mut combined,
                &mut encounter_order,
                &result.content,
                result.score * KEYWORD_WEIGHT,
            );
        }

        // 메타데이터 재결합: 콘텐츠 -> 메타데이터 (나중 항목이 우선)
        let mut metadata_lookup: HashMap<String, ChunkMetadata> = HashMap::new();
        let records = self
            .store
            .all()
            .await
            .map_err(|e| RetrievalError::StoreUnavailable(e.to_string()))?;
        for record in records {
            metadata_lookup.insert(record.content, record.metadata);
        }

        let mut fused: Vec<ScoredChunk> = encounter_order
            .into_iter()
            .map(|content| {
                let score = combined[&content];
                let metadata = metadata_lookup
                    .get(&content)
                    .cloned()
                    .unwrap_or_default();
                ScoredChunk {
                    content,
                    metadata,
                    score,
                }
            })
            .collect();

        // 점수 내림차순, 동점은 누적 순서(시맨틱 우선) 유지
        fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        fused.truncate(k);

        Ok(fused)
    }
}

/// 콘텐츠 키에 점수 기여를 누적
///
/// 처음 보는 콘텐츠는 등장 순서 벡터에도 기록합니다.
fn accumulate(
    scores: &mut HashMap<String, f32>,
    encounter_order: &mut Vec<String>,
    content: &str,
    contribution: f32,
) {
    match scores.get_mut(content) {
        Some(score) => *score += contribution,
        None => {
            scores.insert(content.to_string(), contribution);
            encounter_order.push(content.to_string());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::memory::MemoryChunkStore;
    use crate::knowledge::vector::{
        Chunk, ChunkMetadata, ChunkRecord, NearestResult, META_SOURCE,
    };
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 고정 벡터를 반환하는 임베딩 스텁
    struct StubEmbedding {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl EmbeddingProvider for StubEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.vector.clone())
        }

        fn dimension(&self) -> usize {
            self.vector.len()
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    /// 항상 실패하는 임베딩 스텁
    struct FailingEmbedding;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            bail!("provider offline")
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "failing-stub"
        }
    }

    /// 첫 번째 all() 호출 이후 내용이 사라지는 저장소
    ///
    /// 통합 점수 계산과 메타데이터 재결합 사이에 청크가 삭제되는
    /// 경쟁 상황을 재현합니다.
    struct VanishingStore {
        inner: MemoryChunkStore,
        scans: AtomicUsize,
    }

    #[async_trait]
    impl ChunkStore for VanishingStore {
        async fn add_batch(&self, chunks: &[Chunk]) -> Result<usize> {
            self.inner.add_batch(chunks).await
        }

        async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<NearestResult>> {
            self.inner.nearest(query, k).await
        }

        async fn all(&self) -> Result<Vec<ChunkRecord>> {
            if self.scans.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.all().await
            } else {
                Ok(vec![])
            }
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }

        async fn delete_by_source(&self, source: &str) -> Result<usize> {
            self.inner.delete_by_source(source).await
        }
    }

    fn chunk_with(id: &str, content: &str, source: &str, embedding: Vec<f32>) -> Chunk {
        let mut metadata = ChunkMetadata::new();
        metadata.insert(META_SOURCE.to_string(), json!(source));
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            metadata,
            embedding,
        }
    }

    async fn store_with(chunks: Vec<Chunk>) -> Arc<MemoryChunkStore> {
        let store = Arc::new(MemoryChunkStore::new());
        store.add_batch(&chunks).await.unwrap();
        store
    }

    fn retriever(store: Arc<dyn ChunkStore>, query_vector: Vec<f32>) -> HybridRetriever {
        HybridRetriever::new(store, Arc::new(StubEmbedding { vector: query_vector }))
    }

    // P1: 결과는 점수 내림차순이어야 함
    #[tokio::test]
    async fn test_similarity_search_descending_scores() {
        let store = store_with(vec![
            chunk_with("a#0", "alpha", "a.txt", vec![0.0, 1.0, 0.0]),
            chunk_with("a#1", "beta", "a.txt", vec![1.0, 0.0, 0.0]),
            chunk_with("a#2", "gamma", "a.txt", vec![1.0, 1.0, 0.0]),
        ])
        .await;
        let retriever = retriever(store, vec![1.0, 0.0, 0.0]);

        let results = retriever.similarity_search("query", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score, "score inversion");
        }
        assert_eq!(results[0].content, "beta");
    }

    #[tokio::test]
    async fn test_keyword_search_descending_scores() {
        let store = store_with(vec![
            chunk_with("a#0", "rust is fast", "a.txt", vec![1.0]),
            chunk_with("a#1", "rust rust everywhere, fast and safe", "a.txt", vec![1.0]),
            chunk_with("a#2", "python is slow", "a.txt", vec![1.0]),
        ])
        .await;
        let retriever = retriever(store, vec![1.0]);

        let results = retriever.keyword_search("rust fast", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score, "score inversion");
        }
    }

    // P2: 모든 검색은 최대 k개만 반환
    #[tokio::test]
    async fn test_bounded_result_size() {
        let mut chunks = Vec::new();
        for i in 0..10 {
            chunks.push(chunk_with(
                &format!("a#{}", i),
                &format!("common topic number {}", i),
                "a.txt",
                vec![1.0, i as f32 * 0.01],
            ));
        }
        let store = store_with(chunks).await;
        let retriever = retriever(store, vec![1.0, 0.0]);

        assert_eq!(retriever.similarity_search("q", 3).await.unwrap().len(), 3);
        assert_eq!(retriever.keyword_search("common", 3).await.unwrap().len(), 3);
        assert_eq!(retriever.hybrid_search("common", 3).await.unwrap().len(), 3);
    }

    // P3: 통합 결과는 두 하위 검색 결과의 합집합에 포함됨
    #[tokio::test]
    async fn test_fusion_subset_of_union() {
        let store = store_with(vec![
            chunk_with("a#0", "the cat sat", "a.txt", vec![1.0, 0.0]),
            chunk_with("a#1", "a dog barked", "a.txt", vec![0.9, 0.1]),
            chunk_with("a#2", "birds fly south", "a.txt", vec![0.0, 1.0]),
            chunk_with("a#3", "cat and dog", "a.txt", vec![0.5, 0.5]),
        ])
        .await;
        let retriever = retriever(store, vec![1.0, 0.0]);

        let k = 2;
        let semantic = retriever.similarity_search("cat dog", k).await.unwrap();
        let keyword = retriever.keyword_search("cat dog", k).await.unwrap();
        let fused = retriever.hybrid_search("cat dog", k).await.unwrap();

        let union: Vec<&str> = semantic
            .iter()
            .chain(keyword.iter())
            .map(|r| r.content.as_str())
            .collect();

        for result in &fused {
            assert!(
                union.contains(&result.content.as_str()),
                "fused result not in union: {}",
                result.content
            );
        }
    }

    // P4: 같은 입력에 대해 결과는 완전히 결정적
    #[tokio::test]
    async fn test_hybrid_search_deterministic() {
        let mut chunks = Vec::new();
        for i in 0..8 {
            chunks.push(chunk_with(
                &format!("a#{}", i),
                &format!("shared keyword plus variant {}", i),
                "a.txt",
                vec![1.0, (i % 3) as f32 * 0.1, 0.2],
            ));
        }
        let store = store_with(chunks).await;
        let retriever = retriever(store, vec![1.0, 0.1, 0.2]);

        let first = retriever.hybrid_search("shared keyword", 5).await.unwrap();
        let second = retriever.hybrid_search("shared keyword", 5).await.unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.content, b.content);
            assert_eq!(a.score.to_bits(), b.score.to_bits(), "non-deterministic score");
            assert_eq!(a.metadata, b.metadata);
        }
    }

    // P5: 키워드가 전혀 등장하지 않는 청크는 키워드 결과에서 제외
    #[tokio::test]
    async fn test_zero_match_excluded() {
        let store = store_with(vec![
            chunk_with("a#0", "relevant rust text", "a.txt", vec![1.0]),
            chunk_with("a#1", "completely unrelated", "a.txt", vec![1.0]),
        ])
        .await;
        let retriever = retriever(store, vec![1.0]);

        let results = retriever.keyword_search("rust", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "relevant rust text");
    }

    // 빈 쿼리(키워드 0개)는 빈 결과
    #[tokio::test]
    async fn test_empty_query_keyword_search() {
        let store = store_with(vec![chunk_with("a#0", "anything", "a.txt", vec![1.0])]).await;
        let retriever = retriever(store, vec![1.0]);

        let results = retriever.keyword_search("   ", 5).await.unwrap();
        assert!(results.is_empty());
    }

    // 동점 청크는 저장 순서를 유지해야 함
    #[tokio::test]
    async fn test_keyword_ties_keep_store_order() {
        let store = store_with(vec![
            chunk_with("a#0", "rust one", "a.txt", vec![1.0]),
            chunk_with("a#1", "rust two", "a.txt", vec![1.0]),
            chunk_with("a#2", "rust three", "a.txt", vec![1.0]),
        ])
        .await;
        let retriever = retriever(store, vec![1.0]);

        let results = retriever.keyword_search("rust", 3).await.unwrap();
        let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["rust one", "rust two", "rust three"]);
    }

    // P6: 가중치 검증 - 시맨틱 1.0 (0.7) > 키워드 1건 (0.3)
    #[tokio::test]
    async fn test_weight_dominance() {
        let store = store_with(vec![
            // A: 쿼리 벡터와 완전히 일치 (시맨틱 1.0), 키워드 불일치
            chunk_with("a#0", "semantic only entry", "a.txt", vec![1.0, 0.0]),
            // B: 키워드 1건 일치, 시맨틱 직교 (거리 1.0 -> 점수 0.0, 기여 없음)
            chunk_with("b#0", "lexical overlap here", "b.txt", vec![0.0, 1.0]),
        ])
        .await;
        let retriever = retriever(store, vec![1.0, 0.0]);

        let results = retriever.hybrid_search("lexical", 2).await.unwrap();

        let score_of = |content: &str| {
            results
                .iter()
                .find(|r| r.content == content)
                .map(|r| r.score)
                .unwrap()
        };

        let semantic_only = score_of("semantic only entry");
        let keyword_only = score_of("lexical overlap here");

        // A = 1.0 * 0.7, B = 0.0 * 0.7 + 1 * 0.3
        assert!((semantic_only - 0.7).abs() < 1e-4);
        assert!((keyword_only - 0.3).abs() < 1e-4);
        assert!(semantic_only > keyword_only);
        assert_eq!(results[0].content, "semantic only entry");
    }

    // E2E 1: 점수 산식 전체 검증
    // keyword("cat mat") = 2, semantic distance 0.1 -> 0.9
    // hybrid = 0.9 * 0.7 + 2 * 0.3 = 1.23
    #[tokio::test]
    async fn test_combined_score_formula() {
        let store = store_with(vec![chunk_with(
            "a#0",
            "The cat sat on the mat",
            "a.txt",
            vec![1.0, 0.0, 0.0],
        )])
        .await;
        // 코사인 유사도 0.9 -> 거리 0.1
        let query_vector = vec![0.9, (1.0f32 - 0.81).sqrt(), 0.0];
        let retriever = retriever(store, query_vector);

        let keyword = retriever.keyword_search("cat mat", 5).await.unwrap();
        assert_eq!(keyword.len(), 1);
        assert_eq!(keyword[0].score, 2.0);

        let semantic = retriever.similarity_search("cat mat", 5).await.unwrap();
        assert_eq!(semantic.len(), 1);
        assert!((semantic[0].score - 0.9).abs() < 1e-4);

        let fused = retriever.hybrid_search("cat mat", 5).await.unwrap();
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 1.23).abs() < 1e-3);
        assert_eq!(
            fused[0].metadata.get(META_SOURCE),
            Some(&json!("a.txt")),
            "metadata must come from the stored chunk"
        );
    }

    // E2E 2: 빈 저장소 -> 빈 결과, 오류 없음
    #[tokio::test]
    async fn test_empty_store_returns_empty() {
        let store = Arc::new(MemoryChunkStore::new());
        let retriever = retriever(store, vec![1.0, 0.0]);

        let results = retriever.hybrid_search("anything", 5).await.unwrap();
        assert!(results.is_empty());
    }

    // E2E 4: 통합 계산과 메타데이터 재결합 사이에 청크가 사라지면
    // 빈 메타데이터로 대체 (오류 아님)
    #[tokio::test]
    async fn test_vanished_chunk_gets_empty_metadata() {
        let inner = MemoryChunkStore::new();
        inner
            .add_batch(&[chunk_with("a#0", "ephemeral content", "a.txt", vec![1.0])])
            .await
            .unwrap();
        let store = Arc::new(VanishingStore {
            inner,
            scans: AtomicUsize::new(0),
        });
        let retriever = retriever(store, vec![1.0]);

        let results = retriever.hybrid_search("ephemeral", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].metadata.is_empty());
    }

    // 하위 검색 실패 시 하이브리드 전체가 실패 (조용한 폴백 없음)
    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let store = store_with(vec![chunk_with("a#0", "some text", "a.txt", vec![1.0])]).await;
        let retriever = HybridRetriever::new(store, Arc::new(FailingEmbedding));

        let err = retriever.hybrid_search("some", 5).await.unwrap_err();
        let retrieval_err = err
            .downcast_ref::<RetrievalError>()
            .expect("expected RetrievalError");
        assert!(matches!(retrieval_err, RetrievalError::Embedding(_)));
    }

    // 양쪽 검색에 모두 등장하는 청크는 기여가 합산됨
    #[tokio::test]
    async fn test_fusion_sums_both_contributions() {
        let store = store_with(vec![
            chunk_with("a#0", "rust systems language", "a.txt", vec![1.0, 0.0]),
            chunk_with("a#1", "unrelated filler text", "a.txt", vec![0.0, 1.0]),
        ])
        .await;
        let retriever = retriever(store, vec![1.0, 0.0]);

        let fused = retriever.hybrid_search("rust", 5).await.unwrap();
        let top = &fused[0];
        assert_eq!(top.content, "rust systems language");
        // 시맨틱 1.0 * 0.7 + 키워드 1 * 0.3
        assert!((top.score - 1.0).abs() < 1e-4);
    }
}
