//! Memory Chunk Store - 인메모리 청크 저장소
//!
//! 코사인 거리 정밀 탐색(exact nearest neighbor)을 수행하는
//! 휘발성 저장소입니다. 임시 세션과 테스트에서 사용합니다.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::vector::{
    cosine_similarity, metadata_source, Chunk, ChunkRecord, ChunkStore, NearestResult,
};

// ============================================================================
// MemoryChunkStore
// ============================================================================

/// 인메모리 청크 저장소
///
/// 삽입 순서를 유지하며, 읽기는 동시 허용 / 쓰기는 배타적입니다
/// (RwLock). 삽입은 청크 단위로 원자적입니다 - 부분 삽입된 청크가
/// 읽기에 노출되지 않습니다.
pub struct MemoryChunkStore {
    chunks: RwLock<Vec<Chunk>>,
}

impl MemoryChunkStore {
    /// 빈 저장소 생성
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn add_batch(&self, chunks: &[Chunk]) -> Result<usize> {
        let mut guard = self
            .chunks
            .write()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        guard.extend_from_slice(chunks);
        Ok(chunks.len())
    }

    async fn nearest(&self, query_embedding: &[f32], k: usize) -> Result<Vec<NearestResult>> {
        let guard = self
            .chunks
            .read()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;

        // 코사인 거리 = 1 - 코사인 유사도 (0.0 ~ 2.0)
        let mut results: Vec<NearestResult> = guard
            .iter()
            .map(|chunk| NearestResult {
                chunk: ChunkRecord {
                    id: chunk.id.clone(),
                    content: chunk.content.clone(),
                    metadata: chunk.metadata.clone(),
                },
                distance: 1.0 - cosine_similarity(&chunk.embedding, query_embedding),
            })
            .collect();

        // 거리 오름차순, 동거리는 삽입 순서 유지 (stable sort)
        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);

        Ok(results)
    }

    async fn all(&self) -> Result<Vec<ChunkRecord>> {
        let guard = self
            .chunks
            .read()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;

        Ok(guard
            .iter()
            .map(|chunk| ChunkRecord {
                id: chunk.id.clone(),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let guard = self
            .chunks
            .read()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        Ok(guard.len())
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let mut guard = self
            .chunks
            .write()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;

        let before = guard.len();
        guard.retain(|chunk| metadata_source(&chunk.metadata) != Some(source));
        Ok(before - guard.len())
    }
}

// ============================================================================
// Tests
// ============================================================================
