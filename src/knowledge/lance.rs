//! LanceDB Chunk Store - 영속 청크 저장소
//!
//! ANN (Approximate Nearest Neighbor) 검색으로 대용량 청크에서도 빠른 검색을 지원합니다.
//! 키워드 스캔을 위한 전체 읽기(full scan)도 함께 제공합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;
use lancedb::DistanceType;

use super::vector::{
    metadata_source, Chunk, ChunkMetadata, ChunkRecord, ChunkStore, NearestResult,
    EMBEDDING_DIMENSION,
};

/// 청크 테이블 이름
const TABLE_NAME: &str = "chunks";

// ============================================================================
// LanceChunkStore
// ============================================================================

/// LanceDB 청크 저장소 구현
///
/// Apache Arrow 기반 columnar 저장소로, 청크의 텍스트/메타데이터와
/// 임베딩을 한 테이블에 함께 보관합니다. 메타데이터는 JSON 문자열
/// 컬럼으로 직렬화합니다.
pub struct LanceChunkStore {
    db: Connection,
}

impl LanceChunkStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create LanceDB directory")?;
        }

        let uri = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(uri)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db })
    }

    /// 청크 테이블 스키마 생성
    fn create_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    EMBEDDING_DIMENSION,
                ),
                false,
            ),
        ])
    }

    /// 청크들을 Arrow RecordBatch로 변환
    fn chunks_to_batch(chunks: &[Chunk]) -> Result<RecordBatch> {
        if chunks.is_empty() {
            anyhow::bail!("Cannot create batch from empty chunks");
        }

        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        // source는 삭제 필터를 위해 메타데이터에서 분리하여 별도 컬럼으로 둡니다
        let sources: Vec<String> = chunks
            .iter()
            .map(|c| metadata_source(&c.metadata).unwrap_or_default().to_string())
            .collect();
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let metadata_json: Vec<String> = chunks
            .iter()
            .map(|c| serde_json::to_string(&c.metadata).context("Failed to serialize metadata"))
            .collect::<Result<_>>()?;

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = chunks
            .iter()
            .flat_map(|c| c.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            EMBEDDING_DIMENSION,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema()),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(sources)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(metadata_json)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&TABLE_NAME.to_string()))
            .unwrap_or(false)
    }

    /// 청크 테이블 열기
    async fn open_table(&self) -> Result<Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open chunk table")
    }

    /// RecordBatch 한 개에서 청크 레코드들 추출
    fn batch_to_records(batch: &RecordBatch) -> Result<Vec<ChunkRecord>> {
        let ids = batch
            .column_by_name("id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing id column"))?;

        let contents = batch
            .column_by_name("content")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing content column"))?;

        let metadata_json = batch
            .column_by_name("metadata")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing metadata column"))?;

        let mut records = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let metadata: ChunkMetadata = serde_json::from_str(metadata_json.value(i))
                .context("Failed to parse chunk metadata")?;

            records.push(ChunkRecord {
                id: ids.value(i).to_string(),
                content: contents.value(i).to_string(),
                metadata,
            });
        }

        Ok(records)
    }
}

#[async_trait]
impl ChunkStore for LanceChunkStore {
    async fn add_batch(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let batch = Self::chunks_to_batch(chunks)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            let table = self.open_table().await?;
            table
                .add(batches)
                .execute()
                .await
                .context("Failed to add chunks to table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create chunk table")?;
        }

        Ok(chunks.len())
    }

    async fn nearest(&self, query_embedding: &[f32], k: usize) -> Result<Vec<NearestResult>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        // 코사인 거리 기반 벡터 검색 (낮을수록 유사)
        let stream = self
            .open_table()
            .await?
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut results = Vec::new();
        for batch in batches {
            // _distance 컬럼은 LanceDB가 자동 추가
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for (i, chunk) in Self::batch_to_records(&batch)?.into_iter().enumerate() {
                results.push(NearestResult {
                    chunk,
                    distance: distances.value(i),
                });
            }
        }

        Ok(results)
    }

    async fn all(&self) -> Result<Vec<ChunkRecord>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;
        let row_count = table.count_rows(None).await.context("Failed to count rows")?;
        if row_count == 0 {
            return Ok(vec![]);
        }

        // 전체 스캔 - 저장(fragment) 순서대로 반환됨
        let stream = table
            .query()
            .limit(row_count)
            .execute()
            .await
            .context("Failed to execute full scan")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut records = Vec::with_capacity(row_count);
        for batch in batches {
            records.extend(Self::batch_to_records(&batch)?);
        }

        Ok(records)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let before = self.count().await?;

        // 작은따옴표 이스케이프 - SQL 필터 인젝션 방지
        let filter = format!("source = '{}'", source.replace('\'', "''"));
        self.open_table()
            .await?
            .delete(&filter)
            .await
            .context("Failed to delete chunks")?;

        Ok(before.saturating_sub(self.count().await?))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::vector::META_SOURCE;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_chunk(source: &str, index: usize) -> Chunk {
        let mut metadata = ChunkMetadata::new();
        metadata.insert(META_SOURCE.to_string(), json!(source));
        Chunk {
            id: format!("{}#{}", source, index),
            content: format!("Test chunk {} from {}", index, source),
            metadata,
            embedding: vec![0.1; EMBEDDING_DIMENSION as usize],
        }
    }

    #[tokio::test]
    async fn test_lance_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("test.lance");

        let store = LanceChunkStore::open(&lance_path).await.unwrap();

        // 초기 상태
        assert_eq!(store.count().await.unwrap(), 0);

        // 삽입
        let chunks = vec![create_test_chunk("a.txt", 0), create_test_chunk("a.txt", 1)];
        let inserted = store.add_batch(&chunks).await.unwrap();
        assert_eq!(inserted, 2);

        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_lance_nearest() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("search_test.lance");

        let store = LanceChunkStore::open(&lance_path).await.unwrap();

        let chunks = vec![
            create_test_chunk("a.txt", 0),
            create_test_chunk("b.txt", 0),
            create_test_chunk("c.txt", 0),
        ];
        store.add_batch(&chunks).await.unwrap();

        let query = vec![0.1; EMBEDDING_DIMENSION as usize];
        let results = store.nearest(&query, 2).await.unwrap();

        assert!(!results.is_empty());
        assert!(results.len() <= 2);
        // 메타데이터가 복원되어야 함
        assert!(results[0].chunk.metadata.contains_key(META_SOURCE));
    }

    #[tokio::test]
    async fn test_lance_all_returns_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("scan_test.lance");

        let store = LanceChunkStore::open(&lance_path).await.unwrap();

        // 빈 저장소 스캔
        assert!(store.all().await.unwrap().is_empty());

        store
            .add_batch(&[create_test_chunk("a.txt", 0), create_test_chunk("b.txt", 0)])
            .await
            .unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            metadata_source(&all[0].metadata),
            Some("a.txt"),
            "metadata roundtrip failed"
        );
    }

    #[tokio::test]
    async fn test_lance_delete_by_source() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("delete_test.lance");

        let store = LanceChunkStore::open(&lance_path).await.unwrap();

        store
            .add_batch(&[
                create_test_chunk("a.txt", 0),
                create_test_chunk("a.txt", 1),
                create_test_chunk("b.txt", 0),
            ])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 3);

        let deleted = store.delete_by_source("a.txt").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
