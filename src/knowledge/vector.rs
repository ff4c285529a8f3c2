//! Chunk Store - 청크 데이터 모델 및 저장소 트레이트
//!
//! 검색 가능한 콘텐츠의 최소 단위(청크)와
//! 벡터 근접 검색 + 전체 스캔을 제공하는 저장소 인터페이스를 정의합니다.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 벡터 임베딩 차원 (all-MiniLM-L6-v2 계열 기본값)
pub const EMBEDDING_DIMENSION: i32 = 384;

/// 청크 메타데이터 (문자열 키 -> 스칼라 JSON 값)
///
/// 비어있을 수 있지만 항상 존재합니다 (None 없음).
pub type ChunkMetadata = HashMap<String, serde_json::Value>;

/// 메타데이터의 원본 문서 이름 키
pub const META_SOURCE: &str = "source";
/// 메타데이터의 페이지 번호 키
pub const META_PAGE: &str = "page";

// ============================================================================
// Types
// ============================================================================

/// 청크 - 검색 가능한 콘텐츠의 불변 단위 (저장용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// 청크 ID (원본 문서 식별자 + 순번에서 유도, 저장소 내 유일)
    pub id: String,
    /// 청크 텍스트 (UTF-8, 비어있지 않음)
    pub content: String,
    /// 메타데이터 (원본 문서 이름, 페이지 번호 등)
    pub metadata: ChunkMetadata,
    /// 임베딩 벡터 (인제스천 시점에 한 번 생성)
    pub embedding: Vec<f32>,
}

/// 저장된 청크 레코드 (임베딩 제외 - 전체 스캔용)
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// 청크 ID
    pub id: String,
    /// 청크 텍스트
    pub content: String,
    /// 메타데이터
    pub metadata: ChunkMetadata,
}

/// 근접 검색 결과 (거리 포함)
#[derive(Debug, Clone)]
pub struct NearestResult {
    /// 청크 레코드
    pub chunk: ChunkRecord,
    /// 쿼리 벡터와의 거리 (낮을수록 유사)
    pub distance: f32,
}

// ============================================================================
// ChunkStore Trait
// ============================================================================

/// ChunkStore 트레이트 (async)
///
/// 청크 저장소의 공통 인터페이스입니다. 검색 엔진 관점에서는
/// 추가 전용(append-only)이며, 키워드 스캔을 위해 콘텐츠와 메타데이터를
/// 벌크로 읽을 수 있어야 합니다.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// 청크 배치 삽입
    ///
    /// ID 중복 검사는 하지 않습니다. ID 유일성은 인제스천 책임입니다.
    async fn add_batch(&self, chunks: &[Chunk]) -> Result<usize>;

    /// 쿼리 벡터에 가장 가까운 k개 청크 조회 (거리 오름차순)
    async fn nearest(&self, query_embedding: &[f32], k: usize) -> Result<Vec<NearestResult>>;

    /// 저장된 모든 청크 조회 (콘텐츠 + 메타데이터, 저장 순서)
    async fn all(&self) -> Result<Vec<ChunkRecord>>;

    /// 청크 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 원본 문서 이름 기준 청크 삭제
    async fn delete_by_source(&self, source: &str) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 두 벡터 간의 코사인 유사도를 계산합니다.
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 메타데이터에서 원본 문서 이름 추출
pub fn metadata_source(metadata: &ChunkMetadata) -> Option<&str> {
    metadata.get(META_SOURCE).and_then(|v| v.as_str())
}

// ============================================================================
// Tests
// ============================================================================
