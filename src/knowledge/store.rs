//! Document Registry - rusqlite 기반 원본 문서 레지스트리
//!
//! 인제스천된 원본 문서의 목록과 통계를 관리합니다.
//! 청크 본문과 임베딩은 청크 저장소가 보관하며, 레지스트리는
//! 문서 단위 기록(이름, 출처, 콘텐츠 해시, 청크 수)만 담당합니다.
//! 저장 위치: ~/.docqa-rag/registry.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.docqa-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docqa-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 등록된 원본 문서
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: i64,
    /// 문서 이름 (청크 메타데이터의 source 값과 동일)
    pub name: String,
    /// 출처 (파일 경로, direct-input 등)
    pub origin: String,
    /// 콘텐츠 SHA-256 (16진수) - 재인제스천 중복 판정용
    pub content_sha: String,
    /// 이 문서에서 생성된 청크 수
    pub chunk_count: i64,
    /// 콘텐츠 길이 (문자 수)
    pub content_chars: i64,
    pub created_at: DateTime<Utc>,
}

/// 새 문서 등록용 구조체
#[derive(Debug, Clone)]
pub struct NewSourceDocument {
    pub name: String,
    pub origin: String,
    pub content_sha: String,
    pub chunk_count: i64,
    pub content_chars: i64,
}

/// 레지스트리 통계
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub document_count: usize,
    pub total_chunks: usize,
    pub total_content_chars: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// DocumentRegistry
// ============================================================================

/// 원본 문서 레지스트리
///
/// SQLite 기반 문서 기록 저장소입니다.
pub struct DocumentRegistry {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl DocumentRegistry {
    /// 레지스트리 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        // 부모 디렉토리 생성
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let registry = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        registry.initialize()?;
        Ok(registry)
    }

    /// 기본 위치에서 열기 (~/.docqa-rag/registry.db)
    pub fn open_default() -> Result<Self> {
        let data_dir = get_data_dir();
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir)
                .context("Failed to create data directory")?;
        }

        let db_path = data_dir.join("registry.db");
        Self::open(&db_path)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 커넥션 잠금 획득
    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS source_documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                origin TEXT NOT NULL,
                content_sha TEXT NOT NULL,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                content_chars INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )
        .context("Failed to create source_documents table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_source_documents_name ON source_documents(name)",
            [],
        )
        .context("Failed to create name index")?;

        tracing::debug!("Document registry initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 문서 등록 (이름이 같으면 교체)
    pub fn add_document(&self, doc: NewSourceDocument) -> Result<i64> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR REPLACE INTO source_documents
             (name, origin, content_sha, chunk_count, content_chars, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                doc.name,
                doc.origin,
                doc.content_sha,
                doc.chunk_count,
                doc.content_chars,
                now
            ],
        )
        .context("Failed to insert source document")?;

        let id = conn.last_insert_rowid();
        tracing::info!("Registered document: {} (id={}, chunks={})", doc.name, id, doc.chunk_count);

        Ok(id)
    }

    /// ID로 문서 조회
    pub fn get_document(&self, id: i64) -> Result<Option<SourceDocument>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, name, origin, content_sha, chunk_count, content_chars, created_at
             FROM source_documents WHERE id = ?1",
        )?;

        let doc = stmt.query_row(params![id], row_to_document).ok();

        Ok(doc)
    }

    /// 이름으로 문서 조회
    pub fn get_by_name(&self, name: &str) -> Result<Option<SourceDocument>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, name, origin, content_sha, chunk_count, content_chars, created_at
             FROM source_documents WHERE name = ?1",
        )?;

        let doc = stmt.query_row(params![name], row_to_document).ok();

        Ok(doc)
    }

    /// 문서 목록 조회 (최신순)
    pub fn list_documents(&self, limit: usize) -> Result<Vec<SourceDocument>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, name, origin, content_sha, chunk_count, content_chars, created_at
             FROM source_documents
             ORDER BY created_at DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], row_to_document)?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// 문서 삭제
    pub fn delete_document(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;

        let rows = conn.execute("DELETE FROM source_documents WHERE id = ?1", params![id])?;

        Ok(rows > 0)
    }

    /// 레지스트리 통계
    pub fn stats(&self) -> Result<RegistryStats> {
        let conn = self.conn()?;

        let (count, chunks, chars): (i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(chunk_count), 0),
                        COALESCE(SUM(content_chars), 0)
                 FROM source_documents",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap_or((0, 0, 0));

        Ok(RegistryStats {
            document_count: count as usize,
            total_chunks: chunks as usize,
            total_content_chars: chars as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 쿼리 행을 SourceDocument로 변환
fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceDocument> {
    Ok(SourceDocument {
        id: row.get(0)?,
        name: row.get(1)?,
        origin: row.get(2)?,
        content_sha: row.get(3)?,
        chunk_count: row.get(4)?,
        content_chars: row.get(5)?,
        created_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================
