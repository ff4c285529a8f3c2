//! 파일 수집 모듈
//!
//! 인제스천 대상 파일을 모읍니다. 폴더는 재귀 탐색하되
//! .gitignore 패턴과 숨김 파일 규칙을 따르고,
//! 지원하는 문서 형식(텍스트/PDF/DOCX)만 통과시킵니다.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use ignore::WalkBuilder;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 문서 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 일반 텍스트 (마크다운 포함)
    Text,
    /// PDF 문서
    Pdf,
    /// Word 문서 (docx)
    Docx,
}

impl FileType {
    /// 경로의 확장자로 형식 판별
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "txt" | "md" | "rst" | "csv" | "json" | "toml" | "yaml" | "yml" | "xml" | "html" => {
                Some(Self::Text)
            }
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 절대 경로
    pub path: PathBuf,
    /// 문서 형식
    pub file_type: FileType,
    /// 크기 (바이트)
    pub size: u64,
}

impl CollectedFile {
    fn inspect(path: PathBuf) -> Option<Self> {
        let file_type = FileType::from_path(&path)?;
        let size = std::fs::metadata(&path).ok().filter(|m| m.is_file())?.len();
        Some(Self {
            path,
            file_type,
            size,
        })
    }

    /// 파일 이름 (표시 및 source 메타데이터용)
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 파일 크기 상한 (바이트, 0이면 무제한)
    pub max_file_size: u64,
    /// PDF 제외
    pub skip_pdfs: bool,
    /// Word 문서 제외
    pub skip_docx: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 10 * 1024 * 1024, // 10MB
            skip_pdfs: false,
            skip_docx: false,
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 설정으로 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 단일 파일 수집
    ///
    /// 지원하지 않는 형식이거나 필터에 걸리면 None.
    pub fn collect_file(&self, path: &Path) -> Result<Option<CollectedFile>> {
        let path = absolutize(path)?;
        if !path.is_file() {
            bail!("File not found: {:?}", path);
        }

        Ok(CollectedFile::inspect(path).filter(|f| self.passes(f)))
    }

    /// 폴더 재귀 수집
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        let root = absolutize(path)?;
        if !root.is_dir() {
            bail!("Directory not found: {:?}", root);
        }

        let walker = WalkBuilder::new(&root)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        let files: Vec<CollectedFile> = walker
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    None
                }
            })
            .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
            .filter_map(|e| CollectedFile::inspect(e.into_path()))
            .filter(|f| self.passes(f))
            .collect();

        tracing::info!("Collected {} files from {:?}", files.len(), root);
        Ok(files)
    }

    /// 필터 통과 여부
    fn passes(&self, file: &CollectedFile) -> bool {
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            tracing::debug!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
            return false;
        }

        match file.file_type {
            FileType::Pdf => !self.config.skip_pdfs,
            FileType::Docx => !self.config.skip_docx,
            FileType::Text => true,
        }
    }
}

/// 상대 경로를 현재 작업 디렉토리 기준 절대 경로로
fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub text_files: usize,
    pub pdf_files: usize,
    pub docx_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    /// 수집된 파일 목록에서 통계 계산
    pub fn from_files(files: &[CollectedFile]) -> Self {
        files.iter().fold(Self::default(), |mut stats, file| {
            stats.total_files += 1;
            stats.total_size += file.size;
            match file.file_type {
                FileType::Text => stats.text_files += 1,
                FileType::Pdf => stats.pdf_files += 1,
                FileType::Docx => stats.docx_files += 1,
            }
            stats
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
