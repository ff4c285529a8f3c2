//! 콘텐츠 추출 모듈
//!
//! 다양한 파일 형식에서 텍스트 콘텐츠를 추출합니다.
//! - 텍스트 파일: 직접 읽기
//! - PDF 파일: pdf-extract로 페이지별 추출
//! - Word 문서: docx 문단 순회

pub mod docx;
pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::FileType;

// ============================================================================
// Extracted Content
// ============================================================================

/// 추출된 콘텐츠
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    /// 추출된 텍스트
    pub text: String,
    /// 원본 파일 타입
    pub source_type: FileType,
    /// 메타데이터 (PDF 페이지 번호 등)
    pub metadata: ContentMetadata,
}

/// 콘텐츠 메타데이터
#[derive(Debug, Clone, Default)]
pub struct ContentMetadata {
    /// 페이지 번호 (1부터 시작)
    pub page_number: Option<usize>,
    /// 총 페이지 수 (PDF)
    pub total_pages: Option<usize>,
}

// ============================================================================
// Content Extractor
// ============================================================================

/// 콘텐츠 추출기
#[derive(Debug, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    /// 새 추출기 생성
    pub fn new() -> Self {
        Self
    }

    /// 파일에서 콘텐츠 추출
    pub async fn extract(&self, path: &Path, file_type: FileType) -> Result<Vec<ExtractedContent>> {
        match file_type {
            FileType::Text => self.extract_text(path).await,
            FileType::Pdf => self.extract_pdf(path).await,
            FileType::Docx => self.extract_docx(path).await,
        }
    }

    /// 텍스트 파일에서 추출
    async fn extract_text(&self, path: &Path) -> Result<Vec<ExtractedContent>> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read text file: {:?}", path))?;

        Ok(vec![ExtractedContent {
            text,
            source_type: FileType::Text,
            metadata: ContentMetadata::default(),
        }])
    }

    /// PDF 파일에서 추출
    async fn extract_pdf(&self, path: &Path) -> Result<Vec<ExtractedContent>> {
        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let path = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || pdf::extract_pages(&path))
            .await
            .context("PDF extraction task failed")??;

        let total_pages = pages.len();

        Ok(pages
            .into_iter()
            .map(|page| ExtractedContent {
                text: page.text,
                source_type: FileType::Pdf,
                metadata: ContentMetadata {
                    page_number: Some(page.number),
                    total_pages: Some(total_pages),
                },
            })
            .collect())
    }

    /// Word 문서에서 추출
    async fn extract_docx(&self, path: &Path) -> Result<Vec<ExtractedContent>> {
        let path = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || docx::extract_text(&path))
            .await
            .context("DOCX extraction task failed")??;

        Ok(vec![ExtractedContent {
            text,
            source_type: FileType::Docx,
            metadata: ContentMetadata::default(),
        }])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_metadata_default() {
        let meta = ContentMetadata::default();
        assert!(meta.page_number.is_none());
        assert!(meta.total_pages.is_none());
    }

    #[tokio::test]
    async fn test_extract_text_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("note.txt");
        tokio::fs::write(&path, "hello extraction").await.unwrap();

        let extractor = ContentExtractor::new();
        let contents = extractor.extract(&path, FileType::Text).await.unwrap();

        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].text, "hello extraction");
        assert!(contents[0].metadata.page_number.is_none());
    }

    #[tokio::test]
    async fn test_extract_missing_file() {
        let extractor = ContentExtractor::new();
        let result = extractor
            .extract(Path::new("/no/such/file.txt"), FileType::Text)
            .await;
        assert!(result.is_err());
    }
}
