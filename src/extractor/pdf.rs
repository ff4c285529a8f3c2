//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트로 전체 텍스트를 뽑은 뒤 페이지 단위로 나눕니다.

use std::path::Path;

use anyhow::{Context, Result};

/// 추출된 PDF 페이지
#[derive(Debug, Clone)]
pub struct PdfPage {
    /// 페이지 번호 (1부터 시작)
    pub number: usize,
    /// 페이지 텍스트
    pub text: String,
}

/// PDF에서 페이지별 텍스트 추출
pub fn extract_pages(path: &Path) -> Result<Vec<PdfPage>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        // 스캔본 PDF는 텍스트 레이어가 없음
        tracing::warn!("No text extracted from PDF: {:?}", path);
        return Ok(vec![PdfPage {
            number: 1,
            text: String::new(),
        }]);
    }

    Ok(split_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| PdfPage {
            number: i + 1,
            text,
        })
        .collect())
}

/// PDF 텍스트를 페이지별로 분리
///
/// 폼피드 문자를 우선 시도하고, 없으면 "--- Page N ---" 형태의
/// 구분선 패턴을 시도합니다. 둘 다 없으면 전체를 1페이지로 봅니다.
fn split_pages(text: &str) -> Vec<String> {
    if let Some(pages) = split_on_formfeed(text) {
        return pages;
    }
    if let Some(pages) = split_on_separator_lines(text) {
        return pages;
    }
    vec![text.trim().to_string()]
}

/// 폼피드 문자(\x0c) 기준 분리 (2페이지 이상일 때만 Some)
fn split_on_formfeed(text: &str) -> Option<Vec<String>> {
    let pages = collect_nonempty(text.split('\x0c'));
    (pages.len() > 1).then_some(pages)
}

/// "--- Page N ---" 형태 구분선 기준 분리 (일부 PDF 생성기에서 사용)
fn split_on_separator_lines(text: &str) -> Option<Vec<String>> {
    let page_pattern = regex::Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
        .expect("Invalid regex");

    if !page_pattern.is_match(text) {
        return None;
    }

    let pages = collect_nonempty(page_pattern.split(text));
    (pages.len() > 1).then_some(pages)
}

/// 조각들을 트리밍하고 빈 조각을 버림
fn collect_nonempty<'a>(parts: impl Iterator<Item = &'a str>) -> Vec<String> {
    parts
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pages_with_formfeed() {
        let text = "Page 1 content\x0cPage 2 content\x0cPage 3 content";
        let pages = split_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], "Page 1 content");
        assert_eq!(pages[1], "Page 2 content");
    }

    #[test]
    fn test_split_pages_with_separator_line() {
        let text = "First page text\n--- Page 2 ---\nSecond page text";
        let pages = split_pages(text);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], "First page text");
    }

    #[test]
    fn test_split_pages_no_separator() {
        let text = "Just some text without page breaks";
        let pages = split_pages(text);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0], text);
    }

    #[test]
    fn test_extract_pages_missing_file() {
        let result = extract_pages(Path::new("/no/such/file.pdf"));
        assert!(result.is_err());
    }
}
