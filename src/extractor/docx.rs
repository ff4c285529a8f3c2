//! DOCX 텍스트 추출 모듈
//!
//! docx-rs로 문서를 읽어 문단/런을 순회하며 텍스트를 모읍니다.
//! 표 등 문단 이외의 요소는 건너뜁니다.

use std::path::Path;

use anyhow::{Context, Result};
use docx_rs::{DocumentChild, ParagraphChild, RunChild};

/// DOCX 파일에서 텍스트 추출
pub fn extract_text(path: &Path) -> Result<String> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read DOCX: {:?}", path))?;

    let docx = docx_rs::read_docx(&data)
        .map_err(|e| anyhow::anyhow!("Failed to parse DOCX {:?}: {}", path, e))?;

    let mut text = String::new();

    for child in docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            let before = text.len();

            for paragraph_child in paragraph.children {
                if let ParagraphChild::Run(run) = paragraph_child {
                    for run_child in run.children {
                        if let RunChild::Text(t) = run_child {
                            text.push_str(&t.text);
                        }
                    }
                }
            }

            // 빈 문단은 줄바꿈을 만들지 않음
            if text.len() > before {
                text.push('\n');
            }
        }
    }

    if text.trim().is_empty() {
        tracing::warn!("No text extracted from DOCX: {:?}", path);
    }

    Ok(text)
}

// ============================================================================
// Tests
// ============================================================================
