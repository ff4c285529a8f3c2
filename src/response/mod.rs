//! 응답 생성 모듈 - 검색 결과 기반 답변 조립
//!
//! 하이브리드 검색의 순위 목록을 입력으로 받아 컨텍스트를 조립하고,
//! 질의 키워드와 겹치는 문장을 추출하여 답변을 만듭니다.
//! 생성형 모델 연동은 이 모듈의 범위 밖이며, 교체 가능한 외부
//! 협력자로 남겨둡니다.

use serde::Serialize;

use crate::knowledge::{metadata_source, ScoredChunk};

/// 컨텍스트 최대 길이 (문자)
const MAX_CONTEXT_CHARS: usize = 2000;
/// 답변에 포함할 최대 문장 수
const MAX_ANSWER_SENTENCES: usize = 3;
/// 출처 최대 표시 수
const MAX_SOURCES: usize = 3;

// ============================================================================
// Types
// ============================================================================

/// 생성된 답변
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedAnswer {
    /// 답변 텍스트
    pub text: String,
    /// 신뢰도 (검색 점수 평균, 범위 제한 없음)
    pub confidence: f32,
    /// 출처 문서 이름 (최대 3개)
    pub sources: Vec<String>,
}

// ============================================================================
// ResponseGenerator
// ============================================================================

/// 응답 생성기
pub struct ResponseGenerator {
    max_context_chars: usize,
}

impl Default for ResponseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseGenerator {
    /// 기본 설정으로 생성 (컨텍스트 2000자)
    pub fn new() -> Self {
        Self {
            max_context_chars: MAX_CONTEXT_CHARS,
        }
    }

    /// 컨텍스트 예산을 지정하여 생성
    pub fn with_context_budget(max_context_chars: usize) -> Self {
        Self { max_context_chars }
    }

    /// 검색 결과로부터 답변 생성
    ///
    /// 빈 결과에는 신뢰도 0의 안내 문구를 반환합니다.
    /// 호출자는 보통 빈 결과를 미리 걸러 "관련 정보 없음"으로 처리합니다.
    pub fn generate(&self, query: &str, results: &[ScoredChunk]) -> GeneratedAnswer {
        if results.is_empty() {
            return GeneratedAnswer {
                text: "문서에서 관련 정보를 찾을 수 없습니다.".to_string(),
                confidence: 0.0,
                sources: vec![],
            };
        }

        let context = self.create_context(results);
        let text = extract_answer(query, &context);

        let confidence =
            results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32;

        let sources = results
            .iter()
            .take(MAX_SOURCES)
            .enumerate()
            .map(|(i, result)| {
                metadata_source(&result.metadata)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("문서 {}", i + 1))
            })
            .collect();

        GeneratedAnswer {
            text,
            confidence,
            sources,
        }
    }

    /// 검색 결과에서 컨텍스트 조립
    ///
    /// 청크 전체 단위로만 추가하며, 예산을 넘기는 청크부터 중단합니다.
    fn create_context(&self, results: &[ScoredChunk]) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let mut current_length = 0;

        for result in results {
            if current_length + result.content.len() > self.max_context_chars {
                break;
            }
            parts.push(&result.content);
            current_length += result.content.len();
        }

        parts.join("\n")
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 컨텍스트에서 질의 관련 문장 추출
///
/// 질의 키워드를 포함하는 문장을 순서대로 최대 3개 이어붙입니다.
fn extract_answer(query: &str, context: &str) -> String {
    let keywords: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let relevant: Vec<&str> = context
        .split('.')
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .filter(|sentence| {
            let lower = sentence.to_lowercase();
            keywords.iter().any(|keyword| lower.contains(keyword.as_str()))
        })
        .take(MAX_ANSWER_SENTENCES)
        .collect();

    if relevant.is_empty() {
        "관련 정보를 찾았지만 구체적인 답변을 추출하지 못했습니다.".to_string()
    } else {
        format!("{}.", relevant.join(". "))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{ChunkMetadata, META_SOURCE};
    use serde_json::json;

    fn scored(content: &str, source: Option<&str>, score: f32) -> ScoredChunk {
        let mut metadata = ChunkMetadata::new();
        if let Some(source) = source {
            metadata.insert(META_SOURCE.to_string(), json!(source));
        }
        ScoredChunk {
            content: content.to_string(),
            metadata,
            score,
        }
    }

    #[test]
    fn test_generate_empty_results() {
        let generator = ResponseGenerator::new();
        let answer = generator.generate("anything", &[]);
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.sources.is_empty());
    }

    #[test]
    fn test_generate_extracts_relevant_sentences() {
        let generator = ResponseGenerator::new();
        let results = vec![scored(
            "Rust is a systems language. It is fast. Cats are animals.",
            Some("guide.md"),
            0.8,
        )];

        let answer = generator.generate("rust fast", &results);
        assert!(answer.text.contains("Rust is a systems language"));
        assert!(answer.text.contains("It is fast"));
        assert!(!answer.text.contains("Cats"));
    }

    #[test]
    fn test_generate_limits_sentences() {
        let generator = ResponseGenerator::new();
        let results = vec![scored(
            "rust one. rust two. rust three. rust four. rust five.",
            Some("a.txt"),
            1.0,
        )];

        let answer = generator.generate("rust", &results);
        let sentence_count = answer.text.matches("rust").count();
        assert_eq!(sentence_count, 3);
    }

    #[test]
    fn test_generate_fallback_when_no_overlap() {
        let generator = ResponseGenerator::new();
        let results = vec![scored("completely unrelated text.", Some("a.txt"), 0.5)];

        let answer = generator.generate("quantum physics", &results);
        assert!(answer.text.contains("추출하지 못했습니다"));
        // 신뢰도는 결과 점수에서 계산됨
        assert!((answer.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_is_mean_score() {
        let generator = ResponseGenerator::new();
        let results = vec![
            scored("rust text one.", Some("a.txt"), 1.0),
            scored("rust text two.", Some("b.txt"), 0.5),
        ];

        let answer = generator.generate("rust", &results);
        assert!((answer.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_sources_fall_back_to_position() {
        let generator = ResponseGenerator::new();
        let results = vec![
            scored("rust alpha.", Some("a.txt"), 1.0),
            scored("rust beta.", None, 0.9),
        ];

        let answer = generator.generate("rust", &results);
        assert_eq!(answer.sources, vec!["a.txt".to_string(), "문서 2".to_string()]);
    }

    #[test]
    fn test_sources_capped_at_three() {
        let generator = ResponseGenerator::new();
        let results: Vec<ScoredChunk> = (0..5)
            .map(|i| scored("rust entry.", Some(&format!("doc{}.txt", i)), 1.0))
            .collect();

        let answer = generator.generate("rust", &results);
        assert_eq!(answer.sources.len(), 3);
    }

    #[test]
    fn test_context_budget_respected() {
        let generator = ResponseGenerator::with_context_budget(30);
        let results = vec![
            scored("short rust sentence.", Some("a.txt"), 1.0),
            scored(
                "this chunk is far too long to fit in the remaining context budget.",
                Some("b.txt"),
                0.9,
            ),
        ];

        let context = generator.create_context(&results);
        assert!(context.contains("short rust sentence"));
        assert!(!context.contains("far too long"));
    }
}
