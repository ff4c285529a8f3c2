//! NLP 모듈 - 언어 감지 및 번역
//!
//! Sarvam AI API에 위임하는 얇은 클라이언트입니다.
//! 다국어 질의를 영어로 정규화하고, 답변을 요청 언어로 되돌립니다.
//! 검색 경로(임베딩/스캔/통합)에는 관여하지 않습니다.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Sarvam 언어 감지 엔드포인트
const SARVAM_DETECT_URL: &str = "https://api.sarvam.ai/v1/detect_language";
/// Sarvam 번역 엔드포인트
const SARVAM_TRANSLATE_URL: &str = "https://api.sarvam.ai/v1/translate";

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수 SARVAM_API_KEY)
pub fn get_api_key() -> Result<String> {
    if let Ok(key) = std::env::var("SARVAM_API_KEY") {
        if !key.is_empty() {
            return Ok(key);
        }
    }

    anyhow::bail!(
        "API key not found. Set SARVAM_API_KEY environment variable for multilingual support."
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    std::env::var("SARVAM_API_KEY")
        .map(|key| !key.is_empty())
        .unwrap_or(false)
}

// ============================================================================
// SarvamClient
// ============================================================================

/// Sarvam AI 클라이언트
pub struct SarvamClient {
    api_key: String,
    client: reqwest::Client,
}

/// 언어 감지 요청
#[derive(Debug, Serialize)]
struct DetectRequest {
    text: String,
}

/// 언어 감지 응답
#[derive(Debug, Deserialize)]
struct DetectResponse {
    language: Option<String>,
}

/// 번역 요청
#[derive(Debug, Serialize)]
struct TranslateRequest {
    text: String,
    target_language: String,
}

/// 번역 응답
#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translated_text: Option<String>,
}

impl SarvamClient {
    /// API 키로 클라이언트 생성
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { api_key, client })
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env() -> Result<Self> {
        Self::new(get_api_key()?)
    }

    /// 텍스트의 언어 감지
    ///
    /// 감지 불가 시 "en"을 반환합니다.
    pub async fn detect_language(&self, text: &str) -> Result<String> {
        let response = self
            .client
            .post(SARVAM_DETECT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&DetectRequest {
                text: text.to_string(),
            })
            .send()
            .await
            .context("Failed to send language detection request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Sarvam detect_language error ({}): {}", status, body);
        }

        let detected: DetectResponse = response
            .json()
            .await
            .context("Failed to parse language detection response")?;

        Ok(detected.language.unwrap_or_else(|| "en".to_string()))
    }

    /// 텍스트 번역
    ///
    /// 대상 언어가 영어면 원문을 그대로 반환합니다 (호출 절약).
    /// 응답에 번역이 없으면 원문을 반환합니다.
    pub async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        if target_lang == "en" {
            return Ok(text.to_string());
        }

        let response = self
            .client
            .post(SARVAM_TRANSLATE_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&TranslateRequest {
                text: text.to_string(),
                target_language: target_lang.to_string(),
            })
            .send()
            .await
            .context("Failed to send translation request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Sarvam translate error ({}): {}", status, body);
        }

        let translated: TranslateResponse = response
            .json()
            .await
            .context("Failed to parse translation response")?;

        Ok(translated
            .translated_text
            .unwrap_or_else(|| text.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SarvamClient::new("test-key".to_string());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_translate_to_english_is_identity() {
        // 영어 대상 번역은 API 호출 없이 원문 반환
        let client = SarvamClient::new("test-key".to_string()).unwrap();
        let result = client.translate("hello world", "en").await.unwrap();
        assert_eq!(result, "hello world");
    }

    #[test]
    fn test_detect_response_parsing() {
        let parsed: DetectResponse = serde_json::from_str(r#"{"language": "hi"}"#).unwrap();
        assert_eq!(parsed.language.as_deref(), Some("hi"));

        // language 필드가 없어도 파싱 성공 (기본값 en 처리)
        let parsed: DetectResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(parsed.language.is_none());
    }

    #[test]
    fn test_translate_response_parsing() {
        let parsed: TranslateResponse =
            serde_json::from_str(r#"{"translated_text": "नमस्ते"}"#).unwrap();
        assert_eq!(parsed.translated_text.as_deref(), Some("नमस्ते"));
    }
}
