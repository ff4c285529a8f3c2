//! 임베딩 모듈 - Ollama API를 통한 텍스트 벡터화
//!
//! 텍스트를 고정 차원 벡터로 변환하는 임베딩 프로바이더입니다.
//! 시맨틱 검색을 위한 핵심 모듈입니다.
//!
//! 인제스천과 쿼리에 반드시 같은 모델을 사용해야 유사도 점수가
//! 의미를 가집니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::from_env()?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// 기본 Ollama 엔드포인트
/// ref: https://github.com/ollama/ollama/blob/main/docs/api.md
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// 기본 임베딩 모델 (all-MiniLM-L6-v2 계열)
const DEFAULT_EMBED_MODEL: &str = "all-minilm";

/// 기본 임베딩 차원 (all-minilm)
pub const DEFAULT_DIMENSION: usize = 384;

/// 전송 실패 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 500;

/// Ollama 임베딩 구현체
///
/// 로컬 Ollama 서버의 embeddings API를 호출합니다.
#[derive(Debug)]
pub struct OllamaEmbedding {
    base_url: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
}

impl OllamaEmbedding {
    /// 새 Ollama 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `base_url` - Ollama 서버 주소 (예: http://localhost:11434)
    /// * `model` - 임베딩 모델 이름
    pub fn new(base_url: String, model: String) -> Result<Self> {
        Self::with_dimension(base_url, model, DEFAULT_DIMENSION)
    }

    /// 차원을 지정하여 생성
    ///
    /// 모델이 반환하는 차원과 일치해야 합니다. 서버 응답의 차원이
    /// 다르면 embed가 오류를 반환합니다.
    pub fn with_dimension(base_url: String, model: String, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Embedding dimension must be positive");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
            dimension,
        })
    }

    /// 환경변수에서 설정을 읽어 생성
    ///
    /// - `OLLAMA_URL`: 서버 주소 (기본 http://localhost:11434)
    /// - `DOCQA_EMBED_MODEL`: 모델 이름 (기본 all-minilm)
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        let model =
            std::env::var("DOCQA_EMBED_MODEL").unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string());
        Self::new(base_url, model)
    }

    /// 임베딩 차원 반환
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 서버 주소 반환
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Ollama embeddings API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

/// Ollama embeddings API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// 요청 전송 (전송 실패 시 지수 백오프로 재시도)
    ///
    /// 서버가 응답한 오류(4xx/5xx)는 재시도하지 않고 즉시 실패합니다.
    async fn send_with_retry(&self, request: &EmbedRequest) -> Result<String> {
        let url = format!("{}/api/embeddings", self.base_url);
        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            match self.client.post(&url).json(request).send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .context("Failed to read response body")?;

                    if status.is_success() {
                        return Ok(body);
                    }
                    anyhow::bail!("Ollama API error ({}): {}", status, body);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < MAX_RETRIES {
                        tracing::warn!(
                            "Embedding request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(anyhow::anyhow!(
            "Embedding request failed after {} retries: {}",
            MAX_RETRIES,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트는 서버 호출 없이 영벡터
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let body = self.send_with_retry(&request).await?;
        let parsed: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        // 차원 불일치는 모델 설정 오류 - 점수가 무의미해지므로 거부
        if parsed.embedding.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: model '{}' returned {}, expected {}",
                self.model,
                parsed.embedding.len(),
                self.dimension
            );
        }

        Ok(parsed.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // embeddings API는 단건 호출이므로 순차 처리
        let mut embeddings = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding batch {}/{}", i + 1, texts.len());
            embeddings.push(self.embed(text).await?);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 임베딩 프로바이더 생성 (환경변수 설정 사용)
pub fn create_embedder() -> Result<OllamaEmbedding> {
    let embedder = OllamaEmbedding::from_env()?;
    tracing::info!(
        "Using Ollama embedding: {} at {} (dimension: {})",
        embedder.name(),
        embedder.base_url(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================
