//! Text Chunking Module
//!
//! 문서를 겹치는 문자 윈도우로 분할합니다.
//! 청크 경계에서 문맥이 끊기지 않도록 이웃 청크와 일부 구간을 공유합니다.

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 청크 목표 크기 (문자 수)
    pub chunk_size: usize,
    /// 이웃 청크와의 오버랩 (문자 수)
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkConfig {
    /// 오버랩 없는 빠른 인덱싱용 설정
    pub fn without_overlap(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            overlap: 0,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// WindowChunker
// ============================================================================

/// 겹치는 문자 윈도우 청커
///
/// 목표 크기만큼 자르되 윈도우 안의 마지막 공백에서 끊어
/// 단어가 중간에 잘리는 것을 피합니다. 다음 윈도우는
/// 오버랩만큼 뒤로 물러난 위치에서 시작합니다.
pub struct WindowChunker {
    config: ChunkConfig,
}

impl WindowChunker {
    /// 설정으로 생성
    ///
    /// 오버랩은 청크 크기의 절반을 넘지 않도록 조정합니다
    /// (진행이 멈추는 것을 방지).
    pub fn new(config: ChunkConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        let overlap = config.overlap.min(chunk_size / 2);
        Self {
            config: ChunkConfig {
                chunk_size,
                overlap,
            },
        }
    }

    /// 기본 설정으로 생성 (1000자 윈도우, 200자 오버랩)
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// 윈도우 끝 위치 결정
    ///
    /// UTF-8 경계로 내린 뒤, 텍스트 중간이면 윈도우 안의
    /// 마지막 공백에서 끊습니다 (너무 이른 위치는 제외).
    fn window_end(&self, text: &str, start: usize) -> usize {
        let hard_end = floor_char_boundary(text, (start + self.config.chunk_size).min(text.len()));
        if hard_end >= text.len() {
            return text.len();
        }

        let window = &text[start..hard_end];
        if let Some(pos) = window.rfind(char::is_whitespace) {
            if pos > self.config.chunk_size / 2 {
                return start + pos;
            }
        }

        hard_end
    }
}

impl Chunker for WindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return vec![];
        }

        if text.len() <= self.config.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let end = self.window_end(text, start);

            let piece = text[start..end].trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }

            if end >= text.len() {
                break;
            }

            // 오버랩만큼 물러난 위치에서 다음 윈도우 시작
            let next = floor_char_boundary(text, end.saturating_sub(self.config.overlap));
            start = if next > start { next } else { end };
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "WindowChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// UTF-8 경계 조정 (인덱스 이하로)
#[inline]
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i > 0 && !s.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(WindowChunker::with_defaults())
}

/// 윈도우 청커 생성 (설정 지정)
pub fn window_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(WindowChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================
