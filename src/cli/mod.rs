//! CLI 모듈
//!
//! docqa-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::collector::{CollectionStats, CollectorConfig, FileCollector, FileType};
use crate::embedding::{create_embedder, OllamaEmbedding};
use crate::extractor::ContentExtractor;
use crate::knowledge::{
    get_data_dir, metadata_source, DocumentProcessor, DocumentRegistry, HybridRetriever,
    LanceChunkStore, ScoredChunk, SourceContent, DEFAULT_TOP_K,
};
use crate::nlp::{has_api_key as has_sarvam_key, SarvamClient};
use crate::response::ResponseGenerator;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docqa-rag")]
#[command(version, about = "문서 질의응답 하이브리드 RAG 시스템", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 검색 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchMode {
    /// 시맨틱 + 키워드 통합
    Hybrid,
    /// 시맨틱 (벡터)만
    Vector,
    /// 키워드 스캔만
    Keyword,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일, 폴더, 또는 텍스트를 지식베이스에 추가
    Ingest {
        /// 수집할 파일 경로
        #[arg(long)]
        file: Option<PathBuf>,

        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 직접 입력할 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// 문서 이름 (--text 사용 시)
        #[arg(short, long)]
        source: Option<String>,

        /// PDF 파일 건너뛰기
        #[arg(long)]
        skip_pdfs: bool,

        /// Word 문서 건너뛰기
        #[arg(long)]
        skip_docx: bool,

        /// 강제 재처리 (콘텐츠가 같아도 다시 임베딩)
        #[arg(long)]
        force: bool,
    },

    /// 문서에 질문하고 답변 생성
    Ask {
        /// 질문
        query: String,

        /// 검색할 청크 수
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        limit: usize,

        /// 답변 언어 (미지정 시 질문 언어 따름)
        #[arg(short, long)]
        lang: Option<String>,
    },

    /// 검색 결과 직접 조회
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        limit: usize,

        /// 검색 모드
        #[arg(short, long, value_enum, default_value_t = SearchMode::Hybrid)]
        mode: SearchMode,
    },

    /// 저장된 문서 목록
    List {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 문서 삭제 (청크 포함)
    Delete {
        /// 삭제할 문서 ID
        #[arg(short, long)]
        id: Option<i64>,

        /// 삭제할 문서 이름
        #[arg(short, long)]
        name: Option<String>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest {
            file,
            dir,
            text,
            source,
            skip_pdfs,
            skip_docx,
            force,
        } => cmd_ingest(file, dir, text, source, skip_pdfs, skip_docx, force).await,
        Commands::Ask { query, limit, lang } => cmd_ask(&query, limit, lang).await,
        Commands::Search { query, limit, mode } => cmd_search(&query, limit, mode).await,
        Commands::List { limit } => cmd_list(limit).await,
        Commands::Delete { id, name } => cmd_delete(id, name).await,
        Commands::Status => cmd_status().await,
    }
}

// ============================================================================
// Stack Wiring
// ============================================================================

/// 기본 저장소 + 임베딩 스택 열기
async fn open_stack() -> Result<(DocumentRegistry, Arc<LanceChunkStore>, Arc<OllamaEmbedding>)> {
    let data_dir = get_data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir).context("데이터 디렉토리 생성 실패")?;
    }

    let registry =
        DocumentRegistry::open(&data_dir.join("registry.db")).context("레지스트리 열기 실패")?;

    let store = Arc::new(
        LanceChunkStore::open(&data_dir.join("chunks.lance"))
            .await
            .context("청크 저장소 열기 실패")?,
    );

    let embedder = Arc::new(create_embedder().context("임베딩 프로바이더 생성 실패")?);

    Ok((registry, store, embedder))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
async fn cmd_ingest(
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    text: Option<String>,
    source: Option<String>,
    skip_pdfs: bool,
    skip_docx: bool,
    force: bool,
) -> Result<()> {
    let (registry, store, embedder) = open_stack().await?;
    let processor = DocumentProcessor::new(registry, store, embedder);

    // 직접 입력 텍스트
    if let Some(text_content) = text {
        let name = source.unwrap_or_else(|| "direct-input".to_string());

        println!("[*] 텍스트 저장 및 임베딩 생성 중...");
        let outcome = processor
            .ingest(&name, "direct-input", &[SourceContent::plain(text_content)], force)
            .await
            .context("문서 추가 실패")?;

        if outcome.skipped {
            println!("[OK] 동일한 콘텐츠가 이미 존재합니다 (ID: {})", outcome.doc_id);
        } else {
            println!(
                "[OK] 문서가 추가되었습니다 (ID: {}, 청크 {}개)",
                outcome.doc_id, outcome.chunk_count
            );
        }
        return Ok(());
    }

    // 파일/폴더 수집
    let config = CollectorConfig {
        skip_pdfs,
        skip_docx,
        ..Default::default()
    };
    let collector = FileCollector::new(config);
    let extractor = ContentExtractor::new();

    let files = if let Some(ref file_path) = file {
        match collector.collect_file(file_path)? {
            Some(f) => vec![f],
            None => {
                println!("[!] 지원하지 않는 파일 형식: {:?}", file_path);
                return Ok(());
            }
        }
    } else if let Some(ref dir_path) = dir {
        collector.collect_directory(dir_path)?
    } else {
        bail!("--file, --dir, --text 중 하나를 지정해야 합니다");
    };

    if files.is_empty() {
        println!("[!] 수집할 파일이 없습니다.");
        return Ok(());
    }

    // 통계 표시
    let stats = CollectionStats::from_files(&files);
    println!("[*] 수집 대상: {} 파일", stats.total_files);
    println!(
        "    텍스트: {}, PDF: {}, DOCX: {}",
        stats.text_files, stats.pdf_files, stats.docx_files
    );
    println!("    총 크기: {}", format_bytes(stats.total_size as usize));
    println!();

    // 파일별 처리
    let mut success_count = 0;
    let mut skipped_count = 0;
    let mut error_count = 0;

    for (i, collected_file) in files.iter().enumerate() {
        let file_name = collected_file.file_name();

        let type_str = match collected_file.file_type {
            FileType::Text => "TXT",
            FileType::Pdf => "PDF",
            FileType::Docx => "DOC",
        };

        print!("[{}/{}] [{}] {}... ", i + 1, files.len(), type_str, file_name);

        // 콘텐츠 추출
        let extracted = match extractor
            .extract(&collected_file.path, collected_file.file_type)
            .await
        {
            Ok(contents) => contents,
            Err(e) => {
                println!("추출 실패: {}", e);
                error_count += 1;
                continue;
            }
        };

        let contents: Vec<SourceContent> = extracted
            .into_iter()
            .map(|content| SourceContent {
                text: content.text,
                page: content.metadata.page_number,
            })
            .collect();

        let origin = format!("file://{}", collected_file.path.display());

        match processor.ingest(file_name, &origin, &contents, force).await {
            Ok(outcome) if outcome.skipped => {
                println!("건너뜀 (변경 없음)");
                skipped_count += 1;
            }
            Ok(outcome) => {
                println!("완료 (청크 {}개)", outcome.chunk_count);
                success_count += 1;
            }
            Err(e) => {
                println!("저장 실패: {}", e);
                error_count += 1;
            }
        }
    }

    println!();
    println!(
        "[OK] 완료: 성공 {}, 건너뜀 {}, 실패 {}",
        success_count, skipped_count, error_count
    );

    Ok(())
}

/// 질의응답 명령어 (ask)
///
/// 질문 언어를 감지해 영어로 정규화한 뒤 하이브리드 검색을 수행하고,
/// 검색 결과에서 답변을 조립합니다. 답변은 요청 언어로 번역됩니다.
async fn cmd_ask(query: &str, limit: usize, lang: Option<String>) -> Result<()> {
    if limit == 0 {
        bail!("-k 값은 1 이상이어야 합니다");
    }

    let (_registry, store, embedder) = open_stack().await?;
    let retriever = HybridRetriever::new(store, embedder);

    // 다국어 처리 (SARVAM_API_KEY가 있을 때만)
    let nlp = if has_sarvam_key() {
        Some(SarvamClient::from_env()?)
    } else {
        None
    };

    let explicit_lang = lang.is_some();
    let mut english_query = query.to_string();
    let mut answer_lang = lang.unwrap_or_else(|| "en".to_string());

    if let Some(ref nlp) = nlp {
        let detected = nlp
            .detect_language(query)
            .await
            .context("언어 감지 실패")?;

        if detected != "en" {
            tracing::debug!("Detected query language: {}", detected);
            english_query = nlp
                .translate(query, "en")
                .await
                .context("질문 번역 실패")?;
            // 명시적 --lang이 없으면 질문 언어로 답변
            if !explicit_lang {
                answer_lang = detected;
            }
        }
    }

    println!("[*] 검색 중: \"{}\"", query);

    let results = retriever
        .hybrid_search(&english_query, limit)
        .await
        .context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 문서에서 관련 정보를 찾을 수 없습니다. 다른 질문을 시도해 보세요.");
        return Ok(());
    }

    let generator = ResponseGenerator::new();
    let mut answer = generator.generate(&english_query, &results);

    // 답변 번역 (영어 외 요청 시)
    if answer_lang != "en" {
        if let Some(ref nlp) = nlp {
            answer.text = nlp
                .translate(&answer.text, &answer_lang)
                .await
                .context("답변 번역 실패")?;
        }
    }

    println!("\n[OK] 답변:\n");
    println!("{}", answer.text);
    println!();
    println!("    신뢰도: {:.1}%", answer.confidence.clamp(0.0, 1.0) * 100.0);
    if !answer.sources.is_empty() {
        println!("    출처: {}", answer.sources.join(", "));
    }

    Ok(())
}

/// 검색 명령어 (search)
///
/// 답변 생성 없이 검색 결과만 출력합니다.
async fn cmd_search(query: &str, limit: usize, mode: SearchMode) -> Result<()> {
    if limit == 0 {
        bail!("-k 값은 1 이상이어야 합니다");
    }

    let (_registry, store, embedder) = open_stack().await?;
    let retriever = HybridRetriever::new(store, embedder);

    println!("[*] 검색 중: \"{}\"", query);

    let results = match mode {
        SearchMode::Hybrid => retriever.hybrid_search(query, limit).await,
        SearchMode::Vector => retriever.similarity_search(query, limit).await,
        SearchMode::Keyword => retriever.keyword_search(query, limit).await,
    }
    .context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());
    print_results(&results);

    Ok(())
}

/// 검색 결과 출력
fn print_results(results: &[ScoredChunk]) {
    for (i, result) in results.iter().enumerate() {
        let source = metadata_source(&result.metadata).unwrap_or("-");

        println!("{}. [점수: {:.4}] {}", i + 1, result.score, source);
        println!("   내용: {}", truncate_text(&result.content, 200));
        println!();
    }
}

/// 목록 명령어 (list)
async fn cmd_list(limit: usize) -> Result<()> {
    let registry = DocumentRegistry::open_default().context("레지스트리 열기 실패")?;

    let docs = registry.list_documents(limit).context("문서 목록 조회 실패")?;

    if docs.is_empty() {
        println!("[!] 저장된 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 문서 ({} 건):\n", docs.len());

    for doc in docs {
        println!("  #{:<4} {}", doc.id, truncate_text(&doc.name, 50));
        println!("        출처: {}", doc.origin);
        println!(
            "        {} | 청크 {}개 | {} chars",
            doc.created_at.format("%Y-%m-%d %H:%M"),
            doc.chunk_count,
            doc.content_chars
        );
        println!();
    }

    Ok(())
}

/// 삭제 명령어 (delete)
///
/// 레지스트리와 청크 저장소에서 함께 삭제합니다.
async fn cmd_delete(id: Option<i64>, name: Option<String>) -> Result<()> {
    let (registry, store, embedder) = open_stack().await?;

    let doc_id = if let Some(id) = id {
        id
    } else if let Some(ref name) = name {
        registry
            .get_by_name(name)
            .context("문서 조회 실패")?
            .ok_or_else(|| anyhow::anyhow!("이름이 '{}'인 문서를 찾을 수 없습니다", name))?
            .id
    } else {
        bail!("--id 또는 --name 중 하나를 지정해야 합니다");
    };

    let processor = DocumentProcessor::new(registry, store, embedder);
    let deleted = processor
        .delete_document(doc_id)
        .await
        .context("문서 삭제 실패")?;

    if deleted {
        println!("[OK] 문서 #{} 삭제됨 (청크 포함)", doc_id);
    } else {
        println!("[!] ID {}인 문서를 찾을 수 없습니다", doc_id);
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status() -> Result<()> {
    println!("docqa-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    // 데이터 디렉토리
    let data_dir = get_data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    // 임베딩 서버 설정
    match OllamaEmbedding::from_env() {
        Ok(embedder) => {
            use crate::embedding::EmbeddingProvider;
            println!(
                "[*] 임베딩: {} at {} ({}차원)",
                embedder.name(),
                embedder.base_url(),
                embedder.dimension()
            );
        }
        Err(e) => {
            println!("[!] 임베딩 설정 오류: {}", e);
        }
    }

    // 번역 API 키 상태
    if has_sarvam_key() {
        println!("[OK] 번역 API 키: 설정됨");
    } else {
        println!("[!] 번역 API 키: 미설정 (영어 질문만 지원)");
        println!("    설정: export SARVAM_API_KEY=your-key");
    }

    // 레지스트리 통계
    match DocumentRegistry::open_default() {
        Ok(registry) => match registry.stats() {
            Ok(stats) => {
                println!("[OK] 저장된 문서: {} 건", stats.document_count);
                println!(
                    "     청크 {}개 | 총 {} chars",
                    stats.total_chunks, stats.total_content_chars
                );
            }
            Err(e) => {
                println!("[!] 통계 조회 실패: {}", e);
            }
        },
        Err(e) => {
            println!("[!] 레지스트리 열기 실패: {}", e);
        }
    }

    // 청크 저장소 상태
    match LanceChunkStore::open(&data_dir.join("chunks.lance")).await {
        Ok(store) => {
            use crate::knowledge::ChunkStore;
            match store.count().await {
                Ok(count) => println!("[OK] 청크 인덱스: {} 청크", count),
                Err(e) => tracing::debug!("청크 개수 조회 실패: {}", e),
            }
        }
        Err(e) => {
            tracing::debug!("청크 저장소 열기 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 한 줄 미리보기용 텍스트 자르기 (UTF-8 안전, 공백 정리)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");

    match flat.char_indices().nth(max_chars) {
        Some((byte_pos, _)) => format!("{}...", &flat[..byte_pos]),
        None => flat,
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 3] = ["B", "KB", "MB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

// ============================================================================
// Tests
// ============================================================================
