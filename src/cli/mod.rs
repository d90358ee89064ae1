//! CLI 모듈
//!
//! palank-qa CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::answer::{AnswerOrchestrator, ContextAssembler};
use crate::config::RagConfig;
use crate::embedding::{create_embedder, has_api_key};
use crate::extractor::extract_document;
use crate::knowledge::chunk_text;
use crate::llm::GroqProvider;
use crate::pipeline::{QaPipeline, SearchSources, StreamingAnswer};
use crate::session::{ConversationTurn, Session};
use crate::web::WebRetriever;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "palank-qa")]
#[command(version, about = "PDF + 웹 검색 기반 질의응답", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서와 웹을 근거로 질문에 답변
    Ask {
        /// 질문
        question: String,

        /// 근거로 사용할 문서 (PDF 또는 텍스트, 여러 번 지정 가능)
        #[arg(short, long = "doc")]
        docs: Vec<PathBuf>,

        /// 웹 검색 사용 안 함
        #[arg(long)]
        no_web: bool,

        /// 문서 검색 사용 안 함
        #[arg(long)]
        no_pdf: bool,

        /// 답변을 스트리밍으로 출력
        #[arg(short, long)]
        stream: bool,

        /// 생성 모델
        #[arg(short, long)]
        model: Option<String>,

        /// 생성 온도 (0.0 ~ 2.0)
        #[arg(long)]
        temperature: Option<f32>,

        /// 최대 생성 토큰 수
        #[arg(long)]
        max_tokens: Option<u32>,

        /// 결과를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 대화형 질의응답 (/clear, /stats, /history, /export, /model, /temp, /tokens, /quit)
    Chat {
        /// 시작할 때 수집할 문서
        #[arg(short, long = "doc")]
        docs: Vec<PathBuf>,

        /// 웹 검색 사용 안 함
        #[arg(long)]
        no_web: bool,

        /// 답변을 스트리밍으로 출력
        #[arg(short, long)]
        stream: bool,

        /// 생성 모델
        #[arg(short, long)]
        model: Option<String>,

        /// 생성 온도 (0.0 ~ 2.0)
        #[arg(long)]
        temperature: Option<f32>,

        /// 최대 생성 토큰 수
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// 답변 생성 없이 검색 결과만 확인
    Search {
        /// 검색 쿼리
        query: String,

        /// 함께 검색할 문서
        #[arg(short, long = "doc")]
        docs: Vec<PathBuf>,

        /// 소스별 결과 개수
        #[arg(short, long, default_value = "3")]
        limit: usize,

        /// 웹 검색 사용 안 함
        #[arg(long)]
        no_web: bool,
    },

    /// 문서를 청크로 나눈 결과 확인
    Chunk {
        /// 문서 경로
        file: PathBuf,

        /// 목표 청크 크기 (문자 수)
        #[arg(short, long)]
        size: Option<usize>,
    },

    /// 생성 모델 가용성 확인
    Models,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = RagConfig::from_env().context("설정 로드 실패")?;

    match cli.command {
        Commands::Ask {
            question,
            docs,
            no_web,
            no_pdf,
            stream,
            model,
            temperature,
            max_tokens,
            json,
        } => {
            apply_generation_overrides(&mut config, model, temperature, max_tokens);
            let sources = SearchSources {
                pdf: !no_pdf,
                web: !no_web,
            };
            cmd_ask(&config, &question, &docs, sources, stream, json).await
        }
        Commands::Chat {
            docs,
            no_web,
            stream,
            model,
            temperature,
            max_tokens,
        } => {
            apply_generation_overrides(&mut config, model, temperature, max_tokens);
            cmd_chat(&config, &docs, !no_web, stream).await
        }
        Commands::Search {
            query,
            docs,
            limit,
            no_web,
        } => cmd_search(&config, &query, &docs, limit, !no_web).await,
        Commands::Chunk { file, size } => {
            if let Some(size) = size {
                config.chunk.target_size = size;
            }
            cmd_chunk(&config, &file).await
        }
        Commands::Models => cmd_models(&config).await,
        Commands::Status => cmd_status(&config),
    }
}

// ============================================================================
// Setup
// ============================================================================

fn apply_generation_overrides(
    config: &mut RagConfig,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
) {
    if let Some(model) = model {
        config.generation.model = model;
    }
    if let Some(temperature) = temperature {
        config.generation.temperature = temperature;
    }
    if let Some(max_tokens) = max_tokens {
        config.generation.max_tokens = max_tokens;
    }
}

async fn build_session(config: &RagConfig) -> Result<Arc<Session>> {
    // 로컬 모델 로드는 다운로드를 포함하는 블로킹 작업
    let embedding = config.embedding.clone();
    let embedder = tokio::task::spawn_blocking(move || create_embedder(&embedding))
        .await
        .context("임베딩 초기화 작업 실패")?
        .context("임베딩 프로바이더 초기화 실패")?;
    Ok(Arc::new(Session::new(embedder, config)))
}

fn build_orchestrator(config: &RagConfig) -> Result<Arc<AnswerOrchestrator>> {
    let provider = GroqProvider::from_env(Duration::from_secs(config.generation.timeout_secs))?;
    Ok(Arc::new(AnswerOrchestrator::new(
        Arc::new(provider),
        &config.generation,
        ContextAssembler::new(&config.retrieval),
    )))
}

fn build_web(config: &RagConfig, enabled: bool) -> Result<Option<Arc<WebRetriever>>> {
    if !enabled {
        return Ok(None);
    }
    Ok(Some(Arc::new(WebRetriever::new(&config.web)?)))
}

async fn build_pipeline(config: &RagConfig, web_enabled: bool) -> Result<QaPipeline> {
    config.validate()?;
    let orchestrator = build_orchestrator(config)?;
    let session = build_session(config).await?;
    let web = build_web(config, web_enabled)?;
    Ok(QaPipeline::new(session, web, orchestrator, config.retrieval.clone()))
}

/// 문서 수집 결과 집계
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct IngestCounts {
    succeeded: usize,
    skipped: usize,
    failed: usize,
}

/// 문서 추출 후 세션에 수집
///
/// 실패한 문서는 경고만 출력하고 다음 문서로 넘어갑니다.
async fn ingest_paths(session: &Session, paths: &[PathBuf]) -> IngestCounts {
    let mut counts = IngestCounts::default();

    for (i, path) in paths.iter().enumerate() {
        print!("[{}/{}] {}... ", i + 1, paths.len(), path.display());
        std::io::stdout().flush().ok();

        let document = match extract_document(path).await {
            Ok(document) => document,
            Err(e) => {
                println!("[!] 추출 실패: {:#}", e);
                counts.failed += 1;
                continue;
            }
        };

        if document.likely_scanned {
            println!("텍스트 없음 (스캔본으로 보입니다. OCR 후 다시 시도하세요)");
            counts.skipped += 1;
            continue;
        }

        match session.ingest_document(&document.doc_id, &document.text).await {
            Ok(report) => {
                println!(
                    "{} 청크 ({})",
                    report.chunks_added,
                    format_bytes(document.text.len())
                );
                counts.succeeded += 1;
            }
            Err(e) => {
                println!("[!] 인덱싱 실패: {}", e);
                counts.failed += 1;
            }
        }
    }

    if counts.failed > 0 || counts.skipped > 0 {
        println!(
            "[*] 수집: 성공 {}, 건너뜀 {}, 실패 {}",
            counts.succeeded, counts.skipped, counts.failed
        );
    }
    counts
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 질문 명령어 (ask)
async fn cmd_ask(
    config: &RagConfig,
    question: &str,
    docs: &[PathBuf],
    sources: SearchSources,
    stream: bool,
    json: bool,
) -> Result<()> {
    if question.trim().is_empty() {
        bail!("질문이 비어 있습니다");
    }

    let pipeline = build_pipeline(config, sources.web).await?;
    if sources.pdf {
        ingest_paths(pipeline.session(), docs).await;
    }

    let turn = if stream && !json {
        stream_turn(&pipeline, question, sources).await?
    } else {
        pipeline.ask(question, sources).await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&turn)?);
    } else {
        if !stream {
            println!("\n{}", turn.answer);
        }
        print_sources(&turn);
    }

    Ok(())
}

/// 대화형 명령어 (chat)
async fn cmd_chat(config: &RagConfig, docs: &[PathBuf], web: bool, stream: bool) -> Result<()> {
    let pipeline = build_pipeline(config, web).await?;
    ingest_paths(pipeline.session(), docs).await;

    let sources = SearchSources { pdf: true, web };
    let orchestrator = pipeline.orchestrator();
    println!(
        "[*] 모델: {} | temperature {} | max_tokens {}",
        orchestrator.active_model(),
        orchestrator.temperature(),
        orchestrator.max_tokens()
    );
    println!("    명령: /clear /stats /history /export /model <name> /temp <t> /tokens <n> /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("입력 읽기 실패")? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.split_once(' ').map_or((input, ""), |(c, a)| (c, a.trim())) {
            ("/quit" | "/exit", _) => break,
            ("/clear", _) => {
                pipeline.session().reset();
                println!("[OK] 문서와 대화 기록을 모두 삭제했습니다");
            }
            ("/stats", _) => {
                let stats = pipeline.session().stats();
                println!("[*] 세션: {}", stats.session_id);
                println!(
                    "    문서: {} | 청크: {} | 대화: {}",
                    stats.documents, stats.index.total_chunks, stats.turns
                );
                println!("    임베딩: {}", stats.index.provider);
            }
            ("/history", _) => {
                for (i, turn) in pipeline.session().history().iter().enumerate() {
                    println!(
                        "{}. [{}] {}",
                        i + 1,
                        turn.timestamp.format("%H:%M:%S"),
                        truncate_text(&turn.question, 60)
                    );
                    println!("   {}", truncate_text(&turn.answer, 120));
                }
            }
            ("/export", _) => print!("{}", pipeline.session().export_jsonl()?),
            ("/model", "") => println!("[*] 현재 모델: {}", orchestrator.active_model()),
            ("/model", name) => {
                if orchestrator.set_model(name).await {
                    println!("[OK] 모델 변경: {}", name);
                } else {
                    println!("[!] 사용할 수 없는 모델: {}", name);
                }
            }
            ("/temp", value) => match value.parse::<f32>() {
                Ok(t) => match orchestrator.set_temperature(t) {
                    Ok(()) => println!("[OK] temperature: {}", t),
                    Err(e) => println!("[!] {}", e),
                },
                Err(_) => println!("[*] 현재 temperature: {}", orchestrator.temperature()),
            },
            ("/tokens", value) => match value.parse::<u32>() {
                Ok(n) => match orchestrator.set_max_tokens(n) {
                    Ok(()) => println!("[OK] max_tokens: {}", n),
                    Err(e) => println!("[!] {}", e),
                },
                Err(_) => println!("[*] 현재 max_tokens: {}", orchestrator.max_tokens()),
            },
            _ => {
                let turn = if stream {
                    stream_turn(&pipeline, input, sources).await?
                } else {
                    let turn = pipeline.ask(input, sources).await;
                    println!("\n{}", turn.answer);
                    turn
                };
                print_sources(&turn);
            }
        }
    }

    Ok(())
}

/// 스트리밍 출력 후 턴 기록
async fn stream_turn(
    pipeline: &QaPipeline,
    question: &str,
    sources: SearchSources,
) -> Result<ConversationTurn> {
    let StreamingAnswer {
        mut fragments,
        recorder,
    } = pipeline.ask_stream(question, sources).await;

    println!();
    let mut answer = String::new();
    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next().await {
        print!("{}", fragment);
        stdout.flush().ok();
        answer.push_str(&fragment);
    }
    println!();

    Ok(recorder.finish(answer))
}

/// 검색 명령어 (search)
async fn cmd_search(
    config: &RagConfig,
    query: &str,
    docs: &[PathBuf],
    limit: usize,
    web: bool,
) -> Result<()> {
    let session = build_session(config).await?;
    ingest_paths(&session, docs).await;
    let retriever = build_web(config, web)?;

    println!("[*] 검색 중: \"{}\"", query);

    let pdf_search = session.index().search(query, limit);
    let web_search = async {
        match &retriever {
            Some(r) => r.search_multiple_sources(query, limit).await,
            None => Vec::new(),
        }
    };
    let (pdf_hits, web_hits) = tokio::join!(pdf_search, web_search);
    let pdf_hits = pdf_hits.context("문서 검색 실패")?;

    if pdf_hits.is_empty() && web_hits.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    if !pdf_hits.is_empty() {
        println!("\n[OK] 문서 결과 ({} 건):\n", pdf_hits.len());
        for (i, hit) in pdf_hits.iter().enumerate() {
            println!(
                "{}. [점수: {:.4}] {} #{}",
                i + 1,
                hit.score,
                hit.source_doc_id,
                hit.ordinal
            );
            println!("   내용: {}", truncate_text(&hit.text, 200));
        }
    }

    if !web_hits.is_empty() {
        println!("\n[OK] 웹 결과 ({} 건):\n", web_hits.len());
        for (i, result) in web_hits.iter().enumerate() {
            println!("{}. [{}] {}", i + 1, result.source_engine, result.title);
            if let Some(url) = &result.url {
                println!("   URL: {}", url);
            }
            println!("   스니펫: {}", truncate_text(&result.snippet, 200));
        }
    }

    Ok(())
}

/// 청크 명령어 (chunk)
async fn cmd_chunk(config: &RagConfig, file: &Path) -> Result<()> {
    let document = extract_document(file).await?;
    let chunks = chunk_text(&document.text, config.chunk.target_size);

    println!(
        "[OK] {}: {} 청크 (목표 {} 자)\n",
        document.doc_id,
        chunks.len(),
        config.chunk.target_size
    );
    for (i, chunk) in chunks.iter().enumerate() {
        println!("#{:<3} ({} 자) {}", i, chunk.chars().count(), truncate_text(chunk, 100));
    }

    Ok(())
}

/// 모델 확인 명령어 (models)
async fn cmd_models(config: &RagConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    println!("[*] 모델 가용성 확인 중 ({})...", orchestrator.provider_name());

    for status in orchestrator.probe_models().await {
        let mark = if status.available { "[OK]" } else { "[!] " };
        let active = if status.active { " (현재)" } else { "" };
        println!("{} {}{}", mark, status.model, active);
    }

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config: &RagConfig) -> Result<()> {
    println!("palank-qa v{}", env!("CARGO_PKG_VERSION"));
    println!();

    if crate::config::env_value("GROQ_API_KEY").is_some() {
        println!("[OK] GROQ_API_KEY: 설정됨");
    } else {
        println!("[!] GROQ_API_KEY: 미설정");
        println!("    설정: export GROQ_API_KEY=your-key");
    }

    if has_api_key() {
        println!("[OK] Gemini 임베딩 키: 설정됨");
    } else {
        println!(
            "[*] Gemini 임베딩 키: 미설정 (로컬 모델 사용: {})",
            config.embedding.local_model
        );
    }

    println!();
    println!(
        "[*] 모델: {} (대체: {})",
        config.generation.model,
        config.generation.fallback_models.join(", ")
    );
    println!(
        "    temperature {} | max_tokens {}",
        config.generation.temperature, config.generation.max_tokens
    );
    println!(
        "[*] 청크 크기: {} | 유사도 임계값: {}",
        config.chunk.target_size, config.retrieval.similarity_threshold
    );
    println!(
        "[*] 컨텍스트: PDF {} + 웹 {} | 발췌 {} 자 | 전체 {} 자",
        config.retrieval.pdf_results,
        config.retrieval.web_results,
        config.retrieval.max_excerpt_chars,
        config.retrieval.max_context_chars
    );

    if let Err(e) = config.validate() {
        println!("[!] 설정 오류: {}", e);
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_sources(turn: &ConversationTurn) {
    if turn.pdf_sources.is_empty() && turn.web_sources.is_empty() {
        println!("\n[*] 출처 없음 (일반 지식 기반 답변) | 모델: {}", turn.model);
        return;
    }

    println!("\n[*] 출처 | 모델: {}", turn.model);
    for (i, text) in turn.pdf_sources.iter().enumerate() {
        println!("  PDF {}: {}", i + 1, truncate_text(text, 80));
    }
    for (i, result) in turn.web_sources.iter().enumerate() {
        match &result.url {
            Some(url) => println!("  Web {}: {} ({})", i + 1, result.title, url),
            None => println!("  Web {}: {}", i + 1, result.title),
        }
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
