//! 웹 검색 모듈 - 구조화 API 우선, HTML 결과 페이지 폴백
//!
//! 1. DuckDuckGo instant answer API (Abstract → Answer → RelatedTopics)
//! 2. 결과가 0건이거나 실패하면 DuckDuckGo HTML 결과 페이지 파싱
//! 3. 추가 백엔드 결과와 합친 뒤 제목(대소문자 무시) 기준 중복 제거
//!
//! 검색 실패는 호출 측에 에러로 전파되지 않고 "결과 감소"로 처리됩니다.

mod html;
mod instant;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::WebSearchConfig;
use crate::error::SearchError;

pub use html::{normalize_result_url, parse_html_results, DuckDuckGoHtml};
pub use instant::{parse_instant_answer, DuckDuckGoInstant};

// ============================================================================
// Types
// ============================================================================

/// 웹 검색 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub snippet: String,
    pub url: Option<String>,
    /// 결과를 만든 엔진 (DuckDuckGo, Wikipedia, Web Search ...)
    pub source_engine: String,
}

/// 검색 백엔드 트레이트
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// 최대 `max_results`개 결과 검색
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<WebResult>, SearchError>;

    /// 백엔드 이름 (로그용)
    fn name(&self) -> &str;
}

// ============================================================================
// WebRetriever
// ============================================================================

/// 웹 검색기
pub struct WebRetriever {
    primary: Arc<dyn SearchBackend>,
    fallback: Option<Arc<dyn SearchBackend>>,
    extra: Vec<Arc<dyn SearchBackend>>,
}

impl WebRetriever {
    /// DuckDuckGo API + HTML 폴백으로 생성
    pub fn new(config: &WebSearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create web search HTTP client")?;

        Ok(Self::with_backends(
            Arc::new(DuckDuckGoInstant::new(client.clone(), &config.api_url)),
            Some(Arc::new(DuckDuckGoHtml::new(client, &config.html_url))),
        ))
    }

    /// 백엔드를 직접 지정하여 생성
    pub fn with_backends(
        primary: Arc<dyn SearchBackend>,
        fallback: Option<Arc<dyn SearchBackend>>,
    ) -> Self {
        Self {
            primary,
            fallback,
            extra: Vec::new(),
        }
    }

    /// 추가 백엔드 등록 (`search_multiple_sources`에서 사용)
    pub fn add_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.extra.push(backend);
        self
    }

    /// 기본 검색 (API → HTML 폴백), 중복 제거 후 최대 `max_results`개
    pub async fn search(&self, query: &str, max_results: usize) -> Vec<WebResult> {
        if query.trim().is_empty() || max_results == 0 {
            return vec![];
        }

        let mut results = dedup_by_title(self.search_with_fallback(query, max_results).await);
        results.truncate(max_results);
        results
    }

    /// 기본 검색 + 추가 백엔드 결과 통합
    ///
    /// 순서대로 합친 뒤 제목 기준 첫 항목만 남깁니다.
    pub async fn search_multiple_sources(&self, query: &str, max_results: usize) -> Vec<WebResult> {
        if query.trim().is_empty() || max_results == 0 {
            return vec![];
        }

        let mut combined = self.search_with_fallback(query, max_results).await;

        for backend in &self.extra {
            if dedup_by_title(combined.clone()).len() >= max_results {
                break;
            }
            match backend.search(query, max_results).await {
                Ok(results) => combined.extend(results),
                Err(e) => tracing::warn!("{} search failed: {}", backend.name(), e),
            }
        }

        let mut results = dedup_by_title(combined);
        results.truncate(max_results);
        tracing::debug!("Web search returned {} results for {:?}", results.len(), query);
        results
    }

    /// 1차 백엔드 → (0건 또는 실패 시) 폴백
    async fn search_with_fallback(&self, query: &str, max_results: usize) -> Vec<WebResult> {
        match self.primary.search(query, max_results).await {
            Ok(results) if !results.is_empty() => return results,
            Ok(_) => tracing::debug!("{} returned no results", self.primary.name()),
            Err(e) => tracing::warn!(
                "{} search failed: {}. Trying alternative method...",
                self.primary.name(),
                e
            ),
        }

        let Some(fallback) = &self.fallback else {
            return vec![];
        };

        match fallback.search(query, max_results).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!("{} search failed: {}", fallback.name(), e);
                vec![]
            }
        }
    }
}

/// 제목(소문자, 앞뒤 공백 제거) 기준 중복 제거. 먼저 나온 항목 유지.
pub fn dedup_by_title(results: Vec<WebResult>) -> Vec<WebResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.title.trim().to_lowercase()))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn result(title: &str, engine: &str) -> WebResult {
        WebResult {
            title: title.to_string(),
            snippet: format!("About {}", title),
            url: Some(format!("https://example.com/{}", title.replace(' ', "-"))),
            source_engine: engine.to_string(),
        }
    }

    /// 고정 응답 백엔드
    struct StaticBackend {
        name: &'static str,
        outcome: std::result::Result<Vec<WebResult>, &'static str>,
        calls: AtomicUsize,
    }

    impl StaticBackend {
        fn ok(name: &'static str, results: Vec<WebResult>) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome: Ok(results),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome: Err("connection reset"),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchBackend for StaticBackend {
        async fn search(
            &self,
            _query: &str,
            max_results: usize,
        ) -> Result<Vec<WebResult>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Ok(results) => Ok(results.iter().take(max_results).cloned().collect()),
                Err(message) => Err(SearchError::http(self.name, message)),
            }
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    #[test]
    fn test_dedup_case_insensitive_first_wins() {
        let results = vec![
            result("Rust Language", "DuckDuckGo"),
            result("rust language", "Web Search"),
            result("Cargo", "Web Search"),
            result("  RUST LANGUAGE ", "Wikipedia"),
        ];
        let unique = dedup_by_title(results);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].source_engine, "DuckDuckGo");
        assert_eq!(unique[1].title, "Cargo");
    }

    #[tokio::test]
    async fn test_primary_results_skip_fallback() {
        let primary = StaticBackend::ok("api", vec![result("Direct Answer", "DuckDuckGo")]);
        let fallback = StaticBackend::ok("html", vec![result("Other", "Web Search")]);
        let retriever = WebRetriever::with_backends(primary.clone(), Some(fallback.clone()));

        let results = retriever.search("rust", 5).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Direct Answer");
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_primary_triggers_fallback() {
        let primary = StaticBackend::ok("api", vec![]);
        let fallback = StaticBackend::ok("html", vec![result("From HTML", "Web Search")]);
        let retriever = WebRetriever::with_backends(primary.clone(), Some(fallback.clone()));

        let results = retriever.search("rust", 5).await;
        assert_eq!(results[0].title, "From HTML");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_primary_triggers_fallback() {
        let fallback = StaticBackend::ok("html", vec![result("Recovered", "Web Search")]);
        let retriever =
            WebRetriever::with_backends(StaticBackend::failing("api"), Some(fallback.clone()));

        let results = retriever.search("rust", 3).await;
        assert_eq!(results.len(), 1);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_both_failing_yields_empty() {
        let retriever = WebRetriever::with_backends(
            StaticBackend::failing("api"),
            Some(StaticBackend::failing("html")),
        );
        assert!(retriever.search("rust", 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_sources_dedup_and_truncate() {
        let primary = StaticBackend::ok(
            "api",
            vec![result("Ownership", "DuckDuckGo"), result("Borrowing", "Wikipedia")],
        );
        let extra = StaticBackend::ok(
            "extra",
            vec![
                result("ownership", "Web Search"),
                result("Lifetimes", "Web Search"),
                result("Traits", "Web Search"),
            ],
        );
        let retriever = WebRetriever::with_backends(primary, None).add_backend(extra);

        let results = retriever.search_multiple_sources("rust", 3).await;
        let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Ownership", "Borrowing", "Lifetimes"]);
    }

    #[tokio::test]
    async fn test_extra_backend_skipped_when_full() {
        let primary = StaticBackend::ok("api", vec![result("A", "x"), result("B", "x")]);
        let extra = StaticBackend::ok("extra", vec![result("C", "y")]);
        let retriever = WebRetriever::with_backends(primary, None).add_backend(extra.clone());

        let results = retriever.search_multiple_sources("q", 2).await;
        assert_eq!(results.len(), 2);
        assert_eq!(extra.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_query_makes_no_calls() {
        let primary = StaticBackend::ok("api", vec![result("A", "x")]);
        let retriever = WebRetriever::with_backends(primary.clone(), None);
        assert!(retriever.search("   ", 3).await.is_empty());
        assert!(retriever.search_multiple_sources("q", 0).await.is_empty());
        assert_eq!(primary.calls(), 0);
    }
}
