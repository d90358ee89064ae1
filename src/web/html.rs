//! DuckDuckGo HTML 결과 페이지 백엔드 (폴백)
//!
//! `div.result` 블록에서 제목 링크(`a.result__a`)와 스니펫(`.result__snippet`)을 추출합니다.
//! 둘 중 하나라도 없는 블록은 건너뜁니다.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{SearchBackend, WebResult};
use crate::error::SearchError;
use crate::knowledge::normalize_whitespace;

const ENGINE: &str = "Web Search";

const DDG_BASE: &str = "https://duckduckgo.com/";

/// HTML 결과 페이지 백엔드
pub struct DuckDuckGoHtml {
    client: reqwest::Client,
    html_url: String,
}

impl DuckDuckGoHtml {
    pub fn new(client: reqwest::Client, html_url: &str) -> Self {
        Self {
            client,
            html_url: html_url.to_string(),
        }
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoHtml {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>, SearchError> {
        let response = self
            .client
            .get(&self.html_url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| SearchError::http(ENGINE, e))?;

        if !response.status().is_success() {
            return Err(SearchError::http(
                ENGINE,
                format!("HTTP {}", response.status()),
            ));
        }

        let html = response
            .text()
            .await
            .map_err(|e| SearchError::http(ENGINE, e))?;

        Ok(parse_html_results(&html, max_results))
    }

    fn name(&self) -> &str {
        ENGINE
    }
}

/// 결과 페이지 HTML → 결과 목록 (최대 `max_results`개)
pub fn parse_html_results(html: &str, max_results: usize) -> Vec<WebResult> {
    let (Ok(result_sel), Ok(title_sel), Ok(snippet_sel)) = (
        Selector::parse("div.result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return vec![];
    };

    let document = Html::parse_document(html);
    let mut results = Vec::new();

    for block in document.select(&result_sel) {
        if results.len() >= max_results {
            break;
        }

        let (Some(title_el), Some(snippet_el)) = (
            block.select(&title_sel).next(),
            block.select(&snippet_sel).next(),
        ) else {
            continue;
        };

        let title = element_text(&title_el);
        let snippet = element_text(&snippet_el);
        if title.is_empty() || snippet.is_empty() {
            continue;
        }

        results.push(WebResult {
            title,
            snippet,
            url: title_el.value().attr("href").and_then(normalize_result_url),
            source_engine: ENGINE.to_string(),
        });
    }

    results
}

/// 결과 링크 정규화
///
/// - 프로토콜 상대 링크(`//example.com`) → `https://example.com`
/// - DuckDuckGo 리다이렉트(`/l/?uddg=<encoded>`) → 실제 대상 URL
/// - 빈 값 / 파싱 불가 → `None`
pub fn normalize_result_url(href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let base = Url::parse(DDG_BASE).ok()?;
    let url = base.join(href).ok()?;

    let is_redirect = url
        .host_str()
        .map(|h| h.ends_with("duckduckgo.com"))
        .unwrap_or(false)
        && url.path().starts_with("/l/");

    if is_redirect {
        if let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "uddg") {
            return Some(target.into_owned());
        }
    }

    Some(url.to_string())
}

/// 요소 텍스트 (공백 정리)
fn element_text(element: &ElementRef) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_PAGE: &str = r##"
        <html><body>
          <div class="results">
            <div class="result results_links web-result">
              <h2 class="result__title">
                <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2Flearn&amp;rut=abc">
                  Learn <b>Rust</b>
                </a>
              </h2>
              <a class="result__snippet" href="#">The <b>Rust</b> book and   other resources.</a>
            </div>
            <div class="result results_links web-result">
              <a class="result__a" href="https://doc.rust-lang.org/std/">std - Rust</a>
              <div class="result__snippet">The Rust Standard Library.</div>
            </div>
            <div class="result">
              <a class="result__a" href="https://example.com/no-snippet">No snippet here</a>
            </div>
            <div class="result">
              <a class="result__a" href="">Empty link</a>
              <a class="result__snippet">Snippet without url.</a>
            </div>
          </div>
        </body></html>
    "##;

    #[test]
    fn test_parse_results() {
        let results = parse_html_results(RESULTS_PAGE, 10);
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].title, "Learn Rust");
        assert_eq!(results[0].snippet, "The Rust book and other resources.");
        assert_eq!(results[0].url.as_deref(), Some("https://www.rust-lang.org/learn"));
        assert_eq!(results[0].source_engine, "Web Search");

        assert_eq!(results[1].title, "std - Rust");
        assert_eq!(results[1].url.as_deref(), Some("https://doc.rust-lang.org/std/"));

        assert_eq!(results[2].title, "Empty link");
        assert_eq!(results[2].url, None);
    }

    #[test]
    fn test_parse_respects_max() {
        assert_eq!(parse_html_results(RESULTS_PAGE, 1).len(), 1);
        assert!(parse_html_results(RESULTS_PAGE, 0).is_empty());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_html_results("not html at all", 5).is_empty());
    }

    #[test]
    fn test_normalize_result_url() {
        assert_eq!(
            normalize_result_url("//example.com/page").as_deref(),
            Some("https://example.com/page")
        );
        assert_eq!(
            normalize_result_url("/l/?uddg=https%3A%2F%2Fexample.org%2Fa%3Fb%3Dc").as_deref(),
            Some("https://example.org/a?b=c")
        );
        assert_eq!(
            normalize_result_url("https://example.net/x").as_deref(),
            Some("https://example.net/x")
        );
        assert_eq!(normalize_result_url("   "), None);
    }
}
