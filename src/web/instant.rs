//! DuckDuckGo Instant Answer API 백엔드
//!
//! ref: https://duckduckgo.com/api
//!
//! 우선순위: Abstract(직접 답변) → Answer(짧은 답변) → RelatedTopics

use async_trait::async_trait;
use serde_json::Value;

use super::{SearchBackend, WebResult};
use crate::error::SearchError;

const ENGINE: &str = "DuckDuckGo";

/// RelatedTopics 항목의 출처 표기
const TOPIC_ENGINE: &str = "Wikipedia";

/// Instant Answer API 백엔드
pub struct DuckDuckGoInstant {
    client: reqwest::Client,
    api_url: String,
}

impl DuckDuckGoInstant {
    pub fn new(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.to_string(),
        }
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoInstant {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>, SearchError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| SearchError::http(ENGINE, e))?;

        if !response.status().is_success() {
            return Err(SearchError::http(
                ENGINE,
                format!("HTTP {}", response.status()),
            ));
        }

        // 응답 Content-Type이 application/x-javascript일 수 있어 텍스트로 받아 파싱
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::http(ENGINE, e))?;
        let payload: Value =
            serde_json::from_str(&body).map_err(|e| SearchError::parse(ENGINE, e))?;

        Ok(parse_instant_answer(&payload, max_results))
    }

    fn name(&self) -> &str {
        ENGINE
    }
}

/// Instant Answer JSON → 결과 목록 (최대 `max_results`개)
pub fn parse_instant_answer(payload: &Value, max_results: usize) -> Vec<WebResult> {
    let mut results = Vec::new();
    if max_results == 0 {
        return results;
    }

    if let Some(abstract_text) = non_empty_str(payload, "Abstract") {
        results.push(WebResult {
            title: "Direct Answer".to_string(),
            snippet: abstract_text.to_string(),
            url: non_empty_str(payload, "AbstractURL").map(str::to_string),
            source_engine: ENGINE.to_string(),
        });
    }

    if results.len() < max_results {
        if let Some(answer) = non_empty_str(payload, "Answer") {
            results.push(WebResult {
                title: "Quick Answer".to_string(),
                snippet: answer.to_string(),
                url: non_empty_str(payload, "AnswerURL").map(str::to_string),
                source_engine: ENGINE.to_string(),
            });
        }
    }

    if let Some(topics) = payload.get("RelatedTopics").and_then(Value::as_array) {
        collect_topics(topics, max_results, &mut results);
    }

    results
}

/// RelatedTopics 수집 (중첩 그룹 `Topics`는 평탄화)
fn collect_topics(items: &[Value], max_results: usize, results: &mut Vec<WebResult>) {
    for item in items {
        if results.len() >= max_results {
            return;
        }

        if let Some(nested) = item.get("Topics").and_then(Value::as_array) {
            collect_topics(nested, max_results, results);
            continue;
        }

        let Some(text) = non_empty_str(item, "Text") else {
            continue;
        };
        let first_url = non_empty_str(item, "FirstURL");

        results.push(WebResult {
            title: first_url.map(title_from_url).unwrap_or_default(),
            snippet: text.to_string(),
            url: first_url.map(str::to_string),
            source_engine: TOPIC_ENGINE.to_string(),
        });
    }
}

/// `https://duckduckgo.com/Rust_(programming_language)` → `Rust (Programming Language)`
fn title_from_url(url: &str) -> String {
    let segment = url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    title_case(&segment.replace('_', " "))
}

/// 단어 첫 글자만 대문자 (영문자 뒤가 아닌 위치)
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_priority_order() {
        let payload = json!({
            "Abstract": "Rust is a general-purpose programming language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust_(programming_language)",
            "Answer": "Rust 1.0 was released in 2015",
            "AnswerURL": "",
            "RelatedTopics": [
                {"Text": "Cargo - the Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo_(software)"},
                {"Text": "Servo - browser engine", "FirstURL": "https://duckduckgo.com/Servo_(software)"}
            ]
        });

        let results = parse_instant_answer(&payload, 5);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].title, "Direct Answer");
        assert_eq!(results[0].source_engine, "DuckDuckGo");
        assert_eq!(results[1].title, "Quick Answer");
        assert_eq!(results[1].url, None);
        assert_eq!(results[2].title, "Cargo (Software)");
        assert_eq!(results[2].source_engine, "Wikipedia");
        assert_eq!(
            results[2].url.as_deref(),
            Some("https://duckduckgo.com/Cargo_(software)")
        );
    }

    #[test]
    fn test_max_results_respected() {
        let payload = json!({
            "Abstract": "A",
            "RelatedTopics": [
                {"Text": "one", "FirstURL": "https://duckduckgo.com/One"},
                {"Text": "two", "FirstURL": "https://duckduckgo.com/Two"},
                {"Text": "three", "FirstURL": "https://duckduckgo.com/Three"}
            ]
        });
        let results = parse_instant_answer(&payload, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].title, "One");
        assert!(parse_instant_answer(&payload, 0).is_empty());
    }

    #[test]
    fn test_nested_topics_and_entries_without_text() {
        let payload = json!({
            "Abstract": "",
            "RelatedTopics": [
                {"Name": "Software", "Topics": [
                    {"Text": "Tokio runtime", "FirstURL": "https://duckduckgo.com/Tokio_runtime"}
                ]},
                {"FirstURL": "https://duckduckgo.com/No_text"},
                {"Text": "Hyper http", "FirstURL": "https://duckduckgo.com/hyper_HTTP"}
            ]
        });
        let results = parse_instant_answer(&payload, 5);
        let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Tokio Runtime", "Hyper Http"]);
    }

    #[test]
    fn test_empty_payload() {
        assert!(parse_instant_answer(&json!({}), 5).is_empty());
        assert!(parse_instant_answer(&json!({"Answer": {"type": "calc"}}), 5).is_empty());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("rust (programming language)"), "Rust (Programming Language)");
        assert_eq!(title_case("HTTP/2"), "Http/2");
    }
}
