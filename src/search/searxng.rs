//! SearXNG 检索客户端
//!
//! GET {base_url}/search?q=...&format=json；带超时与结果条数上限。
//! 本地部署的 SearXNG 需在 settings.yml 的 formats 中启用 json。

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Instant;

use crate::search::{SearchResponse, SearchResult};

/// 检索后端抽象：工具层只依赖这一契约，测试用假实现注入
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResponse, String>;
}

/// SearXNG JSON API 的响应片段
#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    results: Vec<RawResult>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    engine: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

/// SearXNG 客户端
pub struct SearxngClient {
    client: Client,
    search_url: String,
    max_results: usize,
}

impl SearxngClient {
    pub fn new(base_url: &str, timeout_secs: u64, max_results: usize) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            search_url: format!("{}/search", base_url.trim_end_matches('/')),
            max_results,
        }
    }
}

#[async_trait]
impl SearchProvider for SearxngClient {
    async fn search(&self, query: &str) -> Result<SearchResponse, String> {
        let query = query.trim();
        if query.is_empty() {
            return Err("Empty search query".to_string());
        }

        tracing::info!(query = %query, "searxng search");
        let started = Instant::now();
        let resp = self
            .client
            .get(&self.search_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("language", "auto"),
                ("safesearch", "1"),
            ])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }

        let raw: RawResponse = resp
            .json()
            .await
            .map_err(|e| format!("Invalid JSON response: {}", e))?;

        let results: Vec<SearchResult> = raw
            .results
            .into_iter()
            .take(self.max_results)
            .filter(|r| !r.url.is_empty())
            .map(|r| SearchResult {
                title: if r.title.is_empty() {
                    "No title".to_string()
                } else {
                    r.title
                },
                url: r.url,
                content: r.content,
                engine: r.engine,
                score: r.score,
            })
            .collect();

        let total_results = results.len();
        Ok(SearchResponse {
            query: query.to_string(),
            results,
            total_results,
            search_time: started.elapsed().as_secs_f64(),
        })
    }
}
