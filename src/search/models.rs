//! 检索结果数据模型

use serde::{Deserialize, Serialize};

/// 单条检索结果
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl SearchResult {
    pub fn new(title: impl Into<String>, url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            engine: None,
            score: None,
        }
    }
}

/// 一次检索的完整响应
#[derive(Clone, Debug)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    /// 检索耗时（秒）
    pub search_time: f64,
}

impl SearchResponse {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// 从 URL 中提取 host（不含端口与路径），失败时原样返回
pub fn extract_domain(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));
    match without_scheme {
        Some(rest) => rest
            .split('/')
            .next()
            .and_then(|host| host.split(':').next())
            .map(|host| host.to_lowercase())
            .unwrap_or_else(|| trimmed.to_string()),
        None => trimmed.to_string(),
    }
}
