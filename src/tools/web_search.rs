//! Web 检索工具
//!
//! 包装 SearchProvider，把检索结果作为结构化来源返回给编排层登记引用；
//! 文本部分按本地编号渲染，编排层登记全局编号后会用全局编号重新渲染观察。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::search::{SearchProvider, SearchResultFormatter};
use crate::tools::{Tool, ToolOutput};

pub const WEB_SEARCH_TOOL_NAME: &str = "web_search";

/// Web 检索工具
pub struct WebSearchTool {
    provider: Arc<dyn SearchProvider>,
    formatter: SearchResultFormatter,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>, max_content_chars: usize) -> Self {
        Self {
            provider,
            formatter: SearchResultFormatter::new(max_content_chars),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "搜索互联网获取实时信息。当需要了解最新事件、实时数据、当前新闻或验证信息时使用此工具。\
         输入应该是一个清晰、具体的搜索查询。\
         例如: '2024年人工智能最新进展', 'OpenAI GPT-4 Turbo 发布时间'"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "搜索查询关键词。应该具体、清晰、针对性强，以获取最相关的信息。"
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: Value) -> Result<ToolOutput, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }

        tracing::info!(query = %query, "web_search tool");
        let response = self
            .provider
            .search(query)
            .await
            .map_err(|e| format!("搜索失败: {}。请尝试重新搜索或基于已有知识回答。", e))?;

        if response.is_empty() {
            return Ok(ToolOutput::text(self.formatter.format_no_results()));
        }

        let text = self.formatter.format_for_model(&response.results, 1);
        Ok(ToolOutput::with_sources(text, response.results))
    }
}
