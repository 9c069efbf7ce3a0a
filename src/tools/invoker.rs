//! 工具调用适配器
//!
//! 持有 ToolRegistry 与全局超时，把一次调用归一化为 ToolResult：
//! 未知工具、工具报错、超时全部编码为 is_error 文本，绝不向上抛出，
//! 让编排循环把失败作为观察回给模型继续推理。每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::llm::ToolSpec;
use crate::search::SearchResult;
use crate::tools::ToolRegistry;

/// 归一化后的工具调用结果
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub text: String,
    pub is_error: bool,
    pub sources: Vec<SearchResult>,
}

impl ToolResult {
    fn ok(text: String, sources: Vec<SearchResult>) -> Self {
        Self {
            text,
            is_error: false,
            sources,
        }
    }

    fn error(text: String) -> Self {
        Self {
            text,
            is_error: true,
            sources: Vec::new(),
        }
    }
}

/// 工具调用适配器：对每次调用施加超时，并把所有工具级失败编码进结果
pub struct ToolInvoker {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolInvoker {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具；超时与失败都以 is_error 观察返回，输出 JSON 审计日志
    pub async fn invoke(&self, tool_name: &str, args: serde_json::Value) -> ToolResult {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let result = match self.registry.get(tool_name) {
            Some(tool) => match timeout(self.timeout, tool.call(args)).await {
                Ok(Ok(output)) => ToolResult::ok(output.text, output.sources),
                Ok(Err(e)) => ToolResult::error(format!("工具执行失败: {}", e)),
                Err(_) => ToolResult::error(format!(
                    "工具 {} 执行超时（{}秒），请换一种方式继续。",
                    tool_name,
                    self.timeout.as_secs()
                )),
            },
            None => ToolResult::error(format!(
                "未知工具: {}。可用工具: {}",
                tool_name,
                self.registry.tool_names().join(", ")
            )),
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": !result.is_error,
            "sources": result.sources.len(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
