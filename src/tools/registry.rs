//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / call），
//! 由 ToolRegistry 按名注册与查找；ToolInvoker 在调用时加超时并归一化结果。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolSpec;
use crate::search::SearchResult;

/// 工具执行成功的产出：文本 + 可引用来源（检索类工具填充，其余留空）
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub text: String,
    pub sources: Vec<SearchResult>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
        }
    }

    pub fn with_sources(text: impl Into<String>, sources: Vec<SearchResult>) -> Self {
        Self {
            text: text.into(),
            sources,
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型调用时使用）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    /// 默认返回空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；Err 表示工具级失败（由调用适配器转为 is_error 观察，不中断运行）
    async fn call(&self, args: Value) -> Result<ToolOutput, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 生成绑定给 function-call 模型的工具描述列表
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopTool;

    #[async_trait]
    impl Tool for NoopTool {
        fn name(&self) -> &str {
            "noop"
        }

        fn description(&self) -> &str {
            "does nothing"
        }

        async fn call(&self, _args: Value) -> Result<ToolOutput, String> {
            Ok(ToolOutput::text("ok"))
        }
    }

    #[test]
    fn test_register_and_specs() {
        let mut registry = ToolRegistry::new();
        registry.register(NoopTool);
        assert_eq!(registry.tool_names(), vec!["noop".to_string()]);
        let specs = registry.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "noop");
        assert_eq!(specs[0].parameters["type"], "object");
    }
}
