//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：complete（非流式）、
//! complete_stream（流式 chunk，区分 reasoning/answer）、complete_with_tools
//! （绑定工具后返回内容或工具调用意图）。编排层只依赖这一契约，
//! 各家 API 的消息形状差异全部收敛在具体实现里。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 消息角色（与 LLM API 一致；Tool 为工具结果回填）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 单条消息；assistant 消息可携带工具调用意图，tool 消息通过 tool_call_id 关联
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// 携带工具调用意图的 assistant 消息（content 为伴随的推理文本，可为空）
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCallIntent>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// 工具结果消息，回填给下一轮 function-call 模型
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// 提供给模型的工具描述（名称 + 说明 + JSON Schema 参数）
#[derive(Clone, Debug, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// 模型发出的工具调用意图；arguments 已归一化为 JSON 对象
/// （各家 SDK 的字符串/字典/对象三种形态由客户端实现负责解析）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallIntent {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// 一次 function-call 模型调用的归一化结果
#[derive(Clone, Debug, Default)]
pub struct ModelTurn {
    /// 模型输出的文本（单模型模式下可能是最终回答，双模型模式下仅是推理）
    pub content: String,
    /// 工具调用意图；非空时优先于 content
    pub tool_calls: Vec<ToolCallIntent>,
}

impl ModelTurn {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// 流式 chunk 的内容类型：推理过程或回答正文
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkKind {
    Reasoning,
    Answer,
}

/// 流式输出的一小段
#[derive(Clone, Debug)]
pub struct StreamChunk {
    pub text: String,
    pub kind: ChunkKind,
}

impl StreamChunk {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: ChunkKind::Answer,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: ChunkKind::Reasoning,
        }
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

/// LLM 调用错误；is_transient 决定重试装饰器是否重试
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited (retry after {retry_after_ms}ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// 限流与网络类错误可重试；响应格式错误与其余 API 错误不可
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. } | LlmError::Network(_))
    }
}

/// LLM 客户端 trait：非流式完成、流式完成与工具绑定完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 流式完成，返回 chunk 流（reasoning/answer 已区分）
    async fn complete_stream(&self, messages: &[Message]) -> Result<ChunkStream, LlmError>;

    /// 绑定工具后完成一轮：返回内容或工具调用意图
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ModelTurn, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::RateLimited { retry_after_ms: 500 }.is_transient());
        assert!(LlmError::Network("connection reset".to_string()).is_transient());
        assert!(!LlmError::ApiError("invalid model".to_string()).is_transient());
        assert!(!LlmError::InvalidResponse("empty choices".to_string()).is_transient());
    }

    #[test]
    fn test_tool_message_carries_call_id() {
        let msg = Message::tool("call_1", "observation");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }
}
