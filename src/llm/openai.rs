//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 工具绑定、字符串形式的 arguments 解析、`<think>` 推理段切分等各家差异都在这里归一化，
//! 编排层只看到 LlmClient 契约。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::llm::{
    ChunkStream, LlmClient, LlmError, Message, ModelTurn, Role, StreamChunk, ToolCallIntent,
    ToolSpec,
};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// 将 `<think>...</think>` 段切分为 reasoning chunk，其余为 answer chunk。
/// in_think 跨 delta 保持，reasoner 类模型的标签通常独立成段到达。
#[derive(Debug, Default)]
pub struct ThinkTagSplitter {
    in_think: bool,
}

impl ThinkTagSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        let mut rest = text;
        loop {
            if self.in_think {
                match rest.find("</think>") {
                    Some(pos) => {
                        if pos > 0 {
                            chunks.push(StreamChunk::reasoning(&rest[..pos]));
                        }
                        self.in_think = false;
                        rest = &rest[pos + "</think>".len()..];
                    }
                    None => {
                        if !rest.is_empty() {
                            chunks.push(StreamChunk::reasoning(rest));
                        }
                        return chunks;
                    }
                }
            } else {
                match rest.find("<think>") {
                    Some(pos) => {
                        if pos > 0 {
                            chunks.push(StreamChunk::answer(&rest[..pos]));
                        }
                        self.in_think = true;
                        rest = &rest[pos + "<think>".len()..];
                    }
                    None => {
                        if !rest.is_empty() {
                            chunks.push(StreamChunk::answer(rest));
                        }
                        return chunks;
                    }
                }
            }
        }
    }
}

fn map_openai_err(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::ApiError(api) => {
            let msg = api.message.clone();
            let is_rate_limit = api
                .code
                .as_ref()
                .map(|c| c.to_string().contains("429") || c.to_string().contains("rate_limit"))
                .unwrap_or(false)
                || msg.to_lowercase().contains("rate limit");
            if is_rate_limit {
                LlmError::RateLimited {
                    retry_after_ms: 1000,
                }
            } else {
                LlmError::ApiError(msg)
            }
        }
        OpenAIError::Reqwest(e) => LlmError::Network(e.to_string()),
        other => LlmError::ApiError(other.to_string()),
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，调用时转 Message 为 API 格式
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    fn to_openai_messages(&self, messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .unwrap(),
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .unwrap(),
                ),
                Role::Assistant => {
                    let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                    args.content(m.content.clone());
                    if !m.tool_calls.is_empty() {
                        args.tool_calls(
                            m.tool_calls
                                .iter()
                                .map(|tc| {
                                    ChatCompletionMessageToolCalls::Function(
                                        ChatCompletionMessageToolCall {
                                            id: tc.id.clone(),
                                            function: FunctionCall {
                                                name: tc.name.clone(),
                                                arguments: tc.arguments.to_string(),
                                            },
                                        },
                                    )
                                })
                                .collect::<Vec<_>>(),
                        );
                    }
                    ChatCompletionRequestMessage::Assistant(args.build().unwrap())
                }
                Role::Tool => ChatCompletionRequestMessage::Tool(
                    ChatCompletionRequestToolMessageArgs::default()
                        .content(m.content.clone())
                        .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
                        .build()
                        .unwrap(),
                ),
            })
            .collect()
    }

    fn to_openai_tools(&self, tools: &[ToolSpec]) -> Vec<ChatCompletionTools> {
        tools
            .iter()
            .map(|t| {
                ChatCompletionTools::Function(ChatCompletionTool {
                    function: FunctionObjectArgs::default()
                        .name(t.name.clone())
                        .description(t.description.clone())
                        .parameters(t.parameters.clone())
                        .build()
                        .unwrap(),
                })
            })
            .collect()
    }
}

/// 将 SDK 返回的工具调用归一化为 ToolCallIntent；
/// arguments 是 JSON 字符串，解析失败时降级为空对象让工具侧报错重试
fn normalize_tool_call(tc: &ChatCompletionMessageToolCall) -> ToolCallIntent {
    let arguments = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
        tracing::warn!(
            tool = %tc.function.name,
            error = %e,
            "工具调用 arguments 不是合法 JSON，降级为空对象"
        );
        serde_json::json!({})
    });
    ToolCallIntent {
        id: tc.id.clone(),
        name: tc.function.name.clone(),
        arguments,
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages))
            .build()
            .map_err(map_openai_err)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_err)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<ChunkStream, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages))
            .build()
            .map_err(map_openai_err)?;

        let inner = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(map_openai_err)?;

        let mut splitter = ThinkTagSplitter::new();
        let stream = inner.flat_map(move |item| {
            let out: Vec<Result<StreamChunk, LlmError>> = match item {
                Ok(resp) => resp
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.as_deref())
                    .map(|text| splitter.push(text).into_iter().map(Ok).collect())
                    .unwrap_or_default(),
                Err(e) => vec![Err(map_openai_err(e))],
            };
            futures_util::stream::iter(out)
        });

        Ok(Box::pin(stream))
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ModelTurn, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(self.to_openai_messages(messages));
        if !tools.is_empty() {
            args.tools(self.to_openai_tools(tools));
        }
        let request = args.build().map_err(map_openai_err)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_err)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let choice = response
            .choices
            .first()
            .ok_or_else(|| LlmError::InvalidResponse("响应不含 choices".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|tc| match tc {
                ChatCompletionMessageToolCalls::Function(f) => Some(normalize_tool_call(f)),
                _ => None,
            })
            .collect();

        Ok(ModelTurn {
            content: choice.message.content.clone().unwrap_or_default(),
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChunkKind;

    #[test]
    fn test_think_splitter_plain_answer() {
        let mut s = ThinkTagSplitter::new();
        let chunks = s.push("hello world");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Answer);
        assert_eq!(chunks[0].text, "hello world");
    }

    #[test]
    fn test_think_splitter_inline_block() {
        let mut s = ThinkTagSplitter::new();
        let chunks = s.push("a<think>b</think>c");
        let kinds: Vec<_> = chunks.iter().map(|c| (c.kind, c.text.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (ChunkKind::Answer, "a"),
                (ChunkKind::Reasoning, "b"),
                (ChunkKind::Answer, "c"),
            ]
        );
    }

    #[test]
    fn test_think_splitter_state_spans_deltas() {
        let mut s = ThinkTagSplitter::new();
        let first = s.push("<think>思考中");
        assert!(first.iter().all(|c| c.kind == ChunkKind::Reasoning));
        let second = s.push("还在想</think>答案");
        assert_eq!(second[0].kind, ChunkKind::Reasoning);
        assert_eq!(second.last().unwrap().kind, ChunkKind::Answer);
        assert_eq!(second.last().unwrap().text, "答案");
    }

    #[test]
    fn test_normalize_tool_call_bad_json_degrades() {
        let tc = ChatCompletionMessageToolCall {
            id: "call_1".to_string(),
            function: FunctionCall {
                name: "web_search".to_string(),
                arguments: "not json".to_string(),
            },
        };
        let intent = normalize_tool_call(&tc);
        assert_eq!(intent.name, "web_search");
        assert_eq!(intent.arguments, serde_json::json!({}));
    }
}
