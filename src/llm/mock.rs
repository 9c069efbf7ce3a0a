//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本队列依次返回预设的 ModelTurn / 回答 / chunk 流；队列耗尽后回落到
//! 默认行为（回显最后一条 user 消息），便于无 Key 本地跑通整个循环。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{
    ChunkStream, LlmClient, LlmError, Message, ModelTurn, Role, StreamChunk, ToolSpec,
};

/// 流式脚本：建流即失败，或给定的 chunk 序列（可含中途错误）
pub enum MockStream {
    Fail(LlmError),
    Chunks(Vec<Result<StreamChunk, LlmError>>),
}

/// 脚本化 Mock 客户端
#[derive(Default)]
pub struct MockLlmClient {
    turns: Mutex<VecDeque<ModelTurn>>,
    answers: Mutex<VecDeque<Result<String, LlmError>>>,
    streams: Mutex<VecDeque<MockStream>>,
    /// turns 队列耗尽后每次返回的默认 turn（如：永远请求工具调用）
    default_turn: Mutex<Option<ModelTurn>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预设一轮 function-call 模型输出
    pub fn push_turn(self, turn: ModelTurn) -> Self {
        self.turns.lock().unwrap().push_back(turn);
        self
    }

    /// 预设一轮工具调用意图
    pub fn push_tool_call(self, name: &str, arguments: serde_json::Value) -> Self {
        let id = format!("call_{}", self.turns.lock().unwrap().len() + 1);
        self.push_turn(ModelTurn {
            content: String::new(),
            tool_calls: vec![crate::llm::ToolCallIntent {
                id,
                name: name.to_string(),
                arguments,
            }],
        })
    }

    /// 预设一轮纯文本输出（无工具调用）
    pub fn push_content(self, content: &str) -> Self {
        self.push_turn(ModelTurn {
            content: content.to_string(),
            tool_calls: Vec::new(),
        })
    }

    /// 预设一次非流式回答
    pub fn push_answer(self, answer: Result<String, LlmError>) -> Self {
        self.answers.lock().unwrap().push_back(answer);
        self
    }

    /// 预设一次流式脚本
    pub fn push_stream(self, script: MockStream) -> Self {
        self.streams.lock().unwrap().push_back(script);
        self
    }

    /// turns 耗尽后的默认输出（如永远工具调用，用于迭代上限测试）
    pub fn with_default_turn(self, turn: ModelTurn) -> Self {
        *self.default_turn.lock().unwrap() = Some(turn);
        self
    }

    fn echo(messages: &[Message]) -> String {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        format!("Echo from Mock: {}", last_user)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        match self.answers.lock().unwrap().pop_front() {
            Some(scripted) => scripted,
            None => Ok(Self::echo(messages)),
        }
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<ChunkStream, LlmError> {
        let script = self.streams.lock().unwrap().pop_front();
        match script {
            Some(MockStream::Fail(e)) => Err(e),
            Some(MockStream::Chunks(chunks)) => Ok(Box::pin(stream::iter(chunks))),
            None => {
                let content = self.complete(messages).await?;
                Ok(Box::pin(stream::iter(vec![Ok(StreamChunk::answer(content))])))
            }
        }
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<ModelTurn, LlmError> {
        if let Some(turn) = self.turns.lock().unwrap().pop_front() {
            return Ok(turn);
        }
        if let Some(turn) = self.default_turn.lock().unwrap().clone() {
            return Ok(turn);
        }
        Ok(ModelTurn {
            content: Self::echo(messages),
            tool_calls: Vec::new(),
        })
    }
}
