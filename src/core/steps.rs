//! 流式步骤协议
//!
//! 编排器与任意消费方（UI / 测试 / 日志）之间唯一的通道：一条有界 mpsc 通道上的
//! 有序 AgentStep 序列。消费方按发送顺序各消费一次；发送端记录是否已发出 final，
//! 供恢复控制器执行「final 之后绝不再发 error」的规则。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::AgentError;

/// 步骤通道容量：消费方不拉取时发送端挂起（背压）
pub const STEP_CHANNEL_CAPACITY: usize = 64;

/// 步骤类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Reasoning,
    Action,
    Observation,
    Final,
    CitationUpdate,
    Error,
}

/// 可观察进度的原子单元；发出后不再修改
#[derive(Debug, Clone, Serialize)]
pub struct AgentStep {
    pub kind: StepKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AgentStep {
    pub fn reasoning(content: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Reasoning,
            content: content.into(),
            metadata: None,
        }
    }

    /// 回答阶段的推理内容（reasoner 模型的思考过程）
    pub fn reasoning_answer_phase(content: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Reasoning,
            content: content.into(),
            metadata: Some(serde_json::json!({ "reasoning_type": "answer_phase" })),
        }
    }

    pub fn action(tool: &str, tool_input: &serde_json::Value) -> Self {
        Self {
            kind: StepKind::Action,
            content: format!("调用工具: {}", tool),
            metadata: Some(serde_json::json!({
                "tool": tool,
                "tool_input": tool_input,
            })),
        }
    }

    pub fn observation(content: impl Into<String>, tool: &str, is_error: bool) -> Self {
        Self {
            kind: StepKind::Observation,
            content: content.into(),
            metadata: Some(serde_json::json!({
                "tool": tool,
                "is_error": is_error,
            })),
        }
    }

    /// 最终回答的一段（流式时为片段，非流式时为整段）
    pub fn final_chunk(content: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Final,
            content: content.into(),
            metadata: None,
        }
    }

    /// 整体替换已流出的回答内容（引用已改写为链接）
    pub fn citation_update(content: impl Into<String>) -> Self {
        Self {
            kind: StepKind::CitationUpdate,
            content: content.into(),
            metadata: Some(serde_json::json!({ "replace": true })),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Error,
            content: content.into(),
            metadata: None,
        }
    }
}

/// 步骤发送端：单生产者，跟踪 final 是否已发出
#[derive(Clone)]
pub struct StepSender {
    tx: mpsc::Sender<AgentStep>,
    final_emitted: Arc<AtomicBool>,
}

impl StepSender {
    /// 发送一个步骤；消费方已断开时返回 false（运行应尽快退出）
    pub async fn send(&self, step: AgentStep) -> bool {
        if step.kind == StepKind::Final {
            self.final_emitted.store(true, Ordering::SeqCst);
        }
        self.tx.send(step).await.is_ok()
    }

    /// 发送一个步骤；消费方已断开时视为取消，让运行尽快退出
    pub async fn emit(&self, step: AgentStep) -> Result<(), AgentError> {
        if self.send(step).await {
            Ok(())
        } else {
            Err(AgentError::Cancelled)
        }
    }

    pub fn final_emitted(&self) -> bool {
        self.final_emitted.load(Ordering::SeqCst)
    }
}

/// 建立一条步骤通道
pub fn step_channel() -> (StepSender, mpsc::Receiver<AgentStep>) {
    let (tx, rx) = mpsc::channel(STEP_CHANNEL_CAPACITY);
    (
        StepSender {
            tx,
            final_emitted: Arc::new(AtomicBool::new(false)),
        },
        rx,
    )
}
