//! Agent 错误类型
//!
//! 工具级失败在循环内吸收为观察；迭代上限在本地转入回答生成；
//! 超时与不可恢复的模型错误升到恢复控制器，以单条可行动的 error 步骤呈现给调用方。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误；工具级失败不在此列，
/// 它们由调用适配器编码为 is_error 观察，循环继续
#[derive(Error, Debug)]
pub enum AgentError {
    /// 达到迭代上限（本地恢复：转入回答生成，不对外暴露为失败）
    #[error("Iteration limit exceeded ({0})")]
    IterationLimitExceeded(usize),

    /// 整体时间预算耗尽（致命，不做部分回答回退）
    #[error("Execution timeout after {0}s")]
    ExecutionTimeout(u64),

    /// 模型调用失败（重试已在调用层耗尽）
    #[error("Model invocation error: {0}")]
    ModelInvocation(#[from] LlmError),

    /// 流式回答失败且非流式回退也失败
    #[error("Streaming failure: {0}")]
    StreamingFailure(String),

    /// 所有回退耗尽后的最终失败
    #[error("Execution failure: {0}")]
    ExecutionFailure(String),

    #[error("Cancelled")]
    Cancelled,

    /// 非法状态迁移（编排器内部缺陷）
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 面向用户的可行动提示；内部细节只进日志
    pub fn user_message(&self) -> String {
        match self {
            AgentError::ExecutionTimeout(secs) => format!(
                "执行超时（{}秒）。请尝试简化问题后重试。",
                secs
            ),
            AgentError::Cancelled => "已取消当前任务。".to_string(),
            AgentError::ModelInvocation(_) => {
                "模型调用多次失败，请检查网络与 API Key 后重试。".to_string()
            }
            AgentError::ConfigError(msg) => format!("配置错误: {}", msg),
            _ => "执行失败，请稍后重试或简化问题。".to_string(),
        }
    }
}
