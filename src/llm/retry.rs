//! LLM 调用重试装饰器
//!
//! 包装任意 LlmClient，对瞬时错误（限流、网络）做有界指数退避重试；
//! 流式调用只重试建流本身，流中断交由上层的非流式回退处理。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;

use crate::llm::{ChunkStream, LlmClient, LlmError, Message, ModelTurn, ToolSpec};

/// 重试参数：初始间隔与总时长上限
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_elapsed: Duration::from_secs(15),
        }
    }
}

impl RetryConfig {
    fn to_backoff(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }
}

/// 重试装饰器：透传 token 统计，重试瞬时错误
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>) -> Self {
        Self {
            inner,
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

fn classify(e: LlmError) -> backoff::Error<LlmError> {
    if e.is_transient() {
        tracing::warn!(error = %e, "LLM 瞬时错误，准备重试");
        backoff::Error::transient(e)
    } else {
        backoff::Error::permanent(e)
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        backoff::future::retry(self.config.to_backoff(), || async {
            self.inner.complete(messages).await.map_err(classify)
        })
        .await
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<ChunkStream, LlmError> {
        backoff::future::retry(self.config.to_backoff(), || async {
            self.inner.complete_stream(messages).await.map_err(classify)
        })
        .await
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ModelTurn, LlmError> {
        backoff::future::retry(self.config.to_backoff(), || async {
            self.inner
                .complete_with_tools(messages, tools)
                .await
                .map_err(classify)
        })
        .await
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
