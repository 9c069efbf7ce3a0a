//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//!
//! ModelFactory 持有按用途（function-call / answer）惰性构造的共享客户端；
//! OnceLock 保证并发首次使用下只构造一次，工厂本身由调用方显式注入，不依赖全局可变状态。

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

use std::sync::{Arc, OnceLock};

pub use deepseek::{create_deepseek_client, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::{MockLlmClient, MockStream};
pub use openai::{OpenAiClient, ThinkTagSplitter, TokenUsage};
pub use retry::{RetryConfig, RetryingLlmClient};
pub use traits::{
    ChunkKind, ChunkStream, LlmClient, LlmError, Message, ModelTurn, Role, StreamChunk,
    ToolCallIntent, ToolSpec,
};

use crate::config::{LlmSection, ModelSection};

/// 按配置与环境变量构造具体客户端（DeepSeek / OpenAI 兼容 / Mock），外层套重试装饰器
fn build_client(cfg: &LlmSection, section: &ModelSection) -> Arc<dyn LlmClient> {
    let provider = section
        .provider
        .clone()
        .unwrap_or_else(|| cfg.provider.clone())
        .to_lowercase();
    let model = section.model.clone();

    let use_deepseek = provider == "deepseek"
        && (std::env::var("DEEPSEEK_API_KEY").is_ok() || std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = provider == "openai" && std::env::var("OPENAI_API_KEY").is_ok();

    let inner: Arc<dyn LlmClient> = if use_deepseek {
        let model = model.unwrap_or_else(|| DEEPSEEK_CHAT.to_string());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(create_deepseek_client(Some(&model)))
    } else if use_openai {
        let model = model.unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            cfg.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    };

    Arc::new(RetryingLlmClient::new(inner))
}

/// 模型工厂：function-call 与 answer 两个槽位，并发首次访问只构造一次
pub struct ModelFactory {
    cfg: LlmSection,
    function_call: OnceLock<Arc<dyn LlmClient>>,
    answer: OnceLock<Arc<dyn LlmClient>>,
}

impl ModelFactory {
    pub fn new(cfg: LlmSection) -> Self {
        Self {
            cfg,
            function_call: OnceLock::new(),
            answer: OnceLock::new(),
        }
    }

    /// 工具调用阶段的模型
    pub fn function_call_client(&self) -> Arc<dyn LlmClient> {
        self.function_call
            .get_or_init(|| build_client(&self.cfg, &self.cfg.function_call))
            .clone()
    }

    /// 回答阶段的独立模型；未配置或与 function-call 相同时返回 None（单模型模式）
    pub fn answer_client(&self) -> Option<Arc<dyn LlmClient>> {
        if !self.cfg.answer.is_configured() || self.cfg.answer == self.cfg.function_call {
            return None;
        }
        Some(
            self.answer
                .get_or_init(|| build_client(&self.cfg, &self.cfg.answer))
                .clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_returns_same_instance() {
        let factory = ModelFactory::new(LlmSection::default());
        let a = factory.function_call_client();
        let b = factory.function_call_client();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_answer_client_absent_in_single_model_mode() {
        let factory = ModelFactory::new(LlmSection::default());
        assert!(factory.answer_client().is_none());
    }

    #[test]
    fn test_answer_client_present_when_configured() {
        let mut cfg = LlmSection::default();
        cfg.answer.model = Some(DEEPSEEK_REASONER.to_string());
        let factory = ModelFactory::new(cfg);
        assert!(factory.answer_client().is_some());
    }

    #[test]
    fn test_concurrent_first_use_initializes_once() {
        let factory = Arc::new(ModelFactory::new(LlmSection::default()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let f = Arc::clone(&factory);
                std::thread::spawn(move || f.function_call_client())
            })
            .collect();
        let clients: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for c in &clients[1..] {
            assert!(Arc::ptr_eq(&clients[0], c));
        }
    }
}
