//! Agent 装配与对外入口
//!
//! SearchAgent 持有共享的编排器；run 把一次提问交给恢复控制器，
//! 返回步骤接收端。多次 run 彼此独立，可并发进行。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{AgentConfig, AppConfig};
use crate::core::{AgentError, AgentStep, Orchestrator, RecoveryController};
use crate::llm::{LlmClient, ModelFactory};
use crate::search::SearxngClient;
use crate::tools::{Tool, ToolInvoker, ToolRegistry, WebSearchTool};

/// 深度搜索智能体
pub struct SearchAgent {
    orchestrator: Arc<Orchestrator>,
}

impl SearchAgent {
    pub fn builder() -> SearchAgentBuilder {
        SearchAgentBuilder::default()
    }

    /// 按应用配置装配：模型工厂 + SearXNG 检索 + web_search 工具
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let factory = ModelFactory::new(cfg.llm.clone());
        let provider = Arc::new(SearxngClient::new(
            &cfg.search.endpoint,
            cfg.search.timeout_secs,
            cfg.search.max_results,
        ));

        let mut builder = Self::builder()
            .function_call_llm(factory.function_call_client())
            .max_iterations(cfg.agent.max_iterations)
            .max_execution_time_secs(cfg.agent.max_execution_time_secs)
            .register_tool(WebSearchTool::new(provider, cfg.search.max_content_chars));
        if let Some(answer) = factory.answer_client() {
            builder = builder.answer_llm(answer);
        }
        builder.build()
    }

    /// 运行一次提问，返回步骤流的接收端（按发出顺序拉取）
    pub fn run(&self, query: &str) -> mpsc::Receiver<AgentStep> {
        RecoveryController::launch(Arc::clone(&self.orchestrator), query.to_string())
    }

    pub fn config(&self) -> &AgentConfig {
        self.orchestrator.config()
    }
}

/// SearchAgent 构建器
pub struct SearchAgentBuilder {
    function_call_llm: Option<Arc<dyn LlmClient>>,
    answer_llm: Option<Arc<dyn LlmClient>>,
    registry: ToolRegistry,
    max_iterations: usize,
    max_execution_time_secs: u64,
    tool_timeout_secs: u64,
}

impl Default for SearchAgentBuilder {
    fn default() -> Self {
        Self {
            function_call_llm: None,
            answer_llm: None,
            registry: ToolRegistry::new(),
            max_iterations: 10,
            max_execution_time_secs: 60,
            tool_timeout_secs: 30,
        }
    }
}

impl SearchAgentBuilder {
    /// 工具调用阶段的模型（必需）
    pub fn function_call_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.function_call_llm = Some(llm);
        self
    }

    /// 独立的回答模型；设置后进入双模型模式
    pub fn answer_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.answer_llm = Some(llm);
        self
    }

    pub fn register_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.registry.register(tool);
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn max_execution_time_secs(mut self, secs: u64) -> Self {
        self.max_execution_time_secs = secs;
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<SearchAgent, AgentError> {
        let function_call_llm = self.function_call_llm.ok_or_else(|| {
            AgentError::ConfigError("未设置 function-call 模型".to_string())
        })?;
        let config = AgentConfig::new(
            self.max_iterations,
            self.max_execution_time_secs,
            self.answer_llm.is_some(),
        )?;
        let invoker = Arc::new(ToolInvoker::new(self.registry, self.tool_timeout_secs));
        let orchestrator = Arc::new(Orchestrator::new(
            function_call_llm,
            self.answer_llm,
            invoker,
            config,
        ));
        Ok(SearchAgent { orchestrator })
    }
}
