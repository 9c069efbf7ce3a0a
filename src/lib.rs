//! Scout - Rust 深度搜索智能体引擎
//!
//! 模块划分：
//! - **agent**: 对外入口（SearchAgent 构建与运行）
//! - **citation**: 全局引用编号、链接解析与参考文献列表
//! - **config**: 应用配置加载（TOML + 环境变量）与运行参数校验
//! - **core**: 步骤协议、状态机、编排循环、恢复控制
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与重试装饰器
//! - **prompts**: 工具调用阶段与回答阶段的提示词模板
//! - **search**: 检索结果模型、SearXNG 客户端与结果格式化
//! - **tools**: 工具 trait、注册表与调用适配器

pub mod agent;
pub mod citation;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod prompts;
pub mod search;
pub mod tools;

pub use agent::{SearchAgent, SearchAgentBuilder};
pub use crate::core::{AgentStep, StepKind};
