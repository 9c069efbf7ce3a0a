//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCOUT__*` 覆盖（双下划线表示嵌套，
//! 如 `SCOUT__AGENT__MAX_ITERATIONS=5`）。运行参数（迭代与时间预算）在
//! AgentConfig::new 中一次性校验，越界直接拒绝而非截断。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::AgentError;

/// 迭代次数上限的硬顶（成本控制）
pub const MAX_ITERATIONS_CEILING: usize = 10;
/// 单次运行时间预算的下限与上限（秒）
pub const MIN_EXECUTION_SECS: u64 = 10;
pub const MAX_EXECUTION_SECS: u64 = 300;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub search: SearchSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentSection::default(),
            llm: LlmSection::default(),
            search: SearchSection::default(),
        }
    }
}

/// [agent] 段：ReAct 迭代与时间预算（原始值，未校验）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: usize,
    pub max_execution_time_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_execution_time_secs: 60,
        }
    }
}

/// [llm] 段：后端选择、function-call 模型与可选的独立回答模型
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub function_call: ModelSection,
    /// 配置后启用双模型：回答阶段改用该模型
    #[serde(default)]
    pub answer: ModelSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "deepseek".to_string()
}

/// 单个模型的选择（provider 缺省时沿用 [llm].provider）
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ModelSection {
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl ModelSection {
    pub fn is_configured(&self) -> bool {
        self.model.is_some() || self.provider.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 60,
            stream: 120,
        }
    }
}

/// [search] 段：SearXNG 端点、超时、结果条数与摘要长度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_results: usize,
    /// 单条结果摘要的最大字符数（超出截断并追加 ...）
    pub max_content_chars: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            timeout_secs: 5,
            max_results: 5,
            max_content_chars: 200,
        }
    }
}

/// 校验后的运行参数：构造时检查范围，运行期间不可变
#[derive(Debug, Clone)]
pub struct AgentConfig {
    max_iterations: usize,
    max_execution_time: Duration,
    dual_llm: bool,
}

impl AgentConfig {
    /// 校验并构造；越界值拒绝（ConfigError），不做截断
    pub fn new(
        max_iterations: usize,
        max_execution_time_secs: u64,
        dual_llm: bool,
    ) -> Result<Self, AgentError> {
        if max_iterations < 1 || max_iterations > MAX_ITERATIONS_CEILING {
            return Err(AgentError::ConfigError(format!(
                "max_iterations 必须在 1..={} 范围内，当前为 {}",
                MAX_ITERATIONS_CEILING, max_iterations
            )));
        }
        if max_execution_time_secs < MIN_EXECUTION_SECS
            || max_execution_time_secs > MAX_EXECUTION_SECS
        {
            return Err(AgentError::ConfigError(format!(
                "max_execution_time_secs 必须在 {}..={} 范围内，当前为 {}",
                MIN_EXECUTION_SECS, MAX_EXECUTION_SECS, max_execution_time_secs
            )));
        }
        Ok(Self {
            max_iterations,
            max_execution_time: Duration::from_secs(max_execution_time_secs),
            dual_llm,
        })
    }

    /// 从 [agent] 段构造；dual_llm 由 [llm.answer] 是否配置了不同模型推导
    pub fn from_sections(agent: &AgentSection, llm: &LlmSection) -> Result<Self, AgentError> {
        let dual_llm = llm.answer.is_configured() && llm.answer != llm.function_call;
        Self::new(agent.max_iterations, agent.max_execution_time_secs, dual_llm)
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn max_execution_time(&self) -> Duration {
        self.max_execution_time
    }

    pub fn dual_llm(&self) -> bool {
        self.dual_llm
    }
}

/// 从 config 目录加载配置，环境变量 SCOUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SCOUT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SCOUT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
