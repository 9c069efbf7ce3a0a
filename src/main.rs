//! Scout - 深度搜索智能体
//!
//! 入口：初始化日志、按配置装配 SearchAgent，把命令行问题交给它并逐步打印进度。

use anyhow::Context;
use scout::config::{load_config, AppConfig};
use scout::{SearchAgent, StepKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scout::observability::init();

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        eprintln!("用法: scout <问题>");
        std::process::exit(2);
    }

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let agent = SearchAgent::from_config(&cfg).context("Failed to build agent")?;

    let mut steps = agent.run(&query);
    let mut answer = String::new();
    while let Some(step) = steps.recv().await {
        match step.kind {
            StepKind::Reasoning => eprintln!("[思考] {}", step.content),
            StepKind::Action => eprintln!("[行动] {}", step.content),
            StepKind::Observation => eprintln!("[观察] {}", step.content),
            StepKind::Final => answer.push_str(&step.content),
            // 整体替换已累计的回答（引用已改写为链接）
            StepKind::CitationUpdate => answer = step.content,
            StepKind::Error => eprintln!("[错误] {}", step.content),
        }
    }

    println!("{}", answer);
    Ok(())
}
