//! Agent 编排器：推理/行动主循环
//!
//! 驱动 function-call 模型决定调用工具或给出内容；工具结果经引用管理器
//! 登记全局编号后作为观察回填；迭代计数达到上限时强制转入回答生成。
//! 双模型模式下 function-call 模型的文本只视为推理，最终回答始终由回答模型生成。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::citation::CitationManager;
use crate::config::AgentConfig;
use crate::core::recovery::{generate_answer_with_fallback, with_cancel};
use crate::core::{AgentError, AgentStep, RunPhase, RunState, StepSender};
use crate::llm::{LlmClient, Message};
use crate::prompts;
use crate::search::SearchResultFormatter;
use crate::tools::ToolInvoker;

/// 推理内容预览最大字符数
const REASONING_PREVIEW_CHARS: usize = 300;
/// 观察内容预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 500;

/// 主循环的两种正常出口
enum LoopOutcome {
    /// 单模型模式：最终回答已在循环内发出
    Completed,
    /// 需要回答生成（双模型，或单模型未给出内容）
    AnswerPending,
}

/// 编排器：持有共享的模型与工具适配器，本身无跨运行可变状态
pub struct Orchestrator {
    function_call_llm: Arc<dyn LlmClient>,
    answer_llm: Option<Arc<dyn LlmClient>>,
    invoker: Arc<ToolInvoker>,
    config: AgentConfig,
    formatter: SearchResultFormatter,
}

impl Orchestrator {
    pub fn new(
        function_call_llm: Arc<dyn LlmClient>,
        answer_llm: Option<Arc<dyn LlmClient>>,
        invoker: Arc<ToolInvoker>,
        config: AgentConfig,
    ) -> Self {
        Self {
            function_call_llm,
            answer_llm,
            invoker,
            config,
            formatter: SearchResultFormatter::default(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn dual_llm(&self) -> bool {
        self.answer_llm.is_some()
    }

    /// 回答阶段模型：未配置独立模型时复用 function-call 模型
    fn answer_llm(&self) -> Arc<dyn LlmClient> {
        self.answer_llm
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.function_call_llm))
    }

    /// 执行一次运行；步骤经 sender 按因果顺序发出。
    /// 时间预算与错误到步骤的映射由恢复控制器在外层处理。
    pub(crate) async fn execute(
        &self,
        query: &str,
        sender: &StepSender,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        // 每个对话轮次一个全新的引用管理器，轮次开始时显式复位
        let mut state = RunState::new();
        let mut citations = CitationManager::new();
        citations.reset();

        let result = match self
            .run_loop(query, sender, cancel, &mut state, &mut citations)
            .await
        {
            Ok(LoopOutcome::Completed) => Ok(()),
            Ok(LoopOutcome::AnswerPending) => {
                match self
                    .answer_phase(query, &state, &citations, sender, cancel)
                    .await
                {
                    Ok(()) => state.advance(RunPhase::Done),
                    Err(e) => Err(e),
                }
            }
            // 迭代上限不是失败：带着已累计的工具结果转入回答生成
            Err(AgentError::IterationLimitExceeded(limit)) => {
                tracing::info!(max_iterations = limit, "达到最大迭代次数，转入回答生成");
                state.advance(RunPhase::AnswerGeneration)?;
                match self
                    .answer_phase(query, &state, &citations, sender, cancel)
                    .await
                {
                    Ok(()) => state.advance(RunPhase::Done),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        if result.is_err() && !state.phase().is_terminal() {
            let _ = state.advance(RunPhase::Failed);
        }
        result
    }

    /// 回答生成：双模型模式先提示切换，再交给带回退的生成流程
    async fn answer_phase(
        &self,
        query: &str,
        state: &RunState,
        citations: &CitationManager,
        sender: &StepSender,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        if self.dual_llm() {
            sender
                .emit(AgentStep::reasoning_answer_phase("正在生成最终回答..."))
                .await?;
        }
        generate_answer_with_fallback(
            &self.answer_llm(),
            query,
            state.tool_results(),
            citations,
            sender,
            cancel,
        )
        .await
    }

    async fn run_loop(
        &self,
        query: &str,
        sender: &StepSender,
        cancel: &CancellationToken,
        state: &mut RunState,
        citations: &mut CitationManager,
    ) -> Result<LoopOutcome, AgentError> {
        let specs = self.invoker.specs();
        let mut messages = vec![
            Message::system(prompts::AGENT_SYSTEM_PROMPT),
            Message::user(query),
        ];

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let turn = with_cancel(
                cancel,
                self.function_call_llm.complete_with_tools(&messages, &specs),
            )
            .await??;

            if turn.has_tool_calls() {
                state.advance(RunPhase::ToolSelection)?;
                if !turn.content.trim().is_empty() {
                    sender
                        .emit(AgentStep::reasoning(preview(
                            &turn.content,
                            REASONING_PREVIEW_CHARS,
                        )))
                        .await?;
                }
                messages.push(Message::assistant_tool_calls(
                    turn.content.clone(),
                    turn.tool_calls.clone(),
                ));

                state.advance(RunPhase::ToolExecution)?;
                for call in &turn.tool_calls {
                    sender
                        .emit(AgentStep::action(&call.name, &call.arguments))
                        .await?;

                    let result =
                        with_cancel(cancel, self.invoker.invoke(&call.name, call.arguments.clone()))
                            .await?;

                    // 检索类结果先登记全局编号，再用全局编号渲染观察文本
                    let observation = if result.sources.is_empty() {
                        result.text
                    } else {
                        let round_query = call
                            .arguments
                            .get("query")
                            .and_then(|v| v.as_str())
                            .unwrap_or(query);
                        let (start, _end) = citations.add_results(&result.sources, round_query);
                        self.formatter.format_for_model(&result.sources, start)
                    };

                    sender
                        .emit(AgentStep::observation(
                            preview(&observation, OBSERVATION_PREVIEW_CHARS),
                            &call.name,
                            result.is_error,
                        ))
                        .await?;
                    messages.push(Message::tool(&call.id, observation.clone()));
                    state.push_tool_result(observation);
                }

                state.record_iteration();
                if state.iterations() >= self.config.max_iterations() {
                    return Err(AgentError::IterationLimitExceeded(
                        self.config.max_iterations(),
                    ));
                }
                state.advance(RunPhase::Reasoning)?;
                continue;
            }

            // 无工具调用：候选最终内容
            state.advance(RunPhase::AnswerGeneration)?;
            if !self.dual_llm() && !turn.content.trim().is_empty() {
                // 单模型模式：引用解析后直接作为最终回答
                self.emit_resolved_final(&turn.content, citations, sender)
                    .await?;
                state.advance(RunPhase::Done)?;
                return Ok(LoopOutcome::Completed);
            }
            if !turn.content.trim().is_empty() {
                // 双模型模式：该内容仅视为推理，最终回答交给回答模型重新生成
                sender
                    .emit(AgentStep::reasoning(preview(
                        &turn.content,
                        REASONING_PREVIEW_CHARS,
                    )))
                    .await?;
            }
            return Ok(LoopOutcome::AnswerPending);
        }
    }

    /// 单模型路径：内容整段发出（引用已改写），再追加参考文献
    async fn emit_resolved_final(
        &self,
        content: &str,
        citations: &CitationManager,
        sender: &StepSender,
    ) -> Result<(), AgentError> {
        sender
            .emit(AgentStep::final_chunk(citations.resolve(content)))
            .await?;
        let used = citations.used_numbers(content);
        let references = citations.format_reference_list(&used);
        if !references.is_empty() {
            sender.emit(AgentStep::final_chunk(references)).await?;
        }
        Ok(())
    }
}

/// 按字符截断预览，超出追加 ...
fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}
