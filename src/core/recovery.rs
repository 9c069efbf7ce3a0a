//! 恢复控制器
//!
//! 两道独立防线：整体时间预算（到期取消在飞调用并发出单条 error 步骤，不做
//! 部分回答回退）与迭代上限（由编排器转入回答生成，必须以 final 结束）。
//! 流式回答失败时用同一回答模型非流式重试一次；一旦发出过 final 步骤，
//! 同一次运行内绝不再发出 error 步骤。

use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::citation::CitationManager;
use crate::core::{AgentError, AgentStep, Orchestrator, StepSender};
use crate::core::steps::step_channel;
use crate::llm::{ChunkKind, LlmClient, LlmError};
use crate::prompts;

/// 等待 future 完成，取消令牌触发时放弃（丢弃 future 即中止子调用）
pub(crate) async fn with_cancel<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, AgentError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        out = fut => Ok(out),
    }
}

/// 回答生成：优先流式；建流失败、流中断或流为空时非流式重试一次。
/// 成功路径以 final 结束，并在使用了引用时发出 citation_update 与参考文献。
pub(crate) async fn generate_answer_with_fallback(
    llm: &Arc<dyn LlmClient>,
    query: &str,
    tool_results: &[String],
    citations: &CitationManager,
    sender: &StepSender,
    cancel: &CancellationToken,
) -> Result<(), AgentError> {
    let messages = prompts::build_answer_messages(query, tool_results);

    let mut answer = String::new();
    let mut stream_error: Option<LlmError> = None;

    match with_cancel(cancel, llm.complete_stream(&messages)).await? {
        Ok(mut stream) => loop {
            match with_cancel(cancel, stream.next()).await? {
                None => break,
                Some(Ok(chunk)) => match chunk.kind {
                    ChunkKind::Reasoning => {
                        if !chunk.text.trim().is_empty() {
                            sender
                                .emit(AgentStep::reasoning_answer_phase(chunk.text))
                                .await?;
                        }
                    }
                    ChunkKind::Answer => {
                        if !chunk.text.is_empty() {
                            answer.push_str(&chunk.text);
                            sender.emit(AgentStep::final_chunk(chunk.text)).await?;
                        }
                    }
                },
                Some(Err(e)) => {
                    stream_error = Some(e);
                    break;
                }
            }
        },
        Err(e) => stream_error = Some(e),
    }

    // 流式失败或未产出内容：同一模型非流式重试一次
    let mut force_citation_update = false;
    if stream_error.is_some() || answer.trim().is_empty() {
        if let Some(ref e) = stream_error {
            tracing::warn!(error = %e, "流式回答失败，改用非流式重试一次");
        } else {
            tracing::warn!("流式回答未产生内容，改用非流式重试一次");
        }
        // 已流出的片段之后会被 citation_update 整体替换
        force_citation_update = !answer.is_empty();
        answer = with_cancel(cancel, llm.complete(&messages))
            .await?
            .map_err(|e| AgentError::StreamingFailure(e.to_string()))?;
        if answer.trim().is_empty() {
            return Err(AgentError::ExecutionFailure(
                "回答模型未产生内容".to_string(),
            ));
        }
        sender.emit(AgentStep::final_chunk(answer.clone())).await?;
    }

    let used = citations.used_numbers(&answer);
    if force_citation_update || !used.is_empty() {
        sender
            .emit(AgentStep::citation_update(citations.resolve(&answer)))
            .await?;
    }
    if !used.is_empty() {
        sender
            .emit(AgentStep::final_chunk(
                citations.format_reference_list(&used),
            ))
            .await?;
    }
    Ok(())
}

/// 恢复控制器：包裹编排器执行，施加时间预算并把失败映射为 error 步骤
pub struct RecoveryController;

impl RecoveryController {
    /// 启动一次运行，返回步骤接收端；后台任务在预算内驱动编排器
    pub fn launch(orchestrator: Arc<Orchestrator>, query: String) -> mpsc::Receiver<AgentStep> {
        let (sender, rx) = step_channel();

        tokio::spawn(async move {
            let run_id = uuid::Uuid::new_v4();
            let span = tracing::info_span!("agent_run", %run_id);
            async {
                let budget = orchestrator.config().max_execution_time();
                let budget_secs = budget.as_secs();
                let cancel = CancellationToken::new();

                let outcome = tokio::time::timeout(
                    budget,
                    orchestrator.execute(&query, &sender, &cancel),
                )
                .await;

                match outcome {
                    Err(_elapsed) => {
                        // 到期：取消在飞子调用，单条 error 结束；不做部分回答回退
                        cancel.cancel();
                        tracing::error!("Agent 执行超时 ({}秒)", budget_secs);
                        if !sender.final_emitted() {
                            let _ = sender
                                .send(AgentStep::error(
                                    AgentError::ExecutionTimeout(budget_secs).user_message(),
                                ))
                                .await;
                        }
                    }
                    Ok(Ok(())) => {
                        tracing::info!("Agent 运行完成");
                    }
                    Ok(Err(AgentError::Cancelled)) => {
                        tracing::info!("Agent 运行已取消");
                    }
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Agent 运行失败");
                        if !sender.final_emitted() {
                            let _ = sender.send(AgentStep::error(e.user_message())).await;
                        }
                    }
                }
            }
            .instrument(span)
            .await;
        });

        rx
    }
}
