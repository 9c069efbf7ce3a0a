//! 端到端场景测试：脚本化 Mock 模型 + 假检索后端驱动完整运行

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use scout::llm::{
        ChunkStream, LlmClient, LlmError, Message, MockLlmClient, MockStream, ModelTurn,
        StreamChunk, ToolSpec,
    };
    use scout::search::{SearchProvider, SearchResponse, SearchResult};
    use scout::tools::WebSearchTool;
    use scout::{AgentStep, SearchAgent, StepKind};

    /// 按批次出结果的假检索后端；批次耗尽后返回空结果
    struct FakeSearchProvider {
        batches: Mutex<VecDeque<Vec<SearchResult>>>,
    }

    impl FakeSearchProvider {
        fn new(batches: Vec<Vec<SearchResult>>) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(batches.into()),
            })
        }

        fn empty() -> Arc<Self> {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl SearchProvider for FakeSearchProvider {
        async fn search(&self, query: &str) -> Result<SearchResponse, String> {
            let results = self.batches.lock().unwrap().pop_front().unwrap_or_default();
            Ok(SearchResponse {
                query: query.to_string(),
                total_results: results.len(),
                results,
                search_time: 0.01,
            })
        }
    }

    /// 挂起的模型：用于时间预算测试
    struct HangingLlm;

    #[async_trait]
    impl LlmClient for HangingLlm {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(String::new())
        }

        async fn complete_stream(&self, _messages: &[Message]) -> Result<ChunkStream, LlmError> {
            Err(LlmError::ApiError("not used".to_string()))
        }

        async fn complete_with_tools(
            &self,
            messages: &[Message],
            _tools: &[ToolSpec],
        ) -> Result<ModelTurn, LlmError> {
            self.complete(messages).await.map(|content| ModelTurn {
                content,
                tool_calls: Vec::new(),
            })
        }
    }

    fn batch(prefix: &str, host: &str, n: usize) -> Vec<SearchResult> {
        (1..=n)
            .map(|i| {
                SearchResult::new(
                    format!("{} {}", prefix, i),
                    format!("https://{}/{}", host, i),
                    format!("{} 的摘要内容 {}", prefix, i),
                )
            })
            .collect()
    }

    async fn collect_steps(agent: &SearchAgent, query: &str) -> Vec<AgentStep> {
        let mut rx = agent.run(query);
        let mut steps = Vec::new();
        while let Some(step) = rx.recv().await {
            steps.push(step);
        }
        steps
    }

    fn count(steps: &[AgentStep], kind: StepKind) -> usize {
        steps.iter().filter(|s| s.kind == kind).count()
    }

    fn final_text(steps: &[AgentStep]) -> String {
        steps
            .iter()
            .filter(|s| s.kind == StepKind::Final)
            .map(|s| s.content.as_str())
            .collect()
    }

    fn tool_call_turn(name: &str, query: &str) -> ModelTurn {
        ModelTurn {
            content: String::new(),
            tool_calls: vec![scout::llm::ToolCallIntent {
                id: "call_x".to_string(),
                name: name.to_string(),
                arguments: json!({ "query": query }),
            }],
        }
    }

    /// 场景 A：不触发任何工具调用，单模型模式直接给出直答
    #[tokio::test]
    async fn test_scenario_a_direct_answer_without_tools() {
        let agent = SearchAgent::builder()
            .function_call_llm(Arc::new(
                MockLlmClient::new().push_content("巴黎是法国的首都。"),
            ))
            .register_tool(WebSearchTool::new(FakeSearchProvider::empty(), 200))
            .build()
            .unwrap();

        let steps = collect_steps(&agent, "法国的首都是哪里").await;

        assert_eq!(count(&steps, StepKind::Final), 1);
        assert_eq!(count(&steps, StepKind::Action), 0);
        assert_eq!(count(&steps, StepKind::Observation), 0);
        assert_eq!(count(&steps, StepKind::CitationUpdate), 0);
        assert_eq!(count(&steps, StepKind::Error), 0);
        assert_eq!(final_text(&steps), "巴黎是法国的首都。");
    }

    /// 场景 B：两轮检索（3 条 + 2 条），回答引用 [1] 与 [5]，
    /// 参考文献恰好两条并按轮次分组，编号跨轮连续
    #[tokio::test]
    async fn test_scenario_b_global_numbering_across_two_rounds() {
        let function_call = MockLlmClient::new()
            .push_tool_call("web_search", json!({ "query": "rust 发布" }))
            .push_tool_call("web_search", json!({ "query": "rust 性能" }))
            .push_content("资料已足够。");
        let answer = MockLlmClient::new().push_stream(MockStream::Chunks(vec![
            Ok(StreamChunk::answer("根据 [1] 的报道，")),
            Ok(StreamChunk::answer("以及 [5] 的测试数据。")),
        ]));

        let agent = SearchAgent::builder()
            .function_call_llm(Arc::new(function_call))
            .answer_llm(Arc::new(answer))
            .register_tool(WebSearchTool::new(
                FakeSearchProvider::new(vec![batch("发布", "a.com", 3), batch("性能", "b.com", 2)]),
                200,
            ))
            .build()
            .unwrap();

        let steps = collect_steps(&agent, "rust 最近怎么样").await;

        assert_eq!(count(&steps, StepKind::Action), 2);
        assert_eq!(count(&steps, StepKind::Observation), 2);
        assert_eq!(count(&steps, StepKind::Error), 0);

        // 第二轮观察从全局编号 4 开始
        let observations: Vec<&AgentStep> = steps
            .iter()
            .filter(|s| s.kind == StepKind::Observation)
            .collect();
        assert!(observations[0].content.contains("[1] 发布 1"));
        assert!(observations[1].content.contains("[4] 性能 1"));
        assert!(!observations[1].content.contains("[1] 性能 1"));

        // 引用改写为链接
        let update = steps
            .iter()
            .find(|s| s.kind == StepKind::CitationUpdate)
            .expect("citation_update step");
        assert!(update.content.contains("[[1]](https://a.com/1)"));
        assert!(update.content.contains("[[5]](https://b.com/2)"));
        assert_eq!(update.metadata.as_ref().unwrap()["replace"], true);

        // 参考文献：恰好两条，分别列在第 1、2 轮之下
        let references = steps
            .iter()
            .filter(|s| s.kind == StepKind::Final)
            .last()
            .unwrap();
        assert!(references.content.starts_with("\n\n---\n**References:**\n"));
        assert!(references.content.contains("**Round 1** (query: rust 发布)"));
        assert!(references.content.contains("**Round 2** (query: rust 性能)"));
        assert!(references.content.contains("1. [发布 1](https://a.com/1) — a.com"));
        assert!(references.content.contains("5. [性能 2](https://b.com/2) — b.com"));
        for unused in ["\n2. [", "\n3. [", "\n4. ["] {
            assert!(!references.content.contains(unused));
        }

        // citation_update 先于参考文献 final
        let update_idx = steps
            .iter()
            .position(|s| s.kind == StepKind::CitationUpdate)
            .unwrap();
        let refs_idx = steps.len() - 1;
        assert!(update_idx < refs_idx);
        assert_eq!(steps[refs_idx].kind, StepKind::Final);
    }

    /// 场景 C：模型永远请求工具调用，迭代上限后仍以 final 结束且无 error
    #[tokio::test]
    async fn test_scenario_c_iteration_limit_yields_final() {
        let function_call =
            MockLlmClient::new().with_default_turn(tool_call_turn("web_search", "再搜一次"));
        let answer = MockLlmClient::new().push_answer(Ok("基于两轮检索的总结 [1]。".to_string()));

        let agent = SearchAgent::builder()
            .function_call_llm(Arc::new(function_call))
            .answer_llm(Arc::new(answer))
            .max_iterations(2)
            .register_tool(WebSearchTool::new(
                FakeSearchProvider::new(vec![batch("甲", "a.com", 2), batch("乙", "b.com", 2)]),
                200,
            ))
            .build()
            .unwrap();

        let steps = collect_steps(&agent, "持续追问").await;

        assert_eq!(count(&steps, StepKind::Action), 2);
        assert_eq!(count(&steps, StepKind::Observation), 2);
        assert!(count(&steps, StepKind::Final) >= 1);
        assert_eq!(count(&steps, StepKind::Error), 0);
        assert!(final_text(&steps).contains("总结"));
    }

    /// 迭代上限且零工具结果（工具始终失败）时同样必须以 final 结束
    #[tokio::test]
    async fn test_iteration_limit_with_zero_results_still_final() {
        let function_call =
            MockLlmClient::new().with_default_turn(tool_call_turn("ghost_tool", "x"));
        let answer = MockLlmClient::new().push_answer(Ok("基于已有知识的直答。".to_string()));

        let agent = SearchAgent::builder()
            .function_call_llm(Arc::new(function_call))
            .answer_llm(Arc::new(answer))
            .max_iterations(2)
            .register_tool(WebSearchTool::new(FakeSearchProvider::empty(), 200))
            .build()
            .unwrap();

        let steps = collect_steps(&agent, "问题").await;

        // 未知工具编码为 is_error 观察，运行继续
        let observations: Vec<&AgentStep> = steps
            .iter()
            .filter(|s| s.kind == StepKind::Observation)
            .collect();
        assert_eq!(observations.len(), 2);
        for obs in observations {
            assert_eq!(obs.metadata.as_ref().unwrap()["is_error"], true);
        }
        assert!(count(&steps, StepKind::Final) >= 1);
        assert_eq!(count(&steps, StepKind::Error), 0);
    }

    /// 检索无结果：不建轮次、无参考文献，回答模型收到直答指示
    #[tokio::test]
    async fn test_empty_search_round_produces_no_references() {
        let function_call = MockLlmClient::new()
            .push_turn(tool_call_turn("web_search", "没有结果的查询"))
            .push_content("");
        let answer = MockLlmClient::new().push_answer(Ok("据我所知……".to_string()));

        let agent = SearchAgent::builder()
            .function_call_llm(Arc::new(function_call))
            .answer_llm(Arc::new(answer))
            .register_tool(WebSearchTool::new(FakeSearchProvider::empty(), 200))
            .build()
            .unwrap();

        let steps = collect_steps(&agent, "问题").await;

        let obs = steps
            .iter()
            .find(|s| s.kind == StepKind::Observation)
            .unwrap();
        assert!(obs.content.contains("未找到相关搜索结果"));
        assert_eq!(count(&steps, StepKind::CitationUpdate), 0);
        assert!(!final_text(&steps).contains("**References:**"));
        assert_eq!(count(&steps, StepKind::Error), 0);
    }

    /// 流式回答中途失败：非流式重试一次成功，final 之后不得出现 error
    #[tokio::test]
    async fn test_stream_failure_recovers_without_error_after_final() {
        let function_call = MockLlmClient::new()
            .push_turn(tool_call_turn("web_search", "查询"))
            .push_content("");
        let answer = MockLlmClient::new()
            .push_stream(MockStream::Chunks(vec![
                Ok(StreamChunk::answer("部分回答 [1]")),
                Err(LlmError::Network("connection reset".to_string())),
            ]))
            .push_answer(Ok("完整回答 [1]。".to_string()));

        let agent = SearchAgent::builder()
            .function_call_llm(Arc::new(function_call))
            .answer_llm(Arc::new(answer))
            .register_tool(WebSearchTool::new(
                FakeSearchProvider::new(vec![batch("丙", "c.com", 1)]),
                200,
            ))
            .build()
            .unwrap();

        let steps = collect_steps(&agent, "问题").await;

        assert_eq!(count(&steps, StepKind::Error), 0);
        assert!(count(&steps, StepKind::Final) >= 2);

        // 回退后的整体替换修正了重复的片段
        let update = steps
            .iter()
            .find(|s| s.kind == StepKind::CitationUpdate)
            .unwrap();
        assert_eq!(update.content, "完整回答 [[1]](https://c.com/1)。");
    }

    /// 失败注入下的不变量：一旦发出过 final，其后绝不再出现 error
    #[tokio::test]
    async fn test_no_error_step_after_final_under_failure_injection() {
        for stream_mode in 0..3u8 {
            for fallback_ok in [true, false] {
                let answer = MockLlmClient::new();
                let answer = match stream_mode {
                    0 => answer.push_stream(MockStream::Chunks(vec![Ok(StreamChunk::answer(
                        "答案 [1]。",
                    ))])),
                    1 => answer
                        .push_stream(MockStream::Fail(LlmError::Network("open".to_string()))),
                    _ => answer.push_stream(MockStream::Chunks(vec![
                        Ok(StreamChunk::answer("部分 [1]")),
                        Err(LlmError::Network("mid".to_string())),
                    ])),
                };
                let answer = if fallback_ok {
                    answer.push_answer(Ok("回退回答 [1]。".to_string()))
                } else {
                    answer.push_answer(Err(LlmError::ApiError("down".to_string())))
                };

                let function_call = MockLlmClient::new()
                    .push_tool_call("web_search", json!({ "query": "q" }))
                    .push_content("");
                let agent = SearchAgent::builder()
                    .function_call_llm(Arc::new(function_call))
                    .answer_llm(Arc::new(answer))
                    .register_tool(WebSearchTool::new(
                        FakeSearchProvider::new(vec![batch("源", "s.com", 1)]),
                        200,
                    ))
                    .build()
                    .unwrap();

                let steps = collect_steps(&agent, "问题").await;

                if let Some(first_final) =
                    steps.iter().position(|s| s.kind == StepKind::Final)
                {
                    assert!(
                        steps[first_final..].iter().all(|s| s.kind != StepKind::Error),
                        "error after final (stream_mode={}, fallback_ok={})",
                        stream_mode,
                        fallback_ok
                    );
                }
            }
        }
    }

    /// 回答模型彻底失败：流式与非流式都失败时，恰好一条 error 且没有 final
    #[tokio::test]
    async fn test_answer_model_total_failure_yields_single_error() {
        let function_call = MockLlmClient::new().push_content("");
        let answer = MockLlmClient::new()
            .push_stream(MockStream::Fail(LlmError::Network("down".to_string())))
            .push_answer(Err(LlmError::ApiError("still down".to_string())));

        let agent = SearchAgent::builder()
            .function_call_llm(Arc::new(function_call))
            .answer_llm(Arc::new(answer))
            .register_tool(WebSearchTool::new(FakeSearchProvider::empty(), 200))
            .build()
            .unwrap();

        let steps = collect_steps(&agent, "问题").await;

        assert_eq!(count(&steps, StepKind::Final), 0);
        assert_eq!(count(&steps, StepKind::Error), 1);
        let error = steps.iter().find(|s| s.kind == StepKind::Error).unwrap();
        // 对用户只给可行动提示，不泄漏内部错误串
        assert!(!error.content.contains("still down"));
        assert!(!error.content.is_empty());
    }

    /// 时间预算耗尽：单条 error 携带固定的超时提示，无 final、无部分回答回退
    #[tokio::test(start_paused = true)]
    async fn test_time_guard_emits_single_timeout_error() {
        let agent = SearchAgent::builder()
            .function_call_llm(Arc::new(HangingLlm))
            .max_execution_time_secs(10)
            .register_tool(WebSearchTool::new(FakeSearchProvider::empty(), 200))
            .build()
            .unwrap();

        let steps = collect_steps(&agent, "问题").await;

        assert_eq!(count(&steps, StepKind::Final), 0);
        assert_eq!(count(&steps, StepKind::Error), 1);
        let error = steps.iter().find(|s| s.kind == StepKind::Error).unwrap();
        assert!(error.content.contains("执行超时"));
        assert!(error.content.contains("10"));
    }

    /// 工具失败作为 is_error 观察回流，模型随后仍能给出最终回答
    #[tokio::test]
    async fn test_tool_failure_is_observation_and_run_continues() {
        let function_call = MockLlmClient::new()
            .push_turn(ModelTurn {
                content: String::new(),
                tool_calls: vec![scout::llm::ToolCallIntent {
                    id: "call_1".to_string(),
                    name: "web_search".to_string(),
                    // 缺少 query 参数，工具报错
                    arguments: json!({}),
                }],
            })
            .push_content("虽然搜索失败，但我可以直接回答。");

        let agent = SearchAgent::builder()
            .function_call_llm(Arc::new(function_call))
            .register_tool(WebSearchTool::new(FakeSearchProvider::empty(), 200))
            .build()
            .unwrap();

        let steps = collect_steps(&agent, "问题").await;

        let obs = steps
            .iter()
            .find(|s| s.kind == StepKind::Observation)
            .unwrap();
        assert_eq!(obs.metadata.as_ref().unwrap()["is_error"], true);
        assert!(obs.content.contains("工具执行失败"));
        assert_eq!(count(&steps, StepKind::Error), 0);
        assert_eq!(count(&steps, StepKind::Final), 1);
    }

    /// 双模型模式下即使首轮就没有工具调用，也必须恰好走一次回答生成
    #[tokio::test]
    async fn test_dual_mode_always_regenerates_with_answer_model() {
        let function_call = MockLlmClient::new().push_content("这看起来像一个完整回答。");
        let answer = MockLlmClient::new().push_answer(Ok("回答模型的权威回答。".to_string()));

        let agent = SearchAgent::builder()
            .function_call_llm(Arc::new(function_call))
            .answer_llm(Arc::new(answer))
            .register_tool(WebSearchTool::new(FakeSearchProvider::empty(), 200))
            .build()
            .unwrap();

        let steps = collect_steps(&agent, "问题").await;

        // function-call 模型的文本只作为推理展示，最终回答来自回答模型
        assert!(steps
            .iter()
            .any(|s| s.kind == StepKind::Reasoning && s.content.contains("完整回答")));
        assert_eq!(final_text(&steps), "回答模型的权威回答。");
        assert_eq!(count(&steps, StepKind::Error), 0);
    }

    /// 步骤因果顺序：action 先于对应 observation，observation 先于 final
    #[tokio::test]
    async fn test_step_causal_ordering() {
        let function_call = MockLlmClient::new()
            .push_turn(tool_call_turn("web_search", "q"))
            .push_content("完成 [1]。");

        let agent = SearchAgent::builder()
            .function_call_llm(Arc::new(function_call))
            .register_tool(WebSearchTool::new(
                FakeSearchProvider::new(vec![batch("丁", "d.com", 1)]),
                200,
            ))
            .build()
            .unwrap();

        let steps = collect_steps(&agent, "问题").await;

        let action = steps.iter().position(|s| s.kind == StepKind::Action).unwrap();
        let observation = steps
            .iter()
            .position(|s| s.kind == StepKind::Observation)
            .unwrap();
        let first_final = steps.iter().position(|s| s.kind == StepKind::Final).unwrap();
        assert!(action < observation);
        assert!(observation < first_final);
    }
}
