//! 提示词模板
//!
//! 工具调用阶段与回答阶段的 system/user 提示词；回答阶段的检索结果
//! 已带全局引用编号，模型按 [数字] 引用即可。

use crate::llm::Message;

/// 工具调用阶段的 system 提示词
pub const AGENT_SYSTEM_PROMPT: &str = "你是一个有用的 AI 助手，可以使用工具来帮助回答用户的问题。

重要规则:
1. 当需要最新信息或实时数据时，使用 web_search 工具
2. 当工具返回结果后，仔细分析是否足够回答问题
3. 如果信息不足，可以再次使用工具搜索更多信息
4. 在最终回答中，使用 [数字] 格式引用搜索结果的来源
5. 最终回答应该准确、完整、有引用";

/// 回答阶段的 system 提示词
pub const ANSWER_SYSTEM_PROMPT: &str = "你是一个有用的 AI 助手。基于以下搜索结果，为用户的问题提供一个准确、完整、有引用的回答。

重要规则:
1. 仔细分析搜索结果，提取相关信息
2. 在回答中使用 [数字] 格式引用搜索结果来源
3. 如果搜索结果不足以回答问题，如实说明
4. 回答应该准确、完整、有条理";

/// 无任何检索结果时的直答指示
pub const DIRECT_ANSWER_INSTRUCTION: &str =
    "没有检索到任何搜索结果，请基于你已有的知识直接回答用户的问题。如果不确定，请如实说明。";

/// 构造回答阶段的消息列表：用户问题 + 各轮检索结果（或直答指示）
pub fn build_answer_messages(user_input: &str, tool_results: &[String]) -> Vec<Message> {
    let user_prompt = if tool_results.is_empty() {
        format!("用户问题: {}\n\n{}", user_input, DIRECT_ANSWER_INSTRUCTION)
    } else {
        let context = tool_results
            .iter()
            .enumerate()
            .map(|(i, result)| format!("[第 {} 轮检索]\n{}", i + 1, result))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "用户问题: {}\n\n搜索结果:\n{}\n\n请基于以上搜索结果回答用户的问题。",
            user_input, context
        )
    };

    vec![
        Message::system(ANSWER_SYSTEM_PROMPT),
        Message::user(user_prompt),
    ]
}
