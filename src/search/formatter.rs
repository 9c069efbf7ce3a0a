//! 检索结果格式化
//!
//! 把一轮检索结果渲染成带全局编号的观察文本，供模型在回答中用 [数字] 引用。
//! 编号从 start_number 开始（由引用管理器分配），跨轮连续。

use crate::search::SearchResult;

/// 结果格式化器：控制摘要截断长度
pub struct SearchResultFormatter {
    max_content_chars: usize,
}

impl Default for SearchResultFormatter {
    fn default() -> Self {
        Self {
            max_content_chars: 200,
        }
    }
}

impl SearchResultFormatter {
    pub fn new(max_content_chars: usize) -> Self {
        Self { max_content_chars }
    }

    /// 渲染一轮结果；start_number 为该轮首条的全局编号
    pub fn format_for_model(&self, results: &[SearchResult], start_number: u32) -> String {
        let mut parts = vec!["搜索结果:\n".to_string()];

        for (idx, result) in results.iter().enumerate() {
            let number = start_number + idx as u32;
            let content = truncate_chars(&result.content, self.max_content_chars);
            parts.push(format!(
                "[{}] {}\n来源: {}\n摘要: {}\n",
                number, result.title, result.url, content
            ));
        }

        parts.push(format!(
            "\n找到 {} 条搜索结果。你可以使用 [数字] 格式在回答中引用这些来源。",
            results.len()
        ));

        parts.join("\n")
    }

    /// 无结果时回给模型的提示
    pub fn format_no_results(&self) -> String {
        "未找到相关搜索结果。请尝试使用不同的关键词或基于已有知识回答。".to_string()
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}
