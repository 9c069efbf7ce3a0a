//! 全局引用管理器
//!
//! 为一个对话轮次内的多轮检索结果分配全局唯一、单调递增的引用编号；
//! 把回答中的 [n] 改写为可点击链接，并按检索轮次生成参考文献列表。
//! 每个对话轮次各持有一个实例，轮次开始时 reset，绝不跨并发运行共享。

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use crate::search::{extract_domain, SearchResult};

/// 引用摘要的最大字符数
const SNIPPET_CHARS: usize = 200;

/// 单条引用记录（按全局编号存于 map）
#[derive(Clone, Debug)]
pub struct CitationRecord {
    pub url: String,
    pub title: String,
    pub domain: String,
    pub snippet: String,
    pub query: String,
    pub round_number: u32,
}

/// 一轮检索及其占用的编号区间
#[derive(Clone, Debug)]
pub struct SearchRound {
    pub round_number: u32,
    pub query: String,
    pub start_number: u32,
    pub end_number: u32,
}

/// 全局引用管理器：单调计数器 + 编号映射 + 轮次列表
pub struct CitationManager {
    current_number: u32,
    citation_map: BTreeMap<u32, CitationRecord>,
    rounds: Vec<SearchRound>,
    citation_pattern: Regex,
}

impl Default for CitationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CitationManager {
    pub fn new() -> Self {
        Self {
            current_number: 1,
            citation_map: BTreeMap::new(),
            rounds: Vec::new(),
            citation_pattern: Regex::new(r"\[(\d+)\]").expect("static pattern"),
        }
    }

    /// 登记一轮检索结果并分配连续编号，返回 (start, end)。
    /// 空结果返回 (0, 0)：不推进计数器、不建轮次。
    pub fn add_results(&mut self, results: &[SearchResult], query: &str) -> (u32, u32) {
        if results.is_empty() {
            tracing::warn!(query = %query, "空检索结果集，跳过编号");
            return (0, 0);
        }

        let start_number = self.current_number;
        let round_number = self.rounds.len() as u32 + 1;

        for result in results {
            let snippet = if result.content.chars().count() > SNIPPET_CHARS {
                format!(
                    "{}...",
                    result.content.chars().take(SNIPPET_CHARS).collect::<String>()
                )
            } else {
                result.content.clone()
            };
            self.citation_map.insert(
                self.current_number,
                CitationRecord {
                    url: result.url.clone(),
                    title: result.title.clone(),
                    domain: extract_domain(&result.url),
                    snippet,
                    query: query.to_string(),
                    round_number,
                },
            );
            self.current_number += 1;
        }

        let end_number = self.current_number - 1;
        self.rounds.push(SearchRound {
            round_number,
            query: query.to_string(),
            start_number,
            end_number,
        });

        tracing::info!(
            round = round_number,
            count = results.len(),
            range = %format!("[{}-{}]", start_number, end_number),
            "登记检索结果"
        );

        (start_number, end_number)
    }

    /// 把文本中已登记的 [n] 改写为 [[n]](url)；未登记的编号原样保留
    pub fn resolve(&self, text: &str) -> String {
        if self.citation_map.is_empty() {
            return text.to_string();
        }
        self.citation_pattern
            .replace_all(text, |caps: &regex::Captures| {
                let raw = &caps[0];
                match caps[1].parse::<u32>().ok().and_then(|n| {
                    self.citation_map.get(&n).map(|record| (n, record))
                }) {
                    Some((n, record)) => format!("[[{}]]({})", n, record.url),
                    None => raw.to_string(),
                }
            })
            .into_owned()
    }

    /// 提取文本中实际使用且已登记的引用编号
    pub fn used_numbers(&self, text: &str) -> BTreeSet<u32> {
        self.citation_pattern
            .captures_iter(text)
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .filter(|n| self.citation_map.contains_key(n))
            .collect()
    }

    /// 按轮次分组生成参考文献列表；没有被使用的轮次整体省略，
    /// used_numbers 为空时返回空串。输出格式是对外契约，不可改动。
    pub fn format_reference_list(&self, used_numbers: &BTreeSet<u32>) -> String {
        let used: BTreeSet<u32> = used_numbers
            .iter()
            .copied()
            .filter(|n| self.citation_map.contains_key(n))
            .collect();
        if used.is_empty() {
            return String::new();
        }

        let mut text = String::from("\n\n---\n**References:**\n");
        for round in &self.rounds {
            let round_used: Vec<u32> = (round.start_number..=round.end_number)
                .filter(|n| used.contains(n))
                .collect();
            if round_used.is_empty() {
                continue;
            }
            text.push_str(&format!(
                "\n**Round {}** (query: {})\n",
                round.round_number, round.query
            ));
            for n in round_used {
                let record = &self.citation_map[&n];
                text.push_str(&format!(
                    "{}. [{}]({}) — {}\n",
                    n, record.title, record.url, record.domain
                ));
            }
        }
        text
    }

    /// 改写引用并在结尾追加参考文献列表
    pub fn process_answer(&self, text: &str) -> String {
        let converted = self.resolve(text);
        let used = self.used_numbers(text);
        format!("{}{}", converted, self.format_reference_list(&used))
    }

    pub fn get(&self, number: u32) -> Option<&CitationRecord> {
        self.citation_map.get(&number)
    }

    pub fn rounds(&self) -> &[SearchRound] {
        &self.rounds
    }

    pub fn total_citations(&self) -> usize {
        self.citation_map.len()
    }

    /// 下一个可用编号（登记前读取，可用于日志）
    pub fn next_number(&self) -> u32 {
        self.current_number
    }

    /// 清空计数器、映射与轮次；每个新对话轮次开始时调用一次，绝不在轮次中途调用
    pub fn reset(&mut self) {
        self.rounds.clear();
        self.citation_map.clear();
        self.current_number = 1;
        tracing::info!("重置全局引用管理器");
    }
}
