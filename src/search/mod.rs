//! 检索层：结果模型、SearXNG 客户端与格式化

pub mod formatter;
pub mod models;
pub mod searxng;

pub use formatter::SearchResultFormatter;
pub use models::{extract_domain, SearchResponse, SearchResult};
pub use searxng::{SearchProvider, SearxngClient};
