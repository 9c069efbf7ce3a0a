//! 工具层：trait、注册表、调用适配器与内置工具

pub mod invoker;
pub mod registry;
pub mod web_search;

pub use invoker::{ToolInvoker, ToolResult};
pub use registry::{Tool, ToolOutput, ToolRegistry};
pub use web_search::{WebSearchTool, WEB_SEARCH_TOOL_NAME};
