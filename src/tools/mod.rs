//! 工具层：注册表、执行器（超时 + 审计）、结果类型与 Web 搜索

pub mod executor;
pub mod registry;
pub mod result;
pub mod search;

pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry};
pub use result::{SearchBundle, SearchHit, ToolResult};
pub use search::{SearchBackend, TavilyBackend, WebSearchTool};
