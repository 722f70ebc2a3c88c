//! 会话记忆：对话历史条目（仅内存，持久化与剪枝由调用方负责）

pub mod conversation;

pub use conversation::{dialogue_turns, Message, Role};
