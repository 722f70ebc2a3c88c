//! 对话历史条目
//!
//! message_history 只保存 user / assistant 两种角色；System 仅在拼装 LLM 请求时出现，不进入历史。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn is_dialogue(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant)
    }
}

/// 过滤出可作为对话轮次回放给 LLM 的消息（丢弃混入历史的 System 消息）
pub fn dialogue_turns(history: &[Message]) -> impl Iterator<Item = &Message> {
    history.iter().filter(|m| m.is_dialogue())
}
