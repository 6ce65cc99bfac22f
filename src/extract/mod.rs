//! 聊天消息提取
//!
//! 提取流程分为四部分：
//!
//! - [`layout`]: 每个平台的聊天区结构（容器、索引属性、主体层级）
//! - [`parser`]: 把单个消息元素解析为 [`ChatMessage`]，结构不符时跳过
//! - [`search`]: 容器查找状态机 `{Searching, Found, GaveUp}`
//! - [`extractor`]: 会话管理，首次提取、变更订阅和按索引去重
//!
//! 同一会话内每个稳定索引最多发出一次，即使变更通知重复投递同一节点。

pub mod extractor;
pub mod layout;
pub mod parser;
pub mod search;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::router::StreamContext;

pub use extractor::{ChatExtractor, ExtractionSession, ExtractionStats, MessageCallback};
pub use layout::{ChatLayout, ContainerLocator, KICK_LAYOUT, TWITCH_LAYOUT};
pub use parser::parse_message;
pub use search::{search_container, ContainerSearch, RetryPolicy};

/// 归一化的聊天消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// 页面分配的稳定索引
    pub id: String,
    pub username: Option<String>,
    pub text: Option<String>,
    pub emote_id: Option<String>,
    pub is_reply: bool,
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(rename = "streamContext")]
    pub stream: StreamContext,
}

impl ChatMessage {
    pub fn has_text(&self) -> bool {
        self.text.as_deref().map_or(false, |text| !text.is_empty())
    }
}
