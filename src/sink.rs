//! 消息持久化
//!
//! 对管道来说只写不读：每条消息一行，字段为主播标识、用户名、文本、
//! 表情标识、时间戳和回复标记。写入失败记录日志后丢弃。

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{constants, SinkConfig};
use crate::error::{BaitblockError, BaitblockResult};
use crate::extract::ChatMessage;

/// 持久化的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    pub stream: String,
    pub username: Option<String>,
    pub text: Option<String>,
    pub emote_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub is_reply: bool,
}

impl MessageRow {
    /// 消息没有发送时间时使用接收时间
    pub fn from_message(message: &ChatMessage, received_at: DateTime<Utc>) -> Self {
        Self {
            stream: message.stream.stream_identity.clone(),
            username: message.username.clone(),
            text: message.text.clone(),
            emote_id: message.emote_id.clone(),
            timestamp: message.sent_at.unwrap_or(received_at),
            is_reply: message.is_reply,
        }
    }
}

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn store(&self, row: &MessageRow) -> BaitblockResult<()>;
}

/// 托管数据库的 REST 接口
#[derive(Debug, Clone)]
pub struct PostgrestSink {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl PostgrestSink {
    pub fn new(base_url: &str, table: &str, api_key: &str, timeout: Duration) -> BaitblockResult<Self> {
        let endpoint = Url::parse(&format!(
            "{}/rest/v1/{}",
            base_url.trim_end_matches('/'),
            table
        ))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
        })
    }

    /// 地址或密钥缺失时返回 `None`
    pub fn from_config(config: &SinkConfig) -> BaitblockResult<Option<Self>> {
        match (&config.url, &config.api_key) {
            (Some(url), Some(key)) => Ok(Some(Self::new(
                url,
                &config.table,
                key,
                constants::DEFAULT_REQUEST_TIMEOUT,
            )?)),
            _ => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl MessageSink for PostgrestSink {
    async fn store(&self, row: &MessageRow) -> BaitblockResult<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .json(&[row])
            .send()
            .await
            .map_err(|e| BaitblockError::PersistenceError(format!("写入请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BaitblockError::PersistenceError(format!(
                "写入失败 {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

/// 内存持久化，测试用
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<MessageRow>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<MessageRow> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn store(&self, row: &MessageRow) -> BaitblockResult<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|e| BaitblockError::PersistenceError(format!("锁已中毒: {}", e)))?;
        rows.push(row.clone());
        Ok(())
    }
}
