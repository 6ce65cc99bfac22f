//! 分类服务客户端
//!
//! HTTP 约定：`POST {base}/label_messages`，请求体 `{"messages": [..]}`，
//! 响应是与请求同序的 `[{"label": ..}, ..]`，允许额外字段。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::constants;
use crate::error::{BaitblockError, BaitblockResult};

/// 单条消息的分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phishing_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benign_score: Option<f64>,
}

impl Verdict {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            phishing_score: None,
            benign_score: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct LabelRequest<'a> {
    messages: &'a [String],
}

/// 外部分类器
#[async_trait]
pub trait Classifier: Send + Sync {
    /// 返回与 `texts` 同序的结果；条目可以少于输入
    async fn label(&self, texts: &[String]) -> BaitblockResult<Vec<Verdict>>;
}

/// 基于 HTTP 的分类器
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: Client,
    endpoint: Url,
}

impl HttpClassifier {
    pub fn new(base_url: &str) -> BaitblockResult<Self> {
        Self::with_timeout(base_url, constants::DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> BaitblockResult<Self> {
        let endpoint = Url::parse(&format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            constants::CLASSIFY_PATH
        ))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(BaitblockError::ConfigError(format!(
                "分类服务地址必须是 http(s): {}",
                base_url
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn label(&self, texts: &[String]) -> BaitblockResult<Vec<Verdict>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!("发送 {} 条消息到 {}", texts.len(), self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&LabelRequest { messages: texts })
            .send()
            .await
            .map_err(|e| BaitblockError::from(e).with_context(&self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BaitblockError::ClassifierError(format!(
                "{} 返回状态 {}",
                self.endpoint, status
            )));
        }

        let verdicts: Vec<Verdict> = response.json().await.map_err(|e| {
            BaitblockError::ClassifierError(format!("无法解析分类结果: {}", e))
        })?;

        if verdicts.len() != texts.len() {
            tracing::warn!(
                "分类结果数量不匹配: 发送 {}，收到 {}",
                texts.len(),
                verdicts.len()
            );
        }
        Ok(verdicts)
    }
}
