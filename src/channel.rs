//! 上下文之间的消息通道
//!
//! 抓取上下文与协调上下文互相隔离，只通过异步消息通信。两个方向的消息各是
//! 一个封闭的枚举，线上格式为 `{"type": "<tag>", "payload": ...}`：
//!
//! | 消息 | 方向 | 载荷 |
//! |---|---|---|
//! | `newChatMessage` | 抓取 → 协调 | [`ChatMessage`] |
//! | `feedToggle` | 协调 → 抓取 | `{"enabled": bool}` |
//! | `phishingIndexes` | 协调 → 抓取 | `{"streamContext": ..., "indexes": [...]}` |
//!
//! `phishingIndexes` 带着被分类消息所属的直播间，抓取上下文只在该直播间的
//! 会话仍然活动时应用。

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{helpers, BaitblockError, BaitblockResult};
use crate::extract::ChatMessage;
use crate::router::StreamContext;

/// 抓取上下文发出的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ScraperMessage {
    NewChatMessage(ChatMessage),
}

/// 协调上下文发出的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum CoordinatorMessage {
    FeedToggle {
        enabled: bool,
    },
    PhishingIndexes {
        #[serde(rename = "streamContext")]
        stream: StreamContext,
        indexes: Vec<String>,
    },
}

/// 编码为线上 JSON
pub fn encode<T: Serialize>(message: &T) -> BaitblockResult<String> {
    Ok(serde_json::to_string(message)?)
}

/// 从线上 JSON 解码，未知的 `type` 是错误
pub fn decode<T: DeserializeOwned>(raw: &str) -> BaitblockResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| BaitblockError::SerializationError(format!("无法解码消息: {}", e)))
}

/// 端口的发送半边
pub struct PortSender<T> {
    tx: mpsc::UnboundedSender<T>,
    name: &'static str,
}

impl<T> Clone for PortSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name,
        }
    }
}

impl<T: Debug> PortSender<T> {
    pub fn send(&self, message: T) -> BaitblockResult<()> {
        self.tx.send(message).map_err(|e| {
            let err = BaitblockError::ChannelClosed(format!("{}: {:?}", self.name, e.0));
            helpers::log_error(&err);
            err
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 端口的接收半边
pub struct PortReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> PortReceiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// 一端的收发端口
pub struct Port<Out, In> {
    sender: PortSender<Out>,
    receiver: PortReceiver<In>,
}

impl<Out: Debug, In> Port<Out, In> {
    pub fn send(&self, message: Out) -> BaitblockResult<()> {
        self.sender.send(message)
    }

    pub async fn recv(&mut self) -> Option<In> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<In> {
        self.receiver.try_recv()
    }

    pub fn sender(&self) -> PortSender<Out> {
        self.sender.clone()
    }

    pub fn split(self) -> (PortSender<Out>, PortReceiver<In>) {
        (self.sender, self.receiver)
    }
}

pub type ScraperPort = Port<ScraperMessage, CoordinatorMessage>;
pub type CoordinatorPort = Port<CoordinatorMessage, ScraperMessage>;

/// 创建一对相连的端口
pub fn message_channel() -> (ScraperPort, CoordinatorPort) {
    let (to_coordinator, from_scraper) = mpsc::unbounded_channel();
    let (to_scraper, from_coordinator) = mpsc::unbounded_channel();

    let scraper = Port {
        sender: PortSender {
            tx: to_coordinator,
            name: "scraper→coordinator",
        },
        receiver: PortReceiver {
            rx: from_coordinator,
        },
    };
    let coordinator = Port {
        sender: PortSender {
            tx: to_scraper,
            name: "coordinator→scraper",
        },
        receiver: PortReceiver { rx: from_scraper },
    };
    (scraper, coordinator)
}

/// 抓取上下文对协调消息的处理
pub trait ScraperHandler {
    fn on_feed_toggle(&mut self, enabled: bool);
    fn on_phishing_indexes(&mut self, stream: StreamContext, ids: Vec<String>);
}

/// 协调上下文对抓取消息的处理
pub trait CoordinatorHandler {
    fn on_new_chat_message(&mut self, message: ChatMessage);
}

pub fn dispatch_to_scraper<H: ScraperHandler + ?Sized>(handler: &mut H, message: CoordinatorMessage) {
    match message {
        CoordinatorMessage::FeedToggle { enabled } => handler.on_feed_toggle(enabled),
        CoordinatorMessage::PhishingIndexes { stream, indexes } => {
            handler.on_phishing_indexes(stream, indexes)
        }
    }
}

pub fn dispatch_to_coordinator<H: CoordinatorHandler + ?Sized>(
    handler: &mut H,
    message: ScraperMessage,
) {
    match message {
        ScraperMessage::NewChatMessage(chat) => handler.on_new_chat_message(chat),
    }
}
