//! # Baitblock Library
//!
//! 从直播页面实时提取聊天消息，批量送往外部分类服务，并在页面上标记
//! 被判定为钓鱼的消息。
//!
//! ## 模块组织
//!
//! - `router` - 页面路由：识别当前直播间并监听地址变化
//! - `extract` - 聊天提取：定位容器、解析消息结构、去重
//! - `channel` - 两个执行上下文之间的消息协议
//! - `classify` - 信号过滤、分类客户端和批处理器
//! - `annotate` - 在页面上标记被判定的消息
//! - `preference` - 抓取开关及其持久化
//! - `sink` - 消息持久化
//! - `runtime` - 协调上下文与抓取上下文
//! - `dom` - DOM 工具与页面宿主模拟
//! - `config` / `env` / `error` - 配置、环境变量和错误处理

pub mod annotate;
pub mod channel;
pub mod classify;
pub mod config;
pub mod dom;
pub mod env;
pub mod error;
pub mod extract;
pub mod preference;
pub mod router;
pub mod runtime;
pub mod sink;

// Re-export commonly used items for convenience
pub use annotate::{AnnotationReport, ResultAnnotator};
pub use channel::{message_channel, CoordinatorMessage, ScraperMessage};
pub use classify::{ClassificationBatcher, Classifier, HttpClassifier, SignalFilter, Verdict};
pub use config::{BaitblockConfig, ConfigManager};
pub use dom::LiveDocument;
pub use error::{BaitblockError, BaitblockResult};
pub use extract::{ChatExtractor, ChatMessage, ExtractionSession};
pub use preference::{PreferenceGate, PreferenceStore};
pub use router::{classify_url, PageRouter, Platform, StreamContext};
pub use runtime::{Coordinator, ScraperContext};
pub use sink::{MessageRow, MessageSink};
