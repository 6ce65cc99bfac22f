//! 运行时装配
//!
//! 两个相互隔离的执行上下文只通过 [`crate::channel`] 通信：
//!
//! - [`Coordinator`]：可跨线程，负责持久化、批次分类和开关广播
//! - [`ScraperContext`]：必须在 `LocalSet` 中运行，负责路由、提取和标注

pub mod coordinator;
pub mod scraper;

use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::channel::{CoordinatorPort, ScraperPort};
use crate::classify::{ClassificationBatcher, HttpClassifier};
use crate::config::BaitblockConfig;
use crate::dom::{ChangeSource, PageDocument};
use crate::error::BaitblockResult;
use crate::extract::{ChatExtractor, RetryPolicy};
use crate::preference::{
    JsonFilePreferenceStore, MemoryPreferenceStore, PreferenceGate, PreferenceStore,
};
use crate::router::{RouteCallback, StreamContext};
use crate::sink::PostgrestSink;

pub use coordinator::Coordinator;
pub use scraper::ScraperContext;

/// 把路由回调转换为 [`ScraperContext`] 消费的通道
pub fn route_feed() -> (RouteCallback, mpsc::UnboundedReceiver<Option<StreamContext>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: RouteCallback = Rc::new(move |context: Option<StreamContext>| {
        if tx.send(context).is_err() {
            tracing::debug!("抓取上下文已停止，丢弃路由变化");
        }
    });
    (callback, rx)
}

/// 打开偏好存储：配置了路径时使用 JSON 文件，否则只在内存中
pub fn open_preferences(config: &BaitblockConfig) -> PreferenceGate {
    let store: Arc<dyn PreferenceStore> = match &config.preference_path {
        Some(path) => Arc::new(JsonFilePreferenceStore::new(path)),
        None => Arc::new(MemoryPreferenceStore::new()),
    };
    PreferenceGate::load_with_default(store, config.capture_default)
}

/// 按配置装配协调上下文
pub fn coordinator_from_config(
    config: &BaitblockConfig,
    port: CoordinatorPort,
    gate: PreferenceGate,
) -> BaitblockResult<Coordinator> {
    let classifier =
        HttpClassifier::with_timeout(&config.classifier_url, config.request_timeout())?;
    let batcher = ClassificationBatcher::from_config(config, Arc::new(classifier));

    let mut coordinator =
        Coordinator::new(port, batcher, gate).with_flush_interval(config.flush_interval());
    match PostgrestSink::from_config(&config.sink)? {
        Some(sink) => {
            tracing::info!("消息持久化到 {}", sink.endpoint());
            coordinator = coordinator.with_sink(Arc::new(sink));
        }
        None => tracing::debug!("未配置持久化"),
    }
    Ok(coordinator)
}

/// 按配置装配抓取上下文，返回的回调交给 [`crate::router::PageRouter`]
///
/// `gate` 是协调上下文开关的镜像。
pub fn scraper_from_config<D>(
    config: &BaitblockConfig,
    document: D,
    gate: PreferenceGate,
    port: ScraperPort,
) -> (ScraperContext<D>, RouteCallback)
where
    D: PageDocument + ChangeSource + Clone + 'static,
{
    let extractor = ChatExtractor::new(document, gate.clone())
        .with_retry_policy(RetryPolicy::from_config(config));
    let (on_route, routes) = route_feed();
    (ScraperContext::new(extractor, gate, port, routes), on_route)
}
