//! 抓取上下文
//!
//! 单线程运行（`LocalSet`）。每次路由变化都会停止旧会话，并为新的直播间
//! 启动提取；提取出的消息以 `newChatMessage` 发往协调上下文。收到的
//! `feedToggle` 只更新本上下文的开关镜像，`phishingIndexes` 只有属于当前
//! 会话的直播间时才交给标注器。

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use tokio::sync::mpsc;

use crate::annotate::ResultAnnotator;
use crate::channel::{dispatch_to_scraper, ScraperHandler, ScraperMessage, ScraperPort};
use crate::dom::{ChangeSource, PageDocument};
use crate::error::{helpers, BaitblockResult};
use crate::extract::{ChatExtractor, ChatMessage, ExtractionSession};
use crate::preference::PreferenceGate;
use crate::router::StreamContext;

type PendingStart = Pin<Box<dyn Future<Output = BaitblockResult<ExtractionSession>>>>;

async fn wait_for_start(pending: &mut Option<PendingStart>) -> BaitblockResult<ExtractionSession> {
    match pending {
        Some(start) => start.await,
        None => std::future::pending().await,
    }
}

/// 协调消息在抓取上下文中的处理
struct ScraperDispatch<'a, D> {
    gate: &'a PreferenceGate,
    document: &'a D,
    session: Option<&'a ExtractionSession>,
}

impl<D: PageDocument> ScraperHandler for ScraperDispatch<'_, D> {
    fn on_feed_toggle(&mut self, enabled: bool) {
        self.gate.apply_remote(enabled);
    }

    fn on_phishing_indexes(&mut self, stream: StreamContext, ids: Vec<String>) {
        match self.session {
            Some(session) if session.is_active() && session.context() == &stream => {
                let report = ResultAnnotator::new(session.layout()).apply(&self.document.root(), &ids);
                if !report.missing.is_empty() {
                    tracing::debug!("{} 条标记的节点已不存在", report.missing.len());
                }
            }
            _ => tracing::debug!("{} 没有活动会话，忽略 {} 个标记", stream, ids.len()),
        }
    }
}

/// 抓取上下文
pub struct ScraperContext<D> {
    extractor: ChatExtractor<D>,
    gate: PreferenceGate,
    port: ScraperPort,
    routes: mpsc::UnboundedReceiver<Option<StreamContext>>,
}

impl<D> ScraperContext<D>
where
    D: PageDocument + ChangeSource + Clone + 'static,
{
    /// `gate` 必须与 `extractor` 使用的开关是同一个镜像
    pub fn new(
        extractor: ChatExtractor<D>,
        gate: PreferenceGate,
        port: ScraperPort,
        routes: mpsc::UnboundedReceiver<Option<StreamContext>>,
    ) -> Self {
        Self {
            extractor,
            gate,
            port,
            routes,
        }
    }

    /// 运行直到路由来源或协调上下文关闭
    pub async fn run(self) -> BaitblockResult<()> {
        let ScraperContext {
            extractor,
            gate,
            port,
            mut routes,
        } = self;
        let (outbound, mut inbox) = port.split();

        let mut current: Option<StreamContext> = None;
        let mut session: Option<ExtractionSession> = None;
        let mut pending: Option<PendingStart> = None;

        loop {
            tokio::select! {
                route = routes.recv() => {
                    let route = match route {
                        Some(route) => route,
                        None => {
                            tracing::info!("路由来源已关闭");
                            break;
                        }
                    };
                    if route == current {
                        continue;
                    }

                    session = None;
                    pending = None;
                    current = route.clone();

                    match route {
                        Some(context) => {
                            tracing::info!("检测到直播间 {}", context);
                            let extractor = extractor.clone();
                            let sender = outbound.clone();
                            let on_message = Rc::new(move |message: ChatMessage| {
                                let _ = sender.send(ScraperMessage::NewChatMessage(message));
                            });
                            pending = Some(Box::pin(async move {
                                extractor.start(context, on_message).await
                            }));
                        }
                        None => tracing::debug!("当前页面不是直播间"),
                    }
                },
                result = wait_for_start(&mut pending), if pending.is_some() => {
                    pending = None;
                    match result {
                        Ok(started) => session = Some(started),
                        Err(e) => helpers::log_error(&e),
                    }
                },
                message = inbox.recv() => match message {
                    Some(message) => {
                        let mut dispatch = ScraperDispatch {
                            gate: &gate,
                            document: extractor.document(),
                            session: session.as_ref(),
                        };
                        dispatch_to_scraper(&mut dispatch, message);
                    }
                    None => {
                        tracing::info!("协调上下文已断开");
                        break;
                    }
                },
            }
        }

        Ok(())
    }
}
