//! 协调上下文
//!
//! 接收抓取上下文的消息，持久化并缓冲；按固定节奏换出批次并在后台任务中
//! 调用分类器，把被标记的索引连同所属直播间发回抓取上下文。偏好变化转发为
//! `feedToggle`。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::channel::{
    dispatch_to_coordinator, CoordinatorHandler, CoordinatorMessage, CoordinatorPort, PortSender,
};
use crate::classify::ClassificationBatcher;
use crate::config::constants;
use crate::error::{helpers, BaitblockResult};
use crate::extract::ChatMessage;
use crate::preference::PreferenceGate;
use crate::sink::{MessageRow, MessageSink};

struct CoordinatorState {
    batcher: ClassificationBatcher,
    gate: PreferenceGate,
    sink: Option<Arc<dyn MessageSink>>,
}

impl CoordinatorHandler for CoordinatorState {
    fn on_new_chat_message(&mut self, message: ChatMessage) {
        if !self.gate.is_enabled() {
            tracing::debug!("抓取已关闭，忽略消息 {}", message.id);
            return;
        }

        if let Some(sink) = &self.sink {
            let sink = sink.clone();
            let row = MessageRow::from_message(&message, Utc::now());
            tokio::spawn(async move {
                if let Err(e) = sink.store(&row).await {
                    helpers::log_error(&e);
                }
            });
        }

        self.batcher.push(message);
    }
}

impl CoordinatorState {
    fn tick(&mut self, outbound: &PortSender<CoordinatorMessage>) {
        let job = match self.batcher.flush() {
            Some(job) => job,
            None => return,
        };

        tracing::debug!("换出 {} 条消息", job.len());
        let outbound = outbound.clone();
        tokio::spawn(async move {
            for batch in job.run_by_stream().await {
                // 抓取上下文已关闭时 send 会记录错误
                let _ = outbound.send(CoordinatorMessage::PhishingIndexes {
                    stream: batch.stream,
                    indexes: batch.ids,
                });
            }
        });
    }
}

/// 协调上下文
pub struct Coordinator {
    port: CoordinatorPort,
    state: CoordinatorState,
    flush_interval: Duration,
}

impl Coordinator {
    pub fn new(port: CoordinatorPort, batcher: ClassificationBatcher, gate: PreferenceGate) -> Self {
        Self {
            port,
            state: CoordinatorState {
                batcher,
                gate,
                sink: None,
            },
            flush_interval: constants::DEFAULT_FLUSH_INTERVAL,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.state.sink = Some(sink);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// 运行直到抓取上下文断开
    pub async fn run(self) -> BaitblockResult<()> {
        let Coordinator {
            port,
            mut state,
            flush_interval,
        } = self;
        let (outbound, mut inbox) = port.split();

        let start = tokio::time::Instant::now() + flush_interval;
        let mut ticker = tokio::time::interval_at(start, flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut preference = state.gate.watch();
        let mut preference_open = true;

        tracing::info!("协调上下文启动，批次间隔 {:?}", flush_interval);
        loop {
            tokio::select! {
                message = inbox.recv() => match message {
                    Some(message) => dispatch_to_coordinator(&mut state, message),
                    None => {
                        tracing::info!("抓取上下文已断开");
                        break;
                    }
                },
                _ = ticker.tick() => state.tick(&outbound),
                changed = preference.changed(), if preference_open => match changed {
                    Ok(()) => {
                        let enabled = *preference.borrow_and_update();
                        let _ = outbound.send(CoordinatorMessage::FeedToggle { enabled });
                    }
                    Err(_) => preference_open = false,
                },
            }
        }

        Ok(())
    }
}
