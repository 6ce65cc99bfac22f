use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use markup5ever_rcdom::Handle;

use super::layout::ChatLayout;
use super::parser::parse_message;
use super::search::{search_container, RetryPolicy};
use super::ChatMessage;
use crate::dom::node::{find_all, get_node_attr, is_element};
use crate::dom::{ChangeSource, MutationRecord, PageDocument, Subscription};
use crate::error::BaitblockResult;
use crate::preference::PreferenceGate;
use crate::router::StreamContext;

pub type MessageCallback = Rc<dyn Fn(ChatMessage)>;

/// 单次会话的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub emitted: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub suppressed: usize,
}

struct SessionState {
    layout: &'static ChatLayout,
    stream: StreamContext,
    gate: PreferenceGate,
    on_message: MessageCallback,
    seen: RefCell<HashSet<String>>,
    stats: Cell<ExtractionStats>,
    stopped: Cell<bool>,
}

impl SessionState {
    fn bump(&self, update: impl FnOnce(&mut ExtractionStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }

    fn handle_batch(&self, records: &[MutationRecord]) {
        for record in records {
            for node in &record.added_nodes {
                if self.stopped.get() {
                    return;
                }
                if is_element(node) {
                    self.handle_added(node);
                }
            }
        }
    }

    /// 新插入的元素本身不是消息时，扫描其中的消息后代
    fn handle_added(&self, node: &Handle) {
        let index_attr = self.layout.index_attr;
        if get_node_attr(node, index_attr).is_some() {
            self.handle_candidate(node);
            return;
        }
        for candidate in find_all(node, &|n| get_node_attr(n, index_attr).is_some()) {
            self.handle_candidate(&candidate);
        }
    }

    fn handle_candidate(&self, element: &Handle) {
        if self.stopped.get() {
            return;
        }

        if let Some(id) = get_node_attr(element, self.layout.index_attr) {
            if self.seen.borrow().contains(&id) {
                self.bump(|s| s.duplicates += 1);
                return;
            }
        }

        let message = match parse_message(self.layout, element, &self.stream) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("跳过元素: {}", e);
                self.bump(|s| s.skipped += 1);
                return;
            }
        };

        self.seen.borrow_mut().insert(message.id.clone());

        if self.gate.is_enabled() {
            self.bump(|s| s.emitted += 1);
            (self.on_message)(message);
        } else {
            self.bump(|s| s.suppressed += 1);
        }
    }
}

/// 聊天消息提取器
#[derive(Clone)]
pub struct ChatExtractor<D> {
    document: D,
    gate: PreferenceGate,
    policy: RetryPolicy,
}

impl<D> ChatExtractor<D>
where
    D: PageDocument + ChangeSource,
{
    pub fn new(document: D, gate: PreferenceGate) -> Self {
        Self {
            document,
            gate,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    /// 开始提取
    ///
    /// 先查找容器（可能需要多次重试），然后按文档顺序发出已有消息，
    /// 最后在容器子树上订阅变更。开关关闭时消息只记为已见，不发出。
    pub async fn start(
        &self,
        context: StreamContext,
        on_message: MessageCallback,
    ) -> BaitblockResult<ExtractionSession> {
        let layout = ChatLayout::for_platform(context.platform);
        let container = search_container(&self.document, layout, self.policy).await?;

        let state = Rc::new(SessionState {
            layout,
            stream: context.clone(),
            gate: self.gate.clone(),
            on_message,
            seen: RefCell::new(HashSet::new()),
            stats: Cell::new(ExtractionStats::default()),
            stopped: Cell::new(false),
        });

        for element in layout.message_elements(&container) {
            state.handle_candidate(&element);
        }

        let observer_state = state.clone();
        let subscription = self.document.subscribe(
            &container,
            Box::new(move |records: &[MutationRecord]| {
                observer_state.handle_batch(records)
            }),
        );

        tracing::info!(
            "开始提取 {}，已有消息 {} 条",
            context,
            state.stats.get().emitted
        );

        Ok(ExtractionSession {
            container,
            context,
            layout,
            state,
            subscription: Some(subscription),
        })
    }
}

/// 提取会话，丢弃即停止
pub struct ExtractionSession {
    container: Handle,
    context: StreamContext,
    layout: &'static ChatLayout,
    state: Rc<SessionState>,
    subscription: Option<Subscription>,
}

impl ExtractionSession {
    pub fn container(&self) -> &Handle {
        &self.container
    }

    pub fn context(&self) -> &StreamContext {
        &self.context
    }

    pub fn layout(&self) -> &'static ChatLayout {
        self.layout
    }

    pub fn stats(&self) -> ExtractionStats {
        self.state.stats.get()
    }

    pub fn seen_count(&self) -> usize {
        self.state.seen.borrow().len()
    }

    pub fn is_active(&self) -> bool {
        !self.state.stopped.get()
    }

    /// 取消订阅并停止后续发出
    pub fn stop(&mut self) {
        if self.state.stopped.replace(true) {
            return;
        }
        self.subscription.take();
        tracing::info!("停止提取 {}: {:?}", self.context, self.state.stats.get());
    }
}

impl Drop for ExtractionSession {
    fn drop(&mut self) {
        self.stop();
    }
}
