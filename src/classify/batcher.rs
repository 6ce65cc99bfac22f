//! 分类批次管理器
//!
//! 按固定节奏把缓冲区中的消息送去分类。缓冲区只有一个写者（批次管理器本身），
//! 在每个节拍内同步地换成空缓冲区，之后才开始网络调用：
//! 调用期间到达的消息进入下一批，既不会重复也不会丢失。
//!
//! ## 失败处理
//!
//! 网络错误或响应无法解析时记录日志并丢弃整批，不重试也不重新入队。
//!
//! 换出的批次记住每条消息所属的直播间，[`FlushJob::run_by_stream`] 按直播间
//! 分组返回被标记的索引，迟到的结果因此不会落到后来打开的直播间上。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let mut batcher = ClassificationBatcher::new(Arc::new(HttpClassifier::new(url)?));
//! batcher.push(message);
//! if let Some(job) = batcher.flush() {
//!     let flagged = tokio::spawn(job.run()).await?;
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::client::{Classifier, Verdict};
use super::filter::SignalFilter;
use crate::config::{constants, BaitblockConfig};
use crate::error::{helpers, BaitblockResult};
use crate::extract::ChatMessage;
use crate::router::StreamContext;

/// 批次统计
#[derive(Debug, Default)]
pub struct BatcherStats {
    buffered: AtomicUsize,
    filtered_out: AtomicUsize,
    flushed_batches: AtomicUsize,
    flushed_messages: AtomicUsize,
    flagged: AtomicUsize,
    dropped_batches: AtomicUsize,
}

impl BatcherStats {
    pub fn get_buffered(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }

    pub fn get_filtered_out(&self) -> usize {
        self.filtered_out.load(Ordering::Relaxed)
    }

    pub fn get_flushed_batches(&self) -> usize {
        self.flushed_batches.load(Ordering::Relaxed)
    }

    pub fn get_flushed_messages(&self) -> usize {
        self.flushed_messages.load(Ordering::Relaxed)
    }

    pub fn get_flagged(&self) -> usize {
        self.flagged.load(Ordering::Relaxed)
    }

    pub fn get_dropped_batches(&self) -> usize {
        self.dropped_batches.load(Ordering::Relaxed)
    }
}

/// 待分类条目：消息及其稳定索引
#[derive(Debug, Clone)]
struct PendingEntry {
    message: ChatMessage,
    index: String,
}

/// 分类批次管理器
pub struct ClassificationBatcher {
    pending: Vec<PendingEntry>,
    filter: SignalFilter,
    classifier: Arc<dyn Classifier>,
    positive_label: String,
    stats: Arc<BatcherStats>,
}

impl ClassificationBatcher {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            pending: Vec::new(),
            filter: SignalFilter::default(),
            classifier,
            positive_label: constants::DEFAULT_POSITIVE_LABEL.to_string(),
            stats: Arc::new(BatcherStats::default()),
        }
    }

    pub fn from_config(config: &BaitblockConfig, classifier: Arc<dyn Classifier>) -> Self {
        Self::new(classifier)
            .with_filter(SignalFilter::from_config(config))
            .with_positive_label(config.positive_label.clone())
    }

    pub fn with_filter(mut self, filter: SignalFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_positive_label(mut self, label: impl Into<String>) -> Self {
        self.positive_label = label.into();
        self
    }

    /// 入队，返回是否通过信号过滤
    ///
    /// 没有文本的消息（纯表情）永远不入队。
    pub fn push(&mut self, message: ChatMessage) -> bool {
        let accepted = message
            .text
            .as_deref()
            .map_or(false, |text| self.filter.accepts(text));

        if !accepted {
            self.stats.filtered_out.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("消息 {} 未通过信号过滤", message.id);
            return false;
        }

        self.stats.buffered.fetch_add(1, Ordering::Relaxed);
        let index = message.id.clone();
        self.pending.push(PendingEntry { message, index });
        true
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 同步换出缓冲区；缓冲区为空时返回 `None`
    pub fn flush(&mut self) -> Option<FlushJob> {
        if self.pending.is_empty() {
            return None;
        }

        let batch = std::mem::take(&mut self.pending);
        let mut ids = Vec::with_capacity(batch.len());
        let mut texts = Vec::with_capacity(batch.len());
        let mut streams = Vec::with_capacity(batch.len());
        for entry in batch {
            ids.push(entry.index);
            texts.push(entry.message.text.unwrap_or_default());
            streams.push(entry.message.stream);
        }

        self.stats.flushed_batches.fetch_add(1, Ordering::Relaxed);
        self.stats
            .flushed_messages
            .fetch_add(ids.len(), Ordering::Relaxed);

        Some(FlushJob {
            ids,
            texts,
            streams,
            classifier: self.classifier.clone(),
            positive_label: self.positive_label.clone(),
            stats: self.stats.clone(),
        })
    }

    pub fn stats(&self) -> Arc<BatcherStats> {
        self.stats.clone()
    }
}

/// 同一直播间内被判为正例的索引
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedBatch {
    pub stream: StreamContext,
    pub ids: Vec<String>,
}

/// 一次已换出的批次，独立于批次管理器运行
pub struct FlushJob {
    ids: Vec<String>,
    texts: Vec<String>,
    streams: Vec<StreamContext>,
    classifier: Arc<dyn Classifier>,
    positive_label: String,
    stats: Arc<BatcherStats>,
}

impl FlushJob {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    async fn flagged_positions(&self) -> BaitblockResult<Vec<usize>> {
        let verdicts = self.classifier.label(&self.texts).await?;
        let positions = flagged_positions(self.ids.len(), &verdicts, &self.positive_label);
        self.stats.flagged.fetch_add(positions.len(), Ordering::Relaxed);
        Ok(positions)
    }

    /// 调用分类器并返回被判为正例的索引
    pub async fn try_run(self) -> BaitblockResult<Vec<String>> {
        let positions = self.flagged_positions().await?;
        Ok(positions.into_iter().map(|i| self.ids[i].clone()).collect())
    }

    /// 与 [`FlushJob::try_run`] 相同，失败时记录日志并丢弃整批
    pub async fn run(self) -> Vec<String> {
        self.run_by_stream()
            .await
            .into_iter()
            .flat_map(|batch| batch.ids)
            .collect()
    }

    /// 按直播间分组返回被标记的索引，保持批次内的顺序
    ///
    /// 失败时记录日志并丢弃整批。
    pub async fn run_by_stream(self) -> Vec<FlaggedBatch> {
        let positions = match self.flagged_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                self.stats.dropped_batches.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("丢弃 {} 条消息的批次", self.len());
                helpers::log_error(&e);
                return Vec::new();
            }
        };

        let mut grouped: Vec<FlaggedBatch> = Vec::new();
        for i in positions {
            let stream = &self.streams[i];
            match grouped.iter_mut().find(|batch| &batch.stream == stream) {
                Some(batch) => batch.ids.push(self.ids[i].clone()),
                None => grouped.push(FlaggedBatch {
                    stream: stream.clone(),
                    ids: vec![self.ids[i].clone()],
                }),
            }
        }
        grouped
    }
}

fn flagged_positions(count: usize, verdicts: &[Verdict], positive_label: &str) -> Vec<usize> {
    verdicts
        .iter()
        .take(count)
        .enumerate()
        .filter(|(_, verdict)| verdict.label == positive_label)
        .map(|(i, _)| i)
        .collect()
}

/// 按位置把结果与索引配对，缺失的结果视为未标注
pub fn select_flagged(ids: &[String], verdicts: &[Verdict], positive_label: &str) -> Vec<String> {
    flagged_positions(ids.len(), verdicts, positive_label)
        .into_iter()
        .map(|i| ids[i].clone())
        .collect()
}
