//! 消息分类
//!
//! 信号过滤 → 定时批次 → 外部分类器 → 被标记的索引。

pub mod batcher;
pub mod client;
pub mod filter;

pub use batcher::{select_flagged, BatcherStats, ClassificationBatcher, FlaggedBatch, FlushJob};
pub use client::{Classifier, HttpClassifier, Verdict};
pub use filter::{FilterStats, SignalFilter};
