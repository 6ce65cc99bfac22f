//! 宿主页面 DOM 抽象
//!
//! - [`node`]: RcDom 节点查询与修改
//! - [`live`]: 可观察的页面模拟（[`ChangeSource`]、[`PageDocument`]）
//! - [`serializer`]: HTML 快照的解码与序列化

pub mod live;
pub mod node;
pub mod serializer;

pub use live::{BatchCallback, ChangeSource, LiveDocument, MutationRecord, PageDocument, Subscription};
pub use serializer::{html_to_dom, serialize_document};
