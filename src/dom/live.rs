//! 宿主页面模拟
//!
//! [`LiveDocument`] 持有一棵 RcDom，执行插入和删除，并把产生的变更记录排队。
//! 调用 [`LiveDocument::flush`] 时按订阅根节点把记录分批投递给观察者，
//! 对应浏览器在微任务检查点批量派发 `MutationObserver` 回调的行为。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use markup5ever_rcdom::{Handle, RcDom};

use super::node::{append_child, detach, is_inclusive_descendant, parse_fragment};
use super::serializer::{html_to_dom, serialize_document};
use crate::error::BaitblockResult;

/// 一次子节点变更
#[derive(Clone)]
pub struct MutationRecord {
    pub target: Handle,
    pub added_nodes: Vec<Handle>,
    pub removed_nodes: Vec<Handle>,
}

impl std::fmt::Debug for MutationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationRecord")
            .field("added_nodes", &self.added_nodes.len())
            .field("removed_nodes", &self.removed_nodes.len())
            .finish()
    }
}

pub type BatchCallback = Box<dyn Fn(&[MutationRecord])>;

/// 变更通知源
pub trait ChangeSource {
    /// 订阅 `root` 子树（含自身）上的变更
    fn subscribe(&self, root: &Handle, on_batch: BatchCallback) -> Subscription;
}

/// 可查询的页面
pub trait PageDocument {
    fn root(&self) -> Handle;
}

struct Observer {
    root: Handle,
    callback: BatchCallback,
    active: Cell<bool>,
}

/// 订阅句柄，丢弃即取消
pub struct Subscription {
    observer: Rc<Observer>,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        self.observer.active.get()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.observer.active.set(false);
    }
}

struct LiveInner {
    dom: RcDom,
    pending: RefCell<Vec<MutationRecord>>,
    observers: RefCell<Vec<Rc<Observer>>>,
}

/// 可变更、可观察的文档
#[derive(Clone)]
pub struct LiveDocument {
    inner: Rc<LiveInner>,
}

impl LiveDocument {
    pub fn from_dom(dom: RcDom) -> Self {
        Self {
            inner: Rc::new(LiveInner {
                dom,
                pending: RefCell::new(Vec::new()),
                observers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn parse(html: &str) -> BaitblockResult<Self> {
        Self::from_bytes(html.as_bytes(), "utf-8")
    }

    pub fn from_bytes(data: &[u8], encoding: &str) -> BaitblockResult<Self> {
        Ok(Self::from_dom(html_to_dom(data, encoding)?))
    }

    /// 把 HTML 片段追加到 `parent` 末尾，返回新插入的节点
    pub fn append_html(&self, parent: &Handle, html: &str) -> Vec<Handle> {
        let nodes = parse_fragment(html);
        for node in &nodes {
            append_child(parent, node);
        }
        self.queue(MutationRecord {
            target: parent.clone(),
            added_nodes: nodes.clone(),
            removed_nodes: Vec::new(),
        });
        nodes
    }

    pub fn append(&self, parent: &Handle, child: &Handle) {
        let previous = detach(child);
        append_child(parent, child);
        if let Some(previous) = previous {
            self.queue(MutationRecord {
                target: previous,
                added_nodes: Vec::new(),
                removed_nodes: vec![child.clone()],
            });
        }
        self.queue(MutationRecord {
            target: parent.clone(),
            added_nodes: vec![child.clone()],
            removed_nodes: Vec::new(),
        });
    }

    /// 删除节点；节点不在树上时返回 `false`
    pub fn remove(&self, node: &Handle) -> bool {
        match detach(node) {
            Some(parent) => {
                self.queue(MutationRecord {
                    target: parent,
                    added_nodes: Vec::new(),
                    removed_nodes: vec![node.clone()],
                });
                true
            }
            None => false,
        }
    }

    /// 替换 `parent` 的全部子节点，产生一条记录
    pub fn replace_children(&self, parent: &Handle, html: &str) -> Vec<Handle> {
        let removed: Vec<Handle> = std::mem::take(&mut *parent.children.borrow_mut());
        for node in &removed {
            node.parent.set(None);
        }
        let added = parse_fragment(html);
        for node in &added {
            append_child(parent, node);
        }
        self.queue(MutationRecord {
            target: parent.clone(),
            added_nodes: added.clone(),
            removed_nodes: removed,
        });
        added
    }

    fn queue(&self, record: MutationRecord) {
        self.inner.pending.borrow_mut().push(record);
    }

    pub fn pending_records(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// 投递排队的变更记录，返回收到批次的观察者数量
    ///
    /// 回调中产生的新变更留到下一次 `flush`。
    pub fn flush(&self) -> usize {
        let records: Vec<MutationRecord> = std::mem::take(&mut *self.inner.pending.borrow_mut());
        if records.is_empty() {
            return 0;
        }

        self.inner
            .observers
            .borrow_mut()
            .retain(|observer| observer.active.get());
        let observers: Vec<Rc<Observer>> = self.inner.observers.borrow().clone();

        let mut delivered = 0;
        for observer in observers {
            let batch: Vec<MutationRecord> = records
                .iter()
                .filter(|record| is_inclusive_descendant(&record.target, &observer.root))
                .cloned()
                .collect();

            // 前一个回调可能已经取消了这个订阅
            if batch.is_empty() || !observer.active.get() {
                continue;
            }
            (observer.callback)(&batch);
            delivered += 1;
        }
        delivered
    }

    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .borrow()
            .iter()
            .filter(|observer| observer.active.get())
            .count()
    }

    pub fn serialize(&self, encoding: &str) -> BaitblockResult<Vec<u8>> {
        serialize_document(&self.inner.dom.document, encoding)
    }
}

impl PageDocument for LiveDocument {
    fn root(&self) -> Handle {
        self.inner.dom.document.clone()
    }
}

impl ChangeSource for LiveDocument {
    fn subscribe(&self, root: &Handle, on_batch: BatchCallback) -> Subscription {
        let observer = Rc::new(Observer {
            root: root.clone(),
            callback: on_batch,
            active: Cell::new(true),
        });
        self.inner.observers.borrow_mut().push(observer.clone());
        Subscription { observer }
    }
}
