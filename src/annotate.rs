//! 标注被标记的消息
//!
//! 按稳定索引在当前聊天容器中重新定位元素，在消息自身的内容节点（而不是
//! 列表项包裹层或回复预览）上加可见的轮廓。节点已被页面移除时跳过。
//! 标注是幂等的，重复应用不会叠加样式。

use markup5ever_rcdom::Handle;

use crate::config::constants::{FLAG_ATTR, FLAG_STYLE};
use crate::dom::node::{find_by_attr, get_node_attr, set_node_attr};
use crate::error::{helpers, BaitblockError};
use crate::extract::ChatLayout;
use crate::router::Platform;

const FLAG_VALUE: &str = "phishing";

/// 一次标注的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationReport {
    pub marked: Vec<String>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResultAnnotator {
    layout: &'static ChatLayout,
}

impl ResultAnnotator {
    pub fn new(layout: &'static ChatLayout) -> Self {
        Self { layout }
    }

    pub fn for_platform(platform: Platform) -> Self {
        Self::new(ChatLayout::for_platform(platform))
    }

    pub fn apply(&self, root: &Handle, ids: &[String]) -> AnnotationReport {
        let mut report = AnnotationReport::default();

        let container = match self.layout.locate_container(root) {
            Some(container) => container,
            None => {
                tracing::debug!("标注时聊天容器不存在，跳过 {} 条", ids.len());
                report.missing = ids.to_vec();
                return report;
            }
        };

        for id in ids {
            let target = find_by_attr(&container, self.layout.index_attr, id)
                .and_then(|element| self.layout.content_node(&element));

            match target {
                Some(node) => {
                    mark(&node);
                    report.marked.push(id.clone());
                }
                None => {
                    helpers::log_error(&BaitblockError::NodeGone(id.clone()));
                    report.missing.push(id.clone());
                }
            }
        }

        if !report.marked.is_empty() {
            tracing::info!("已标注 {} 条可疑消息", report.marked.len());
        }
        report
    }
}

fn mark(node: &Handle) {
    let style = get_node_attr(node, "style").unwrap_or_default();
    if !style.contains(FLAG_STYLE) {
        let merged = if style.trim().is_empty() {
            FLAG_STYLE.to_string()
        } else {
            format!("{}; {}", style.trim().trim_end_matches(';'), FLAG_STYLE)
        };
        set_node_attr(node, "style", Some(merged));
    }
    set_node_attr(node, FLAG_ATTR, Some(FLAG_VALUE.to_string()));
}

/// 节点是否已被标注
pub fn is_flagged(node: &Handle) -> bool {
    get_node_attr(node, FLAG_ATTR).as_deref() == Some(FLAG_VALUE)
}
