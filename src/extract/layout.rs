//! 各平台聊天区的结构描述

use markup5ever_rcdom::Handle;

use crate::dom::node::{element_children, find_by_attr, find_by_id, first_element_child};
use crate::router::Platform;

/// 聊天容器的定位方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerLocator {
    Id(&'static str),
    Attr {
        name: &'static str,
        value: &'static str,
    },
}

/// 平台聊天区结构
///
/// 消息元素 → 下降 `body_depth` 层首个元素子节点 → 主体，主体恰好有
/// `body_parts` 个元素子节点。回复消息多一层包裹：消息元素有两个元素子节点，
/// 第二个子节点代替消息元素作为下降起点。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatLayout {
    pub platform: Platform,
    pub container: ContainerLocator,
    /// 容器到消息列表的首元素子节点层数
    pub list_depth: usize,
    pub index_attr: &'static str,
    pub body_depth: usize,
    pub body_parts: usize,
    pub timestamp_part: Option<usize>,
    pub identity_part: usize,
    pub content_part: usize,
    pub emote_attr: &'static str,
}

pub const KICK_LAYOUT: ChatLayout = ChatLayout {
    platform: Platform::Kick,
    container: ContainerLocator::Id("chatroom-messages"),
    list_depth: 1,
    index_attr: "data-index",
    body_depth: 2,
    body_parts: 4,
    timestamp_part: Some(0),
    identity_part: 1,
    content_part: 3,
    emote_attr: "data-emote-id",
};

pub const TWITCH_LAYOUT: ChatLayout = ChatLayout {
    platform: Platform::Twitch,
    container: ContainerLocator::Attr {
        name: "data-test-selector",
        value: "chat-scrollable-area__message-container",
    },
    list_depth: 0,
    index_attr: "data-message-id",
    body_depth: 1,
    body_parts: 3,
    timestamp_part: None,
    identity_part: 0,
    content_part: 2,
    emote_attr: "data-emote-id",
};

impl ChatLayout {
    pub fn for_platform(platform: Platform) -> &'static ChatLayout {
        match platform {
            Platform::Kick => &KICK_LAYOUT,
            Platform::Twitch => &TWITCH_LAYOUT,
        }
    }

    pub fn locate_container(&self, root: &Handle) -> Option<Handle> {
        match self.container {
            ContainerLocator::Id(id) => find_by_id(root, id),
            ContainerLocator::Attr { name, value } => find_by_attr(root, name, value),
        }
    }

    pub fn message_list(&self, container: &Handle) -> Option<Handle> {
        let mut current = container.clone();
        for _ in 0..self.list_depth {
            current = first_element_child(&current)?;
        }
        Some(current)
    }

    /// 当前列表中的消息元素，按文档顺序
    pub fn message_elements(&self, container: &Handle) -> Vec<Handle> {
        self.message_list(container)
            .map(|list| element_children(&list))
            .unwrap_or_default()
    }

    /// 在当前容器中按稳定索引重新定位消息元素
    pub fn find_message(&self, root: &Handle, id: &str) -> Option<Handle> {
        let container = self.locate_container(root)?;
        find_by_attr(&container, self.index_attr, id)
    }

    /// 消息自身的内容节点
    ///
    /// 普通消息是唯一的元素子节点；回复消息是第二个子节点（包裹层），
    /// 第一个子节点是被回复消息的预览。
    pub fn content_node(&self, element: &Handle) -> Option<Handle> {
        match element_children(element).as_slice() {
            [content] => Some(content.clone()),
            [_, wrapper] => Some(wrapper.clone()),
            _ => None,
        }
    }
}
