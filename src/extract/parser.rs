//! 消息元素的结构解析
//!
//! 任何结构偏差都返回 [`BaitblockError::NotAMessage`]，调用方跳过该元素即可。

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use markup5ever_rcdom::Handle;

use super::layout::ChatLayout;
use super::ChatMessage;
use crate::dom::node::{
    element_children, find_first, first_element_child, get_node_attr, get_node_name, text_content,
};
use crate::error::{helpers::not_a_message, BaitblockResult};
use crate::router::StreamContext;

/// 解析一个消息元素
pub fn parse_message(
    layout: &ChatLayout,
    element: &Handle,
    stream: &StreamContext,
) -> BaitblockResult<ChatMessage> {
    let id = get_node_attr(element, layout.index_attr)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| not_a_message(format!("缺少 {}", layout.index_attr)))?;

    let (start, is_reply) = match element_children(element).as_slice() {
        [_] => (element.clone(), false),
        [_, wrapper] => (wrapper.clone(), true),
        other => {
            return Err(not_a_message(format!(
                "{}: 子元素数量 {}",
                id,
                other.len()
            )))
        }
    };

    let body = descend(&start, layout.body_depth)
        .ok_or_else(|| not_a_message(format!("{}: 缺少消息主体", id)))?;
    let parts = element_children(&body);
    if parts.len() != layout.body_parts {
        return Err(not_a_message(format!(
            "{}: 主体有 {} 个部分，期望 {}",
            id,
            parts.len(),
            layout.body_parts
        )));
    }

    let username = find_first(&parts[layout.identity_part], &is_button_like)
        .map(|button| text_content(&button).trim().to_string())
        .filter(|name| !name.is_empty());

    let content = &parts[layout.content_part];
    let text = Some(text_content(content).trim().to_string()).filter(|text| !text.is_empty());
    let emote_id = find_first(content, &|node| get_node_attr(node, layout.emote_attr).is_some())
        .and_then(|emote| get_node_attr(&emote, layout.emote_attr))
        .filter(|emote| !emote.is_empty());

    if text.is_none() && emote_id.is_none() {
        return Err(not_a_message(format!("{}: 内容为空", id)));
    }

    let sent_at = layout
        .timestamp_part
        .and_then(|i| parse_clock_time(text_content(&parts[i]).trim()));

    Ok(ChatMessage {
        id,
        username,
        text,
        emote_id,
        is_reply,
        sent_at,
        stream: stream.clone(),
    })
}

fn descend(node: &Handle, depth: usize) -> Option<Handle> {
    let mut current = node.clone();
    for _ in 0..depth {
        current = first_element_child(&current)?;
    }
    Some(current)
}

fn is_button_like(node: &Handle) -> bool {
    get_node_name(node) == Some("button") || get_node_attr(node, "role").as_deref() == Some("button")
}

/// 把 `"08:09 PM"` 这类只有时刻的时间放到今天（本地时区）
pub fn parse_clock_time(value: &str) -> Option<DateTime<Utc>> {
    let time = ["%I:%M %p", "%I:%M%p", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value, format).ok())?;
    let naive = Local::now().date_naive().and_time(time);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}
