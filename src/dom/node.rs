//! RcDom 节点辅助函数

use std::rc::Rc;

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::{namespace_url, ns};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 设置节点属性，`None` 表示删除该属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    use html5ever::interface::{Attribute, QualName};
    use html5ever::tendril::format_tendril;
    use html5ever::LocalName;

    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let existing = attrs_mut
            .iter()
            .position(|attr| &*attr.name.local == attr_name);

        match (existing, attr_value) {
            (Some(i), Some(value)) => {
                attrs_mut[i].value.clear();
                attrs_mut[i].value.push_slice(value.as_str());
            }
            (Some(i), None) => {
                attrs_mut.remove(i);
            }
            (None, Some(value)) => attrs_mut.push(Attribute {
                name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                value: format_tendril!("{}", value),
            }),
            (None, None) => {}
        }
    }
}

/// 检查 class 属性中是否包含指定类名
pub fn has_class(node: &Handle, class_name: &str) -> bool {
    get_node_attr(node, "class")
        .map(|classes| classes.split_whitespace().any(|c| c == class_name))
        .unwrap_or(false)
}

/// 元素子节点（忽略文本和注释）
pub fn element_children(node: &Handle) -> Vec<Handle> {
    node.children
        .borrow()
        .iter()
        .filter(|child| is_element(child))
        .cloned()
        .collect()
}

pub fn first_element_child(node: &Handle) -> Option<Handle> {
    node.children
        .borrow()
        .iter()
        .find(|child| is_element(child))
        .cloned()
}

/// 拼接所有后代文本节点
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}

/// 获取父节点
///
/// `parent` 是 `Cell`，只能先取出再放回。
pub fn parent_of(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// `node` 是否为 `ancestor` 本身或其后代
pub fn is_inclusive_descendant(node: &Handle, ancestor: &Handle) -> bool {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if Rc::ptr_eq(&n, ancestor) {
            return true;
        }
        current = parent_of(&n);
    }
    false
}

/// 深度优先（文档顺序）查找第一个满足条件的元素
pub fn find_first<F>(node: &Handle, predicate: &F) -> Option<Handle>
where
    F: Fn(&Handle) -> bool,
{
    if is_element(node) && predicate(node) {
        return Some(node.clone());
    }
    for child in node.children.borrow().iter() {
        if let Some(found) = find_first(child, predicate) {
            return Some(found);
        }
    }
    None
}

/// 文档顺序收集所有满足条件的元素（包括 `node` 本身）
pub fn find_all<F>(node: &Handle, predicate: &F) -> Vec<Handle>
where
    F: Fn(&Handle) -> bool,
{
    let mut found = Vec::new();
    collect_matching(node, predicate, &mut found);
    found
}

fn collect_matching<F>(node: &Handle, predicate: &F, found: &mut Vec<Handle>)
where
    F: Fn(&Handle) -> bool,
{
    if is_element(node) && predicate(node) {
        found.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        collect_matching(child, predicate, found);
    }
}

pub fn find_by_id(root: &Handle, id: &str) -> Option<Handle> {
    find_by_attr(root, "id", id)
}

pub fn find_by_attr(root: &Handle, attr_name: &str, value: &str) -> Option<Handle> {
    find_first(root, &|node| {
        get_node_attr(node, attr_name).as_deref() == Some(value)
    })
}

/// 根据名称获取子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    parent
        .children
        .borrow()
        .iter()
        .find(|child| get_node_name(child) == Some(node_name))
        .cloned()
}

/// 从父节点上摘除，返回原父节点
pub fn detach(node: &Handle) -> Option<Handle> {
    let parent = parent_of(node)?;
    parent
        .children
        .borrow_mut()
        .retain(|child| !Rc::ptr_eq(child, node));
    node.parent.set(None);
    Some(parent)
}

/// 追加子节点（会先从原位置摘除）
pub fn append_child(parent: &Handle, child: &Handle) {
    detach(child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child.clone());
}

/// 将 HTML 片段解析为游离节点
///
/// 片段按 `<body>` 内容解析，返回 body 的直接子节点（已与临时文档断开）。
pub fn parse_fragment(html: &str) -> Vec<Handle> {
    let dom = parse_document(RcDom::default(), Default::default()).one(html);

    let body = get_child_node_by_name(&dom.document, "html")
        .and_then(|html| get_child_node_by_name(&html, "body"));

    match body {
        Some(body) => {
            let nodes: Vec<Handle> = std::mem::take(&mut *body.children.borrow_mut());
            for node in &nodes {
                node.parent.set(None);
            }
            nodes
        }
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(dom: &RcDom) -> Handle {
        let html = get_child_node_by_name(&dom.document, "html").unwrap();
        get_child_node_by_name(&html, "body").unwrap()
    }

    #[test]
    fn test_parent_of_does_not_consume_link() {
        let nodes = parse_fragment("<div id=\"a\"><span>x</span></div>");
        let span = first_element_child(&nodes[0]).unwrap();

        assert!(Rc::ptr_eq(&parent_of(&span).unwrap(), &nodes[0]));
        assert!(Rc::ptr_eq(&parent_of(&span).unwrap(), &nodes[0]));
    }

    #[test]
    fn test_text_content_and_element_children() {
        let nodes = parse_fragment("<p> hi <b>there</b><!-- c --></p>");
        assert_eq!(text_content(&nodes[0]), " hi there");
        assert_eq!(element_children(&nodes[0]).len(), 1);
    }

    #[test]
    fn test_set_node_attr_add_replace_remove() {
        let nodes = parse_fragment("<div class=\"a b\"></div>");
        let div = &nodes[0];

        set_node_attr(div, "style", Some("color: red".to_string()));
        assert_eq!(get_node_attr(div, "style").as_deref(), Some("color: red"));
        set_node_attr(div, "style", Some("outline: none".to_string()));
        assert_eq!(get_node_attr(div, "style").as_deref(), Some("outline: none"));
        set_node_attr(div, "style", None);
        assert!(get_node_attr(div, "style").is_none());
        assert!(has_class(div, "b"));
    }

    #[test]
    fn test_append_and_detach() {
        let dom = parse_document(RcDom::default(), Default::default()).one("<div id=\"x\"></div>");
        let body = body_of(&dom);
        let target = find_by_id(&body, "x").unwrap();

        let nodes = parse_fragment("<span data-index=\"7\">m</span>");
        append_child(&target, &nodes[0]);
        assert!(is_inclusive_descendant(&nodes[0], &dom.document));
        assert!(find_by_attr(&dom.document, "data-index", "7").is_some());

        detach(&nodes[0]);
        assert!(!is_inclusive_descendant(&nodes[0], &dom.document));
        assert!(element_children(&target).is_empty());
    }
}
