use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::QualName;
use html5ever::parse_document;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::create_element as sink_create_element;
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

use crate::translation::error::{TranslationError, TranslationResult};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let s: String = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.to_string(),
        None => String::from_utf8_lossy(data).to_string(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
        .unwrap_or_default()
}

/// 根据名称获取子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    let children = parent.children.borrow();
    let matching_children = children.iter().find(|child| match child.data {
        NodeData::Element { ref name, .. } => &*name.local == node_name,
        _ => false,
    });
    matching_children.cloned()
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == attr_name {
                    return Some(attr.value.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

/// 获取节点名称（小写标签名）
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 节点身份键，仅在节点存活期间有效
pub fn node_key(node: &Handle) -> usize {
    Rc::as_ptr(node) as usize
}

/// 判断是否为同一个节点
pub fn same_node(a: &Handle, b: &Handle) -> bool {
    Rc::ptr_eq(a, b)
}

/// 获取父节点（不改变节点状态）
pub fn parent_of(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

fn set_parent(node: &Handle, parent: Option<&Handle>) {
    node.parent.set(parent.map(Rc::downgrade));
}

/// 节点在父节点中的索引
pub fn child_index(parent: &Handle, child: &Handle) -> Option<usize> {
    parent
        .children
        .borrow()
        .iter()
        .position(|c| Rc::ptr_eq(c, child))
}

/// 节点在其父节点中的索引
pub fn index_in_parent(node: &Handle) -> Option<usize> {
    parent_of(node).and_then(|parent| child_index(&parent, node))
}

/// 判断节点是否仍挂在文档树上
pub fn is_attached(node: &Handle) -> bool {
    let mut cursor = node.clone();
    loop {
        if let NodeData::Document = cursor.data {
            return true;
        }
        match parent_of(&cursor) {
            Some(parent) => cursor = parent,
            None => return false,
        }
    }
}

/// 把节点从当前父节点上摘下
pub fn detach(node: &Handle) {
    if let Some(parent) = parent_of(node) {
        parent
            .children
            .borrow_mut()
            .retain(|c| !Rc::ptr_eq(c, node));
    }
    set_parent(node, None);
}

/// 追加子节点
pub fn append_child(parent: &Handle, child: &Handle) {
    detach(child);
    parent.children.borrow_mut().push(child.clone());
    set_parent(child, Some(parent));
}

/// 在参考节点之前插入新节点
pub fn insert_before(parent: &Handle, new_node: &Handle, reference: &Handle) -> TranslationResult<()> {
    detach(new_node);
    let index = child_index(parent, reference).ok_or_else(|| {
        TranslationError::DomError("参考节点不是该父节点的子节点".to_string())
    })?;
    parent.children.borrow_mut().insert(index, new_node.clone());
    set_parent(new_node, Some(parent));
    Ok(())
}

/// 移除子节点，返回是否真的移除了
pub fn remove_child(parent: &Handle, child: &Handle) -> bool {
    match child_index(parent, child) {
        Some(index) => {
            parent.children.borrow_mut().remove(index);
            set_parent(child, None);
            true
        }
        None => false,
    }
}

/// 用新节点替换目标节点（先插入再移除，目标节点对象本身保持不变）
pub fn replace_node(parent: &Handle, new_node: &Handle, target: &Handle) -> TranslationResult<()> {
    insert_before(parent, new_node, target)?;
    remove_child(parent, target);
    Ok(())
}

/// 创建元素节点
pub fn create_element(tag: &str) -> Handle {
    let sink = RcDom::default();
    sink_create_element(
        &sink,
        QualName::new(None, ns!(html), LocalName::from(tag)),
        Vec::new(),
    )
}

/// 创建文本节点
pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 浅克隆：只复制节点本身（元素保留标签名与属性）
pub fn shallow_clone(node: &Handle) -> Handle {
    match node.data {
        NodeData::Element {
            ref name,
            ref attrs,
            ..
        } => {
            let sink = RcDom::default();
            sink_create_element(&sink, name.clone(), attrs.borrow().clone())
        }
        NodeData::Text { ref contents } => Node::new(NodeData::Text {
            contents: RefCell::new(contents.borrow().clone()),
        }),
        NodeData::Comment { ref contents } => Node::new(NodeData::Comment {
            contents: contents.clone(),
        }),
        NodeData::Doctype {
            ref name,
            ref public_id,
            ref system_id,
        } => Node::new(NodeData::Doctype {
            name: name.clone(),
            public_id: public_id.clone(),
            system_id: system_id.clone(),
        }),
        NodeData::ProcessingInstruction {
            ref target,
            ref contents,
        } => Node::new(NodeData::ProcessingInstruction {
            target: target.clone(),
            contents: contents.clone(),
        }),
        NodeData::Document => Node::new(NodeData::Document),
    }
}

/// 深克隆整棵子树
pub fn deep_clone(node: &Handle) -> Handle {
    let copy = shallow_clone(node);
    for child in node.children.borrow().iter() {
        append_child(&copy, &deep_clone(child));
    }
    copy
}

/// 获取文本节点内容
pub fn text_of(node: &Handle) -> Option<String> {
    match node.data {
        NodeData::Text { ref contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 拼接子树中全部文本，等价于 DOM 的 textContent
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    match node.data {
        NodeData::Text { ref contents } => out.push_str(&contents.borrow()),
        NodeData::Comment { .. } | NodeData::ProcessingInstruction { .. } => {}
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
        }
    }
}

/// 按文档顺序收集子树下的全部文本节点
pub fn text_nodes(root: &Handle) -> Vec<Handle> {
    let mut found = Vec::new();
    walk_text(root, &mut found);
    found
}

fn walk_text(node: &Handle, found: &mut Vec<Handle>) {
    if let NodeData::Text { .. } = node.data {
        found.push(node.clone());
        return;
    }
    for child in node.children.borrow().iter() {
        walk_text(child, found);
    }
}

/// 在子树中查找第一个指定标签的元素
pub fn find_first(node: &Handle, tag: &str) -> Option<Handle> {
    if get_node_name(node) == Some(tag) {
        return Some(node.clone());
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| find_first(child, tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(html: &str) -> (RcDom, Handle) {
        let dom = html_to_dom(html.as_bytes(), "utf-8");
        let body = find_first(&dom.document, "body").unwrap();
        (dom, body)
    }

    #[test]
    fn test_replace_node_keeps_original_object() {
        let (_dom, body) = body_of("<p>Hello</p>");
        let p = find_first(&body, "p").unwrap();
        let original = p.children.borrow()[0].clone();
        let font = create_element("font");
        append_child(&font, &create_text("Bonjour"));

        replace_node(&p, &font, &original).unwrap();

        assert_eq!(text_content(&p), "Bonjour");
        assert!(parent_of(&original).is_none());
        assert_eq!(text_of(&original).as_deref(), Some("Hello"));
        assert!(!is_attached(&original));
        assert!(is_attached(&font));
    }

    #[test]
    fn test_insert_before_rejects_foreign_reference() {
        let (_dom, body) = body_of("<p>a</p><div>b</div>");
        let p = find_first(&body, "p").unwrap();
        let div = find_first(&body, "div").unwrap();
        let foreign = div.children.borrow()[0].clone();

        let result = insert_before(&p, &create_text("x"), &foreign);
        assert!(matches!(result, Err(TranslationError::DomError(_))));
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let (_dom, body) = body_of("<p>one <b>two</b></p>");
        let p = find_first(&body, "p").unwrap();
        let copy = deep_clone(&p);

        let b = find_first(&p, "b").unwrap();
        detach(&b);

        assert_eq!(text_content(&p), "one ");
        assert_eq!(text_content(&copy), "one two");
        assert!(parent_of(&copy).is_none());
    }

    #[test]
    fn test_child_index_and_text_nodes_order() {
        let (_dom, body) = body_of("<div>A<span>B</span>C</div>");
        let div = find_first(&body, "div").unwrap();
        let texts: Vec<String> = text_nodes(&div).iter().filter_map(text_of).collect();
        assert_eq!(texts, vec!["A", "B", "C"]);

        let span = find_first(&div, "span").unwrap();
        assert_eq!(child_index(&div, &span), Some(1));
        assert_eq!(index_in_parent(&span), Some(1));
    }
}
