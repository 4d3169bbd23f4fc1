//! Rendered node tree and markup serialization.
//!
//! The node tree is the materialized form of a component instance: an
//! rc-backed tree (children in a `RefCell`, parent as a `Weak` back-link, the
//! same shape `markup5ever_rcdom` uses) that serializes to an HTML document
//! fragment.
//!
//! ## Key Invariants
//!
//! 1. **Class list position 0** of an element always names the exact
//!    definition that produced it; ancestor names follow in order, root last.
//! 2. **Wholesale replacement.** A node is never patched field-by-field;
//!    `replace` swaps the old node for the new one at the same position and
//!    detaches the old subtree entirely.
//! 3. **Detachment is the only cancellation.** A detached subtree can no
//!    longer anchor a reconstruction directive; nothing else cancels one.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use lazy_static::lazy_static;

use crate::directive::DirectiveRefs;
use crate::style::{self, StyleDecl};

lazy_static! {
    /// Attributes owned by the protocol itself; never user data, never
    /// reconstructed by thaw.
    pub static ref RESERVED_ATTRIBUTES: std::collections::HashSet<&'static str> = {
        let mut s = std::collections::HashSet::new();
        s.insert("class");
        s.insert("style");
        s
    };

    /// HTML void elements: serialized without a closing tag.
    static ref VOID_ELEMENTS: std::collections::HashSet<&'static str> = {
        let mut s = std::collections::HashSet::new();
        s.insert("area");
        s.insert("base");
        s.insert("br");
        s.insert("col");
        s.insert("embed");
        s.insert("hr");
        s.insert("img");
        s.insert("input");
        s.insert("link");
        s.insert("meta");
        s.insert("source");
        s.insert("track");
        s.insert("wbr");
        s
    };
}

pub type NodeHandle = Rc<MarkupNode>;

#[derive(Debug)]
pub enum NodeData {
    Element {
        tag: String,
        /// Most-specific-first definition class chain.
        classes: Vec<String>,
        /// Manual style declarations, in order.
        style: Vec<StyleDecl>,
        /// Non-reserved attributes, in order.
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Script {
        code: String,
        /// Marked so document parsing never blocks on the script.
        deferred: bool,
        /// Resolved reconstruction references, when this script is a
        /// directive. Not serialized; the code string carries them.
        refs: Option<DirectiveRefs>,
    },
}

#[derive(Debug)]
pub struct MarkupNode {
    pub data: NodeData,
    parent: RefCell<Weak<MarkupNode>>,
    children: RefCell<Vec<NodeHandle>>,
}

impl MarkupNode {
    pub fn element(
        tag: &str,
        classes: Vec<String>,
        style: Vec<StyleDecl>,
        attributes: Vec<(String, String)>,
    ) -> NodeHandle {
        Rc::new(MarkupNode {
            data: NodeData::Element {
                tag: tag.to_string(),
                classes,
                style,
                attributes,
            },
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        })
    }

    pub fn text(value: &str) -> NodeHandle {
        Rc::new(MarkupNode {
            data: NodeData::Text(value.to_string()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        })
    }

    pub fn script(code: String, deferred: bool, refs: Option<DirectiveRefs>) -> NodeHandle {
        Rc::new(MarkupNode {
            data: NodeData::Script {
                code,
                deferred,
                refs,
            },
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        })
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent.borrow().upgrade()
    }

    pub fn children(&self) -> Vec<NodeHandle> {
        self.children.borrow().clone()
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.data {
            NodeData::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn classes(&self) -> &[String] {
        match &self.data {
            NodeData::Element { classes, .. } => classes,
            _ => &[],
        }
    }

    pub fn style_decls(&self) -> &[StyleDecl] {
        match &self.data {
            NodeData::Element { style, .. } => style,
            _ => &[],
        }
    }

    pub fn attributes(&self) -> &[(String, String)] {
        match &self.data {
            NodeData::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn directive_refs(&self) -> Option<&DirectiveRefs> {
        match &self.data {
            NodeData::Script { refs, .. } => refs.as_ref(),
            _ => None,
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self.data, NodeData::Script { .. })
    }
}

/// Attach `child` as the last child of `parent`. A child already attached
/// elsewhere is detached first. Returns false without attaching when `child`
/// is `parent` itself or one of its ancestors; the tree stays acyclic.
pub fn append(parent: &NodeHandle, child: NodeHandle) -> bool {
    if would_cycle(parent, &child) {
        return false;
    }
    detach(&child);
    *child.parent.borrow_mut() = Rc::downgrade(parent);
    parent.children.borrow_mut().push(child);
    true
}

/// True when attaching `child` under `parent` would make `child` contain
/// itself transitively.
fn would_cycle(parent: &NodeHandle, child: &NodeHandle) -> bool {
    if Rc::ptr_eq(parent, child) {
        return true;
    }
    let mut cursor = parent.parent();
    while let Some(ancestor) = cursor {
        if Rc::ptr_eq(&ancestor, child) {
            return true;
        }
        cursor = ancestor.parent();
    }
    false
}

/// Remove `node` from its parent, taking its whole subtree out of the
/// document. Returns false when the node was already detached.
pub fn detach(node: &NodeHandle) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    parent
        .children
        .borrow_mut()
        .retain(|child| !Rc::ptr_eq(child, node));
    *node.parent.borrow_mut() = Weak::new();
    true
}

/// Swap `old` for `new` at the same position under `old`'s parent. The old
/// subtree is detached wholesale; an attached `new` (including a sibling of
/// `old`) is detached from its current position first. Returns false when
/// `old` has no parent or the swap would make the tree cyclic.
pub fn replace(old: &NodeHandle, new: &NodeHandle) -> bool {
    if Rc::ptr_eq(old, new) {
        return old.parent().is_some();
    }
    let Some(parent) = old.parent() else {
        return false;
    };
    if would_cycle(&parent, new) {
        return false;
    }
    // Detach before taking the children borrow; `new` may live under the
    // same parent. The index is computed after, so it is still current.
    detach(new);
    let mut children = parent.children.borrow_mut();
    let Some(index) = children.iter().position(|child| Rc::ptr_eq(child, old)) else {
        return false;
    };
    children[index] = new.clone();
    drop(children);
    *new.parent.borrow_mut() = Rc::downgrade(&parent);
    *old.parent.borrow_mut() = Weak::new();
    true
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERIALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Serialize a node subtree to markup text.
pub fn to_html(node: &NodeHandle) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

fn write_node(node: &NodeHandle, out: &mut String) {
    match &node.data {
        NodeData::Text(value) => out.push_str(&escape_text(value)),
        NodeData::Script { code, deferred, .. } => {
            if *deferred {
                out.push_str("<script async>");
            } else {
                out.push_str("<script>");
            }
            out.push_str(code);
            out.push_str("</script>");
        }
        NodeData::Element {
            tag,
            classes,
            style,
            attributes,
        } => {
            out.push('<');
            out.push_str(tag);
            if !classes.is_empty() {
                out.push_str(" class=\"");
                out.push_str(&escape_attribute(&classes.join(" ")));
                out.push('"');
            }
            if !style.is_empty() {
                out.push_str(" style=\"");
                out.push_str(&escape_attribute(&style::emit_declarations(style)));
                out.push('"');
            }
            for (name, value) in attributes {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_attribute(value));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(tag.as_str()) {
                return;
            }
            for child in node.children.borrow().iter() {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str) -> NodeHandle {
        MarkupNode::element(tag, vec![], vec![], vec![])
    }

    #[test]
    fn test_class_list_serialized_in_order() {
        let node = MarkupNode::element(
            "a",
            vec!["Link".to_string(), "Widget".to_string()],
            vec![],
            vec![("href".to_string(), "https://example.com".to_string())],
        );
        assert_eq!(
            to_html(&node),
            "<a class=\"Link Widget\" href=\"https://example.com\"></a>"
        );
    }

    #[test]
    fn test_style_attribute_round_trips() {
        let decls = vec![StyleDecl::new("color", "red"), StyleDecl::new("gap", "4px")];
        let node = MarkupNode::element("div", vec![], decls.clone(), vec![]);
        let html = to_html(&node);
        assert!(html.contains("style=\"color: red; gap: 4px\""));
        assert_eq!(node.style_decls(), decls.as_slice());
    }

    #[test]
    fn test_text_and_attribute_escaping() {
        let node = MarkupNode::element(
            "div",
            vec![],
            vec![],
            vec![("title".to_string(), "a\"b<c".to_string())],
        );
        append(&node, MarkupNode::text("1 < 2 & 3"));
        let html = to_html(&node);
        assert!(html.contains("title=\"a&quot;b&lt;c\""));
        assert!(html.contains("1 &lt; 2 &amp; 3"));
    }

    #[test]
    fn test_void_elements_have_no_closing_tag() {
        let node = element("br");
        assert_eq!(to_html(&node), "<br>");
    }

    #[test]
    fn test_deferred_script_marked_async() {
        let node = MarkupNode::script("x()".to_string(), true, None);
        assert_eq!(to_html(&node), "<script async>x()</script>");
    }

    #[test]
    fn test_replace_keeps_position_and_detaches_old() {
        let parent = element("div");
        let first = element("span");
        let second = element("span");
        let third = element("span");
        append(&parent, first.clone());
        append(&parent, second.clone());
        append(&parent, third);

        let replacement = element("p");
        assert!(replace(&second, &replacement));
        let children = parent.children();
        assert_eq!(children.len(), 3);
        assert!(Rc::ptr_eq(&children[1], &replacement));
        assert!(second.parent().is_none());
        assert!(replacement.parent().is_some());
    }

    #[test]
    fn test_detach_clears_parent() {
        let parent = element("div");
        let child = element("span");
        append(&parent, child.clone());
        assert!(detach(&child));
        assert!(child.parent().is_none());
        assert!(parent.children().is_empty());
        assert!(!detach(&child));
    }

    #[test]
    fn test_replace_with_attached_sibling() {
        let parent = element("div");
        let first = element("span");
        let second = element("p");
        append(&parent, first.clone());
        append(&parent, second.clone());

        // The sibling moves into the replaced node's slot.
        assert!(replace(&first, &second));
        let children = parent.children();
        assert_eq!(children.len(), 1);
        assert!(Rc::ptr_eq(&children[0], &second));
        assert!(first.parent().is_none());
        assert!(Rc::ptr_eq(&second.parent().unwrap(), &parent));
    }

    #[test]
    fn test_append_rejects_self_and_ancestors() {
        let outer = element("div");
        let inner = element("div");
        append(&outer, inner.clone());

        assert!(!append(&inner, outer.clone()));
        assert!(!append(&outer, outer.clone()));
        assert!(inner.children().is_empty());
        assert!(outer.parent().is_none());
        assert_eq!(outer.children().len(), 1);
    }

    #[test]
    fn test_replace_rejects_ancestor() {
        let outer = element("div");
        let middle = element("div");
        let leaf = element("span");
        append(&outer, middle.clone());
        append(&middle, leaf.clone());

        assert!(!replace(&leaf, &outer));
        assert!(Rc::ptr_eq(&middle.children()[0], &leaf));
        assert!(outer.parent().is_none());
    }

    #[test]
    fn test_append_reparents() {
        let a = element("div");
        let b = element("div");
        let child = element("span");
        append(&a, child.clone());
        append(&b, child.clone());
        assert!(a.children().is_empty());
        assert!(Rc::ptr_eq(&child.parent().unwrap(), &b));
    }
}
