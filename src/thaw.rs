//! Thaw decoder: reconstruct instance configuration from frozen markup.
//!
//! `Definition::from_node` is the static thaw entry the reconstruction
//! directive calls. It reads the node it is given and nothing else: the tag
//! becomes an explicit tag override, the `style` attribute becomes manual
//! style declarations, non-reserved attributes become attribute overrides,
//! and a leading text child becomes the text override. It is total — any
//! element node yields an instance, and unrecognized fragments are dropped
//! rather than raised.
//!
//! `thaw_document` is the document-level entry: parse markup text, locate the
//! outermost elements whose leading class names a registered definition, and
//! thaw each one. Matched subtrees are not descended into; their inner
//! structure is the matched instance's own business.

use std::rc::Rc;

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as DomNodeData, RcDom};
use tendril::StrTendril;

use crate::component::{Definition, Instance, Overrides};
use crate::markup::{self, MarkupNode, NodeHandle, RESERVED_ATTRIBUTES};
use crate::registry::ExportRegistry;
use crate::style;

impl Definition {
    /// Reconstruct an instance configuration from a markup node. Reserved
    /// attributes are protocol-owned and never become overrides; configured
    /// children are not reconstructed, the first build regenerates them.
    pub fn from_node(self: &Rc<Self>, node: &NodeHandle) -> Rc<Instance> {
        let tag = node.tag().map(|t| t.to_string());
        let styles = node
            .style_decls()
            .iter()
            .map(|decl| decl.to_string())
            .collect();
        let attributes = node
            .attributes()
            .iter()
            .filter(|(name, _)| !RESERVED_ATTRIBUTES.contains(name.as_str()))
            .cloned()
            .collect();
        let text = node.children().first().and_then(|child| match &child.data {
            markup::NodeData::Text(value) => Some(value.clone()),
            _ => None,
        });

        Instance::new_unchecked(
            self,
            Overrides {
                tag,
                text,
                styles,
                attributes,
            },
            vec![],
        )
    }
}

/// Parse `html` and thaw every outermost element whose leading class names a
/// definition registered in `registry`, in document order. Elements that
/// match nothing are skipped and their children searched instead.
pub fn thaw_document(html: &str, registry: &ExportRegistry) -> Vec<Rc<Instance>> {
    let dom = parse_document(RcDom::default(), Default::default()).one(StrTendril::from(html));
    let mut thawed = Vec::new();
    collect_thawable(&dom.document, registry, &mut thawed);
    thawed
}

fn collect_thawable(handle: &Handle, registry: &ExportRegistry, out: &mut Vec<Rc<Instance>>) {
    if let DomNodeData::Element { name, attrs, .. } = &handle.data {
        let class_attr = attrs
            .borrow()
            .iter()
            .find(|attr| attr.name.local.as_ref() == "class")
            .map(|attr| attr.value.to_string());
        let leading_class = class_attr
            .as_deref()
            .and_then(|value| value.split_whitespace().next().map(|c| c.to_string()));

        if let Some(class) = leading_class {
            if let Some(definition) = registry.find_by_class(&class) {
                let node = convert_element(handle, name.local.as_ref());
                out.push(definition.from_node(&node));
                return;
            }
        }
    }
    for child in handle.children.borrow().iter() {
        collect_thawable(child, registry, out);
    }
}

/// Convert a parsed element subtree into the node model. Scripts and
/// comments are dropped; a frozen directive is consumed at parse time, not
/// carried into the reconstructed configuration.
fn convert_element(handle: &Handle, tag: &str) -> NodeHandle {
    let mut classes = Vec::new();
    let mut decls = Vec::new();
    let mut attributes = Vec::new();
    if let DomNodeData::Element { attrs, .. } = &handle.data {
        for attr in attrs.borrow().iter() {
            let name = attr.name.local.as_ref();
            let value = attr.value.to_string();
            match name {
                "class" => {
                    classes = value.split_whitespace().map(|c| c.to_string()).collect();
                }
                "style" => {
                    decls = style::parse_declarations(&value);
                }
                _ => attributes.push((name.to_string(), value)),
            }
        }
    }

    let node = MarkupNode::element(tag, classes, decls, attributes);
    for child in handle.children.borrow().iter() {
        match &child.data {
            DomNodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                if !text.trim().is_empty() {
                    markup::append(&node, MarkupNode::text(&text));
                }
            }
            DomNodeData::Element { name, .. } => {
                let child_tag = name.local.as_ref();
                if child_tag == "script" {
                    continue;
                }
                markup::append(&node, convert_element(child, child_tag));
            }
            _ => {}
        }
    }
    node
}
