//! Immutable document trees.
//!
//! A [`Document`] is the result of a fetch: an owned, read-only element tree
//! stored in an arena so that nodes can be addressed by [`NodeId`] and
//! navigated in both directions. Documents are parsed with `roxmltree` and
//! then copied into the arena, which lets a document be shared behind an
//! `Arc` by every table and view produced from one fetch.
//!
//! [`Element`] is the owned, mutable counterpart used to build change
//! documents and fetch filters.

mod element;
pub mod xpath;

pub use element::Element;
pub use xpath::{Expr, Selection};

use crate::error::DocumentError;

/// Index of a node within its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct NodeData {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

/// An immutable element tree.
///
/// Node 0 is always the root element. Element names and attribute names are
/// stored without their namespace prefix, so `junos:style` is addressed as
/// `style`.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    /// Parse an XML string.
    pub fn parse(xml: &str) -> Result<Self, DocumentError> {
        let parsed = roxmltree::Document::parse(xml)?;
        let mut doc = Document { nodes: Vec::new() };
        doc.copy_node(parsed.root_element(), None);
        Ok(doc)
    }

    /// Build a document from an owned element tree.
    pub fn from_element(element: &Element) -> Self {
        let mut doc = Document { nodes: Vec::new() };
        doc.copy_element(element, None);
        doc
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        if let Some(parent) = data.parent {
            self.nodes[parent.0].children.push(id);
        }
        self.nodes.push(data);
        id
    }

    fn copy_node(&mut self, node: roxmltree::Node<'_, '_>, parent: Option<NodeId>) {
        let text: String = node
            .children()
            .filter(|c| c.is_text())
            .filter_map(|c| c.text())
            .collect();

        let id = self.push(NodeData {
            name: node.tag_name().name().to_string(),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            text,
            children: Vec::new(),
            parent,
        });

        for child in node.children().filter(|c| c.is_element()) {
            self.copy_node(child, Some(id));
        }
    }

    fn copy_element(&mut self, element: &Element, parent: Option<NodeId>) {
        let id = self.push(NodeData {
            name: local_name(&element.name).to_string(),
            attributes: element
                .attributes
                .iter()
                .map(|(k, v)| (local_name(k).to_string(), v.clone()))
                .collect(),
            text: element.text.clone().unwrap_or_default(),
            children: Vec::new(),
            parent,
        });

        for child in &element.children {
            self.copy_element(child, Some(id));
        }
    }

    /// The root element.
    pub fn root(&self) -> Node<'_> {
        Node {
            doc: self,
            id: NodeId(0),
        }
    }

    /// Look up a node by id.
    ///
    /// Ids are only meaningful for the document that produced them.
    pub fn node(&self, id: NodeId) -> Node<'_> {
        debug_assert!(id.0 < self.nodes.len());
        Node { doc: self, id }
    }

    /// Number of elements in the document.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the document has no elements.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }
}

/// A borrowed handle to one element of a [`Document`].
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl<'a> Node<'a> {
    /// The node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The owning document.
    pub fn document(&self) -> &'a Document {
        self.doc
    }

    /// Local element name.
    pub fn name(&self) -> &'a str {
        &self.doc.data(self.id).name
    }

    /// Direct text content with surrounding whitespace removed.
    pub fn text(&self) -> &'a str {
        self.doc.data(self.id).text.trim()
    }

    /// Attribute value by local name.
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        let name = local_name(name);
        self.doc
            .data(self.id)
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All attributes in document order.
    pub fn attributes(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.doc
            .data(self.id)
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parent element, `None` for the root.
    pub fn parent(&self) -> Option<Node<'a>> {
        self.doc
            .data(self.id)
            .parent
            .map(|id| Node { doc: self.doc, id })
    }

    /// Child elements in document order.
    pub fn children(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        let doc = self.doc;
        doc.data(self.id)
            .children
            .iter()
            .map(move |&id| Node { doc, id })
    }

    /// First child element with the given local name.
    pub fn child(&self, name: &str) -> Option<Node<'a>> {
        let name = local_name(name);
        self.children().find(|c| c.name() == name)
    }

    /// All descendant elements (excluding self) in document order.
    pub fn descendants(&self) -> Vec<Node<'a>> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.doc.data(self.id).children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(Node { doc: self.doc, id });
            stack.extend(self.doc.data(id).children.iter().rev().copied());
        }
        out
    }

    /// Copy this subtree into an owned [`Element`].
    pub fn to_element(&self) -> Element {
        let data = self.doc.data(self.id);
        let mut element = Element::new(&data.name);
        for (k, v) in &data.attributes {
            element.attributes.insert(k.clone(), v.clone());
        }
        if !data.text.trim().is_empty() {
            element.text = Some(data.text.trim().to_string());
        }
        element.children = self.children().map(|c| c.to_element()).collect();
        element
    }
}

/// Strip a namespace prefix (`junos:style` -> `style`).
pub(crate) fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}
