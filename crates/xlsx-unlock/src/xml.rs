//! Arena-backed mutable XML tree for the package parts this crate rewrites.
//!
//! Every node of a part lives in a single `Vec` owned by [`XmlPart`]. Callers address nodes through
//! [`NodeId`] handles, which are plain indices and only meaningful for the part that produced them;
//! nothing outside the part holds a reference into its tree, so a mutated part can be serialized
//! and swapped back into the package wholesale.
//!
//! Markup this crate never edits (the XML declaration, comments, processing instructions, CDATA,
//! and the raw start tags of untouched elements) is kept as the original quick-xml events so the
//! serialized output stays as close to the source bytes as possible.
//!
//! Element lookup is by *local name*: `<x:sheetProtection>` and `<sheetProtection>` both match
//! `"sheetProtection"`. Namespace prefixes vary between producers and are never assumed.

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Error)]
pub enum XmlDomError {
    #[error("xml is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("xml parse error: {0}")]
    Parse(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid xml document: {0}")]
    Invalid(&'static str),
}

/// Handle to a node inside one [`XmlPart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

const DOCUMENT: NodeId = NodeId(0);

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element {
        start: BytesStart<'static>,
        /// `<a/>` in the source (or a freshly created element). Only honoured while the element
        /// has no children.
        self_closing: bool,
    },
    Text(BytesText<'static>),
    /// Any other event (declaration, comment, PI, doctype, CDATA) kept verbatim.
    Other(Event<'static>),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed, mutable XML part.
#[derive(Debug, Clone)]
pub struct XmlPart {
    nodes: Vec<Node>,
    root: NodeId,
    bom: bool,
}

impl XmlPart {
    pub fn parse(bytes: &[u8]) -> Result<Self, XmlDomError> {
        let (bytes, bom) = match bytes.strip_prefix(UTF8_BOM) {
            Some(rest) => (rest, true),
            None => (bytes, false),
        };
        std::str::from_utf8(bytes)?;

        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        let mut part = XmlPart {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            root: DOCUMENT,
            bom,
        };
        let mut open: Vec<NodeId> = vec![DOCUMENT];
        let mut buf = Vec::new();

        loop {
            let parent = open.last().copied().unwrap_or(DOCUMENT);
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let id = part.push_element(parent, e.into_owned(), false)?;
                    open.push(id);
                }
                Event::Empty(e) => {
                    part.push_element(parent, e.into_owned(), true)?;
                }
                Event::End(_) => {
                    if open.len() <= 1 {
                        return Err(XmlDomError::Invalid("unexpected closing tag"));
                    }
                    open.pop();
                }
                Event::Text(e) => {
                    part.push_node(parent, NodeKind::Text(e.into_owned()));
                }
                Event::Eof => break,
                other => {
                    part.push_node(parent, NodeKind::Other(other.into_owned()));
                }
            }
            buf.clear();
        }

        if open.len() > 1 {
            return Err(XmlDomError::Invalid("unclosed element at end of document"));
        }
        if part.root == DOCUMENT {
            return Err(XmlDomError::Invalid("missing root element"));
        }
        Ok(part)
    }

    fn push_node(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.push(id);
        }
        id
    }

    fn push_element(
        &mut self,
        parent: NodeId,
        start: BytesStart<'static>,
        self_closing: bool,
    ) -> Result<NodeId, XmlDomError> {
        if parent == DOCUMENT && self.root != DOCUMENT {
            return Err(XmlDomError::Invalid("more than one root element"));
        }
        let id = self.push_node(
            parent,
            NodeKind::Element {
                start,
                self_closing,
            },
        );
        if parent == DOCUMENT {
            self.root = id;
        }
        Ok(id)
    }

    /// The document element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn start(&self, id: NodeId) -> Option<&BytesStart<'static>> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Element { start, .. } => Some(start),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.start(id).is_some()
    }

    /// Qualified element name as written in the source (e.g. `cp:keywords`).
    pub fn qualified_name(&self, id: NodeId) -> Option<&[u8]> {
        self.start(id).map(|start| start.name().into_inner())
    }

    pub fn local_name(&self, id: NodeId) -> Option<&[u8]> {
        self.qualified_name(id).map(local_name)
    }

    /// Namespace prefix of an element name, if it has one.
    pub fn prefix(&self, id: NodeId) -> Option<&str> {
        let name = self.qualified_name(id)?;
        let idx = name.iter().position(|b| *b == b':')?;
        std::str::from_utf8(&name[..idx]).ok()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.parent.filter(|p| *p != DOCUMENT)
    }

    /// All attached elements with the given local name, in document order.
    pub fn descendants_by_local(&self, local: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            if self.local_name(id) == Some(local.as_bytes()) {
                out.push(id);
            }
            // Reverse so the stack pops children in document order.
            for child in self.children(id).iter().rev() {
                if self.is_element(*child) {
                    pending.push(*child);
                }
            }
        }
        out
    }

    pub fn first_by_local(&self, local: &str) -> Option<NodeId> {
        self.descendants_by_local(local).into_iter().next()
    }

    /// Child elements of `id` with the given local name.
    pub fn children_by_local<'a>(
        &'a self,
        id: NodeId,
        local: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |child| self.local_name(*child) == Some(local.as_bytes()))
    }

    /// Unescaped value of the attribute with the exact qualified name `key`.
    pub fn attr(&self, id: NodeId, key: &str) -> Option<String> {
        let start = self.start(id)?;
        start
            .attributes()
            .with_checks(false)
            .filter_map(Result::ok)
            .find(|attr| attr.key.as_ref() == key.as_bytes())
            .map(|attr| match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            })
    }

    /// Namespace declarations on the root element as `(prefix, uri)`; `None` is the default
    /// namespace.
    pub fn namespace_declarations(&self) -> Vec<(Option<String>, String)> {
        let Some(start) = self.start(self.root) else {
            return Vec::new();
        };
        start
            .attributes()
            .with_checks(false)
            .filter_map(Result::ok)
            .filter_map(|attr| {
                let key = std::str::from_utf8(attr.key.as_ref()).ok()?;
                let prefix = if key == "xmlns" {
                    None
                } else {
                    Some(key.strip_prefix("xmlns:")?.to_string())
                };
                let uri = attr.unescape_value().ok()?.into_owned();
                Some((prefix, uri))
            })
            .collect()
    }

    /// The prefix the root binds to `uri`: `Some(None)` for the default namespace, `None` when
    /// the namespace is not declared.
    pub fn prefix_for_namespace(&self, uri: &str) -> Option<Option<String>> {
        let decls = self.namespace_declarations();
        // Prefer a named prefix so attribute names (which never use the default namespace) can
        // reuse the same lookup.
        decls
            .iter()
            .find(|(prefix, value)| prefix.is_some() && value == uri)
            .or_else(|| decls.iter().find(|(_, value)| value == uri))
            .map(|(prefix, _)| prefix.clone())
    }

    /// Concatenated text content of an element (text and CDATA descendants).
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for child in self.children(id) {
            let Some(node) = self.nodes.get(child.0) else {
                continue;
            };
            match &node.kind {
                NodeKind::Text(text) => match text.unescape() {
                    Ok(value) => out.push_str(&value),
                    Err(_) => out.push_str(&String::from_utf8_lossy(text)),
                },
                NodeKind::Other(Event::CData(cdata)) => {
                    out.push_str(&String::from_utf8_lossy(cdata));
                }
                NodeKind::Element { .. } => self.collect_text(*child, out),
                _ => {}
            }
        }
    }

    /// Detach a node (and its subtree) from the tree.
    pub fn remove(&mut self, id: NodeId) {
        if id == DOCUMENT || id == self.root {
            return;
        }
        let Some(parent) = self.nodes.get_mut(id.0).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.retain(|child| *child != id);
        }
    }

    /// Replace the children of an element with a single text node. An empty string leaves the
    /// element empty.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if !self.is_element(id) {
            return;
        }
        let Some(node) = self.nodes.get_mut(id.0) else {
            return;
        };
        for child in std::mem::take(&mut node.children) {
            if let Some(child) = self.nodes.get_mut(child.0) {
                child.parent = None;
            }
        }
        if !text.is_empty() {
            self.push_node(id, NodeKind::Text(BytesText::new(text).into_owned()));
        }
    }

    /// Set (or replace) an attribute on an element. `value` is escaped on write.
    pub fn set_attr(&mut self, id: NodeId, key: &str, value: &str) -> Result<(), XmlDomError> {
        let Some(start) = self.start(id) else {
            return Ok(());
        };
        let name = std::str::from_utf8(start.name().into_inner())?.to_string();
        let mut rebuilt = BytesStart::new(name);
        let mut replaced = false;
        for attr in start.attributes().with_checks(false) {
            let attr = attr?;
            let attr_key = std::str::from_utf8(attr.key.as_ref())?;
            if attr_key == key {
                rebuilt.push_attribute((key, value));
                replaced = true;
            } else {
                // Re-escape so values that were single-quoted in the source stay well-formed
                // inside the double quotes quick-xml writes.
                let unescaped = attr.unescape_value()?;
                rebuilt.push_attribute((attr_key, unescaped.as_ref()));
            }
        }
        if !replaced {
            rebuilt.push_attribute((key, value));
        }

        if let Some(Node {
            kind: NodeKind::Element { start, .. },
            ..
        }) = self.nodes.get_mut(id.0)
        {
            *start = rebuilt;
        }
        Ok(())
    }

    /// Declare `xmlns:{prefix}="{uri}"` on the root element.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) -> Result<(), XmlDomError> {
        let root = self.root;
        self.set_attr(root, &format!("xmlns:{prefix}"), uri)
    }

    /// Append a new, empty element named `qualified_name` as the last child of `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        qualified_name: &str,
    ) -> Result<NodeId, XmlDomError> {
        if !self.is_element(parent) {
            return Err(XmlDomError::Invalid("append target is not an element of this part"));
        }
        Ok(self.push_node(
            parent,
            NodeKind::Element {
                start: BytesStart::new(qualified_name.to_string()),
                self_closing: true,
            },
        ))
    }

    pub fn to_xml_bytes(&self) -> Result<Vec<u8>, XmlDomError> {
        let mut out = Vec::new();
        if self.bom {
            out.extend_from_slice(UTF8_BOM);
        }
        let mut writer = Writer::new(out);
        for child in self.children(DOCUMENT) {
            self.write_node(&mut writer, *child)?;
        }
        Ok(writer.into_inner())
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<(), XmlDomError> {
        let Some(node) = self.nodes.get(id.0) else {
            return Ok(());
        };
        match &node.kind {
            NodeKind::Document => {}
            NodeKind::Element {
                start,
                self_closing,
            } => {
                if node.children.is_empty() && *self_closing {
                    writer.write_event(Event::Empty(start.clone()))?;
                } else {
                    writer.write_event(Event::Start(start.clone()))?;
                    for child in &node.children {
                        self.write_node(writer, *child)?;
                    }
                    writer.write_event(Event::End(start.to_end()))?;
                }
            }
            NodeKind::Text(text) => writer.write_event(Event::Text(text.clone()))?,
            NodeKind::Other(event) => writer.write_event(event.clone())?,
        }
        Ok(())
    }
}

/// Strip a namespace prefix from a qualified name.
pub fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}
