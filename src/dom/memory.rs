//! Arena-backed in-memory document.
//!
//! Nodes are never freed: a removed node keeps its id and data but is no
//! longer reachable from the root, which is exactly how a host page looks
//! after it re-renders an element we still hold a handle to.

use std::collections::BTreeMap;

use crate::config::Selectors;
use crate::error::DomError;

use super::document::{HostDocument, MutationRecord, NodeId};

#[derive(Debug, Clone, Default)]
struct NodeData {
    tag: String,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    text: String,
    display: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// In-memory `HostDocument`.
///
/// Structural changes under the connected tree are queued as
/// `MutationRecord`s; the host drains them with `take_mutations`.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    nodes: Vec<NodeData>,
    mutations: Vec<MutationRecord>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        let root = NodeData {
            tag: "body".to_string(),
            ..NodeData::default()
        };
        Self {
            nodes: vec![root],
            mutations: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Create an element and append it to `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        class: &str,
    ) -> Result<NodeId, DomError> {
        let node = self.create_element(tag, class);
        self.append_child(parent, node)?;
        Ok(node)
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) -> Result<(), DomError> {
        let data = self.node_mut(node)?;
        if !data.classes.iter().any(|c| c == class) {
            data.classes.push(class.to_string());
        }
        Ok(())
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node)
            .map(|d| d.children.clone())
            .unwrap_or_default()
    }

    /// Drain queued mutation records.
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData, DomError> {
        self.nodes.get_mut(id.0).ok_or(DomError::NodeMissing(id))
    }

    fn ensure_exists(&self, id: NodeId) -> Result<(), DomError> {
        self.node(id).map(|_| ()).ok_or(DomError::NodeMissing(id))
    }

    /// Pre-order traversal below `node`, excluding `node`.
    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.node(node) {
            Some(d) => d.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(d) = self.node(current) {
                stack.extend(d.children.iter().rev().copied());
            }
        }
        out
    }

    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.node(child)?.parent?;
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.retain(|&c| c != child);
        }
        if let Some(c) = self.nodes.get_mut(child.0) {
            c.parent = None;
        }
        if self.is_connected(parent) {
            self.mutations.push(MutationRecord {
                target: parent,
                added: Vec::new(),
                removed: vec![child],
            });
        }
        Some(parent)
    }

    fn attach_at(&mut self, parent: NodeId, child: NodeId, index: usize) -> Result<(), DomError> {
        self.ensure_exists(parent)?;
        self.ensure_exists(child)?;
        self.detach(child);

        let p = self.node_mut(parent)?;
        let index = index.min(p.children.len());
        p.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);

        if self.is_connected(parent) {
            self.mutations.push(MutationRecord {
                target: parent,
                added: vec![child],
                removed: Vec::new(),
            });
        }
        Ok(())
    }
}

impl HostDocument for MemoryDocument {
    fn query_by_class(&self, class: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|&n| self.has_class(n, class))
            .collect()
    }

    fn find_descendant_by_class(&self, node: NodeId, class: &str) -> Option<NodeId> {
        self.descendants(node)
            .into_iter()
            .find(|&n| self.has_class(n, class))
    }

    fn find_descendant_by_tag(&self, node: NodeId, tag: &str) -> Option<NodeId> {
        self.descendants(node)
            .into_iter()
            .find(|&n| self.node(n).map(|d| d.tag.eq_ignore_ascii_case(tag)).unwrap_or(false))
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.node(node)
            .map(|d| d.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.node(node)?.attributes.get(name).cloned()
    }

    fn text_content(&self, node: NodeId) -> Option<String> {
        let mut text = self.node(node)?.text.clone();
        for d in self.descendants(node) {
            if let Some(data) = self.node(d) {
                text.push_str(&data.text);
            }
        }
        Some(text)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.node(node).is_some() && self.contains(self.root(), node)
    }

    fn display(&self, node: NodeId) -> Option<String> {
        self.node(node).map(|d| d.display.clone())
    }

    fn set_display(&mut self, node: NodeId, value: &str) -> Result<(), DomError> {
        self.node_mut(node)?.display = value.to_string();
        Ok(())
    }

    fn create_element(&mut self, tag: &str, class: &str) -> NodeId {
        let classes = class.split_whitespace().map(|c| c.to_string()).collect();
        self.nodes.push(NodeData {
            tag: tag.to_string(),
            classes,
            ..NodeData::default()
        });
        NodeId(self.nodes.len() - 1)
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.node_mut(node)?
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), DomError> {
        self.node_mut(node)?.text = text.to_string();
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<(), DomError> {
        let position = self
            .node(parent)
            .ok_or(DomError::NodeMissing(parent))?
            .children
            .iter()
            .position(|&c| c == reference)
            .ok_or(DomError::NotAChild {
                parent,
                child: reference,
            })?;
        self.attach_at(parent, child, position)
    }

    fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.attach_at(parent, child, 0)
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.attach_at(parent, child, usize::MAX)
    }

    fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        self.ensure_exists(node)?;
        self.detach(node);
        Ok(())
    }
}

/// Builds a call entry the way the CRM activity feed renders one.
#[derive(Debug, Clone, Default)]
pub struct CallEntryBuilder {
    id: String,
    link: Option<String>,
    outgoing: bool,
    phone: Option<String>,
    date: Option<String>,
    duration: Option<String>,
    status: Option<String>,
    operator: Option<(String, String)>,
    provider: Option<String>,
}

impl CallEntryBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn link(mut self, link: &str) -> Self {
        self.link = Some(link.to_string());
        self
    }

    pub fn outgoing(mut self) -> Self {
        self.outgoing = true;
        self
    }

    pub fn phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    pub fn date(mut self, date: &str) -> Self {
        self.date = Some(date.to_string());
        self
    }

    pub fn duration(mut self, duration: &str) -> Self {
        self.duration = Some(duration.to_string());
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn operator(mut self, id: &str, name: &str) -> Self {
        self.operator = Some((id.to_string(), name.to_string()));
        self
    }

    pub fn provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }

    /// Render the entry as the last child of `parent`.
    pub fn append_to(
        &self,
        doc: &mut MemoryDocument,
        selectors: &Selectors,
        parent: NodeId,
    ) -> Result<NodeId, DomError> {
        let entry = doc.create_element("div", &selectors.call_entry);
        if !self.id.is_empty() {
            doc.set_attribute(entry, "data-id", &self.id)?;
        }

        if self.outgoing {
            doc.append_element(entry, "span", &selectors.direction_out)?;
        }

        let header = doc.append_element(entry, "div", &selectors.header)?;
        let header_text = match (&self.phone, self.outgoing) {
            (Some(phone), false) => format!("от: {} кому:", phone),
            (Some(phone), true) => format!("кому: {}", phone),
            (None, _) => String::new(),
        };
        doc.set_text(header, &header_text)?;

        if let Some(date) = &self.date {
            let node = doc.append_element(entry, "span", &selectors.date)?;
            doc.set_text(node, date)?;
        }

        if let Some(status) = &self.status {
            let node = doc.append_element(entry, "div", &selectors.status)?;
            let bold = doc.append_element(node, "b", "")?;
            doc.set_text(bold, status)?;
        }

        if let Some((id, name)) = &self.operator {
            let node = doc.append_element(entry, "a", &selectors.operator)?;
            doc.set_attribute(node, "data-id", id)?;
            doc.set_text(node, name)?;
        }

        if let Some(link) = &self.link {
            let node = doc.append_element(entry, "a", &selectors.player_link)?;
            doc.set_attribute(node, "href", link)?;
            if let Some(provider) = &self.provider {
                doc.set_attribute(node, "data-prepare", provider)?;
            }
        }

        if let Some(duration) = &self.duration {
            let node = doc.append_element(entry, "span", &selectors.duration)?;
            doc.set_text(node, duration)?;
        }

        // Attach last so observers see a single fully rendered entry.
        doc.append_child(parent, entry)?;
        Ok(entry)
    }
}
