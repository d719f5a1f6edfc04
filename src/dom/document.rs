//! The host document contract.

use std::fmt;

use crate::error::DomError;

/// Opaque handle to a node of the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One structural change observed under a watched subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Node whose child list changed.
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// Read and write access to the host page.
///
/// Reads return `Option` because the host may have dropped any node at any
/// time. Writes return `DomError` for the same reason; callers decide whether
/// a vanished node matters.
pub trait HostDocument {
    /// All connected elements carrying `class`, in document order.
    fn query_by_class(&self, class: &str) -> Vec<NodeId>;

    /// First descendant of `node` (excluding `node`) carrying `class`.
    fn find_descendant_by_class(&self, node: NodeId, class: &str) -> Option<NodeId>;

    /// First descendant of `node` (excluding `node`) with the given tag.
    fn find_descendant_by_tag(&self, node: NodeId, tag: &str) -> Option<NodeId>;

    fn has_class(&self, node: NodeId, class: &str) -> bool;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Concatenated text of `node` and its descendants.
    fn text_content(&self, node: NodeId) -> Option<String>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// True when `node` is `ancestor` or lies below it.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool;

    /// True when `node` is reachable from the document root.
    fn is_connected(&self, node: NodeId) -> bool;

    /// Inline `display` style; empty string when unset.
    fn display(&self, node: NodeId) -> Option<String>;

    fn set_display(&mut self, node: NodeId, value: &str) -> Result<(), DomError>;

    /// Create a detached element.
    fn create_element(&mut self, tag: &str, class: &str) -> NodeId;

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError>;

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), DomError>;

    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<(), DomError>;

    fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError>;

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError>;

    /// Detach `node` from its parent. Detaching a detached node is a no-op.
    fn remove(&mut self, node: NodeId) -> Result<(), DomError>;

    /// The element a call entry with the given host id is rendered in.
    fn find_call_element(&self, call_entry_class: &str, call_id: &str) -> Option<NodeId> {
        self.query_by_class(call_entry_class)
            .into_iter()
            .find(|&node| self.attribute(node, "data-id").as_deref() == Some(call_id))
    }

    /// The activity feed root, if rendered.
    fn feed_container(&self, feed_class: &str) -> Option<NodeId> {
        self.query_by_class(feed_class).into_iter().next()
    }

    /// True when `node` carries `class` or has a descendant that does.
    fn subtree_has_class(&self, node: NodeId, class: &str) -> bool {
        self.has_class(node, class) || self.find_descendant_by_class(node, class).is_some()
    }
}
