//! Bookmark node read model.
//!
//! # Responsibility
//! - Define the shape of items and folders as reported by the store.
//! - Keep identity opaque: ids are assigned by the store, never by the engine.
//!
//! # Invariants
//! - A node with `url == Some(_)` is an item; otherwise it is a folder.
//! - `index` is the node's position within its parent's ordered children.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Opaque, store-assigned node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Node kind as seen by drag sources and drop zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Leaf bookmark with a URL.
    Item,
    /// Ordered container of items and sub-folders.
    Folder,
}

/// One bookmark node snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkNode {
    pub id: NodeId,
    /// `None` for store roots.
    pub parent_id: Option<NodeId>,
    /// Position within parent children.
    pub index: usize,
    pub title: String,
    /// Present only for items.
    pub url: Option<String>,
    /// Present only for folders loaded with their subtree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BookmarkNode>>,
}

impl BookmarkNode {
    /// Creates an empty folder node.
    pub fn folder(id: impl Into<NodeId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            index: 0,
            title: title.into(),
            url: None,
            children: Some(Vec::new()),
        }
    }

    /// Creates an item node.
    pub fn item(id: impl Into<NodeId>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            index: 0,
            title: title.into(),
            url: Some(url.into()),
            children: None,
        }
    }

    /// Builder helper used by fixtures: appends children and re-indexes them.
    pub fn with_children(mut self, children: Vec<BookmarkNode>) -> Self {
        let mut children = children;
        for (index, child) in children.iter_mut().enumerate() {
            child.parent_id = Some(self.id.clone());
            child.index = index;
        }
        self.children = Some(children);
        self
    }

    pub fn kind(&self) -> NodeKind {
        if self.url.is_some() {
            NodeKind::Item
        } else {
            NodeKind::Folder
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind() == NodeKind::Folder
    }

    /// Returns a copy without the nested subtree.
    pub fn shallow(&self) -> Self {
        Self {
            children: None,
            ..self.clone()
        }
    }
}

/// Concrete move destination: parent folder plus resting index after the move.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub parent_id: NodeId,
    pub index: usize,
}

impl Destination {
    pub fn new(parent_id: impl Into<NodeId>, index: usize) -> Self {
        Self {
            parent_id: parent_id.into(),
            index,
        }
    }
}

impl Display for Destination {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.parent_id, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::{BookmarkNode, NodeId, NodeKind};

    #[test]
    fn kind_follows_url_presence() {
        assert_eq!(
            BookmarkNode::item("7", "Docs", "https://docs.rs").kind(),
            NodeKind::Item
        );
        assert_eq!(BookmarkNode::folder("8", "Work").kind(), NodeKind::Folder);
    }

    #[test]
    fn with_children_assigns_parent_and_contiguous_indices() {
        let folder = BookmarkNode::folder("10", "Work").with_children(vec![
            BookmarkNode::item("11", "Report", "https://a.example"),
            BookmarkNode::item("12", "Invoice", "https://b.example"),
        ]);
        let children = folder.children.expect("folder children");
        assert_eq!(children[0].parent_id, Some(NodeId::from("10")));
        assert_eq!(children[1].index, 1);
    }

    #[test]
    fn node_id_serializes_as_plain_string() {
        let encoded = serde_json::to_string(&NodeId::from("42")).expect("serialize id");
        assert_eq!(encoded, "\"42\"");
    }
}
