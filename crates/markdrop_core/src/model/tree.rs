//! In-memory bookmark tree helpers.
//!
//! # Responsibility
//! - Hold one hierarchical snapshot (UI mirror, store double fixtures).
//! - Provide lookup, ancestry and structural edit helpers.
//!
//! # Invariants
//! - After every structural edit, touched sibling lists are re-indexed
//!   contiguously from 0 and children point back at their parent.

use crate::model::node::{BookmarkNode, Destination, NodeId};
use std::collections::HashSet;

/// Hierarchical snapshot rooted at one or more store roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkTree {
    roots: Vec<BookmarkNode>,
}

impl BookmarkTree {
    pub fn new(roots: Vec<BookmarkNode>) -> Self {
        let mut tree = Self { roots };
        for (index, root) in tree.roots.iter_mut().enumerate() {
            root.parent_id = None;
            root.index = index;
            reindex_subtree(root);
        }
        tree
    }

    pub fn roots(&self) -> &[BookmarkNode] {
        &self.roots
    }

    pub fn into_roots(self) -> Vec<BookmarkNode> {
        self.roots
    }

    pub fn find(&self, id: &NodeId) -> Option<&BookmarkNode> {
        self.roots.iter().find_map(|root| find_in(root, id))
    }

    pub fn find_mut(&mut self, id: &NodeId) -> Option<&mut BookmarkNode> {
        self.roots.iter_mut().find_map(|root| find_in_mut(root, id))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.find(id).is_some()
    }

    /// Returns child nodes of one folder, or `None` if the folder is unknown.
    pub fn children_of(&self, folder_id: &NodeId) -> Option<&[BookmarkNode]> {
        self.find(folder_id)
            .and_then(|node| node.children.as_deref())
    }

    /// Returns ids from `id` up to its root, starting with `id` itself.
    ///
    /// Stops early on a repeated id so corrupted snapshots cannot loop.
    pub fn ancestry(&self, id: &NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut cursor = self.find(id).map(|node| node.id.clone());
        while let Some(current) = cursor {
            if !visited.insert(current.clone()) {
                break;
            }
            cursor = self
                .find(&current)
                .and_then(|node| node.parent_id.clone());
            chain.push(current);
        }
        chain
    }

    /// Current `(parent, index)` of one node, when it has a parent.
    pub fn position_of(&self, id: &NodeId) -> Option<Destination> {
        let node = self.find(id)?;
        let parent_id = node.parent_id.clone()?;
        Some(Destination {
            parent_id,
            index: node.index,
        })
    }

    /// Detaches one non-root node and re-indexes its former siblings.
    pub fn remove(&mut self, id: &NodeId) -> Option<BookmarkNode> {
        let parent_id = self.find(id)?.parent_id.clone()?;
        let parent = self.find_mut(&parent_id)?;
        let children = parent.children.as_mut()?;
        let position = children.iter().position(|child| &child.id == id)?;
        let removed = children.remove(position);
        reindex_children(&parent_id, children);
        Some(removed)
    }

    /// Inserts one node under `parent_id`, clamping `index` to the sibling range.
    ///
    /// Returns the index the node finally occupies.
    pub fn insert(
        &mut self,
        parent_id: &NodeId,
        index: usize,
        node: BookmarkNode,
    ) -> Option<usize> {
        let parent = self.find_mut(parent_id)?;
        if !parent.is_folder() {
            return None;
        }
        let children = parent.children.get_or_insert_with(Vec::new);
        let target = index.min(children.len());
        children.insert(target, node);
        reindex_children(parent_id, children);
        Some(target)
    }

    /// Moves one node to `destination`; the index is the resting index after the move.
    pub fn move_node(&mut self, id: &NodeId, destination: &Destination) -> Option<usize> {
        if !self.find(&destination.parent_id)?.is_folder() {
            return None;
        }
        if self.ancestry(&destination.parent_id).contains(id) {
            return None;
        }
        let node = self.remove(id)?;
        self.insert(&destination.parent_id, destination.index, node)
    }

    /// Number of nodes in the snapshot.
    pub fn len(&self) -> usize {
        fn count(node: &BookmarkNode) -> usize {
            1 + node
                .children
                .as_ref()
                .map(|children| children.iter().map(count).sum())
                .unwrap_or(0)
        }
        self.roots.iter().map(count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Flattened pre-order view of every node.
    pub fn iter(&self) -> impl Iterator<Item = &BookmarkNode> {
        let mut stack: Vec<&BookmarkNode> = self.roots.iter().rev().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            if let Some(children) = node.children.as_ref() {
                stack.extend(children.iter().rev());
            }
            Some(node)
        })
    }
}

fn find_in<'a>(node: &'a BookmarkNode, id: &NodeId) -> Option<&'a BookmarkNode> {
    if &node.id == id {
        return Some(node);
    }
    node.children
        .as_ref()?
        .iter()
        .find_map(|child| find_in(child, id))
}

fn find_in_mut<'a>(node: &'a mut BookmarkNode, id: &NodeId) -> Option<&'a mut BookmarkNode> {
    if &node.id == id {
        return Some(node);
    }
    node.children
        .as_mut()?
        .iter_mut()
        .find_map(|child| find_in_mut(child, id))
}

fn reindex_children(parent_id: &NodeId, children: &mut [BookmarkNode]) {
    for (index, child) in children.iter_mut().enumerate() {
        child.index = index;
        child.parent_id = Some(parent_id.clone());
    }
}

fn reindex_subtree(node: &mut BookmarkNode) {
    let parent_id = node.id.clone();
    if let Some(children) = node.children.as_mut() {
        reindex_children(&parent_id, children);
        for child in children.iter_mut() {
            reindex_subtree(child);
        }
    }
}
