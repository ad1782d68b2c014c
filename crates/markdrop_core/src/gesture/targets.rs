//! Registry of draggable sources and drop zones.
//!
//! # Responsibility
//! - Map typed UI element keys to drag sources and drop zones.
//! - Hit-test pointer positions against registered bounds.
//! - Keep UI element to store id mapping fresh after store-side id churn.
//!
//! # Invariants
//! - Hit-testing returns the highest z-order match; ties go to the most
//!   recently registered element.
//! - Element identity comes from the registry only, never from markup.

use crate::model::drag::{DragSource, DropZone, Point, Rect};
use crate::model::node::{BookmarkNode, NodeId, NodeKind};
use crate::model::tree::BookmarkTree;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

/// Host-assigned key of one UI element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementKey(String);

impl ElementKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ElementKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    bounds: Option<Rect>,
    z: i32,
    order: u64,
}

/// Outcome of one id-mapping refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapReport {
    /// `(old, new)` pairs for ids that changed.
    pub remapped: Vec<(NodeId, NodeId)>,
    /// Elements whose node no longer exists in the store.
    pub dropped: Vec<ElementKey>,
}

impl RemapReport {
    /// New id for `old`, if it was remapped.
    pub fn resolve(&self, old: &NodeId) -> Option<&NodeId> {
        self.remapped
            .iter()
            .find(|(from, _)| from == old)
            .map(|(_, to)| to)
    }
}

/// Element registry shared by input adapters and error recovery.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    sources: HashMap<ElementKey, Entry<DragSource>>,
    zones: HashMap<ElementKey, Entry<DropZone>>,
    next_order: u64,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a draggable element.
    pub fn register_source(
        &mut self,
        element: ElementKey,
        source: DragSource,
        bounds: Option<Rect>,
        z: i32,
    ) {
        let order = self.bump();
        self.sources.insert(
            element,
            Entry {
                value: source,
                bounds,
                z,
                order,
            },
        );
    }

    /// Registers (or replaces) a drop zone element.
    pub fn register_zone(&mut self, element: ElementKey, zone: DropZone, bounds: Option<Rect>, z: i32) {
        let order = self.bump();
        self.zones.insert(
            element,
            Entry {
                value: zone,
                bounds,
                z,
                order,
            },
        );
    }

    /// Removes every role of one element.
    pub fn unregister(&mut self, element: &ElementKey) {
        self.sources.remove(element);
        self.zones.remove(element);
    }

    pub fn clear(&mut self) {
        self.sources.clear();
        self.zones.clear();
    }

    pub fn source_for(&self, element: &ElementKey) -> Option<&DragSource> {
        self.sources.get(element).map(|entry| &entry.value)
    }

    pub fn zone_for(&self, element: &ElementKey) -> Option<&DropZone> {
        self.zones.get(element).map(|entry| &entry.value)
    }

    /// Topmost draggable under `point`.
    pub fn source_at(&self, point: Point) -> Option<(ElementKey, DragSource)> {
        hit_test(&self.sources, point)
    }

    /// Topmost drop zone under `point`.
    pub fn zone_at(&self, point: Point) -> Option<(ElementKey, DropZone)> {
        hit_test(&self.zones, point)
    }

    pub fn len(&self) -> usize {
        self.sources.len() + self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.zones.is_empty()
    }

    /// Rebinds stale node ids against a fresh store tree.
    ///
    /// Sources are matched by kind and title (and URL for items); zones by
    /// folder title. Elements that cannot be matched are dropped.
    pub fn remap(&mut self, tree: &BookmarkTree) -> RemapReport {
        let mut report = RemapReport::default();
        let mut claimed: HashSet<NodeId> = HashSet::new();

        for (element, entry) in self.sources.iter_mut() {
            if tree.contains(&entry.value.id) {
                continue;
            }
            let source = &entry.value;
            let candidate = tree
                .iter()
                .find(|node| !claimed.contains(&node.id) && source_matches(source, node))
                .map(|node| node.id.clone());
            match candidate {
                Some(new_id) => {
                    claimed.insert(new_id.clone());
                    push_remap(&mut report, &entry.value.id, &new_id);
                    entry.value.id = new_id;
                }
                None => report.dropped.push(element.clone()),
            }
        }

        for (element, entry) in self.zones.iter_mut() {
            if tree.contains(&entry.value.folder_id) {
                continue;
            }
            let zone = &entry.value;
            let candidate = report.resolve(&zone.folder_id).cloned().or_else(|| {
                tree.iter()
                    .find(|node| node.is_folder() && node.title == zone.folder_title)
                    .map(|node| node.id.clone())
            });
            match candidate {
                Some(new_id) => {
                    push_remap(&mut report, &entry.value.folder_id, &new_id);
                    entry.value.folder_id = new_id;
                }
                None => report.dropped.push(element.clone()),
            }
        }

        for element in &report.dropped {
            self.sources.retain(|key, entry| {
                key != element || tree.contains(&entry.value.id)
            });
            self.zones.retain(|key, entry| {
                key != element || tree.contains(&entry.value.folder_id)
            });
        }
        report.dropped.sort();
        report.dropped.dedup();

        log::info!(
            "event=id_map_refreshed module=gesture status=ok remapped={} dropped={}",
            report.remapped.len(),
            report.dropped.len()
        );
        report
    }

    fn bump(&mut self) -> u64 {
        self.next_order += 1;
        self.next_order
    }
}

fn hit_test<T: Clone>(
    entries: &HashMap<ElementKey, Entry<T>>,
    point: Point,
) -> Option<(ElementKey, T)> {
    entries
        .iter()
        .filter(|(_, entry)| entry.bounds.is_some_and(|bounds| bounds.contains(point)))
        .max_by_key(|(_, entry)| (entry.z, entry.order))
        .map(|(key, entry)| (key.clone(), entry.value.clone()))
}

fn source_matches(source: &DragSource, node: &BookmarkNode) -> bool {
    if node.kind() != source.kind || node.title != source.title {
        return false;
    }
    match source.kind {
        NodeKind::Item => node.url == source.url,
        NodeKind::Folder => true,
    }
}

fn push_remap(report: &mut RemapReport, old: &NodeId, new: &NodeId) {
    if report.resolve(old).is_none() {
        report.remapped.push((old.clone(), new.clone()));
    }
}
