#![allow(dead_code)]

use markdrop_core::{
    BookmarkNode, BookmarkTree, DragDropEngine, DragSource, DropTarget, DropZone, EngineConfig,
    EngineEvent, HostCapabilities, InputModality, MemoryStore, MutationRequest, NodeId, Store,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// ```text
/// 0 (root)
/// └── 1 Bookmarks bar
///     ├── 10 Work: 11 Report, 12 Invoice, 13 Memo
///     ├── 20 Archive: 21 Old
///     └── 30 Projects
///         └── 31 Alpha: 32 Deep
/// 2 Other bookmarks (under 0)
/// ```
pub fn fixture_tree() -> Vec<BookmarkNode> {
    vec![BookmarkNode::folder("0", "").with_children(vec![
        BookmarkNode::folder("1", "Bookmarks bar").with_children(vec![
            BookmarkNode::folder("10", "Work").with_children(vec![
                BookmarkNode::item("11", "Report", "https://report.example"),
                BookmarkNode::item("12", "Invoice", "https://invoice.example"),
                BookmarkNode::item("13", "Memo", "https://memo.example"),
            ]),
            BookmarkNode::folder("20", "Archive").with_children(vec![BookmarkNode::item(
                "21",
                "Old",
                "https://old.example",
            )]),
            BookmarkNode::folder("30", "Projects").with_children(vec![BookmarkNode::folder(
                "31", "Alpha",
            )
            .with_children(vec![BookmarkNode::item(
                "32",
                "Deep",
                "https://deep.example",
            )])]),
        ]),
        BookmarkNode::folder("2", "Other bookmarks"),
    ])]
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(fixture_tree()))
}

pub async fn start_engine(store: &Arc<MemoryStore>, config: EngineConfig) -> DragDropEngine {
    let shared: Arc<dyn Store> = store.clone();
    DragDropEngine::start(shared, config, HostCapabilities::default())
        .await
        .expect("engine should start")
}

pub fn memo() -> DragSource {
    DragSource::item("13", "Memo", "https://memo.example")
}

pub fn report() -> DragSource {
    DragSource::item("11", "Report", "https://report.example")
}

pub fn invoice() -> DragSource {
    DragSource::item("12", "Invoice", "https://invoice.example")
}

pub fn drop_on(source: DragSource, zone: &DropZone) -> MutationRequest {
    MutationRequest::new(
        source,
        DropTarget {
            folder_id: zone.folder_id.clone(),
            folder_title: zone.folder_title.clone(),
            placement: zone.placement(),
        },
        InputModality::Native,
    )
}

pub fn ids(ids: &[&str]) -> Vec<NodeId> {
    ids.iter().map(|id| NodeId::from(*id)).collect()
}

pub fn mirror_ids(tree: &BookmarkTree, folder: &str) -> Vec<NodeId> {
    tree.children_of(&NodeId::from(folder))
        .expect("folder should exist in mirror")
        .iter()
        .map(|node| node.id.clone())
        .collect()
}

pub fn drain(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Asserts `id` appears exactly once in the whole tree, under `parent`.
pub fn assert_single_placement(tree: &BookmarkTree, id: &str, parent: &str) {
    let id = NodeId::from(id);
    let placements: Vec<Option<&NodeId>> = tree
        .iter()
        .filter(|node| node.id == id)
        .map(|node| node.parent_id.as_ref())
        .collect();
    assert_eq!(placements, vec![Some(&NodeId::from(parent))]);
}
