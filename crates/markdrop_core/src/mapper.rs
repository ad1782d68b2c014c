//! Drop position to store index mapping.
//!
//! # Responsibility
//! - Convert UI placements into the resting index the store expects.
//! - Keep the two index semantics (final vs insertion) separate.
//!
//! # Invariants
//! - Every mapped index lies within `[0, len(destination children)]`, where the
//!   length is taken after the moved node has been inserted.
//! - `map_final` and `map_insertion` are pure and total.

use crate::model::mutation::Placement;
use crate::model::node::{BookmarkNode, Destination, NodeId};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Final-index mode: clamps a desired resting index.
pub fn map_final(index: i64, child_count: usize) -> usize {
    if child_count == 0 {
        return 0;
    }
    let last = (child_count - 1) as i64;
    index.clamp(0, last) as usize
}

/// Insertion-index mode: maps "before child i" to a resting index.
///
/// The `- 1` accounts for the source leaving an earlier slot of the same list.
pub fn map_insertion(insertion_index: i64, child_count: usize) -> usize {
    if child_count == 0 || insertion_index <= 0 {
        return 0;
    }
    if insertion_index >= child_count as i64 {
        return child_count - 1;
    }
    (insertion_index - 1) as usize
}

/// Mapped index escaped its valid range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOutOfRange {
    pub index: usize,
    pub child_count: usize,
}

impl Display for IndexOutOfRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mapped index {} outside [0, {}]",
            self.index, self.child_count
        )
    }
}

impl Error for IndexOutOfRange {}

/// Validates an index against the destination child count.
pub fn ensure_in_range(index: usize, child_count: usize) -> Result<usize, IndexOutOfRange> {
    if index <= child_count {
        Ok(index)
    } else {
        Err(IndexOutOfRange { index, child_count })
    }
}

/// Resolves one placement against a destination child list.
///
/// `children` is the destination's current ordered child list; it may or may
/// not contain the source. Only a source sitting before the insertion point
/// in the same folder shifts down one slot; insertion points reached from
/// another folder keep their slot.
pub fn resolve(
    placement: Placement,
    source_id: &NodeId,
    parent_id: &NodeId,
    children: &[BookmarkNode],
) -> Result<Destination, IndexOutOfRange> {
    let source_slot = children.iter().position(|child| &child.id == source_id);
    let remaining = children.len() - usize::from(source_slot.is_some());
    let post_len = remaining + 1;

    let index = match placement {
        Placement::Append => map_final(post_len as i64, post_len),
        Placement::Final(index) => map_final(index, post_len),
        Placement::Insertion(insertion) => match source_slot {
            Some(slot) if (slot as i64) < insertion => map_insertion(insertion, post_len),
            _ => map_final(insertion, post_len),
        },
    };

    Ok(Destination {
        parent_id: parent_id.clone(),
        index: ensure_in_range(index, remaining)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{ensure_in_range, map_final, map_insertion, resolve};
    use crate::model::mutation::Placement;
    use crate::model::node::{BookmarkNode, NodeId};

    fn children(ids: &[&str]) -> Vec<BookmarkNode> {
        ids.iter()
            .enumerate()
            .map(|(index, id)| {
                let mut node = BookmarkNode::item(*id, *id, format!("https://{id}.example"));
                node.index = index;
                node
            })
            .collect()
    }

    #[test]
    fn final_mode_clamps_into_child_range() {
        assert_eq!(map_final(-3, 5), 0);
        assert_eq!(map_final(99, 5), 4);
        assert_eq!(map_final(0, 0), 0);
        assert_eq!(map_final(2, 5), 2);
        assert_eq!(map_final(i64::MIN, 1), 0);
        assert_eq!(map_final(i64::MAX, 1), 0);
    }

    #[test]
    fn insertion_mode_shifts_interior_points_down() {
        assert_eq!(map_insertion(0, 5), 0);
        assert_eq!(map_insertion(5, 5), 4);
        assert_eq!(map_insertion(3, 5), 2);
        assert_eq!(map_insertion(1, 5), 0);
        assert_eq!(map_insertion(-7, 5), 0);
        assert_eq!(map_insertion(42, 5), 4);
        assert_eq!(map_insertion(3, 0), 0);
    }

    #[test]
    fn range_check_allows_append_slot_only() {
        assert_eq!(ensure_in_range(3, 3), Ok(3));
        assert!(ensure_in_range(4, 3).is_err());
    }

    #[test]
    fn header_drop_lands_first_in_same_parent() {
        let work = children(&["report", "invoice", "memo"]);
        let destination = resolve(
            Placement::Insertion(0),
            &NodeId::from("memo"),
            &NodeId::from("work"),
            &work,
        )
        .expect("resolve");
        assert_eq!(destination.index, 0);
    }

    #[test]
    fn body_drop_appends_across_parents() {
        let folder_b = children(&["b1", "b2"]);
        let destination = resolve(
            Placement::Append,
            &NodeId::from("x"),
            &NodeId::from("b"),
            &folder_b,
        )
        .expect("resolve");
        assert_eq!(destination.index, 2);
    }

    #[test]
    fn body_drop_in_same_parent_goes_last() {
        let list = children(&["a", "b", "c"]);
        let destination = resolve(
            Placement::Append,
            &NodeId::from("a"),
            &NodeId::from("p"),
            &list,
        )
        .expect("resolve");
        assert_eq!(destination.index, 2);
    }

    #[test]
    fn empty_destination_maps_to_zero_in_every_mode() {
        for placement in [
            Placement::Append,
            Placement::Final(9),
            Placement::Insertion(4),
            Placement::Insertion(-1),
        ] {
            let destination =
                resolve(placement, &NodeId::from("x"), &NodeId::from("empty"), &[])
                    .expect("resolve");
            assert_eq!(destination.index, 0, "placement {placement}");
        }
    }

    /// Every insertion point of a same-parent reorder must yield the slot the
    /// user pointed at, for every source position.
    #[test]
    fn same_parent_insertion_matches_visual_target_for_all_positions() {
        let ids = ["a", "b", "c", "d", "e"];
        let list = children(&ids);
        for (source_slot, source) in ids.iter().enumerate() {
            for insertion in 0..=ids.len() {
                let destination = resolve(
                    Placement::Insertion(insertion as i64),
                    &NodeId::from(*source),
                    &NodeId::from("p"),
                    &list,
                )
                .expect("resolve");

                let mut expected: Vec<&str> = ids.to_vec();
                expected.remove(source_slot);
                let visual_slot = if insertion > source_slot {
                    insertion - 1
                } else {
                    insertion
                };
                expected.insert(visual_slot, source);

                let mut actual: Vec<&str> = ids.to_vec();
                actual.remove(source_slot);
                actual.insert(destination.index, source);
                assert_eq!(
                    actual, expected,
                    "source {source} insertion {insertion} -> {}",
                    destination.index
                );
                assert!(destination.index < ids.len());
            }
        }
    }

    #[test]
    fn cross_parent_insertion_points_keep_their_slot() {
        let list = children(&["a", "b", "c"]);
        for insertion in 0..=3_i64 {
            let destination = resolve(
                Placement::Insertion(insertion),
                &NodeId::from("x"),
                &NodeId::from("p"),
                &list,
            )
            .expect("resolve");
            assert_eq!(destination.index, insertion as usize);
        }
    }

    #[test]
    fn final_mode_in_same_parent_never_exceeds_last_slot() {
        let list = children(&["a", "b", "c"]);
        let destination = resolve(
            Placement::Final(10),
            &NodeId::from("b"),
            &NodeId::from("p"),
            &list,
        )
        .expect("resolve");
        assert_eq!(destination.index, 2);
    }
}
