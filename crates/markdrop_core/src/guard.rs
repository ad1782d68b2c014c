//! Protected-node classification and move validation.
//!
//! # Responsibility
//! - Decide whether a folder is a fixed root/system folder.
//! - Reject protected, circular and no-op moves before any store call.
//!
//! # Invariants
//! - A folder's protection flag, once computed, never changes for that id.
//! - Protection is decided from identity and title only, never from mirror
//!   structure, so mirror staleness cannot weaken it.

use crate::model::node::{Destination, NodeId, NodeKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;

/// Chromium root and permanent folder ids.
const CHROMIUM_PROTECTED_IDS: &[&str] = &["0", "1", "2", "3"];
/// Firefox root and built-in folder guids.
const FIREFOX_PROTECTED_IDS: &[&str] = &[
    "root________",
    "menu________",
    "toolbar_____",
    "unfiled_____",
    "mobile______",
];

static PROTECTED_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(bookmarks(\s+(bar|toolbar|menu))?|other\s+bookmarks|mobile\s+bookmarks|menu)$",
    )
    .expect("valid protected title regex")
});

/// Validation rejection raised before any store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationRejection {
    /// Dragged folder is a root/system folder.
    ProtectedSource { id: NodeId, title: String },
    /// Destination folder is a root/system folder.
    ProtectedDestination { id: NodeId, title: String },
    /// Destination lies inside the dragged folder's subtree.
    Cycle { source: NodeId, destination: NodeId },
    /// Drop would leave the node where it already is.
    NoOp { source: NodeId, position: Destination },
    /// Destination zone does not accept this kind of source.
    IncompatibleTarget { source: NodeId, kind: NodeKind },
}

impl ValidationRejection {
    /// Message suitable for a toast/banner; `None` for silent rejections.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::ProtectedSource { title, .. } => Some(format!(
                "\"{}\" is a built-in folder and cannot be moved.",
                display_title(title)
            )),
            Self::ProtectedDestination { title, .. } => Some(format!(
                "\"{}\" is a built-in folder and cannot be reorganized.",
                display_title(title)
            )),
            Self::Cycle { .. } => Some("A folder cannot be moved into itself.".to_string()),
            Self::NoOp { .. } => None,
            Self::IncompatibleTarget { .. } => None,
        }
    }

    pub fn is_protection(&self) -> bool {
        matches!(
            self,
            Self::ProtectedSource { .. } | Self::ProtectedDestination { .. }
        )
    }
}

impl Display for ValidationRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProtectedSource { id, .. } => write!(f, "source folder is protected: {id}"),
            Self::ProtectedDestination { id, .. } => {
                write!(f, "destination folder is protected: {id}")
            }
            Self::Cycle {
                source,
                destination,
            } => write!(
                f,
                "move would create cycle: {source} under its descendant {destination}"
            ),
            Self::NoOp { source, position } => {
                write!(f, "node {source} already at {position}")
            }
            Self::IncompatibleTarget { source, kind } => {
                write!(f, "target does not accept {kind:?} source {source}")
            }
        }
    }
}

impl Error for ValidationRejection {}

/// Inputs for one move validation.
///
/// `destination_ancestry` lists the destination folder and its ancestors up to
/// the root (destination first). `current_position` is the source's current
/// parent/index, when known. `source_is_root` is set when the store reports
/// the source without a parent.
#[derive(Debug, Clone, Copy)]
pub struct MoveCheck<'a> {
    pub source_id: &'a NodeId,
    pub source_kind: NodeKind,
    pub source_title: &'a str,
    pub source_is_root: bool,
    pub destination: &'a Destination,
    pub destination_title: &'a str,
    pub destination_ancestry: &'a [NodeId],
    pub current_position: Option<&'a Destination>,
}

/// Memoizing protection classifier.
#[derive(Debug)]
pub struct ProtectionGuard {
    protected_ids: HashSet<String>,
    extra_titles: HashSet<String>,
    cache: Mutex<HashMap<NodeId, bool>>,
}

impl Default for ProtectionGuard {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}

impl ProtectionGuard {
    /// Creates a guard with the built-in lists plus caller extensions.
    pub fn new(extra_ids: &[String], extra_titles: &[String]) -> Self {
        let protected_ids = CHROMIUM_PROTECTED_IDS
            .iter()
            .chain(FIREFOX_PROTECTED_IDS.iter())
            .map(|value| value.to_string())
            .chain(extra_ids.iter().map(|value| value.trim().to_string()))
            .filter(|value| !value.is_empty())
            .collect();
        let extra_titles = extra_titles
            .iter()
            .map(|value| normalize_title(value))
            .filter(|value| !value.is_empty())
            .collect();
        Self {
            protected_ids,
            extra_titles,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns whether the folder is protected; the first answer per id sticks.
    pub fn is_protected(&self, folder_id: &NodeId, folder_title: &str) -> bool {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(cached) = cache.get(folder_id) {
            return *cached;
        }
        let protected = self.classify(folder_id, folder_title);
        if protected {
            log::debug!(
                "event=folder_protected module=guard status=ok id={}",
                folder_id
            );
        }
        cache.insert(folder_id.clone(), protected);
        protected
    }

    /// Validates one move; rejection means no store call may be issued.
    pub fn check_move(&self, check: MoveCheck<'_>) -> Result<(), ValidationRejection> {
        if check.source_is_root
            || (check.source_kind == NodeKind::Folder
                && self.is_protected(check.source_id, check.source_title))
        {
            return Err(ValidationRejection::ProtectedSource {
                id: check.source_id.clone(),
                title: check.source_title.to_string(),
            });
        }

        let destination_id = &check.destination.parent_id;
        if self.is_protected(destination_id, check.destination_title) {
            return Err(ValidationRejection::ProtectedDestination {
                id: destination_id.clone(),
                title: check.destination_title.to_string(),
            });
        }

        if destination_id == check.source_id
            || check
                .destination_ancestry
                .iter()
                .any(|ancestor| ancestor == check.source_id)
        {
            return Err(ValidationRejection::Cycle {
                source: check.source_id.clone(),
                destination: destination_id.clone(),
            });
        }

        if check.current_position == Some(check.destination) {
            return Err(ValidationRejection::NoOp {
                source: check.source_id.clone(),
                position: check.destination.clone(),
            });
        }

        Ok(())
    }

    fn classify(&self, folder_id: &NodeId, folder_title: &str) -> bool {
        if self.protected_ids.contains(folder_id.as_str()) {
            return true;
        }
        let title = normalize_title(folder_title);
        PROTECTED_TITLE_RE.is_match(&title) || self.extra_titles.contains(&title)
    }
}

fn normalize_title(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn display_title(title: &str) -> &str {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        "Root"
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::{MoveCheck, ProtectionGuard, ValidationRejection};
    use crate::model::node::{Destination, NodeId, NodeKind};

    fn check<'a>(
        source_id: &'a NodeId,
        destination: &'a Destination,
        ancestry: &'a [NodeId],
        current: Option<&'a Destination>,
    ) -> MoveCheck<'a> {
        MoveCheck {
            source_id,
            source_kind: NodeKind::Folder,
            source_title: "Projects",
            source_is_root: false,
            destination,
            destination_title: "Archive",
            destination_ancestry: ancestry,
            current_position: current,
        }
    }

    #[test]
    fn protects_builtin_ids_and_titles() {
        let guard = ProtectionGuard::default();
        assert!(guard.is_protected(&NodeId::from("1"), "anything"));
        assert!(guard.is_protected(&NodeId::from("toolbar_____"), ""));
        assert!(guard.is_protected(&NodeId::from("x1"), "  Bookmarks Bar "));
        assert!(guard.is_protected(&NodeId::from("x2"), "OTHER BOOKMARKS"));
        assert!(guard.is_protected(&NodeId::from("x3"), "Mobile bookmarks"));
        assert!(guard.is_protected(&NodeId::from("x4"), "menu"));
        assert!(guard.is_protected(&NodeId::from("x5"), "bookmarks"));
        assert!(!guard.is_protected(&NodeId::from("x6"), "Bookmarks for work"));
        assert!(!guard.is_protected(&NodeId::from("x7"), "Work"));
    }

    #[test]
    fn protection_is_memoized_per_id() {
        let guard = ProtectionGuard::default();
        assert!(!guard.is_protected(&NodeId::from("42"), "Work"));
        // A later rename to a reserved title does not flip the cached answer.
        assert!(!guard.is_protected(&NodeId::from("42"), "Bookmarks bar"));
    }

    #[test]
    fn extra_lists_extend_builtin_rules() {
        let guard = ProtectionGuard::new(&["pinned".to_string()], &["Read Later".to_string()]);
        assert!(guard.is_protected(&NodeId::from("pinned"), "Pinned"));
        assert!(guard.is_protected(&NodeId::from("77"), "read   later"));
    }

    #[test]
    fn rejects_protected_endpoints() {
        let guard = ProtectionGuard::default();
        let source = NodeId::from("2");
        let destination = Destination::new("50", 0);
        let mut request = check(&source, &destination, &[], None);
        request.source_title = "Other bookmarks";
        assert!(matches!(
            guard.check_move(request),
            Err(ValidationRejection::ProtectedSource { .. })
        ));

        let source = NodeId::from("60");
        let destination = Destination::new("1", 0);
        let rejection = guard
            .check_move(check(&source, &destination, &[], None))
            .expect_err("protected destination");
        assert!(rejection.is_protection());
        assert!(rejection
            .user_message()
            .expect("protected rejections carry a message")
            .contains("built-in"));
    }

    #[test]
    fn rejects_store_roots_as_sources() {
        let guard = ProtectionGuard::default();
        let source = NodeId::from("custom-root");
        let destination = Destination::new("50", 0);
        let mut request = check(&source, &destination, &[], None);
        request.source_is_root = true;
        assert!(matches!(
            guard.check_move(request),
            Err(ValidationRejection::ProtectedSource { .. })
        ));
    }

    #[test]
    fn protected_item_titles_do_not_block_item_moves() {
        let guard = ProtectionGuard::default();
        let source = NodeId::from("61");
        let destination = Destination::new("70", 0);
        let mut request = check(&source, &destination, &[], None);
        request.source_kind = NodeKind::Item;
        request.source_title = "Bookmarks";
        assert!(guard.check_move(request).is_ok());
    }

    #[test]
    fn rejects_moves_into_own_subtree() {
        let guard = ProtectionGuard::default();
        let source = NodeId::from("20");
        let destination = Destination::new("22", 0);
        let ancestry = vec![NodeId::from("22"), NodeId::from("20"), NodeId::from("0")];
        assert!(matches!(
            guard.check_move(check(&source, &destination, &ancestry, None)),
            Err(ValidationRejection::Cycle { .. })
        ));

        let onto_self = Destination::new("20", 0);
        assert!(matches!(
            guard.check_move(check(&source, &onto_self, &[], None)),
            Err(ValidationRejection::Cycle { .. })
        ));
    }

    #[test]
    fn rejects_same_position_as_noop() {
        let guard = ProtectionGuard::default();
        let source = NodeId::from("20");
        let destination = Destination::new("30", 2);
        let current = Destination::new("30", 2);
        let rejection = guard
            .check_move(check(&source, &destination, &[], Some(&current)))
            .expect_err("no-op");
        assert!(matches!(rejection, ValidationRejection::NoOp { .. }));
        assert!(rejection.user_message().is_none());

        let moved = Destination::new("30", 1);
        assert!(guard
            .check_move(check(&source, &destination, &[], Some(&moved)))
            .is_ok());
    }
}
