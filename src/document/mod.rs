//! The live page the detector reads from.
//!
//! The host owns the document; the detector only queries it and subscribes
//! to its mutations. `MemoryDocument` is an in-memory implementation for
//! hosts that mirror page state and for tests.

pub mod memory;

pub use memory::MemoryDocument;

use std::ops::ControlFlow;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("document is detached")]
    Detached,

    #[error("node not found: {0}")]
    NodeNotFound(usize),

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    /// Children were added to or removed from `target`.
    ChildList,
    /// An attribute on `target` was set or removed.
    Attribute { name: String },
    /// Text content of `target` changed.
    CharacterData,
    /// The document title changed. `target` is the body.
    Title,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
}

/// Which mutations an observer wants to hear about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    pub child_list: bool,
    /// Include mutations below the body, not only on the body itself.
    pub subtree: bool,
    pub attributes: bool,
    /// Restrict attribute mutations to these names. `None` means all.
    pub attribute_filter: Option<Vec<String>>,
    pub character_data: bool,
    pub title: bool,
}

impl ObserveOptions {
    /// Whether `record` passes this filter. `in_subtree` tells whether the
    /// target lies strictly below the body.
    pub fn accepts(&self, record: &MutationRecord, in_subtree: bool) -> bool {
        if in_subtree && !self.subtree {
            return false;
        }
        match &record.kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::CharacterData => self.character_data,
            MutationKind::Title => self.title,
            MutationKind::Attribute { name } => {
                self.attributes
                    && self
                        .attribute_filter
                        .as_ref()
                        .map_or(true, |names| names.iter().any(|n| n == name))
            }
        }
    }
}

/// Receiving end of a mutation subscription. Dropping it disconnects.
#[derive(Debug)]
pub struct MutationObserver {
    rx: mpsc::UnboundedReceiver<Vec<MutationRecord>>,
}

impl MutationObserver {
    /// Create a subscription pair. Documents keep the sender and push one
    /// batch per notification; a failed send means the observer is gone.
    pub fn channel() -> (mpsc::UnboundedSender<Vec<MutationRecord>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Next batch, or `None` once the document has dropped the sender.
    pub async fn next_batch(&mut self) -> Option<Vec<MutationRecord>> {
        self.rx.recv().await
    }

    pub fn disconnect(mut self) {
        self.rx.close();
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A live, externally controlled document.
pub trait Document: Send + Sync {
    /// The page title, if the page has one.
    fn title(&self) -> Result<Option<String>, DocumentError>;

    /// Visit the value of attribute `name` on every element that carries it,
    /// in document order. The visitor can stop the scan early.
    fn scan_attribute(
        &self,
        name: &str,
        visit: &mut dyn FnMut(&str) -> ControlFlow<()>,
    ) -> Result<(), DocumentError>;

    /// Subscribe to mutations of the body.
    fn observe(&self, options: ObserveOptions) -> Result<MutationObserver, DocumentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str) -> MutationRecord {
        MutationRecord {
            kind: MutationKind::Attribute { name: name.into() },
            target: NodeId(3),
        }
    }

    #[test]
    fn attribute_filter_limits_names() {
        let options = ObserveOptions {
            attributes: true,
            attribute_filter: Some(vec!["aria-label".into()]),
            subtree: true,
            ..Default::default()
        };
        assert!(options.accepts(&attr("aria-label"), true));
        assert!(!options.accepts(&attr("class"), true));
    }

    #[test]
    fn subtree_required_below_body() {
        let options = ObserveOptions {
            child_list: true,
            ..Default::default()
        };
        let record = MutationRecord {
            kind: MutationKind::ChildList,
            target: NodeId(0),
        };
        assert!(options.accepts(&record, false));
        assert!(!options.accepts(&record, true));
    }

    #[test]
    fn unwatched_kinds_are_rejected() {
        let options = ObserveOptions::default();
        let record = MutationRecord {
            kind: MutationKind::Title,
            target: NodeId(0),
        };
        assert!(!options.accepts(&record, false));
    }
}
