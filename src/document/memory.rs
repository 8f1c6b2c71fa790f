//! In-memory live document.
//!
//! Holds a title and an element tree rooted at the body, and pushes a
//! mutation batch to every matching observer on each change.

use std::ops::ControlFlow;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

use super::{
    Document, DocumentError, MutationKind, MutationObserver, MutationRecord, NodeId,
    ObserveOptions,
};

const BODY: NodeId = NodeId(0);

#[derive(Debug)]
struct Node {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(tag: &str, parent: Option<NodeId>) -> Self {
        Node {
            tag: tag.to_string(),
            attributes: Vec::new(),
            text: String::new(),
            parent,
            children: Vec::new(),
        }
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

struct Registration {
    options: ObserveOptions,
    tx: UnboundedSender<Vec<MutationRecord>>,
}

struct Tree {
    title: Option<String>,
    nodes: Vec<Option<Node>>,
    observers: Vec<Registration>,
    detached: bool,
}

impl Tree {
    fn check_attached(&self) -> Result<(), DocumentError> {
        if self.detached {
            Err(DocumentError::Detached)
        } else {
            Ok(())
        }
    }

    fn node(&self, id: NodeId) -> Result<&Node, DocumentError> {
        self.check_attached()?;
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(DocumentError::NodeNotFound(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DocumentError> {
        self.check_attached()?;
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(DocumentError::NodeNotFound(id.0))
    }

    fn notify(&mut self, record: MutationRecord) {
        let in_subtree = record.target != BODY;
        // Closed receivers are pruned here; that is how an observer disconnects.
        self.observers.retain(|reg| {
            if reg.options.accepts(&record, in_subtree) {
                reg.tx.send(vec![record.clone()]).is_ok()
            } else {
                !reg.tx.is_closed()
            }
        });
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(next.0).and_then(Option::take) {
                stack.extend(node.children);
            }
        }
    }
}

/// An element tree with a title that can be mutated and observed.
///
/// Node ids are never reused: removing an element leaves an empty slot, so
/// storage grows with the number of elements ever appended. Hosts that churn
/// through many elements should build a fresh document per page load.
pub struct MemoryDocument {
    tree: Mutex<Tree>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// An empty document: no title, an empty body.
    pub fn new() -> Self {
        MemoryDocument {
            tree: Mutex::new(Tree {
                title: None,
                nodes: vec![Some(Node::new("body", None))],
                observers: Vec::new(),
                detached: false,
            }),
        }
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        let doc = Self::new();
        doc.lock().title = Some(title.into());
        doc
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn body(&self) -> NodeId {
        BODY
    }

    pub fn set_title(&self, title: Option<&str>) -> Result<(), DocumentError> {
        let mut tree = self.lock();
        tree.check_attached()?;
        tree.title = title.map(str::to_string);
        tree.notify(MutationRecord {
            kind: MutationKind::Title,
            target: BODY,
        });
        Ok(())
    }

    /// Append a new `tag` element as the last child of `parent`.
    pub fn append_element(&self, parent: NodeId, tag: &str) -> Result<NodeId, DocumentError> {
        let mut tree = self.lock();
        tree.node(parent)?;
        let id = NodeId(tree.nodes.len());
        tree.nodes.push(Some(Node::new(tag, Some(parent))));
        tree.node_mut(parent)?.children.push(id);
        tree.notify(MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
        });
        Ok(id)
    }

    pub fn set_attribute(
        &self,
        node: NodeId,
        name: &str,
        value: &str,
    ) -> Result<(), DocumentError> {
        let mut tree = self.lock();
        let element = tree.node_mut(node)?;
        match element.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => element
                .attributes
                .push((name.to_string(), value.to_string())),
        }
        tree.notify(MutationRecord {
            kind: MutationKind::Attribute { name: name.into() },
            target: node,
        });
        Ok(())
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), DocumentError> {
        let mut tree = self.lock();
        let element = tree.node_mut(node)?;
        let before = element.attributes.len();
        element.attributes.retain(|(n, _)| n != name);
        if element.attributes.len() != before {
            tree.notify(MutationRecord {
                kind: MutationKind::Attribute { name: name.into() },
                target: node,
            });
        }
        Ok(())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DocumentError> {
        let tree = self.lock();
        Ok(tree.node(node)?.attribute(name).map(str::to_string))
    }

    pub fn tag(&self, node: NodeId) -> Result<String, DocumentError> {
        Ok(self.lock().node(node)?.tag.clone())
    }

    /// Replace the element's own text.
    pub fn set_text(&self, node: NodeId, text: &str) -> Result<(), DocumentError> {
        let mut tree = self.lock();
        tree.node_mut(node)?.text = text.to_string();
        tree.notify(MutationRecord {
            kind: MutationKind::CharacterData,
            target: node,
        });
        Ok(())
    }

    pub fn text(&self, node: NodeId) -> Result<String, DocumentError> {
        Ok(self.lock().node(node)?.text.clone())
    }

    /// Remove `node` and everything below it. The body cannot be removed.
    pub fn remove(&self, node: NodeId) -> Result<(), DocumentError> {
        let mut tree = self.lock();
        let parent = tree
            .node(node)?
            .parent
            .ok_or_else(|| DocumentError::Other("cannot remove the body".into()))?;
        tree.node_mut(parent)?.children.retain(|c| *c != node);
        tree.free_subtree(node);
        tree.notify(MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
        });
        Ok(())
    }

    /// Remove every child of the body.
    pub fn clear_body(&self) -> Result<(), DocumentError> {
        let mut tree = self.lock();
        let children = std::mem::take(&mut tree.node_mut(BODY)?.children);
        if children.is_empty() {
            return Ok(());
        }
        for child in children {
            tree.free_subtree(child);
        }
        tree.notify(MutationRecord {
            kind: MutationKind::ChildList,
            target: BODY,
        });
        Ok(())
    }

    /// Tear the document down. Mutation streams end and every later query
    /// fails with `DocumentError::Detached`.
    pub fn detach(&self) {
        let mut tree = self.lock();
        tree.detached = true;
        tree.observers.clear();
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        let mut tree = self.lock();
        tree.observers.retain(|reg| !reg.tx.is_closed());
        tree.observers.len()
    }
}

impl Document for MemoryDocument {
    fn title(&self) -> Result<Option<String>, DocumentError> {
        let tree = self.lock();
        tree.check_attached()?;
        Ok(tree.title.clone())
    }

    fn scan_attribute(
        &self,
        name: &str,
        visit: &mut dyn FnMut(&str) -> ControlFlow<()>,
    ) -> Result<(), DocumentError> {
        let tree = self.lock();
        tree.check_attached()?;

        // Pre-order walk; children pushed in reverse to pop in document order.
        let mut stack = vec![BODY];
        while let Some(id) = stack.pop() {
            let Some(node) = tree.nodes.get(id.0).and_then(Option::as_ref) else {
                continue;
            };
            if let Some(value) = node.attribute(name) {
                if visit(value).is_break() {
                    break;
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(())
    }

    fn observe(&self, options: ObserveOptions) -> Result<MutationObserver, DocumentError> {
        let mut tree = self.lock();
        tree.check_attached()?;
        let (tx, observer) = MutationObserver::channel();
        tree.observers.push(Registration { options, tx });
        Ok(observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(doc: &MemoryDocument, attr: &str) -> Vec<String> {
        let mut out = Vec::new();
        doc.scan_attribute(attr, &mut |v: &str| {
            out.push(v.to_string());
            ControlFlow::Continue(())
        })
        .unwrap();
        out
    }

    #[test]
    fn scan_is_in_document_order() {
        let doc = MemoryDocument::new();
        let nav = doc.append_element(doc.body(), "nav").unwrap();
        let a = doc.append_element(nav, "a").unwrap();
        let main = doc.append_element(doc.body(), "main").unwrap();
        doc.set_attribute(main, "aria-label", "third").unwrap();
        doc.set_attribute(nav, "aria-label", "first").unwrap();
        doc.set_attribute(a, "aria-label", "second").unwrap();

        assert_eq!(labels(&doc, "aria-label"), vec!["first", "second", "third"]);
    }

    #[test]
    fn scan_stops_on_break() {
        let doc = MemoryDocument::new();
        for i in 0..5 {
            let el = doc.append_element(doc.body(), "div").unwrap();
            doc.set_attribute(el, "title", &i.to_string()).unwrap();
        }
        let mut seen = 0;
        doc.scan_attribute("title", &mut |_: &str| {
            seen += 1;
            if seen == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn remove_drops_subtree() {
        let doc = MemoryDocument::new();
        let outer = doc.append_element(doc.body(), "div").unwrap();
        let inner = doc.append_element(outer, "span").unwrap();
        doc.set_attribute(inner, "aria-label", "x").unwrap();

        doc.remove(outer).unwrap();

        assert!(labels(&doc, "aria-label").is_empty());
        assert_eq!(doc.attribute(inner, "aria-label"), Err(DocumentError::NodeNotFound(inner.0)));
        assert!(doc.remove(doc.body()).is_err());
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let doc = MemoryDocument::new();
        let first = doc.append_element(doc.body(), "div").unwrap();
        doc.remove(first).unwrap();
        let second = doc.append_element(doc.body(), "span").unwrap();

        assert_ne!(first, second);
        assert_eq!(doc.tag(first), Err(DocumentError::NodeNotFound(first.0)));
        assert_eq!(doc.tag(second).unwrap(), "span");
    }

    #[test]
    fn element_text_and_attributes() {
        let doc = MemoryDocument::new();
        let el = doc.append_element(doc.body(), "div").unwrap();
        assert_eq!(doc.text(el).unwrap(), "");

        doc.set_text(el, "Chats").unwrap();
        doc.set_attribute(el, "aria-label", "Chats · 1 unread").unwrap();
        assert_eq!(doc.text(el).unwrap(), "Chats");
        assert_eq!(doc.tag(doc.body()).unwrap(), "body");

        doc.remove_attribute(el, "aria-label").unwrap();
        assert_eq!(doc.attribute(el, "aria-label").unwrap(), None);
    }

    #[tokio::test]
    async fn clear_body_and_attribute_removal_notify() {
        let doc = MemoryDocument::new();
        let el = doc.append_element(doc.body(), "div").unwrap();
        doc.set_attribute(el, "aria-label", "Chats").unwrap();
        let mut observer = doc
            .observe(ObserveOptions {
                child_list: true,
                subtree: true,
                attributes: true,
                ..Default::default()
            })
            .unwrap();

        // Removing an attribute that is not set is silent.
        doc.remove_attribute(el, "title").unwrap();
        doc.remove_attribute(el, "aria-label").unwrap();
        doc.clear_body().unwrap();
        doc.clear_body().unwrap();

        let first = observer.next_batch().await.unwrap();
        assert_eq!(
            first[0].kind,
            MutationKind::Attribute {
                name: "aria-label".into()
            }
        );
        let second = observer.next_batch().await.unwrap();
        assert_eq!(second[0].kind, MutationKind::ChildList);
        assert_eq!(second[0].target, doc.body());
        assert!(observer.rx.try_recv().is_err());
        assert!(labels(&doc, "aria-label").is_empty());
    }

    #[tokio::test]
    async fn observers_receive_matching_mutations() {
        let doc = MemoryDocument::new();
        let mut observer = doc
            .observe(ObserveOptions {
                child_list: true,
                subtree: true,
                attributes: true,
                attribute_filter: Some(vec!["aria-label".into()]),
                ..Default::default()
            })
            .unwrap();

        let el = doc.append_element(doc.body(), "div").unwrap();
        doc.set_attribute(el, "class", "ignored").unwrap();
        doc.set_attribute(el, "aria-label", "Chats").unwrap();
        doc.set_text(el, "ignored too").unwrap();

        let first = observer.next_batch().await.unwrap();
        assert_eq!(first[0].kind, MutationKind::ChildList);
        let second = observer.next_batch().await.unwrap();
        assert_eq!(
            second[0].kind,
            MutationKind::Attribute {
                name: "aria-label".into()
            }
        );
        assert!(observer.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_observers_are_pruned() {
        let doc = MemoryDocument::new();
        let observer = doc.observe(ObserveOptions::default()).unwrap();
        assert_eq!(doc.observer_count(), 1);
        observer.disconnect();
        assert_eq!(doc.observer_count(), 0);
    }

    #[tokio::test]
    async fn detach_ends_streams_and_fails_queries() {
        let doc = MemoryDocument::with_title("Messenger");
        let mut observer = doc.observe(ObserveOptions::default()).unwrap();

        doc.detach();

        assert!(observer.next_batch().await.is_none());
        assert_eq!(doc.title(), Err(DocumentError::Detached));
        assert!(doc.observe(ObserveOptions::default()).is_err());
        assert!(doc.set_title(Some("x")).is_err());
    }
}
