//! In-memory thread view over a session's messages.
//!
//! Messages are kept in a map keyed by id with child lists on the side, so
//! the tree never holds references between nodes.

use std::collections::{HashMap, HashSet};

use crate::core::ids::MessageId;
use crate::store::message::ChatMessage;

/// Messages of one session arranged by `parent_id`.
///
/// A message whose parent is absent from the input (for example a reply to a
/// soft-deleted message when reading live rows) is treated as a root.
#[derive(Clone, Debug, Default)]
pub struct MessageTree {
    nodes: HashMap<MessageId, ChatMessage>,
    children: HashMap<MessageId, Vec<MessageId>>,
    roots: Vec<MessageId>,
}

impl MessageTree {
    /// Build a tree from messages in creation order. Sibling order follows input order.
    #[must_use]
    pub fn build(messages: Vec<ChatMessage>) -> Self {
        let present: HashSet<MessageId> = messages.iter().map(|m| m.id).collect();
        let mut tree = Self::default();

        for message in messages {
            match message.parent_id {
                Some(parent) if present.contains(&parent) => {
                    tree.children.entry(parent).or_default().push(message.id);
                }
                _ => tree.roots.push(message.id),
            }
            tree.nodes.insert(message.id, message);
        }
        tree
    }

    /// Number of messages in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a message.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<&ChatMessage> {
        self.nodes.get(&id)
    }

    /// Top-level messages.
    pub fn roots(&self) -> impl Iterator<Item = &ChatMessage> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Direct replies to `id`.
    pub fn children(&self, id: MessageId) -> impl Iterator<Item = &ChatMessage> {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.nodes.get(child))
    }

    /// Parent of `id`, if it is part of the tree.
    #[must_use]
    pub fn parent(&self, id: MessageId) -> Option<&ChatMessage> {
        self.nodes
            .get(&id)
            .and_then(|message| message.parent_id)
            .and_then(|parent| self.nodes.get(&parent))
    }

    /// Messages from the root of `id`'s thread down to `id`.
    ///
    /// Empty if `id` is not in the tree.
    #[must_use]
    pub fn path_to_root(&self, id: MessageId) -> Vec<&ChatMessage> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.nodes.get(&id);

        while let Some(message) = cursor {
            if !seen.insert(message.id) {
                break;
            }
            path.push(message);
            cursor = message.parent_id.and_then(|parent| self.nodes.get(&parent));
        }
        path.reverse();
        path
    }
}
