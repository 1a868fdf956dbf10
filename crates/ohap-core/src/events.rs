//! Change notifications emitted by the item tree

use crate::item::ItemId;

/// A structural or value change in the central unit tree.
///
/// The tree queues these as it is mutated; the dispatch context drains them
/// with [`CentralUnit::drain_events`](crate::tree::CentralUnit::drain_events)
/// after each message and forwards them to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    /// An item was appended to `parent`
    ItemAdded { parent: ItemId, id: ItemId },

    /// An item was detached from `parent` and dropped from the index
    ItemRemoved { parent: ItemId, id: ItemId },

    /// Name, description, flags or value of an existing item changed
    ItemChanged { id: ItemId },

    /// A container started or stopped listening
    ListeningChanged { id: ItemId, listening: bool },
}

impl TreeEvent {
    /// Returns a short string label for this event type (for logging/debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ItemAdded { .. } => "item_added",
            Self::ItemRemoved { .. } => "item_removed",
            Self::ItemChanged { .. } => "item_changed",
            Self::ListeningChanged { .. } => "listening_changed",
        }
    }

    /// Id of the item the event is about
    pub fn item_id(&self) -> ItemId {
        match *self {
            Self::ItemAdded { id, .. }
            | Self::ItemRemoved { id, .. }
            | Self::ItemChanged { id }
            | Self::ListeningChanged { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_event_labels() {
        assert_eq!(
            TreeEvent::ItemAdded { parent: 0, id: 1 }.event_type(),
            "item_added"
        );
        assert_eq!(
            TreeEvent::ItemRemoved { parent: 0, id: 1 }.event_type(),
            "item_removed"
        );
        assert_eq!(TreeEvent::ItemChanged { id: 3 }.event_type(), "item_changed");
    }

    #[test]
    fn test_tree_event_item_id() {
        assert_eq!(TreeEvent::ItemAdded { parent: 1, id: 5 }.item_id(), 5);
        assert_eq!(
            TreeEvent::ListeningChanged {
                id: 9,
                listening: true
            }
            .item_id(),
            9
        );
    }
}
