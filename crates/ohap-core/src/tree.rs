//! The central unit and its item tree
//!
//! [`CentralUnit`] is the root container (id 0) of everything the server
//! announces. It owns a flat `id → Item` index; containers only keep the ids
//! of their children and every item keeps the id of its parent, so lookups
//! are O(1) and there are no owning cycles.
//!
//! Ownership policy: removing a container removes its whole subtree,
//! children before parents, with one [`TreeEvent::ItemRemoved`] per item.

use std::collections::HashMap;
use std::fmt::Write as _;

use url::{Host, Url};

use crate::error::{Error, Result};
use crate::events::TreeEvent;
use crate::item::{Item, ItemId, ItemKind, ROOT_ID};

/// Default display name of the root container before the server names it.
pub const DEFAULT_CENTRAL_UNIT_NAME: &str = "Central unit";

/// Host and port of the central unit, derived from its URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    /// Extract `host:port` from a `scheme://host:port/` URL.
    ///
    /// Schemes with a well-known default port may omit the port.
    pub fn from_url(url: &Url) -> Result<Self> {
        // IPv6 literals are stored without brackets so they resolve as-is
        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(Error::invalid_url(url.as_str(), "missing host")),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::invalid_url(url.as_str(), "missing port"))?;
        Ok(Self { host, port })
    }
}

impl std::fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Login credentials sent in the OHAP `login` message
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Root of the item tree plus the connection parameters of one server
#[derive(Debug)]
pub struct CentralUnit {
    items: HashMap<ItemId, Item>,
    url: Url,
    address: ServerAddress,
    credentials: Credentials,
    auto_connect: bool,
    events: Vec<TreeEvent>,
}

impl CentralUnit {
    /// Create a central unit for the server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the URL does not parse or has no
    /// host/port.
    pub fn new(url: &str) -> Result<Self> {
        let (url, address) = parse_url(url)?;

        let mut items = HashMap::new();
        items.insert(ROOT_ID, Item::container(ROOT_ID, DEFAULT_CENTRAL_UNIT_NAME));

        Ok(Self {
            items,
            url,
            address,
            credentials: Credentials::default(),
            auto_connect: true,
            events: Vec::new(),
        })
    }

    // ─────────────────────────────────────────────────────────
    // Connection parameters
    // ─────────────────────────────────────────────────────────

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Replace the server URL. On error the previous URL is kept.
    pub fn set_url(&mut self, url: &str) -> Result<()> {
        let (url, address) = parse_url(url)?;
        self.url = url;
        self.address = address;
        Ok(())
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    pub fn auto_connect(&self) -> bool {
        self.auto_connect
    }

    pub fn set_auto_connect(&mut self, auto_connect: bool) {
        self.auto_connect = auto_connect;
    }

    // ─────────────────────────────────────────────────────────
    // Root container
    // ─────────────────────────────────────────────────────────

    pub fn root(&self) -> &Item {
        // The root is inserted on construction and never removed.
        &self.items[&ROOT_ID]
    }

    pub fn name(&self) -> &str {
        &self.root().name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        if let Some(root) = self.items.get_mut(&ROOT_ID) {
            root.name = name.into();
        }
    }

    /// Number of items in the tree, root included
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when only the root is present
    pub fn is_empty(&self) -> bool {
        self.items.len() == 1
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    // ─────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────

    /// O(1) lookup anywhere in the tree
    pub fn get_item_by_id(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    /// Fail-fast lookup
    pub fn item(&self, id: ItemId) -> Result<&Item> {
        self.items.get(&id).ok_or(Error::ItemNotFound { id })
    }

    /// Child ids of a container in insertion order
    pub fn children(&self, container: ItemId) -> Result<&[ItemId]> {
        let item = self.item(container)?;
        item.as_container()
            .map(|c| c.children())
            .ok_or(Error::NotAContainer { id: container })
    }

    pub fn get_item_count(&self, container: ItemId) -> Result<usize> {
        self.children(container).map(<[ItemId]>::len)
    }

    pub fn get_item_by_index(&self, container: ItemId, index: usize) -> Result<&Item> {
        let children = self.children(container)?;
        let id = *children.get(index).ok_or(Error::IndexOutOfRange {
            container,
            index,
            len: children.len(),
        })?;
        self.item(id)
    }

    /// Ancestor ids from the direct parent up to the root
    pub fn ancestors(&self, id: ItemId) -> Vec<ItemId> {
        let mut result = Vec::new();
        let mut current = self.items.get(&id).and_then(Item::parent);
        while let Some(parent) = current {
            result.push(parent);
            current = self.items.get(&parent).and_then(Item::parent);
        }
        result
    }

    // ─────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────

    /// Append `item` to the children of `parent` and register it in the index.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateId`] if the id is already in the tree
    /// - [`Error::ItemNotFound`] if `parent` is absent
    /// - [`Error::NotAContainer`] if `parent` is a device
    ///
    /// The tree is unchanged on error.
    pub fn add_item(&mut self, parent: ItemId, mut item: Item) -> Result<()> {
        if self.items.contains_key(&item.id) {
            return Err(Error::DuplicateId { id: item.id });
        }
        let container = self.container_mut(parent)?;
        container.children.push(item.id);

        let id = item.id;
        item.parent = Some(parent);
        if let Some(container) = item.container_mut() {
            container.children.clear();
        }
        self.items.insert(id, item);
        self.events.push(TreeEvent::ItemAdded { parent, id });
        Ok(())
    }

    /// Remove an item and, for containers, its whole subtree.
    ///
    /// Returns the removed items, descendants first. Unknown ids and the
    /// root are ignored and yield an empty list.
    pub fn remove_item(&mut self, id: ItemId) -> Vec<Item> {
        if id == ROOT_ID {
            tracing::warn!("Refusing to remove the central unit root");
            return Vec::new();
        }
        let Some(parent) = self.items.get(&id).and_then(Item::parent) else {
            return Vec::new();
        };

        if let Ok(container) = self.container_mut(parent) {
            container.children.retain(|child| *child != id);
        }

        let mut removed = Vec::new();
        self.remove_subtree(id, &mut removed);
        removed
    }

    fn remove_subtree(&mut self, id: ItemId, removed: &mut Vec<Item>) {
        let children = self
            .items
            .get(&id)
            .and_then(Item::as_container)
            .map(|c| c.children.clone())
            .unwrap_or_default();
        for child in children {
            self.remove_subtree(child, removed);
        }
        if let Some(item) = self.items.remove(&id) {
            self.events.push(TreeEvent::ItemRemoved {
                parent: item.parent.unwrap_or(ROOT_ID),
                id,
            });
            removed.push(item);
        }
    }

    /// Add `item` under `parent`, or refresh it in place if the id is known.
    ///
    /// Servers re-announce every item of a container each time listening
    /// starts, so this is the normal path for incoming announcements.
    pub fn announce_item(&mut self, parent: ItemId, item: Item) -> Result<()> {
        if self.items.contains_key(&item.id) {
            self.update_item(parent, item)
        } else {
            self.add_item(parent, item)
        }
    }

    /// Apply a re-announcement of an existing item.
    ///
    /// Keeps children and listening state of containers. Moves the item when
    /// the parent changed. If the item changed between container and device
    /// it is replaced, which drops the old subtree.
    pub fn update_item(&mut self, parent: ItemId, item: Item) -> Result<()> {
        let id = item.id;
        if id == ROOT_ID {
            let root = self.items.get_mut(&ROOT_ID).ok_or(Error::ItemNotFound { id })?;
            root.name = item.name;
            root.description = item.description;
            root.internal = item.internal;
            self.events.push(TreeEvent::ItemChanged { id });
            return Ok(());
        }

        let existing = self.item(id)?;
        let same_kind = existing.is_container() == item.is_container();
        let old_parent = existing.parent;

        if !same_kind {
            self.check_new_parent(id, parent)?;
            self.remove_item(id);
            return self.add_item(parent, item);
        }

        if old_parent != Some(parent) {
            self.move_item(id, parent)?;
        }

        let current = self.items.get_mut(&id).ok_or(Error::ItemNotFound { id })?;
        current.name = item.name;
        current.description = item.description;
        current.internal = item.internal;
        if let (ItemKind::Device(current), ItemKind::Device(announced)) =
            (&mut current.kind, item.kind)
        {
            *current = announced;
        }
        self.events.push(TreeEvent::ItemChanged { id });
        Ok(())
    }

    /// Fails if `new_parent` is not a container that can hold `id`.
    fn check_new_parent(&self, id: ItemId, new_parent: ItemId) -> Result<()> {
        if new_parent == id || self.ancestors(new_parent).contains(&id) {
            return Err(Error::protocol(format!(
                "moving item {id} under {new_parent} would create a cycle"
            )));
        }
        self.children(new_parent).map(|_| ())
    }

    fn move_item(&mut self, id: ItemId, new_parent: ItemId) -> Result<()> {
        self.check_new_parent(id, new_parent)?;
        self.container_mut(new_parent)?.children.push(id);

        let old_parent = self.items.get(&id).and_then(Item::parent);
        if let Some(old_parent) = old_parent {
            if let Ok(container) = self.container_mut(old_parent) {
                container.children.retain(|child| *child != id);
            }
            self.events.push(TreeEvent::ItemRemoved {
                parent: old_parent,
                id,
            });
        }
        if let Some(item) = self.items.get_mut(&id) {
            item.parent = Some(new_parent);
        }
        self.events.push(TreeEvent::ItemAdded {
            parent: new_parent,
            id,
        });
        Ok(())
    }

    pub fn set_binary_value(&mut self, id: ItemId, value: bool) -> Result<()> {
        let item = self.items.get_mut(&id).ok_or(Error::ItemNotFound { id })?;
        item.set_binary_value(value)?;
        self.events.push(TreeEvent::ItemChanged { id });
        Ok(())
    }

    pub fn set_decimal_value(&mut self, id: ItemId, value: f64) -> Result<()> {
        let item = self.items.get_mut(&id).ok_or(Error::ItemNotFound { id })?;
        item.set_decimal_value(value)?;
        self.events.push(TreeEvent::ItemChanged { id });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Listening state
    // ─────────────────────────────────────────────────────────

    /// Set the listening flag of a container.
    ///
    /// Returns `true` if the flag changed.
    pub fn set_listening(&mut self, id: ItemId, listening: bool) -> Result<bool> {
        let container = self.container_mut(id)?;
        if container.listening == listening {
            return Ok(false);
        }
        container.listening = listening;
        self.events
            .push(TreeEvent::ListeningChanged { id, listening });
        Ok(true)
    }

    pub fn is_listening(&self, id: ItemId) -> Result<bool> {
        let item = self.item(id)?;
        item.as_container()
            .map(|c| c.is_listening())
            .ok_or(Error::NotAContainer { id })
    }

    /// True if the item itself or any ancestor container is listening,
    /// i.e. the server pushes changes for it.
    pub fn is_listening_inherited(&self, id: ItemId) -> bool {
        let own = self.items.get(&id).is_some_and(Item::is_listening);
        own || self
            .ancestors(id)
            .into_iter()
            .any(|a| self.items.get(&a).is_some_and(Item::is_listening))
    }

    /// Ids of all containers whose listening flag is set, in ascending order
    pub fn listening_containers(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self
            .items
            .values()
            .filter(|item| item.is_listening())
            .map(|item| item.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    // ─────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────

    /// Take all change notifications queued since the last call
    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Render the tree as indented text, one item per line
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        self.render_item(ROOT_ID, 0, &mut out);
        out
    }

    fn render_item(&self, id: ItemId, depth: usize, out: &mut String) {
        let Some(item) = self.items.get(&id) else {
            return;
        };
        let indent = "  ".repeat(depth);
        match &item.kind {
            ItemKind::Container(container) => {
                let marker = if container.is_listening() {
                    " [listening]"
                } else {
                    ""
                };
                let _ = writeln!(out, "{indent}{} ({}){marker}", item.name, item.id);
                for child in container.children() {
                    self.render_item(*child, depth + 1, out);
                }
            }
            ItemKind::Device(device) => {
                let _ = writeln!(
                    out,
                    "{indent}{} ({}) {} {} = {}",
                    item.name,
                    item.id,
                    device.value_type(),
                    device.device_type,
                    device.value
                );
            }
        }
    }

    fn container_mut(&mut self, id: ItemId) -> Result<&mut crate::item::Container> {
        let item = self.items.get_mut(&id).ok_or(Error::ItemNotFound { id })?;
        item.container_mut().ok_or(Error::NotAContainer { id })
    }
}

fn parse_url(raw: &str) -> Result<(Url, ServerAddress)> {
    let url = Url::parse(raw).map_err(|e| Error::invalid_url(raw, e.to_string()))?;
    let address = ServerAddress::from_url(&url)?;
    Ok((url, address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{DecimalValue, DeviceType, ValueType};
    use pretty_assertions::assert_eq;

    fn unit() -> CentralUnit {
        CentralUnit::new("http://127.0.0.1:18000/").unwrap()
    }

    /// Root → Room 1 (1) → { Switch (5), Thermostat (7) }, Room 2 (9)
    fn populated() -> CentralUnit {
        let mut unit = unit();
        unit.add_item(ROOT_ID, Item::container(1, "Room 1")).unwrap();
        unit.add_item(1, Item::binary_device(5, "Switch", DeviceType::Sensor, true))
            .unwrap();
        unit.add_item(
            1,
            Item::decimal_device(
                7,
                "Thermostat",
                DeviceType::Actuator,
                DecimalValue::new(22.5, -50.0, 50.0).with_unit("Celsius Degrees", "C"),
            ),
        )
        .unwrap();
        unit.add_item(ROOT_ID, Item::container(9, "Room 2")).unwrap();
        unit.drain_events();
        unit
    }

    #[test]
    fn test_new_parses_host_and_port() {
        let unit = unit();
        assert_eq!(unit.address().host, "127.0.0.1");
        assert_eq!(unit.address().port, 18000);
        assert_eq!(unit.address().to_string(), "127.0.0.1:18000");
        assert_eq!(unit.root().id, ROOT_ID);
        assert!(unit.is_empty());
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(matches!(
            CentralUnit::new("not a url"),
            Err(Error::InvalidUrl { .. })
        ));
        assert!(matches!(
            CentralUnit::new("ohap://example.com/"),
            Err(Error::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_set_url_keeps_previous_on_error() {
        let mut unit = unit();
        assert!(unit.set_url("::::").is_err());
        assert_eq!(unit.address().port, 18000);

        unit.set_url("http://ohap.example.com:18001/").unwrap();
        assert_eq!(unit.address().host, "ohap.example.com");
        assert_eq!(unit.address().port, 18001);
    }

    #[test]
    fn test_ipv6_host_is_unbracketed() {
        let unit = CentralUnit::new("http://[::1]:18000/").unwrap();
        assert_eq!(unit.address().host, "::1");
        assert_eq!(unit.address().to_string(), "[::1]:18000");
    }

    #[test]
    fn test_known_scheme_default_port() {
        let unit = CentralUnit::new("http://ohap.example.com/").unwrap();
        assert_eq!(unit.address().port, 80);
    }

    #[test]
    fn test_lookup_returns_added_items() {
        let unit = populated();
        let switch = unit.get_item_by_id(5).unwrap();
        assert_eq!(switch.name, "Switch");
        assert_eq!(switch.parent(), Some(1));
        assert_eq!(switch.value_type(), Some(ValueType::Binary));
        assert_eq!(unit.len(), 5);
    }

    #[test]
    fn test_add_emits_item_added() {
        let mut unit = unit();
        unit.add_item(ROOT_ID, Item::container(1, "Room 1")).unwrap();
        assert_eq!(
            unit.drain_events(),
            vec![TreeEvent::ItemAdded { parent: 0, id: 1 }]
        );
        assert!(unit.drain_events().is_empty());
    }

    #[test]
    fn test_duplicate_id_fails_without_mutation() {
        let mut unit = populated();
        // Same id under a different container is still a duplicate
        let err = unit
            .add_item(9, Item::binary_device(5, "Other", DeviceType::Actuator, false))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId { id: 5 }));
        assert_eq!(unit.get_item_count(9).unwrap(), 0);
        assert_eq!(unit.get_item_by_id(5).unwrap().name, "Switch");
        assert!(unit.drain_events().is_empty());
    }

    #[test]
    fn test_root_id_is_a_duplicate() {
        let mut unit = unit();
        assert!(matches!(
            unit.add_item(ROOT_ID, Item::container(0, "Again")),
            Err(Error::DuplicateId { id: 0 })
        ));
    }

    #[test]
    fn test_add_under_device_or_missing_parent_fails() {
        let mut unit = populated();
        assert!(matches!(
            unit.add_item(5, Item::container(20, "Nested")),
            Err(Error::NotAContainer { id: 5 })
        ));
        assert!(matches!(
            unit.add_item(42, Item::container(20, "Orphan")),
            Err(Error::ItemNotFound { id: 42 })
        ));
        assert!(!unit.contains(20));
    }

    #[test]
    fn test_get_item_by_index_preserves_order() {
        let unit = populated();
        assert_eq!(unit.get_item_by_index(ROOT_ID, 0).unwrap().id, 1);
        assert_eq!(unit.get_item_by_index(ROOT_ID, 1).unwrap().id, 9);
        assert_eq!(unit.get_item_by_index(1, 1).unwrap().id, 7);
        assert_eq!(unit.get_item_count(1).unwrap(), 2);
    }

    #[test]
    fn test_get_item_by_index_out_of_range() {
        let unit = populated();
        let err = unit.get_item_by_index(1, 2).unwrap_err();
        assert!(matches!(
            err,
            Error::IndexOutOfRange {
                container: 1,
                index: 2,
                len: 2
            }
        ));
    }

    #[test]
    fn test_remove_cascades_children_first() {
        let mut unit = populated();
        let removed = unit.remove_item(1);
        let ids: Vec<ItemId> = removed.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![5, 7, 1]);
        assert!(unit.get_item_by_id(5).is_none());
        assert!(unit.get_item_by_id(1).is_none());
        assert_eq!(unit.children(ROOT_ID).unwrap(), &[9]);
        assert_eq!(
            unit.drain_events(),
            vec![
                TreeEvent::ItemRemoved { parent: 1, id: 5 },
                TreeEvent::ItemRemoved { parent: 1, id: 7 },
                TreeEvent::ItemRemoved { parent: 0, id: 1 },
            ]
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut unit = populated();
        assert_eq!(unit.remove_item(5).len(), 1);
        assert!(unit.remove_item(5).is_empty());
        assert!(unit.remove_item(1234).is_empty());
        assert!(unit.remove_item(ROOT_ID).is_empty());
        assert!(unit.contains(ROOT_ID));
    }

    #[test]
    fn test_announce_updates_existing_in_place() {
        let mut unit = populated();
        unit.announce_item(
            1,
            Item::binary_device(5, "Wall switch", DeviceType::Sensor, false)
                .with_description("By the door"),
        )
        .unwrap();

        let switch = unit.item(5).unwrap();
        assert_eq!(switch.name, "Wall switch");
        assert_eq!(switch.description, "By the door");
        assert!(!switch.binary_value().unwrap());
        assert_eq!(unit.children(1).unwrap(), &[5, 7]);
        assert_eq!(unit.drain_events(), vec![TreeEvent::ItemChanged { id: 5 }]);
    }

    #[test]
    fn test_announce_container_keeps_children_and_listening() {
        let mut unit = populated();
        unit.set_listening(1, true).unwrap();
        unit.announce_item(ROOT_ID, Item::container(1, "Living room"))
            .unwrap();

        let room = unit.item(1).unwrap();
        assert_eq!(room.name, "Living room");
        assert!(room.is_listening());
        assert_eq!(unit.children(1).unwrap(), &[5, 7]);
    }

    #[test]
    fn test_announce_moves_item_to_new_parent() {
        let mut unit = populated();
        unit.announce_item(9, Item::binary_device(5, "Switch", DeviceType::Sensor, true))
            .unwrap();
        assert_eq!(unit.item(5).unwrap().parent(), Some(9));
        assert_eq!(unit.children(1).unwrap(), &[7]);
        assert_eq!(unit.children(9).unwrap(), &[5]);
    }

    #[test]
    fn test_move_under_own_descendant_is_rejected() {
        let mut unit = populated();
        unit.add_item(1, Item::container(11, "Closet")).unwrap();
        let err = unit
            .announce_item(11, Item::container(1, "Room 1"))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(unit.item(1).unwrap().parent(), Some(ROOT_ID));
    }

    #[test]
    fn test_announce_kind_change_replaces_item() {
        let mut unit = populated();
        unit.announce_item(ROOT_ID, Item::binary_device(1, "Now a lamp", DeviceType::Actuator, true))
            .unwrap();
        assert!(!unit.item(1).unwrap().is_container());
        assert!(unit.get_item_by_id(5).is_none());
    }

    #[test]
    fn test_kind_change_under_own_subtree_leaves_tree_unchanged() {
        let mut unit = unit();
        unit.add_item(ROOT_ID, Item::container(1, "Floor")).unwrap();
        unit.add_item(1, Item::container(11, "Closet")).unwrap();
        unit.drain_events();

        let err = unit
            .announce_item(11, Item::binary_device(1, "Lamp", DeviceType::Actuator, true))
            .unwrap_err();

        assert!(matches!(err, Error::Protocol { .. }));
        assert_eq!(unit.len(), 3);
        assert!(unit.item(1).unwrap().is_container());
        assert_eq!(unit.item(11).unwrap().parent(), Some(1));
        assert!(unit.drain_events().is_empty());
    }

    #[test]
    fn test_kind_change_under_device_leaves_tree_unchanged() {
        let mut unit = populated();
        let err = unit
            .announce_item(5, Item::container(7, "Not a thermostat"))
            .unwrap_err();

        assert!(matches!(err, Error::NotAContainer { id: 5 }));
        assert!(unit.item(7).unwrap().decimal().is_ok());
        assert_eq!(unit.children(1).unwrap(), &[5, 7]);
    }

    #[test]
    fn test_listening_flags() {
        let mut unit = populated();
        assert!(unit.set_listening(1, true).unwrap());
        assert!(!unit.set_listening(1, true).unwrap());
        assert!(unit.is_listening(1).unwrap());
        assert!(unit.is_listening_inherited(5));
        assert!(!unit.is_listening_inherited(9));
        assert_eq!(unit.listening_containers(), vec![1]);
        assert!(matches!(
            unit.set_listening(5, true),
            Err(Error::NotAContainer { id: 5 })
        ));
    }

    #[test]
    fn test_value_setters_emit_changes() {
        let mut unit = populated();
        unit.set_binary_value(5, false).unwrap();
        unit.set_decimal_value(7, 19.0).unwrap();
        assert!(matches!(
            unit.set_decimal_value(5, 1.0),
            Err(Error::WrongValueType { id: 5, .. })
        ));
        assert_eq!(
            unit.drain_events(),
            vec![
                TreeEvent::ItemChanged { id: 5 },
                TreeEvent::ItemChanged { id: 7 }
            ]
        );
    }

    #[test]
    fn test_render_tree() {
        let mut unit = populated();
        unit.set_name("OHAP Test Server");
        unit.set_listening(ROOT_ID, true).unwrap();
        let expected = "\
OHAP Test Server (0) [listening]
  Room 1 (1)
    Switch (5) binary sensor = true
    Thermostat (7) decimal actuator = 22.5 C
  Room 2 (9)
";
        assert_eq!(unit.render_tree(), expected);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("alice", "secret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("secret"));
    }
}
