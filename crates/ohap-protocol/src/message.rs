//! OHAP message types
//!
//! One [`OhapMessage`] variant per wire message. Device and container
//! announcements carry an info struct that converts to and from the tree's
//! [`Item`].

use ohap_core::item::{
    DecimalValue, DeviceType, DeviceValue, Item, ItemId, ItemKind,
};

/// Protocol minor version sent in `login`.
pub const PROTOCOL_MINOR_VERSION: u8 = 1;

/// Wire tag of each message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Login = 0x00,
    Logout = 0x01,
    Ping = 0x02,
    Pong = 0x03,
    DecimalSensor = 0x04,
    DecimalActuator = 0x05,
    BinarySensor = 0x06,
    BinaryActuator = 0x07,
    Container = 0x08,
    DecimalValueChanged = 0x09,
    BinaryValueChanged = 0x0a,
    ItemRemoved = 0x0b,
    ListeningStart = 0x0c,
    ListeningStop = 0x0d,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::Login,
            0x01 => Self::Logout,
            0x02 => Self::Ping,
            0x03 => Self::Pong,
            0x04 => Self::DecimalSensor,
            0x05 => Self::DecimalActuator,
            0x06 => Self::BinarySensor,
            0x07 => Self::BinaryActuator,
            0x08 => Self::Container,
            0x09 => Self::DecimalValueChanged,
            0x0a => Self::BinaryValueChanged,
            0x0b => Self::ItemRemoved,
            0x0c => Self::ListeningStart,
            0x0d => Self::ListeningStop,
            _ => return None,
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Protocol name, e.g. `binary-value-changed`
    pub fn name(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::DecimalSensor => "decimal-sensor",
            Self::DecimalActuator => "decimal-actuator",
            Self::BinarySensor => "binary-sensor",
            Self::BinaryActuator => "binary-actuator",
            Self::Container => "container",
            Self::DecimalValueChanged => "decimal-value-changed",
            Self::BinaryValueChanged => "binary-value-changed",
            Self::ItemRemoved => "item-removed",
            Self::ListeningStart => "listening-start",
            Self::ListeningStop => "listening-stop",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Body of `decimal-sensor` / `decimal-actuator`
#[derive(Debug, Clone, PartialEq)]
pub struct DecimalDeviceInfo {
    pub id: ItemId,
    pub value: f64,
    pub parent_id: ItemId,
    pub name: String,
    pub description: String,
    pub internal: bool,
    pub min: f64,
    pub max: f64,
    pub unit: String,
    pub unit_abbreviation: String,
}

/// Body of `binary-sensor` / `binary-actuator`
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryDeviceInfo {
    pub id: ItemId,
    pub value: bool,
    pub parent_id: ItemId,
    pub name: String,
    pub description: String,
    pub internal: bool,
}

/// Body of `container`
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    pub id: ItemId,
    pub parent_id: ItemId,
    pub name: String,
    pub description: String,
    pub internal: bool,
}

/// A decoded OHAP message
#[derive(Debug, Clone, PartialEq)]
pub enum OhapMessage {
    Login {
        protocol_minor: u8,
        username: String,
        password: String,
    },
    Logout {
        reason: String,
    },
    Ping {
        id: i32,
    },
    Pong {
        id: i32,
    },
    DecimalSensor(DecimalDeviceInfo),
    DecimalActuator(DecimalDeviceInfo),
    BinarySensor(BinaryDeviceInfo),
    BinaryActuator(BinaryDeviceInfo),
    Container(ContainerInfo),
    DecimalValueChanged {
        id: ItemId,
        value: f64,
    },
    BinaryValueChanged {
        id: ItemId,
        value: bool,
    },
    ItemRemoved {
        id: ItemId,
    },
    ListeningStart {
        id: ItemId,
    },
    ListeningStop {
        id: ItemId,
    },
}

impl OhapMessage {
    /// `login` with the current protocol version
    pub fn login(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Login {
            protocol_minor: PROTOCOL_MINOR_VERSION,
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn logout(reason: impl Into<String>) -> Self {
        Self::Logout {
            reason: reason.into(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Login { .. } => MessageType::Login,
            Self::Logout { .. } => MessageType::Logout,
            Self::Ping { .. } => MessageType::Ping,
            Self::Pong { .. } => MessageType::Pong,
            Self::DecimalSensor(_) => MessageType::DecimalSensor,
            Self::DecimalActuator(_) => MessageType::DecimalActuator,
            Self::BinarySensor(_) => MessageType::BinarySensor,
            Self::BinaryActuator(_) => MessageType::BinaryActuator,
            Self::Container(_) => MessageType::Container,
            Self::DecimalValueChanged { .. } => MessageType::DecimalValueChanged,
            Self::BinaryValueChanged { .. } => MessageType::BinaryValueChanged,
            Self::ItemRemoved { .. } => MessageType::ItemRemoved,
            Self::ListeningStart { .. } => MessageType::ListeningStart,
            Self::ListeningStop { .. } => MessageType::ListeningStop,
        }
    }

    pub fn tag(&self) -> u8 {
        self.message_type().tag()
    }

    pub fn name(&self) -> &'static str {
        self.message_type().name()
    }

    /// Convert an announcement into `(parent_id, item)`.
    ///
    /// Returns `None` for every other message.
    pub fn to_item(&self) -> Option<(ItemId, Item)> {
        let (parent, item) = match self {
            Self::DecimalSensor(info) => (info.parent_id, info.to_item(DeviceType::Sensor)),
            Self::DecimalActuator(info) => (info.parent_id, info.to_item(DeviceType::Actuator)),
            Self::BinarySensor(info) => (info.parent_id, info.to_item(DeviceType::Sensor)),
            Self::BinaryActuator(info) => (info.parent_id, info.to_item(DeviceType::Actuator)),
            Self::Container(info) => (
                info.parent_id,
                Item::container(info.id, info.name.clone())
                    .with_description(info.description.clone())
                    .with_internal(info.internal),
            ),
            _ => return None,
        };
        Some((parent, item))
    }

    /// Build the announcement a server sends for `item` under `parent_id`
    pub fn announce(parent_id: ItemId, item: &Item) -> Self {
        match &item.kind {
            ItemKind::Container(_) => Self::Container(ContainerInfo {
                id: item.id,
                parent_id,
                name: item.name.clone(),
                description: item.description.clone(),
                internal: item.internal,
            }),
            ItemKind::Device(device) => match &device.value {
                DeviceValue::Binary(value) => {
                    let info = BinaryDeviceInfo {
                        id: item.id,
                        value: *value,
                        parent_id,
                        name: item.name.clone(),
                        description: item.description.clone(),
                        internal: item.internal,
                    };
                    match device.device_type {
                        DeviceType::Sensor => Self::BinarySensor(info),
                        DeviceType::Actuator => Self::BinaryActuator(info),
                    }
                }
                DeviceValue::Decimal(d) => {
                    let info = DecimalDeviceInfo {
                        id: item.id,
                        value: d.value,
                        parent_id,
                        name: item.name.clone(),
                        description: item.description.clone(),
                        internal: item.internal,
                        min: d.min,
                        max: d.max,
                        unit: d.unit.clone(),
                        unit_abbreviation: d.unit_abbreviation.clone(),
                    };
                    match device.device_type {
                        DeviceType::Sensor => Self::DecimalSensor(info),
                        DeviceType::Actuator => Self::DecimalActuator(info),
                    }
                }
            },
        }
    }

    /// Value change for a device of the given value type
    pub fn value_changed(id: ItemId, value: &DeviceValue) -> Self {
        match value {
            DeviceValue::Binary(value) => Self::BinaryValueChanged { id, value: *value },
            DeviceValue::Decimal(d) => Self::DecimalValueChanged { id, value: d.value },
        }
    }
}

impl std::fmt::Display for OhapMessage {
    /// One-line summary used by logs and the message log
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.name();
        match self {
            Self::Login {
                protocol_minor,
                username,
                ..
            } => write!(f, "{name} v0.{protocol_minor} user={username:?}"),
            Self::Logout { reason } => write!(f, "{name} reason={reason:?}"),
            Self::Ping { id } | Self::Pong { id } => write!(f, "{name} id={id}"),
            Self::DecimalSensor(info) | Self::DecimalActuator(info) => write!(
                f,
                "{name} id={} parent={} name={:?} value={}",
                info.id, info.parent_id, info.name, info.value
            ),
            Self::BinarySensor(info) | Self::BinaryActuator(info) => write!(
                f,
                "{name} id={} parent={} name={:?} value={}",
                info.id, info.parent_id, info.name, info.value
            ),
            Self::Container(info) => write!(
                f,
                "{name} id={} parent={} name={:?}",
                info.id, info.parent_id, info.name
            ),
            Self::DecimalValueChanged { id, value } => write!(f, "{name} id={id} value={value}"),
            Self::BinaryValueChanged { id, value } => write!(f, "{name} id={id} value={value}"),
            Self::ItemRemoved { id } | Self::ListeningStart { id } | Self::ListeningStop { id } => {
                write!(f, "{name} id={id}")
            }
        }
    }
}

impl DecimalDeviceInfo {
    fn to_item(&self, device_type: DeviceType) -> Item {
        let value = DecimalValue::new(self.value, self.min, self.max)
            .with_unit(self.unit.clone(), self.unit_abbreviation.clone());
        Item::decimal_device(self.id, self.name.clone(), device_type, value)
            .with_description(self.description.clone())
            .with_internal(self.internal)
    }
}

impl BinaryDeviceInfo {
    fn to_item(&self, device_type: DeviceType) -> Item {
        Item::binary_device(self.id, self.name.clone(), device_type, self.value)
            .with_description(self.description.clone())
            .with_internal(self.internal)
    }
}
