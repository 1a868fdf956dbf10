//! Item types of the central unit tree
//!
//! Every node of the tree is an [`Item`]: common identity fields plus an
//! [`ItemKind`] telling whether the node groups other items ([`Container`])
//! or represents a sensor/actuator ([`Device`]).

use serde::Serialize;

use crate::error::{Error, Result};

/// Server-assigned item identifier. The root container is always [`ROOT_ID`].
pub type ItemId = i32;

/// Identifier of the central unit (the root container).
pub const ROOT_ID: ItemId = 0;

/// Whether a device only reports values or can also be actuated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Sensor,
    Actuator,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Sensor => write!(f, "sensor"),
            DeviceType::Actuator => write!(f, "actuator"),
        }
    }
}

/// The kind of value a device carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Binary,
    Decimal,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Binary => "binary",
            ValueType::Decimal => "decimal",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value and range of a decimal device
#[derive(Debug, Clone, PartialEq)]
pub struct DecimalValue {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub unit: String,
    pub unit_abbreviation: String,
}

impl DecimalValue {
    pub fn new(value: f64, min: f64, max: f64) -> Self {
        Self {
            value,
            min,
            max,
            unit: String::new(),
            unit_abbreviation: String::new(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>, abbreviation: impl Into<String>) -> Self {
        self.unit = unit.into();
        self.unit_abbreviation = abbreviation.into();
        self
    }
}

/// Current value of a device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceValue {
    Binary(bool),
    Decimal(DecimalValue),
}

impl DeviceValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            DeviceValue::Binary(_) => ValueType::Binary,
            DeviceValue::Decimal(_) => ValueType::Decimal,
        }
    }
}

impl std::fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceValue::Binary(value) => write!(f, "{}", value),
            DeviceValue::Decimal(d) if d.unit_abbreviation.is_empty() => write!(f, "{}", d.value),
            DeviceValue::Decimal(d) => write!(f, "{} {}", d.value, d.unit_abbreviation),
        }
    }
}

/// A sensor or actuator
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub device_type: DeviceType,
    pub value: DeviceValue,
}

impl Device {
    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }
}

/// A node grouping child items
///
/// Children are stored as ids; the items themselves live in the central
/// unit's index. Only the tree mutates the child list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    pub(crate) children: Vec<ItemId>,
    pub(crate) listening: bool,
}

impl Container {
    /// Child ids in insertion order
    pub fn children(&self) -> &[ItemId] {
        &self.children
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }
}

/// What an item is
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Container(Container),
    Device(Device),
}

/// A node of the central unit tree
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub internal: bool,
    pub(crate) parent: Option<ItemId>,
    pub kind: ItemKind,
}

impl Item {
    /// Create an empty container
    pub fn container(id: ItemId, name: impl Into<String>) -> Self {
        Self::new(id, name, ItemKind::Container(Container::default()))
    }

    /// Create a binary device
    pub fn binary_device(
        id: ItemId,
        name: impl Into<String>,
        device_type: DeviceType,
        value: bool,
    ) -> Self {
        Self::new(
            id,
            name,
            ItemKind::Device(Device {
                device_type,
                value: DeviceValue::Binary(value),
            }),
        )
    }

    /// Create a decimal device
    pub fn decimal_device(
        id: ItemId,
        name: impl Into<String>,
        device_type: DeviceType,
        value: DecimalValue,
    ) -> Self {
        Self::new(
            id,
            name,
            ItemKind::Device(Device {
                device_type,
                value: DeviceValue::Decimal(value),
            }),
        )
    }

    fn new(id: ItemId, name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            internal: false,
            parent: None,
            kind,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    /// Id of the owning container; `None` for the root and detached items
    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, ItemKind::Container(_))
    }

    pub fn as_container(&self) -> Option<&Container> {
        match &self.kind {
            ItemKind::Container(container) => Some(container),
            ItemKind::Device(_) => None,
        }
    }

    pub fn as_device(&self) -> Option<&Device> {
        match &self.kind {
            ItemKind::Device(device) => Some(device),
            ItemKind::Container(_) => None,
        }
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        self.as_device().map(|d| d.device_type)
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.as_device().map(Device::value_type)
    }

    /// Listening flag of a container; always `false` for devices
    pub fn is_listening(&self) -> bool {
        self.as_container().is_some_and(Container::is_listening)
    }

    /// Value of a binary device
    pub fn binary_value(&self) -> Result<bool> {
        match self.device()?.value {
            DeviceValue::Binary(value) => Ok(value),
            DeviceValue::Decimal(_) => Err(self.wrong_value_type(ValueType::Binary)),
        }
    }

    /// Value of a decimal device
    pub fn decimal_value(&self) -> Result<f64> {
        self.decimal().map(|d| d.value)
    }

    /// Value, range and unit of a decimal device
    pub fn decimal(&self) -> Result<&DecimalValue> {
        match &self.device()?.value {
            DeviceValue::Decimal(d) => Ok(d),
            DeviceValue::Binary(_) => Err(self.wrong_value_type(ValueType::Decimal)),
        }
    }

    pub(crate) fn set_binary_value(&mut self, value: bool) -> Result<()> {
        let id = self.id;
        match &mut self.device_mut()?.value {
            DeviceValue::Binary(current) => {
                *current = value;
                Ok(())
            }
            DeviceValue::Decimal(_) => Err(Error::WrongValueType {
                id,
                expected: ValueType::Binary.as_str(),
            }),
        }
    }

    pub(crate) fn set_decimal_value(&mut self, value: f64) -> Result<()> {
        let id = self.id;
        match &mut self.device_mut()?.value {
            DeviceValue::Decimal(current) => {
                current.value = value;
                Ok(())
            }
            DeviceValue::Binary(_) => Err(Error::WrongValueType {
                id,
                expected: ValueType::Decimal.as_str(),
            }),
        }
    }

    pub(crate) fn container_mut(&mut self) -> Option<&mut Container> {
        match &mut self.kind {
            ItemKind::Container(container) => Some(container),
            ItemKind::Device(_) => None,
        }
    }

    fn device(&self) -> Result<&Device> {
        self.as_device().ok_or(Error::NotADevice { id: self.id })
    }

    fn device_mut(&mut self) -> Result<&mut Device> {
        let id = self.id;
        match &mut self.kind {
            ItemKind::Device(device) => Ok(device),
            ItemKind::Container(_) => Err(Error::NotADevice { id }),
        }
    }

    fn wrong_value_type(&self, expected: ValueType) -> Error {
        Error::WrongValueType {
            id: self.id,
            expected: expected.as_str(),
        }
    }
}
