use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a remote BACnet device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Invoke identifier handed out by the engine for a confirmed request
pub type InvokeId = u8;

/// Largest object instance number representable in an object identifier
pub const MAX_INSTANCE: u32 = 0x3F_FFFF;

/// Largest object type number representable in an object identifier
pub const MAX_OBJECT_TYPE: u16 = 0x3FF;

/// Standard object type names, indexed by object type number
const OBJECT_TYPE_NAMES: [&str; 61] = [
    "analog-input",
    "analog-output",
    "analog-value",
    "binary-input",
    "binary-output",
    "binary-value",
    "calendar",
    "command",
    "device",
    "event-enrollment",
    "file",
    "group",
    "loop",
    "multi-state-input",
    "multi-state-output",
    "notification-class",
    "program",
    "schedule",
    "averaging",
    "multi-state-value",
    "trend-log",
    "life-safety-point",
    "life-safety-zone",
    "accumulator",
    "pulse-converter",
    "event-log",
    "global-group",
    "trend-log-multiple",
    "load-control",
    "structured-view",
    "access-door",
    "timer",
    "access-credential",
    "access-point",
    "access-rights",
    "access-user",
    "access-zone",
    "credential-data-input",
    "network-security",
    "bitstring-value",
    "characterstring-value",
    "date-pattern-value",
    "date-value",
    "datetime-pattern-value",
    "datetime-value",
    "integer-value",
    "large-analog-value",
    "octetstring-value",
    "positive-integer-value",
    "time-pattern-value",
    "time-value",
    "notification-forwarder",
    "alert-enrollment",
    "channel",
    "lighting-output",
    "binary-lighting-output",
    "network-port",
    "elevator-group",
    "escalator",
    "lift",
    "staging",
];

/// First object type number reserved for vendor use
const FIRST_PROPRIETARY_TYPE: u16 = 128;

/// BACnet object type (the category half of an object identifier)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectType(pub u16);

impl ObjectType {
    pub const ANALOG_INPUT: ObjectType = ObjectType(0);
    pub const ANALOG_OUTPUT: ObjectType = ObjectType(1);
    pub const ANALOG_VALUE: ObjectType = ObjectType(2);
    pub const BINARY_INPUT: ObjectType = ObjectType(3);
    pub const BINARY_OUTPUT: ObjectType = ObjectType(4);
    pub const BINARY_VALUE: ObjectType = ObjectType(5);
    pub const DEVICE: ObjectType = ObjectType(8);
    pub const MULTI_STATE_INPUT: ObjectType = ObjectType(13);
    pub const MULTI_STATE_VALUE: ObjectType = ObjectType(19);
    pub const CHARACTERSTRING_VALUE: ObjectType = ObjectType(40);
    pub const NETWORK_PORT: ObjectType = ObjectType(56);

    /// Returns the hyphenated name used on topics and in logs
    pub fn name(&self) -> Cow<'static, str> {
        match OBJECT_TYPE_NAMES.get(self.0 as usize) {
            Some(name) => Cow::Borrowed(name),
            None if self.0 >= FIRST_PROPRIETARY_TYPE => Cow::Owned(format!("proprietary-{}", self.0)),
            None => Cow::Owned(format!("reserved-{}", self.0)),
        }
    }

    /// Resolves a name (or a decimal type number) to an object type
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Some(index) = OBJECT_TYPE_NAMES
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(name))
        {
            return Some(ObjectType(index as u16));
        }

        let number = name
            .strip_prefix("proprietary-")
            .or_else(|| name.strip_prefix("reserved-"))
            .unwrap_or(name);
        match number.parse::<u16>() {
            Ok(value) if value <= MAX_OBJECT_TYPE => Some(ObjectType(value)),
            _ => None,
        }
    }

    /// Returns whether this is the device object type
    pub fn is_device(&self) -> bool {
        *self == ObjectType::DEVICE
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Object identifier: object type plus instance number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Object category
    pub object_type: ObjectType,
    /// Instance number within the device
    pub instance: u32,
}

impl ObjectId {
    /// Creates a new object identifier
    pub fn new(object_type: ObjectType, instance: u32) -> Self {
        ObjectId {
            object_type,
            instance,
        }
    }

    /// Device object of the given device
    pub fn device(device: DeviceId) -> Self {
        ObjectId::new(ObjectType::DEVICE, device.0)
    }

    /// Packs the identifier into its 32-bit wire form
    pub fn to_raw(&self) -> u32 {
        ((self.object_type.0 as u32 & MAX_OBJECT_TYPE as u32) << 22) | (self.instance & MAX_INSTANCE)
    }

    /// Unpacks the 32-bit wire form
    pub fn from_raw(raw: u32) -> Self {
        ObjectId {
            object_type: ObjectType((raw >> 22) as u16),
            instance: raw & MAX_INSTANCE,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.instance)
    }
}

/// BACnet property identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(pub u32);

impl PropertyId {
    pub const DESCRIPTION: PropertyId = PropertyId(28);
    pub const OBJECT_LIST: PropertyId = PropertyId(76);
    pub const OBJECT_NAME: PropertyId = PropertyId(77);
    pub const PRESENT_VALUE: PropertyId = PropertyId(85);
    pub const STATUS_FLAGS: PropertyId = PropertyId(111);

    /// Name used in logs
    pub fn name(&self) -> Cow<'static, str> {
        match *self {
            PropertyId::DESCRIPTION => Cow::Borrowed("description"),
            PropertyId::OBJECT_LIST => Cow::Borrowed("object-list"),
            PropertyId::OBJECT_NAME => Cow::Borrowed("object-name"),
            PropertyId::PRESENT_VALUE => Cow::Borrowed("present-value"),
            PropertyId::STATUS_FLAGS => Cow::Borrowed("status-flags"),
            PropertyId(other) => Cow::Owned(format!("property-{}", other)),
        }
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Array index of a property access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayIndex {
    /// The whole property
    #[default]
    All,
    /// A single array element (0 is the element count)
    Element(u32),
}

/// Network address of a remote station, as understood by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Network number (0 = local network)
    pub network: u16,
    /// MAC address on that network
    pub mac: Vec<u8>,
}

impl Address {
    /// Creates an address on the given network
    pub fn new(network: u16, mac: impl Into<Vec<u8>>) -> Self {
        Address {
            network,
            mac: mac.into(),
        }
    }

    /// Creates an address on the local network
    pub fn local(mac: impl Into<Vec<u8>>) -> Self {
        Address::new(0, mac)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.network)?;
        for byte in &self.mac {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Application data tag of a primitive value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationTag {
    Null,
    Boolean,
    Unsigned,
    Signed,
    Real,
    Double,
    OctetString,
    CharacterString,
    BitString,
    Enumerated,
    Date,
    Time,
    ObjectId,
}

impl ApplicationTag {
    /// Maps a wire tag number to a tag
    pub fn from_number(number: u8) -> Option<Self> {
        Some(match number {
            0 => ApplicationTag::Null,
            1 => ApplicationTag::Boolean,
            2 => ApplicationTag::Unsigned,
            3 => ApplicationTag::Signed,
            4 => ApplicationTag::Real,
            5 => ApplicationTag::Double,
            6 => ApplicationTag::OctetString,
            7 => ApplicationTag::CharacterString,
            8 => ApplicationTag::BitString,
            9 => ApplicationTag::Enumerated,
            10 => ApplicationTag::Date,
            11 => ApplicationTag::Time,
            12 => ApplicationTag::ObjectId,
            _ => return None,
        })
    }

    /// Wire tag number
    pub fn number(&self) -> u8 {
        match self {
            ApplicationTag::Null => 0,
            ApplicationTag::Boolean => 1,
            ApplicationTag::Unsigned => 2,
            ApplicationTag::Signed => 3,
            ApplicationTag::Real => 4,
            ApplicationTag::Double => 5,
            ApplicationTag::OctetString => 6,
            ApplicationTag::CharacterString => 7,
            ApplicationTag::BitString => 8,
            ApplicationTag::Enumerated => 9,
            ApplicationTag::Date => 10,
            ApplicationTag::Time => 11,
            ApplicationTag::ObjectId => 12,
        }
    }
}

impl fmt::Display for ApplicationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplicationTag::Null => "null",
            ApplicationTag::Boolean => "boolean",
            ApplicationTag::Unsigned => "unsigned",
            ApplicationTag::Signed => "signed",
            ApplicationTag::Real => "real",
            ApplicationTag::Double => "double",
            ApplicationTag::OctetString => "octet-string",
            ApplicationTag::CharacterString => "character-string",
            ApplicationTag::BitString => "bit-string",
            ApplicationTag::Enumerated => "enumerated",
            ApplicationTag::Date => "date",
            ApplicationTag::Time => "time",
            ApplicationTag::ObjectId => "object-identifier",
        };
        f.write_str(name)
    }
}

/// Calendar date; 255 in any field means "unspecified"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    /// Years since 1900
    pub year: u8,
    pub month: u8,
    pub day: u8,
    /// 1 = Monday .. 7 = Sunday
    pub weekday: u8,
}

/// Time of day; 255 in any field means "unspecified"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredths: u8,
}

/// Marker for an unspecified date/time field
pub const UNSPECIFIED: u8 = 255;

/// A tagged primitive value
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationValue {
    Null,
    Boolean(bool),
    Unsigned(u64),
    Signed(i64),
    Real(f32),
    Double(f64),
    OctetString(Vec<u8>),
    CharacterString(String),
    /// Bits in transmission order
    BitString(Vec<bool>),
    Enumerated(u32),
    Date(Date),
    Time(Time),
    ObjectId(ObjectId),
}

impl ApplicationValue {
    /// Returns the tag of this value
    pub fn tag(&self) -> ApplicationTag {
        match self {
            ApplicationValue::Null => ApplicationTag::Null,
            ApplicationValue::Boolean(_) => ApplicationTag::Boolean,
            ApplicationValue::Unsigned(_) => ApplicationTag::Unsigned,
            ApplicationValue::Signed(_) => ApplicationTag::Signed,
            ApplicationValue::Real(_) => ApplicationTag::Real,
            ApplicationValue::Double(_) => ApplicationTag::Double,
            ApplicationValue::OctetString(_) => ApplicationTag::OctetString,
            ApplicationValue::CharacterString(_) => ApplicationTag::CharacterString,
            ApplicationValue::BitString(_) => ApplicationTag::BitString,
            ApplicationValue::Enumerated(_) => ApplicationTag::Enumerated,
            ApplicationValue::Date(_) => ApplicationTag::Date,
            ApplicationValue::Time(_) => ApplicationTag::Time,
            ApplicationValue::ObjectId(_) => ApplicationTag::ObjectId,
        }
    }
}
