//! Menu item definitions.

use serde::{Deserialize, Serialize};

/// How a boolean item presents its two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BooleanNaming {
    /// Rendered as "true" / "false".
    TrueFalse,
    /// Rendered as "on" / "off".
    OnOff,
    /// Rendered as "yes" / "no".
    YesNo,
}

impl BooleanNaming {
    /// Get the numeric code used on the wire.
    pub fn code(&self) -> u8 {
        match self {
            BooleanNaming::TrueFalse => 0,
            BooleanNaming::OnOff => 1,
            BooleanNaming::YesNo => 2,
        }
    }

    /// Create from a wire code. Unknown codes fall back to true/false.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => BooleanNaming::OnOff,
            2 => BooleanNaming::YesNo,
            _ => BooleanNaming::TrueFalse,
        }
    }
}

/// A submenu grouping other items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubMenuItem {
    /// Unique item id.
    pub id: u16,
    /// Display name.
    pub name: String,
    /// Whether the item may be changed remotely.
    pub read_only: bool,
}

/// An integer item with a fixed range and display scaling.
///
/// The displayed value is `(current + offset) / divisor` with `unit`
/// appended; the core never performs that formatting, it only carries the
/// parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogItem {
    /// Unique item id.
    pub id: u16,
    /// Display name.
    pub name: String,
    /// Whether the item may be changed remotely.
    pub read_only: bool,
    /// Maximum raw value (range is 0..=max_value).
    pub max_value: u16,
    /// Offset applied for display.
    pub offset: i16,
    /// Divisor applied for display.
    pub divisor: u16,
    /// Unit suffix, e.g. "dB" or "V".
    pub unit: String,
}

/// A choice among a fixed list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumerationItem {
    /// Unique item id.
    pub id: u16,
    /// Display name.
    pub name: String,
    /// Whether the item may be changed remotely.
    pub read_only: bool,
    /// The available choices, indexed by current value.
    pub choices: Vec<String>,
}

/// A two-state item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanItem {
    /// Unique item id.
    pub id: u16,
    /// Display name.
    pub name: String,
    /// Whether the item may be changed remotely.
    pub read_only: bool,
    /// How the two states are named.
    pub naming: BooleanNaming,
}

/// A free-text item with a bounded length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    /// Unique item id.
    pub id: u16,
    /// Display name.
    pub name: String,
    /// Whether the item may be changed remotely.
    pub read_only: bool,
    /// Maximum text length in characters.
    pub max_length: u16,
}

/// A read-mostly floating point readout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatItem {
    /// Unique item id.
    pub id: u16,
    /// Display name.
    pub name: String,
    /// Whether the item may be changed remotely.
    pub read_only: bool,
    /// Number of decimal places to show.
    pub decimal_places: u8,
}

/// An item that triggers an action on the device and holds no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    /// Unique item id.
    pub id: u16,
    /// Display name.
    pub name: String,
    /// Whether the item may be triggered remotely.
    pub read_only: bool,
}

/// Any menu item, as a closed sum over the supported kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MenuItem {
    /// A submenu grouping other items.
    SubMenu(SubMenuItem),
    /// An integer item with range and scaling.
    Analog(AnalogItem),
    /// A choice among fixed strings.
    Enumeration(EnumerationItem),
    /// A two-state item.
    Boolean(BooleanItem),
    /// A bounded free-text item.
    Text(TextItem),
    /// A floating point readout.
    FloatingPoint(FloatItem),
    /// An action trigger.
    Action(ActionItem),
}

impl MenuItem {
    /// The unique id of the item.
    pub fn id(&self) -> u16 {
        match self {
            MenuItem::SubMenu(i) => i.id,
            MenuItem::Analog(i) => i.id,
            MenuItem::Enumeration(i) => i.id,
            MenuItem::Boolean(i) => i.id,
            MenuItem::Text(i) => i.id,
            MenuItem::FloatingPoint(i) => i.id,
            MenuItem::Action(i) => i.id,
        }
    }

    /// The display name of the item.
    pub fn name(&self) -> &str {
        match self {
            MenuItem::SubMenu(i) => &i.name,
            MenuItem::Analog(i) => &i.name,
            MenuItem::Enumeration(i) => &i.name,
            MenuItem::Boolean(i) => &i.name,
            MenuItem::Text(i) => &i.name,
            MenuItem::FloatingPoint(i) => &i.name,
            MenuItem::Action(i) => &i.name,
        }
    }

    /// Whether the item may be changed remotely.
    pub fn read_only(&self) -> bool {
        match self {
            MenuItem::SubMenu(i) => i.read_only,
            MenuItem::Analog(i) => i.read_only,
            MenuItem::Enumeration(i) => i.read_only,
            MenuItem::Boolean(i) => i.read_only,
            MenuItem::Text(i) => i.read_only,
            MenuItem::FloatingPoint(i) => i.read_only,
            MenuItem::Action(i) => i.read_only,
        }
    }

    /// Whether this item can contain children.
    pub fn is_submenu(&self) -> bool {
        matches!(self, MenuItem::SubMenu(_))
    }

    /// A short name for the item kind, used in logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            MenuItem::SubMenu(_) => "submenu",
            MenuItem::Analog(_) => "analog",
            MenuItem::Enumeration(_) => "enum",
            MenuItem::Boolean(_) => "boolean",
            MenuItem::Text(_) => "text",
            MenuItem::FloatingPoint(_) => "float",
            MenuItem::Action(_) => "action",
        }
    }
}

/// The current value of a menu item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MenuValue {
    /// Integer value (analog and enumeration items).
    Int(i32),
    /// Boolean value.
    Bool(bool),
    /// Text value.
    Text(String),
    /// Floating point value.
    Float(f64),
}

impl std::fmt::Display for MenuValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MenuValue::Int(v) => write!(f, "{}", v),
            MenuValue::Bool(v) => write!(f, "{}", v),
            MenuValue::Text(v) => write!(f, "{}", v),
            MenuValue::Float(v) => write!(f, "{}", v),
        }
    }
}
