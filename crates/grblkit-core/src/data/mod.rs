//! Data models shared by the engine and its consumers
//!
//! This module provides:
//! - Axis identifiers and per-axis value maps (X, Y, Z, A, B)
//! - The device-reported machine state
//! - The connection lifecycle state
//! - Unit systems (MM, INCH)
//! - Field values carried by change notifications

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Machine coordinate units (millimeters or inches)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    /// Millimeters (metric)
    MM,
    /// Inches (imperial)
    INCH,
    /// Unknown or uninitialized
    Unknown,
}

impl Units {
    /// Map a units-group modal word (`G20`/`G21`) to a unit system
    pub fn from_modal_word(word: &str) -> Self {
        match word {
            "G20" => Units::INCH,
            "G21" => Units::MM,
            _ => Units::Unknown,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::MM => write!(f, "mm"),
            Units::INCH => write!(f, "in"),
            Units::Unknown => write!(f, "unknown"),
        }
    }
}

/// A machine axis as reported by GRBL, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// X axis
    X,
    /// Y axis
    Y,
    /// Z axis
    Z,
    /// A axis (4th axis)
    A,
    /// B axis (5th axis)
    B,
}

impl Axis {
    /// All axes in the positional order GRBL uses in coordinate lists
    pub const ALL: [Axis; 5] = [Axis::X, Axis::Y, Axis::Z, Axis::A, Axis::B];

    /// Axis for a zero-based position in a comma separated coordinate list
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Axis for a pin letter as used in `Pn:` fields
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'X' => Some(Axis::X),
            'Y' => Some(Axis::Y),
            'Z' => Some(Axis::Z),
            'A' => Some(Axis::A),
            'B' => Some(Axis::B),
            _ => None,
        }
    }

    /// Lowercase name used as the sub-key in change notifications
    pub fn key(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
            Axis::A => "a",
            Axis::B => "b",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Per-axis coordinate or rate map; absent axes are not present on the machine
pub type AxisValues = BTreeMap<Axis, f64>;

/// Build an [`AxisValues`] from a positional slice (x, y, z, a, b)
pub fn axis_values(values: &[f64]) -> AxisValues {
    values
        .iter()
        .take(Axis::ALL.len())
        .enumerate()
        .filter_map(|(i, v)| Axis::from_index(i).map(|axis| (axis, *v)))
        .collect()
}

/// Device-reported machine state
///
/// This is the single authoritative device mode, taken from the first field
/// of every status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineStateKind {
    /// Ready for commands
    Idle,
    /// Executing motion
    Run,
    /// Feed hold active
    Hold,
    /// Jogging
    Jog,
    /// Alarm lock (requires unlock or reset)
    Alarm,
    /// Safety door open
    Door,
    /// Check mode (dry-run without machine movement)
    Check,
    /// Homing cycle in progress
    Home,
    /// Low-power sleep
    Sleep,
}

impl MachineStateKind {
    /// Parse the state name of a status report (without any `:SUBSTATE`)
    pub fn from_grbl(name: &str) -> Option<Self> {
        match name {
            "Idle" => Some(Self::Idle),
            "Run" => Some(Self::Run),
            "Hold" => Some(Self::Hold),
            "Jog" => Some(Self::Jog),
            "Alarm" => Some(Self::Alarm),
            "Door" => Some(Self::Door),
            "Check" => Some(Self::Check),
            "Home" => Some(Self::Home),
            "Sleep" => Some(Self::Sleep),
            _ => None,
        }
    }

    /// Check if this state indicates active motion
    pub fn is_moving(&self) -> bool {
        matches!(self, Self::Run | Self::Jog | Self::Home)
    }
}

impl fmt::Display for MachineStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Run => write!(f, "Run"),
            Self::Hold => write!(f, "Hold"),
            Self::Jog => write!(f, "Jog"),
            Self::Alarm => write!(f, "Alarm"),
            Self::Door => write!(f, "Door"),
            Self::Check => write!(f, "Check"),
            Self::Home => write!(f, "Home"),
            Self::Sleep => write!(f, "Sleep"),
        }
    }
}

/// Connection lifecycle state
///
/// Owned by the controller engine; governs whether the transport may be
/// read or written at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Never connected
    Unknown,
    /// Closed cleanly
    NotConnected,
    /// Reserving and opening the transport
    Connecting,
    /// Transport open; I/O allowed
    Connected,
    /// Stop requested
    Disconnecting,
    /// The transport was not open when connecting
    MissingResource,
    /// Another engine holds the transport identifier
    Blocked,
    /// A fatal transport or protocol fault occurred
    Fail,
    /// Discarding queues and releasing the reservation
    Cleanup,
}

impl ConnectionState {
    /// Check if I/O is allowed in this state
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if a transition from this state to `target` is valid.
    ///
    /// - Unknown/NotConnected go to Connecting
    /// - Connecting ends in Connected, Blocked, MissingResource or Fail
    /// - Connected goes to Disconnecting or Fail
    /// - Disconnecting goes through Cleanup back to NotConnected
    /// - Blocked/MissingResource/Fail may retry or disconnect
    pub fn can_transition_to(&self, target: ConnectionState) -> bool {
        use ConnectionState::*;
        if *self == target {
            return true;
        }
        matches!(
            (self, target),
            (Unknown | NotConnected, Connecting)
                | (Unknown, NotConnected)
                | (Connecting, Connected | Blocked | MissingResource | Fail | NotConnected)
                | (Connected, Disconnecting | Fail)
                | (Disconnecting, Cleanup | Fail)
                | (Cleanup, NotConnected)
                | (Blocked | MissingResource | Fail, Connecting | Disconnecting | NotConnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Disconnecting => "DISCONNECTING",
            Self::MissingResource => "MISSING_RESOURCE",
            Self::Blocked => "BLOCKED",
            Self::Fail => "FAIL",
            Self::Cleanup => "CLEANUP",
        };
        f.write_str(name)
    }
}

/// Value carried by a machine state change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Boolean flag
    Bool(bool),
    /// Scalar number (rates, overrides, sub-key coordinates)
    Number(f64),
    /// Free text (state names, versions, messages)
    Text(String),
    /// Reason lists
    List(Vec<String>),
    /// Whole per-axis structure
    Axes(AxisValues),
    /// Whole string map (modal groups)
    Map(BTreeMap<String, String>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::List(items) => write!(f, "[{}]", items.join(", ")),
            FieldValue::Axes(axes) => {
                let parts: Vec<String> = axes
                    .iter()
                    .map(|(axis, v)| format!("{}:{:.3}", axis, v))
                    .collect();
                write!(f, "{{{}}}", parts.join(" "))
            }
            FieldValue::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(" "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_values_positional() {
        let values = axis_values(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(values.len(), 4);
        assert_eq!(values[&Axis::X], 1.0);
        assert_eq!(values[&Axis::A], 4.0);
        assert!(!values.contains_key(&Axis::B));
    }

    #[test]
    fn test_axis_values_ignores_extra_axes() {
        let values = axis_values(&[0.0; 7]);
        assert_eq!(values.len(), 5);
    }

    #[test]
    fn test_machine_state_names() {
        assert_eq!(MachineStateKind::from_grbl("Idle"), Some(MachineStateKind::Idle));
        assert_eq!(MachineStateKind::from_grbl("Door"), Some(MachineStateKind::Door));
        assert_eq!(MachineStateKind::from_grbl("Bogus"), None);
        assert!(MachineStateKind::Jog.is_moving());
        assert!(!MachineStateKind::Hold.is_moving());
    }

    #[test]
    fn test_connection_transitions() {
        use ConnectionState::*;
        assert!(NotConnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Blocked));
        assert!(Connected.can_transition_to(Fail));
        assert!(Disconnecting.can_transition_to(Cleanup));
        assert!(Cleanup.can_transition_to(NotConnected));
        assert!(!NotConnected.can_transition_to(Connected));
        assert!(!Cleanup.can_transition_to(Connected));
        assert_eq!(MissingResource.to_string(), "MISSING_RESOURCE");
    }

    #[test]
    fn test_units_from_modal_word() {
        assert_eq!(Units::from_modal_word("G20"), Units::INCH);
        assert_eq!(Units::from_modal_word("G21"), Units::MM);
        assert_eq!(Units::from_modal_word("G90"), Units::Unknown);
    }
}
