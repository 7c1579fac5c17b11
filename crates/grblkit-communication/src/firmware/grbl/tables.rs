//! Static lookup tables for the GRBL 1.1 dialect
//!
//! Built once on first use and shared for the life of the process.

use grblkit_core::Axis;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Modal groups and the words that select them
const MODAL_GROUPS: &[(&str, &[&str])] = &[
    (
        "motion",
        &[
            "G0", "G1", "G2", "G3", "G38.2", "G38.3", "G38.4", "G38.5", "G80",
        ],
    ),
    ("coordinate_system", &["G54", "G55", "G56", "G57", "G58", "G59"]),
    ("plane", &["G17", "G18", "G19"]),
    ("distance", &["G90", "G91"]),
    ("arc_distance", &["G91.1"]),
    ("feed_mode", &["G93", "G94"]),
    ("units", &["G20", "G21"]),
    ("cutter_compensation", &["G40"]),
    ("tool_length", &["G43.1", "G49"]),
    ("program", &["M0", "M1", "M2", "M30"]),
    ("spindle", &["M3", "M4", "M5"]),
    ("coolant", &["M7", "M8", "M9"]),
];

/// Modal group holding the active tool (`T<n>`)
pub const TOOL_GROUP: &str = "tool";

/// Modal group holding the unit system
pub const UNITS_GROUP: &str = "units";

fn modal_table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        MODAL_GROUPS
            .iter()
            .flat_map(|(group, words)| words.iter().map(move |word| (*word, *group)))
            .collect()
    })
}

/// Modal group of a normalized G/M word (e.g. `G90` -> `distance`)
pub fn modal_group(word: &str) -> Option<&'static str> {
    if word.len() > 1 && word.starts_with('T') && word[1..].chars().all(|c| c.is_ascii_digit()) {
        return Some(TOOL_GROUP);
    }
    modal_table().get(word).copied()
}

/// Normalize a G-code word: uppercase, leading zeros removed (`g01` -> `G1`)
pub fn normalize_word(word: &str) -> String {
    let word = word.to_ascii_uppercase();
    let mut chars = word.chars();
    let Some(letter) = chars.next() else {
        return word;
    };
    let number = chars.as_str();
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return word;
    }

    let (int, frac) = match number.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (number, None),
    };
    let int = int.trim_start_matches('0');
    let int = if int.is_empty() { "0" } else { int };

    match frac {
        Some(frac) => format!("{}{}.{}", letter, int, frac),
        None => format!("{}{}", letter, int),
    }
}

/// Fields of a `<...>` status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusField {
    /// `MPos:` machine position
    MachinePosition,
    /// `WPos:` work position
    WorkPosition,
    /// `WCO:` work coordinate offset
    WorkOffset,
    /// `FS:` feed and spindle
    FeedSpindle,
    /// `F:` feed only
    Feed,
    /// `Ov:` feed, rapid, spindle overrides
    Overrides,
    /// `Pn:` input pins
    Pins,
    /// `Bf:` planner blocks and rx bytes available
    Buffer,
    /// `Ln:` line number
    LineNumber,
    /// `A:` accessory state
    Accessories,
}

fn status_table() -> &'static HashMap<&'static str, StatusField> {
    static TABLE: OnceLock<HashMap<&'static str, StatusField>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            ("MPos", StatusField::MachinePosition),
            ("WPos", StatusField::WorkPosition),
            ("WCO", StatusField::WorkOffset),
            ("FS", StatusField::FeedSpindle),
            ("F", StatusField::Feed),
            ("Ov", StatusField::Overrides),
            ("Pn", StatusField::Pins),
            ("Bf", StatusField::Buffer),
            ("Ln", StatusField::LineNumber),
            ("A", StatusField::Accessories),
        ])
    })
}

/// Field for a status report header (the part before `:`)
pub fn status_field(header: &str) -> Option<StatusField> {
    status_table().get(header).copied()
}

/// Machine state fields fed by EEPROM settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingTarget {
    /// `$110`..`$114`: max rate, mm/min
    MaxRate(Axis),
    /// `$120`..`$124`: acceleration, mm/sec^2
    Acceleration(Axis),
}

fn setting_table() -> &'static HashMap<u16, SettingTarget> {
    static TABLE: OnceLock<HashMap<u16, SettingTarget>> = OnceLock::new();
    TABLE.get_or_init(|| {
        Axis::ALL
            .iter()
            .enumerate()
            .flat_map(|(i, axis)| {
                [
                    (110 + i as u16, SettingTarget::MaxRate(*axis)),
                    (120 + i as u16, SettingTarget::Acceleration(*axis)),
                ]
            })
            .collect()
    })
}

/// Target of a `$<id>=` setting echo, if the engine tracks it
pub fn setting_target(id: u16) -> Option<SettingTarget> {
    setting_table().get(&id).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modal_lookup() {
        assert_eq!(modal_group("G90"), Some("distance"));
        assert_eq!(modal_group("G21"), Some("units"));
        assert_eq!(modal_group("G38.2"), Some("motion"));
        assert_eq!(modal_group("M8"), Some("coolant"));
        assert_eq!(modal_group("T12"), Some(TOOL_GROUP));
        assert_eq!(modal_group("X10"), None);
        assert_eq!(modal_group("T"), None);
    }

    #[test]
    fn test_normalize_word() {
        assert_eq!(normalize_word("g01"), "G1");
        assert_eq!(normalize_word("G00"), "G0");
        assert_eq!(normalize_word("M03"), "M3");
        assert_eq!(normalize_word("G38.2"), "G38.2");
        assert_eq!(normalize_word("x-1.5"), "X-1.5");
    }

    #[test]
    fn test_status_headers() {
        assert_eq!(status_field("MPos"), Some(StatusField::MachinePosition));
        assert_eq!(status_field("Ov"), Some(StatusField::Overrides));
        assert_eq!(status_field("Nope"), None);
    }

    #[test]
    fn test_settings() {
        assert_eq!(setting_target(110), Some(SettingTarget::MaxRate(Axis::X)));
        assert_eq!(setting_target(122), Some(SettingTarget::Acceleration(Axis::Z)));
        assert_eq!(setting_target(130), None);
        assert_eq!(setting_target(1), None);
    }
}
