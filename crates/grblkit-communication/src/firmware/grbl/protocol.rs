//! GRBL wire constants and command classification
//!
//! Real-time bytes are picked off the serial stream by the firmware as soon as
//! they arrive, so they bypass receive-buffer accounting entirely. Everything
//! else is a `\n`-terminated line counted against the receive buffer.

/// Line terminator appended to every streamed command
pub const LINE_TERMINATOR: u8 = b'\n';

/// Prefix of a real-time jog command
pub const JOG_PREFIX: &str = "$J=";

/// Single-byte real-time commands (GRBL 1.1)
pub mod realtime {
    /// Request a `<...>` status report
    pub const STATUS_QUERY: u8 = b'?';
    /// Resume from feed hold
    pub const CYCLE_START: u8 = b'~';
    /// Feed hold
    pub const FEED_HOLD: u8 = b'!';
    /// Soft reset (Ctrl-X)
    pub const SOFT_RESET: u8 = 0x18;
    /// Trigger the safety door state
    pub const SAFETY_DOOR: u8 = 0x84;
    /// Cancel the active jog and flush queued jogs
    pub const JOG_CANCEL: u8 = 0x85;
    /// Feed override back to 100%
    pub const FEED_OVERRIDE_RESET: u8 = 0x90;
    /// Feed override +10%
    pub const FEED_OVERRIDE_PLUS_10: u8 = 0x91;
    /// Feed override -10%
    pub const FEED_OVERRIDE_MINUS_10: u8 = 0x92;
    /// Feed override +1%
    pub const FEED_OVERRIDE_PLUS_1: u8 = 0x93;
    /// Feed override -1%
    pub const FEED_OVERRIDE_MINUS_1: u8 = 0x94;
    /// Rapid override 100%
    pub const RAPID_OVERRIDE_FULL: u8 = 0x95;
    /// Rapid override 50%
    pub const RAPID_OVERRIDE_MEDIUM: u8 = 0x96;
    /// Rapid override low setting
    pub const RAPID_OVERRIDE_LOW: u8 = 0x97;
    /// Spindle override back to 100%
    pub const SPINDLE_OVERRIDE_RESET: u8 = 0x99;
    /// Spindle override +10%
    pub const SPINDLE_OVERRIDE_PLUS_10: u8 = 0x9A;
    /// Spindle override -10%
    pub const SPINDLE_OVERRIDE_MINUS_10: u8 = 0x9B;
    /// Spindle override +1%
    pub const SPINDLE_OVERRIDE_PLUS_1: u8 = 0x9C;
    /// Spindle override -1%
    pub const SPINDLE_OVERRIDE_MINUS_1: u8 = 0x9D;
    /// Toggle spindle stop (only in Hold)
    pub const SPINDLE_STOP: u8 = 0x9E;
    /// Toggle flood coolant
    pub const FLOOD_COOLANT: u8 = 0xA0;
    /// Toggle mist coolant
    pub const MIST_COOLANT: u8 = 0xA1;
}

/// Check if a streamed line is a jog command
pub fn is_jog_command(line: &str) -> bool {
    line.starts_with(JOG_PREFIX)
}

/// Check if a streamed line is a `$` system command rather than G-code
pub fn is_system_command(line: &str) -> bool {
    line.starts_with('$')
}

/// Check if a command must run with nothing else in the device buffer.
///
/// Settings dumps, parameter dumps, build info, startup lines, homing and
/// restores either produce long multi-line replies or take seconds to run.
pub fn is_slow_command(line: &str) -> bool {
    matches!(line, "$$" | "$#" | "$I" | "$N" | "$SLP")
        || line.starts_with("$H")
        || line.starts_with("$RST=")
        || line.starts_with("$I=")
        || line.starts_with("$N0=")
        || line.starts_with("$N1=")
}

/// Bytes occupied in the device buffer by `command`, terminator included
pub fn wire_length(command: &str) -> usize {
    command.len() + 1
}

/// Encode a streamed command for the wire
pub fn encode_line(command: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(command.len() + 1);
    bytes.extend_from_slice(command.as_bytes());
    bytes.push(LINE_TERMINATOR);
    bytes
}

/// Split a G-code line into words.
///
/// `( ... )` and `; ...` comments are dropped. Words need not be separated by
/// spaces, and spaces inside a word are ignored: `G91G1X1` and `G 91 G1 X1`
/// both yield `G91`, `G1`, `X1`.
pub fn gcode_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_comment = false;

    for c in line.chars() {
        if in_comment {
            in_comment = c != ')';
            continue;
        }
        match c {
            '(' => in_comment = true,
            ';' => break,
            c if c.is_ascii_alphabetic() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                current.push(c);
            }
            c if c.is_whitespace() => {}
            c if !current.is_empty() && (c.is_ascii_digit() || matches!(c, '.' | '-' | '+')) => {
                current.push(c)
            }
            _ => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
