//! GRBL 1.1 error and alarm codes
//!
//! Decodes the numeric codes carried by `error:<n>` acknowledgments and
//! `ALARM:<n>` lines, and extracts those codes from raw protocol lines.

/// Description of an `error:<code>` acknowledgment
pub fn describe_error(code: u8) -> &'static str {
    match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid '$' statement",
        4 => "Negative value",
        5 => "Homing not enabled",
        6 => "Step pulse must be at least 3 microseconds",
        7 => "EEPROM read failed, defaults restored",
        8 => "'$' command requires Idle state",
        9 => "G-code locked out during alarm or jog",
        10 => "Soft limits require homing",
        11 => "Line overflow",
        12 => "Step rate exceeded",
        13 => "Safety door opened",
        14 => "Build info or startup line too long",
        15 => "Jog target exceeds machine travel",
        16 => "Invalid jog command",
        17 => "Laser mode requires PWM output",
        20 => "Unsupported command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Command requires integer value",
        24 => "Axis words conflict",
        25 => "Repeated word in block",
        26 => "No axis words",
        27 => "Invalid line number",
        28 => "Missing P or L value",
        29 => "Unsupported work coordinate system",
        30 => "G53 requires G0 or G1",
        31 => "Axis words with G80 active",
        32 => "Arc has no axis words in plane",
        33 => "Invalid motion target",
        34 => "Arc radius error",
        35 => "Arc missing IJK offset",
        36 => "Unused words in block",
        37 => "Tool length offset on wrong axis",
        38 => "Tool number too large",
        _ => "Unknown error",
    }
}

/// Description of an `ALARM:<code>` line
pub fn describe_alarm(code: u8) -> &'static str {
    match code {
        1 => "Hard limit triggered",
        2 => "Soft limit exceeded",
        3 => "Reset while in motion",
        4 => "Probe fail: initial state",
        5 => "Probe fail: no contact",
        6 => "Homing fail: reset during cycle",
        7 => "Homing fail: door opened",
        8 => "Homing fail: pull-off did not clear switch",
        9 => "Homing fail: switch not found",
        _ => "Unknown alarm",
    }
}

/// Code of an `error:<n>` line, if the line is one
pub fn parse_error_code(line: &str) -> Option<u8> {
    line.strip_prefix("error:")?.trim().parse().ok()
}

/// Code of an `ALARM:<n>` line, if the line is one
///
/// Pre-1.1 firmware spells the prefix lowercase; both are accepted.
pub fn parse_alarm_code(line: &str) -> Option<u8> {
    line.strip_prefix("ALARM:")
        .or_else(|| line.strip_prefix("alarm:"))?
        .trim()
        .parse()
        .ok()
}

/// `error:<code> (<description>)` for log lines
pub fn format_error(code: u8) -> String {
    format!("error:{} ({})", code, describe_error(code))
}

/// `ALARM:<code> (<description>)` for log lines and halt reasons
pub fn format_alarm(code: u8) -> String {
    format!("ALARM:{} ({})", code, describe_alarm(code))
}
