//! GRBL report parsing
//!
//! Classifies one complete line received from the device and applies it to
//! a [`MachineState`]. Acknowledgments (`ok`, `error:n`) are consumed by the
//! send path before reaching this parser.
//!
//! # Recognized shapes
//! - `<State[:sub]|MPos:..|WPos:..|WCO:..|FS:..|F:..|Ov:..|Pn:..|Bf:..|Ln:..|A:..>`
//! - `[TYPE:payload]` feedback (`GC`, `sentGcode`, `VER`, `OPT`, `MSG`, `PRB`,
//!   coordinate systems, `TLO`, `echo`, `HLP`)
//! - `$<n>=<value>` setting echoes
//! - `ALARM:<n>`
//! - `Grbl ...` welcome banner and `>...` startup line results
//!
//! A malformed numeric sub-field skips that field only; a report whose overall
//! shape is wrong is rejected as [`ProtocolError::MalformedReport`].

use super::error_decoder::{format_alarm, parse_alarm_code};
use super::machine_state::{Condition, MachineState};
use super::protocol::gcode_words;
use super::tables::{
    modal_group, normalize_word, setting_target, status_field, SettingTarget, StatusField,
};
use grblkit_core::{Axis, AxisValues, MachineStateKind, ProtocolError, Result};

/// Coordinate systems reported by `$#`
const COORDINATE_SYSTEMS: &[&str] = &[
    "G54", "G55", "G56", "G57", "G58", "G59", "G28", "G30", "G92",
];

/// What a successfully parsed line was
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A `<...>` status report
    StatusReport,
    /// A `[TYPE:...]` feedback message other than `MSG`
    Feedback {
        /// Feedback type
        kind: String,
    },
    /// A `[MSG:...]` message
    Message(String),
    /// A `$n=v` setting echo; `applied` when it was mapped into the state
    Setting {
        /// Numeric setting id, `None` for non-numeric (`$N0=`)
        id: Option<u16>,
        /// Whether a tracked field was updated
        applied: bool,
    },
    /// A welcome banner or startup line result
    Startup(String),
    /// An `ALARM:n` line
    Alarm(u8),
}

/// Stateless GRBL line parser
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusParser;

impl StatusParser {
    /// Create a parser
    pub fn new() -> Self {
        Self
    }

    /// Classify `line` and apply it to `state`
    pub fn parse(&self, line: &str, state: &mut MachineState) -> Result<ParseOutcome> {
        if line == "ok" || line.starts_with("error:") {
            return Err(ProtocolError::MisroutedAcknowledgment {
                line: line.to_string(),
            }
            .into());
        }

        if line.starts_with('<') {
            return self.parse_status(line, state);
        }
        if line.starts_with('[') {
            return self.parse_feedback(line, state);
        }
        if line.starts_with('$') && line.contains('=') {
            return Ok(self.parse_setting(line, state));
        }
        if let Some(code) = parse_alarm_code(line) {
            state.add_reason(Condition::Halt, format_alarm(code));
            return Ok(ParseOutcome::Alarm(code));
        }
        if line.starts_with("Grbl ") || line.starts_with('>') {
            tracing::info!("Device: {}", line);
            return Ok(ParseOutcome::Startup(line.to_string()));
        }

        Err(ProtocolError::Unparsed {
            line: line.to_string(),
        }
        .into())
    }

    fn parse_status(&self, line: &str, state: &mut MachineState) -> Result<ParseOutcome> {
        let inner = line
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .ok_or_else(|| malformed(line, "missing closing '>'"))?;

        let mut fields = inner.split('|');
        let head = fields.next().unwrap_or_default();
        let (name, substate) = match head.split_once(':') {
            Some((name, sub)) => (name, Some(sub)),
            None => (head, None),
        };
        let kind = MachineStateKind::from_grbl(name)
            .ok_or_else(|| malformed(line, &format!("unknown machine state '{}'", name)))?;
        let substate = match substate.map(str::parse::<u8>) {
            Some(Ok(code)) => Some(code),
            Some(Err(_)) => {
                tracing::warn!("Ignoring bad substate in {}", line);
                None
            }
            None => None,
        };

        let mut report = StatusReport::default();
        for field in fields {
            let Some((header, value)) = field.split_once(':') else {
                tracing::warn!("Ignoring status field without value: {}", field);
                continue;
            };
            match status_field(header) {
                Some(which) => report.collect(which, value),
                None => tracing::debug!("Ignoring unknown status field {}", header),
            }
        }

        state.set_machine_state(kind);
        state.set_substate(substate);
        report.apply(state);
        Ok(ParseOutcome::StatusReport)
    }

    fn parse_feedback(&self, line: &str, state: &mut MachineState) -> Result<ParseOutcome> {
        let inner = line
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| malformed(line, "missing closing ']'"))?;
        let (kind, payload) = inner.split_once(':').unwrap_or((inner, ""));

        match kind {
            "GC" | "sentGcode" => self.apply_modal_words(payload, state)?,
            "VER" => {
                let version = payload.split(':').next().unwrap_or_default();
                state.set_version(version);
            }
            "OPT" => {
                state.set_options(payload);
                let parts: Vec<&str> = payload.split(',').collect();
                if let (Some(blocks), Some(rx)) = (parts.get(1), parts.get(2)) {
                    match (blocks.trim().parse::<u32>(), rx.trim().parse::<u32>()) {
                        (Ok(blocks), Ok(rx)) => state.set_buffer_sizes(blocks, rx),
                        _ => tracing::warn!("Ignoring bad buffer sizes in {}", line),
                    }
                }
            }
            "MSG" => {
                state.set_message(payload);
                return Ok(ParseOutcome::Message(payload.to_string()));
            }
            "PRB" => {
                let (coords, flag) = payload
                    .rsplit_once(':')
                    .ok_or_else(|| malformed(line, "probe result without success flag"))?;
                let position = parse_axes(coords)
                    .ok_or_else(|| malformed(line, "bad probe coordinates"))?;
                state.set_probe_result(position, flag == "1");
            }
            "TLO" => match payload.trim().parse::<f64>() {
                Ok(offset) => state.set_tool_length_offset(offset),
                Err(_) => return Err(malformed(line, "bad tool length offset")),
            },
            "echo" | "HLP" => tracing::debug!("Device: {}", line),
            system if COORDINATE_SYSTEMS.contains(&system) => {
                let values =
                    parse_axes(payload).ok_or_else(|| malformed(line, "bad coordinates"))?;
                state.set_coordinate_offset(system, values);
            }
            _ => {
                return Err(ProtocolError::UnrecognizedFeedback {
                    kind: kind.to_string(),
                }
                .into())
            }
        }

        Ok(ParseOutcome::Feedback {
            kind: kind.to_string(),
        })
    }

    /// Apply the modal words of a `GC`/`sentGcode` payload.
    ///
    /// Comments are skipped and words may be run together (`G91G1X1`).
    /// Words outside the modal table (axis words, feeds) are ignored. Every
    /// word is applied before a units change is reported.
    pub fn apply_modal_words(&self, payload: &str, state: &mut MachineState) -> Result<()> {
        let mut units_change = None;
        for word in gcode_words(payload) {
            let word = normalize_word(&word);
            let Some(group) = modal_group(&word) else {
                continue;
            };
            if let Err(e) = state.set_modal(group, &word) {
                units_change = Some(e);
            }
        }
        match units_change {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn parse_setting(&self, line: &str, state: &mut MachineState) -> ParseOutcome {
        let Some((key, value)) = line[1..].split_once('=') else {
            return ParseOutcome::Setting {
                id: None,
                applied: false,
            };
        };
        let Ok(id) = key.parse::<u16>() else {
            tracing::debug!("Discarding setting {}", line);
            return ParseOutcome::Setting {
                id: None,
                applied: false,
            };
        };
        let Some(target) = setting_target(id) else {
            return ParseOutcome::Setting {
                id: Some(id),
                applied: false,
            };
        };
        let Ok(value) = value.trim().parse::<f64>() else {
            tracing::warn!("Ignoring non-numeric setting {}", line);
            return ParseOutcome::Setting {
                id: Some(id),
                applied: false,
            };
        };

        match target {
            SettingTarget::MaxRate(axis) => state.set_feed_rate_max(axis, value),
            SettingTarget::Acceleration(axis) => state.set_feed_rate_accel(axis, value),
        }
        ParseOutcome::Setting {
            id: Some(id),
            applied: true,
        }
    }
}

/// Fields collected from one status report before being applied
#[derive(Debug, Default)]
struct StatusReport {
    machine_pos: Option<AxisValues>,
    work_pos: Option<AxisValues>,
    work_offset: Option<AxisValues>,
    feed_rate: Option<f64>,
    spindle_rate: Option<f64>,
    overrides: Option<Vec<f64>>,
    pins: Option<String>,
    buffer: Option<(u32, u32)>,
    line_number: Option<u32>,
    accessories: Option<String>,
}

impl StatusReport {
    fn collect(&mut self, field: StatusField, value: &str) {
        let parsed = match field {
            StatusField::MachinePosition => parse_axes(value).map(|v| self.machine_pos = Some(v)),
            StatusField::WorkPosition => parse_axes(value).map(|v| self.work_pos = Some(v)),
            StatusField::WorkOffset => parse_axes(value).map(|v| self.work_offset = Some(v)),
            StatusField::FeedSpindle => parse_numbers(value).and_then(|v| match v.as_slice() {
                [feed, spindle] => {
                    self.feed_rate = Some(*feed);
                    self.spindle_rate = Some(*spindle);
                    Some(())
                }
                _ => None,
            }),
            StatusField::Feed => value.parse::<f64>().ok().map(|v| self.feed_rate = Some(v)),
            StatusField::Overrides => parse_numbers(value)
                .filter(|v| v.len() == 3)
                .map(|v| self.overrides = Some(v)),
            StatusField::Pins => {
                self.pins = Some(value.to_string());
                Some(())
            }
            StatusField::Buffer => {
                let parts: Vec<&str> = value.split(',').collect();
                match parts.as_slice() {
                    [blocks, rx] => match (blocks.parse::<u32>(), rx.parse::<u32>()) {
                        (Ok(blocks), Ok(rx)) => {
                            self.buffer = Some((blocks, rx));
                            Some(())
                        }
                        _ => None,
                    },
                    _ => None,
                }
            }
            StatusField::LineNumber => value.parse::<u32>().ok().map(|v| self.line_number = Some(v)),
            StatusField::Accessories => {
                self.accessories = Some(value.to_string());
                Some(())
            }
        };

        if parsed.is_none() {
            tracing::warn!("Skipping malformed status field {:?}: {}", field, value);
        }
    }

    fn apply(self, state: &mut MachineState) {
        if let Some(offset) = &self.work_offset {
            state.set_work_offset(offset);
        }
        if let Some(machine) = &self.machine_pos {
            state.set_machine_pos(machine);
        } else if let Some(work) = &self.work_pos {
            state.set_work_pos(work);
        }
        if let Some(feed) = self.feed_rate {
            state.set_feed_rate(feed);
        }
        if let Some(spindle) = self.spindle_rate {
            state.set_spindle_rate(spindle);
        }
        if let Some(ov) = self.overrides {
            state.set_feed_override(ov[0]);
            state.set_rapid_override(ov[1]);
            state.set_spindle_override(ov[2]);
        }
        // Pn and A are only sent while something is active
        state.set_pins(self.pins.as_deref().unwrap_or_default());
        state.set_accessories(self.accessories.as_deref().unwrap_or_default());
        if let Some((blocks, rx)) = self.buffer {
            state.set_buffer_state(blocks, rx);
        }
        if let Some(line) = self.line_number {
            state.set_line_number(line);
        }
    }
}

fn parse_numbers(value: &str) -> Option<Vec<f64>> {
    value
        .split(',')
        .map(|s| s.trim().parse::<f64>().ok())
        .collect()
}

/// Parse a comma separated coordinate list positionally onto x, y, z, a, b
fn parse_axes(value: &str) -> Option<AxisValues> {
    let numbers = parse_numbers(value)?;
    if numbers.len() < 3 || numbers.len() > Axis::ALL.len() {
        return None;
    }
    Some(grblkit_core::axis_values(&numbers))
}

fn malformed(line: &str, reason: &str) -> grblkit_core::Error {
    ProtocolError::MalformedReport {
        line: line.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
