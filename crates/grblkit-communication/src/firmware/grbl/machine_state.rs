//! Host-side mirror of the device state
//!
//! Every setter compares the old and new value and only notifies the
//! registered listener on an actual change. Per-axis structures notify once
//! per changed axis (`machine_pos.x`) and once for the whole structure
//! (`machine_pos`), so consumers are not flooded by unchanged status reports.
//!
//! # Invariants
//! - `work_pos[a] == machine_pos[a] - work_offset[a]` for every reported axis
//! - `pause`, `halt` and `door` are derived only from `machine_state`
//! - a condition flag going false clears its reason list

use super::tables::UNITS_GROUP;
use grblkit_core::{
    Axis, AxisValues, ChangeCallback, FieldValue, MachineStateKind, ProtocolError, Result, Units,
};
use std::collections::BTreeMap;
use std::fmt;

/// Feed and spindle override limits, percent
pub const OVERRIDE_RANGE: std::ops::RangeInclusive<f64> = 10.0..=200.0;

/// Rapid override settings accepted from the device, percent
pub const RAPID_OVERRIDE_STEPS: [f64; 3] = [20.0, 50.0, 100.0];

/// Condition flags carrying a list of reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// Feed hold
    Pause,
    /// Alarm lock
    Halt,
    /// Safety door
    Door,
    /// Door open, parking motion
    Parking,
    /// Door ajar, stopped before parking
    PausePark,
}

impl Condition {
    /// Notification field name of the flag
    pub fn name(&self) -> &'static str {
        match self {
            Condition::Pause => "pause",
            Condition::Halt => "halt",
            Condition::Door => "door",
            Condition::Parking => "parking",
            Condition::PausePark => "pause_park",
        }
    }

    /// Notification field name of the reason list
    pub fn reason_name(&self) -> &'static str {
        match self {
            Condition::Pause => "pause_reason",
            Condition::Halt => "halt_reason",
            Condition::Door => "door_reason",
            Condition::Parking => "parking_reason",
            Condition::PausePark => "pause_park_reason",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ConditionFlag {
    active: bool,
    reasons: Vec<String>,
}

#[derive(Clone, Default)]
struct Notifier(Option<ChangeCallback>);

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "Notifier(set)" } else { "Notifier(none)" })
    }
}

/// Last probe cycle result (`[PRB:...]`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    /// Machine position where the probe tripped
    pub position: AxisValues,
    /// Whether the probe made contact
    pub success: bool,
}

/// Host-side mirror of the device state
#[derive(Debug, Clone)]
pub struct MachineState {
    machine_pos: AxisValues,
    work_pos: AxisValues,
    work_offset: AxisValues,
    feed_rate: f64,
    spindle_rate: f64,
    feed_rate_max: AxisValues,
    feed_rate_accel: AxisValues,
    feed_override: f64,
    rapid_override: f64,
    spindle_override: f64,
    limits: BTreeMap<Axis, bool>,
    probe: bool,
    conditions: [ConditionFlag; 5],
    machine_state: Option<MachineStateKind>,
    substate: Option<u8>,
    gcode_modal: BTreeMap<String, String>,
    version: Option<String>,
    options: Option<String>,
    planner_blocks: Option<u32>,
    rx_buffer_size: Option<u32>,
    planner_available: Option<u32>,
    rx_available: Option<u32>,
    line_number: Option<u32>,
    accessories: String,
    probe_result: Option<ProbeResult>,
    coordinate_offsets: BTreeMap<String, AxisValues>,
    tool_length_offset: f64,
    message: Option<String>,
    listener: Notifier,
}

impl Default for MachineState {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_axes(slot: &mut AxisValues, values: &AxisValues) -> Vec<(Axis, f64)> {
    let mut changed = Vec::new();
    for (axis, value) in values {
        if slot.get(axis) != Some(value) {
            slot.insert(*axis, *value);
            changed.push((*axis, *value));
        }
    }
    changed
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

impl MachineState {
    /// Create an empty state with overrides at 100%
    pub fn new() -> Self {
        Self {
            machine_pos: AxisValues::new(),
            work_pos: AxisValues::new(),
            work_offset: AxisValues::new(),
            feed_rate: 0.0,
            spindle_rate: 0.0,
            feed_rate_max: AxisValues::new(),
            feed_rate_accel: AxisValues::new(),
            feed_override: 100.0,
            rapid_override: 100.0,
            spindle_override: 100.0,
            limits: BTreeMap::new(),
            probe: false,
            conditions: Default::default(),
            machine_state: None,
            substate: None,
            gcode_modal: BTreeMap::new(),
            version: None,
            options: None,
            planner_blocks: None,
            rx_buffer_size: None,
            planner_available: None,
            rx_available: None,
            line_number: None,
            accessories: String::new(),
            probe_result: None,
            coordinate_offsets: BTreeMap::new(),
            tool_length_offset: 0.0,
            message: None,
            listener: Notifier::default(),
        }
    }

    /// Register the change listener, replacing any previous one
    pub fn set_listener(&mut self, listener: ChangeCallback) {
        self.listener = Notifier(Some(listener));
    }

    /// Remove the change listener
    pub fn clear_listener(&mut self) {
        self.listener = Notifier(None);
    }

    fn notify(&self, field: &str, value: FieldValue) {
        tracing::trace!("{} = {}", field, value);
        if let Some(listener) = &self.listener.0 {
            listener(field, &value);
        }
    }

    fn notify_axes(&self, field: &str, changed: &[(Axis, f64)], whole: &AxisValues) {
        if changed.is_empty() {
            return;
        }
        for (axis, value) in changed {
            self.notify(&format!("{}.{}", field, axis.key()), FieldValue::Number(*value));
        }
        self.notify(field, FieldValue::Axes(whole.clone()));
    }

    // Positions

    /// Machine coordinates
    pub fn machine_pos(&self) -> &AxisValues {
        &self.machine_pos
    }

    /// Work coordinates
    pub fn work_pos(&self) -> &AxisValues {
        &self.work_pos
    }

    /// Work coordinate offset
    pub fn work_offset(&self) -> &AxisValues {
        &self.work_offset
    }

    /// Update machine coordinates and derive work coordinates
    pub fn set_machine_pos(&mut self, values: &AxisValues) {
        let changed = merge_axes(&mut self.machine_pos, values);
        self.notify_axes("machine_pos", &changed, &self.machine_pos);
        self.recompute_work_pos();
    }

    /// Update the work offset and derive work coordinates
    pub fn set_work_offset(&mut self, values: &AxisValues) {
        let changed = merge_axes(&mut self.work_offset, values);
        self.notify_axes("work_offset", &changed, &self.work_offset);
        self.recompute_work_pos();
    }

    /// Update work coordinates by moving the machine position under the
    /// current offset
    pub fn set_work_pos(&mut self, values: &AxisValues) {
        let machine: AxisValues = values
            .iter()
            .map(|(axis, w)| (*axis, w + self.offset_of(*axis)))
            .collect();
        self.set_machine_pos(&machine);
    }

    fn offset_of(&self, axis: Axis) -> f64 {
        self.work_offset.get(&axis).copied().unwrap_or(0.0)
    }

    fn recompute_work_pos(&mut self) {
        let derived: AxisValues = self
            .machine_pos
            .iter()
            .map(|(axis, m)| (*axis, m - self.offset_of(*axis)))
            .collect();
        let changed = merge_axes(&mut self.work_pos, &derived);
        self.notify_axes("work_pos", &changed, &self.work_pos);
    }

    // Rates and overrides

    /// Current feed rate
    pub fn feed_rate(&self) -> f64 {
        self.feed_rate
    }

    /// Set the current feed rate
    pub fn set_feed_rate(&mut self, value: f64) {
        if replace(&mut self.feed_rate, value) {
            self.notify("feed_rate", FieldValue::Number(value));
        }
    }

    /// Current spindle speed
    pub fn spindle_rate(&self) -> f64 {
        self.spindle_rate
    }

    /// Set the current spindle speed
    pub fn set_spindle_rate(&mut self, value: f64) {
        if replace(&mut self.spindle_rate, value) {
            self.notify("spindle_rate", FieldValue::Number(value));
        }
    }

    /// Per-axis max rate (`$110`..)
    pub fn feed_rate_max(&self) -> &AxisValues {
        &self.feed_rate_max
    }

    /// Set one axis max rate
    pub fn set_feed_rate_max(&mut self, axis: Axis, value: f64) {
        let changed = merge_axes(&mut self.feed_rate_max, &AxisValues::from([(axis, value)]));
        self.notify_axes("feed_rate_max", &changed, &self.feed_rate_max);
    }

    /// Per-axis acceleration (`$120`..)
    pub fn feed_rate_accel(&self) -> &AxisValues {
        &self.feed_rate_accel
    }

    /// Set one axis acceleration
    pub fn set_feed_rate_accel(&mut self, axis: Axis, value: f64) {
        let changed = merge_axes(&mut self.feed_rate_accel, &AxisValues::from([(axis, value)]));
        self.notify_axes("feed_rate_accel", &changed, &self.feed_rate_accel);
    }

    /// Feed override percent
    pub fn feed_override(&self) -> f64 {
        self.feed_override
    }

    /// Apply a feed override; values outside 10..=200 are ignored
    pub fn set_feed_override(&mut self, value: f64) -> bool {
        if !OVERRIDE_RANGE.contains(&value) {
            tracing::debug!("Ignoring feed override {}", value);
            return false;
        }
        if replace(&mut self.feed_override, value) {
            self.notify("feed_override", FieldValue::Number(value));
        }
        true
    }

    /// Rapid override percent
    pub fn rapid_override(&self) -> f64 {
        self.rapid_override
    }

    /// Apply a rapid override; only 20, 50 and 100 are accepted
    pub fn set_rapid_override(&mut self, value: f64) -> bool {
        if !RAPID_OVERRIDE_STEPS.contains(&value) {
            tracing::debug!("Ignoring rapid override {}", value);
            return false;
        }
        if replace(&mut self.rapid_override, value) {
            self.notify("rapid_override", FieldValue::Number(value));
        }
        true
    }

    /// Spindle override percent
    pub fn spindle_override(&self) -> f64 {
        self.spindle_override
    }

    /// Apply a spindle override; values outside 10..=200 are ignored
    pub fn set_spindle_override(&mut self, value: f64) -> bool {
        if !OVERRIDE_RANGE.contains(&value) {
            tracing::debug!("Ignoring spindle override {}", value);
            return false;
        }
        if replace(&mut self.spindle_override, value) {
            self.notify("spindle_override", FieldValue::Number(value));
        }
        true
    }

    // Hardware inputs

    /// Limit switch state of `axis`
    pub fn limit(&self, axis: Axis) -> bool {
        self.limits.get(&axis).copied().unwrap_or(false)
    }

    /// Set a limit switch flag
    pub fn set_limit(&mut self, axis: Axis, active: bool) {
        if self.limit(axis) != active {
            self.limits.insert(axis, active);
            self.notify(&format!("limit_{}", axis.key()), FieldValue::Bool(active));
        }
    }

    /// Probe input state
    pub fn probe(&self) -> bool {
        self.probe
    }

    /// Set the probe input flag
    pub fn set_probe(&mut self, active: bool) {
        if replace(&mut self.probe, active) {
            self.notify("probe", FieldValue::Bool(active));
        }
    }

    /// Apply a `Pn:` pin string; pins not listed are inactive
    pub fn set_pins(&mut self, pins: &str) {
        let triggered: Vec<Axis> = pins.chars().filter_map(Axis::from_letter).collect();
        for axis in Axis::ALL {
            self.set_limit(axis, triggered.contains(&axis));
        }
        self.set_probe(pins.contains('P'));
    }

    // Condition flags

    /// Whether `condition` is active
    pub fn condition(&self, condition: Condition) -> bool {
        self.conditions[condition.index()].active
    }

    /// Reasons recorded for `condition`
    pub fn reasons(&self, condition: Condition) -> &[String] {
        &self.conditions[condition.index()].reasons
    }

    /// Feed hold active
    pub fn pause(&self) -> bool {
        self.condition(Condition::Pause)
    }

    /// Alarm lock active
    pub fn halt(&self) -> bool {
        self.condition(Condition::Halt)
    }

    /// Safety door active
    pub fn door(&self) -> bool {
        self.condition(Condition::Door)
    }

    /// Parking in progress
    pub fn parking(&self) -> bool {
        self.condition(Condition::Parking)
    }

    /// Stopped with the door ajar
    pub fn pause_park(&self) -> bool {
        self.condition(Condition::PausePark)
    }

    /// Reasons for the alarm lock
    pub fn halt_reason(&self) -> &[String] {
        self.reasons(Condition::Halt)
    }

    /// Reasons for the feed hold
    pub fn pause_reason(&self) -> &[String] {
        self.reasons(Condition::Pause)
    }

    /// Record why `condition` is (or is about to be) active.
    ///
    /// Duplicate reasons are not recorded twice.
    pub fn add_reason(&mut self, condition: Condition, reason: impl Into<String>) {
        let reason = reason.into();
        let flag = &mut self.conditions[condition.index()];
        if flag.reasons.contains(&reason) {
            return;
        }
        flag.reasons.push(reason);
        let reasons = flag.reasons.clone();
        self.notify(condition.reason_name(), FieldValue::List(reasons));
    }

    fn set_condition(&mut self, condition: Condition, active: bool) {
        let flag = &mut self.conditions[condition.index()];
        let changed = replace(&mut flag.active, active);
        let cleared = !active && !flag.reasons.is_empty();
        if cleared {
            flag.reasons.clear();
        }

        if changed {
            self.notify(condition.name(), FieldValue::Bool(active));
        }
        if cleared {
            self.notify(condition.reason_name(), FieldValue::List(Vec::new()));
        }
    }

    // Machine state

    /// Device mode from the last status report
    pub fn machine_state(&self) -> Option<MachineStateKind> {
        self.machine_state
    }

    /// Substate code (`Hold:0`, `Door:2`)
    pub fn substate(&self) -> Option<u8> {
        self.substate
    }

    /// Set the device mode and derive the pause/halt/door flags from it
    pub fn set_machine_state(&mut self, kind: MachineStateKind) {
        if !replace(&mut self.machine_state, Some(kind)) {
            return;
        }
        tracing::info!("Machine state: {}", kind);
        self.notify("machine_state", FieldValue::Text(kind.to_string()));

        let flags = match kind {
            MachineStateKind::Idle
            | MachineStateKind::Run
            | MachineStateKind::Jog
            | MachineStateKind::Home => Some((false, false, false)),
            MachineStateKind::Hold => Some((true, false, false)),
            MachineStateKind::Alarm => Some((false, true, false)),
            MachineStateKind::Door => Some((false, false, true)),
            MachineStateKind::Check | MachineStateKind::Sleep => None,
        };

        if let Some((pause, halt, door)) = flags {
            self.set_condition(Condition::Pause, pause);
            self.set_condition(Condition::Halt, halt);
            self.set_condition(Condition::Door, door);
        }
    }

    /// Apply a substate code for the current mode.
    ///
    /// `Hold:n` and `Door:n` record a reason; `Door:2` means parking and
    /// `Door:1` means stopped with the door ajar. Any other mode except
    /// Check/Sleep clears both parking flags.
    pub fn set_substate(&mut self, substate: Option<u8>) {
        if replace(&mut self.substate, substate) {
            let value = substate.map(f64::from).unwrap_or(-1.0);
            self.notify("substate", FieldValue::Number(value));
        }

        match (self.machine_state, substate) {
            (Some(MachineStateKind::Hold), Some(code)) => {
                self.add_reason(Condition::Pause, hold_reason(code));
            }
            (Some(MachineStateKind::Door), code) => {
                if let Some(code) = code {
                    self.add_reason(Condition::Door, door_reason(code));
                }
                self.set_condition(Condition::Parking, code == Some(2));
                self.set_condition(Condition::PausePark, code == Some(1));
            }
            _ => {}
        }

        if !matches!(
            self.machine_state,
            Some(MachineStateKind::Door | MachineStateKind::Check | MachineStateKind::Sleep) | None
        ) {
            self.set_condition(Condition::Parking, false);
            self.set_condition(Condition::PausePark, false);
        }
    }

    // Modal state

    /// Active word per modal group
    pub fn gcode_modal(&self) -> &BTreeMap<String, String> {
        &self.gcode_modal
    }

    /// Active word of one modal group
    pub fn modal(&self, group: &str) -> Option<&str> {
        self.gcode_modal.get(group).map(String::as_str)
    }

    /// Active unit system
    pub fn units(&self) -> Units {
        self.modal(UNITS_GROUP)
            .map(Units::from_modal_word)
            .unwrap_or(Units::Unknown)
    }

    /// Store the active word of a modal group.
    ///
    /// A different units word replacing an existing one is stored and
    /// then reported as [`ProtocolError::UnitsChanged`].
    pub fn set_modal(&mut self, group: &str, word: &str) -> Result<()> {
        let previous = self.gcode_modal.insert(group.to_string(), word.to_string());
        if previous.as_deref() == Some(word) {
            return Ok(());
        }

        self.notify(
            &format!("gcode_modal.{}", group),
            FieldValue::Text(word.to_string()),
        );
        self.notify("gcode_modal", FieldValue::Map(self.gcode_modal.clone()));

        match previous {
            Some(from) if group == UNITS_GROUP => Err(ProtocolError::UnitsChanged {
                from,
                to: word.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    // Device information

    /// Firmware version (`[VER:...]`)
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Set the firmware version
    pub fn set_version(&mut self, version: &str) {
        if replace(&mut self.version, Some(version.to_string())) {
            self.notify("version", FieldValue::Text(version.to_string()));
        }
    }

    /// Compile options string (`[OPT:...]`)
    pub fn options(&self) -> Option<&str> {
        self.options.as_deref()
    }

    /// Set the compile options string
    pub fn set_options(&mut self, options: &str) {
        if replace(&mut self.options, Some(options.to_string())) {
            self.notify("options", FieldValue::Text(options.to_string()));
        }
    }

    /// Planner buffer size in blocks
    pub fn planner_blocks(&self) -> Option<u32> {
        self.planner_blocks
    }

    /// Receive buffer size reported by the device
    pub fn rx_buffer_size(&self) -> Option<u32> {
        self.rx_buffer_size
    }

    /// Set the planner and receive buffer sizes
    pub fn set_buffer_sizes(&mut self, planner_blocks: u32, rx_buffer_size: u32) {
        if replace(&mut self.planner_blocks, Some(planner_blocks)) {
            self.notify("planner_blocks", FieldValue::Number(planner_blocks.into()));
        }
        if replace(&mut self.rx_buffer_size, Some(rx_buffer_size)) {
            self.notify("rx_buffer_size", FieldValue::Number(rx_buffer_size.into()));
        }
    }

    /// Free planner blocks from the last `Bf:` field
    pub fn planner_available(&self) -> Option<u32> {
        self.planner_available
    }

    /// Free receive bytes from the last `Bf:` field
    pub fn rx_available(&self) -> Option<u32> {
        self.rx_available
    }

    /// Set the `Bf:` buffer state
    pub fn set_buffer_state(&mut self, planner_available: u32, rx_available: u32) {
        if replace(&mut self.planner_available, Some(planner_available)) {
            self.notify("planner_available", FieldValue::Number(planner_available.into()));
        }
        if replace(&mut self.rx_available, Some(rx_available)) {
            self.notify("rx_available", FieldValue::Number(rx_available.into()));
        }
    }

    /// Line number being executed (`Ln:`)
    pub fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    /// Set the executing line number
    pub fn set_line_number(&mut self, line: u32) {
        if replace(&mut self.line_number, Some(line)) {
            self.notify("line_number", FieldValue::Number(line.into()));
        }
    }

    /// Accessory letters (`A:SFM`)
    pub fn accessories(&self) -> &str {
        &self.accessories
    }

    /// Spindle running clockwise
    pub fn spindle_cw(&self) -> bool {
        self.accessories.contains('S')
    }

    /// Spindle running counter-clockwise
    pub fn spindle_ccw(&self) -> bool {
        self.accessories.contains('C')
    }

    /// Flood coolant on
    pub fn flood_coolant(&self) -> bool {
        self.accessories.contains('F')
    }

    /// Mist coolant on
    pub fn mist_coolant(&self) -> bool {
        self.accessories.contains('M')
    }

    /// Set the accessory letters; empty when none are active
    pub fn set_accessories(&mut self, accessories: &str) {
        if replace(&mut self.accessories, accessories.to_string()) {
            self.notify("accessories", FieldValue::Text(accessories.to_string()));
        }
    }

    /// Last probe cycle result
    pub fn probe_result(&self) -> Option<&ProbeResult> {
        self.probe_result.as_ref()
    }

    /// Store a probe cycle result
    pub fn set_probe_result(&mut self, position: AxisValues, success: bool) {
        let result = ProbeResult { position, success };
        if replace(&mut self.probe_result, Some(result.clone())) {
            self.notify("probe_success", FieldValue::Bool(success));
            self.notify("probe_pos", FieldValue::Axes(result.position));
        }
    }

    /// Stored coordinate systems (`G54`..`G59`, `G28`, `G30`, `G92`)
    pub fn coordinate_offsets(&self) -> &BTreeMap<String, AxisValues> {
        &self.coordinate_offsets
    }

    /// Offsets of one coordinate system
    pub fn coordinate_offset(&self, name: &str) -> Option<&AxisValues> {
        self.coordinate_offsets.get(name)
    }

    /// Store the offsets of a coordinate system
    pub fn set_coordinate_offset(&mut self, name: &str, values: AxisValues) {
        let slot = self.coordinate_offsets.entry(name.to_string()).or_default();
        let changed = merge_axes(slot, &values);
        let whole = slot.clone();
        self.notify_axes(&format!("coordinate_offsets.{}", name), &changed, &whole);
    }

    /// Tool length offset (`[TLO:...]`)
    pub fn tool_length_offset(&self) -> f64 {
        self.tool_length_offset
    }

    /// Set the tool length offset
    pub fn set_tool_length_offset(&mut self, value: f64) {
        if replace(&mut self.tool_length_offset, value) {
            self.notify("tool_length_offset", FieldValue::Number(value));
        }
    }

    /// Last `[MSG:...]` text
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Store the last device message
    pub fn set_message(&mut self, message: &str) {
        if replace(&mut self.message, Some(message.to_string())) {
            self.notify("message", FieldValue::Text(message.to_string()));
        }
    }
}

fn hold_reason(code: u8) -> String {
    match code {
        0 => "Hold complete".to_string(),
        1 => "Hold in progress".to_string(),
        n => format!("Hold:{}", n),
    }
}

fn door_reason(code: u8) -> String {
    match code {
        0 => "Door closed, ready to resume".to_string(),
        1 => "Machine stopped, door ajar".to_string(),
        2 => "Door opened, parking".to_string(),
        3 => "Door closed, restoring".to_string(),
        n => format!("Door:{}", n),
    }
}
