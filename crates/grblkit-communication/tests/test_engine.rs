mod common;

use common::{drain_events, quiet_config, MockTransport};
use grblkit_communication::{ControllerEngine, EngineConfig, ManualClock, PortRegistry, RouterMode};
use grblkit_core::{
    axis_values, AckKind, ConnectionError, ConnectionState, EngineEvent, Error, ProtocolError,
};
use std::sync::Arc;
use std::time::Duration;

fn engine(port: &str, config: EngineConfig) -> (ControllerEngine, MockTransport) {
    let transport = MockTransport::new(port);
    let engine = ControllerEngine::new(config, Box::new(transport.clone())).unwrap();
    (engine, transport)
}

#[test]
fn test_connect_lifecycle_events() {
    let (mut engine, _transport) = engine("engine-connect", quiet_config());
    let mut events = engine.subscribe();

    engine.connect().unwrap();
    assert_eq!(engine.connection_state(), ConnectionState::Connected);
    assert!(PortRegistry::is_reserved("engine-connect"));

    engine.disconnect().unwrap();
    assert_eq!(engine.connection_state(), ConnectionState::NotConnected);
    assert!(!PortRegistry::is_reserved("engine-connect"));

    let states: Vec<ConnectionState> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::ConnectionChanged(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnecting,
            ConnectionState::Cleanup,
            ConnectionState::NotConnected,
        ]
    );
}

#[test]
fn test_no_io_unless_connected() {
    let (mut engine, transport) = engine("engine-no-io", quiet_config());
    engine.sender().enqueue_streaming("G0 X1");
    transport.push("ok\n");

    let report = engine.poll().unwrap();
    assert_eq!(report.lines, 0);
    assert_eq!(transport.reads(), 0);
    assert!(transport.written().is_empty());
}

#[test]
fn test_second_engine_is_blocked() {
    let (mut first, _t1) = engine("engine-shared-port", quiet_config());
    let (mut second, _t2) = engine("engine-shared-port", quiet_config());

    first.connect().unwrap();
    let err = second.connect().unwrap_err();
    assert!(matches!(err, Error::Connection(ConnectionError::PortInUse { .. })));
    assert_eq!(second.connection_state(), ConnectionState::Blocked);

    first.disconnect().unwrap();
    second.connect().unwrap();
    assert_eq!(second.connection_state(), ConnectionState::Connected);
    second.disconnect().unwrap();
}

#[test]
fn test_closed_transport_is_missing_resource() {
    let (mut engine, transport) = engine("engine-closed", quiet_config());
    transport.close();

    let err = engine.connect().unwrap_err();
    assert!(matches!(err, Error::Connection(ConnectionError::MissingResource { .. })));
    assert_eq!(engine.connection_state(), ConnectionState::MissingResource);
    assert!(!PortRegistry::is_reserved("engine-closed"));
}

#[test]
fn test_streams_one_line_per_cycle_and_counts_acks() {
    let (mut engine, transport) = engine("engine-stream", quiet_config());
    let mut events = engine.subscribe();
    engine.connect().unwrap();

    let sender = engine.sender();
    sender.enqueue_streaming("G21");
    sender.enqueue_streaming("G0 X1");

    assert_eq!(engine.poll().unwrap().streamed.as_deref(), Some("G21"));
    assert_eq!(engine.poll().unwrap().streamed.as_deref(), Some("G0 X1"));
    assert_eq!(transport.written_text(), "G21\nG0 X1\n");
    assert_eq!(engine.send_buffer().pending_bytes(), 10);
    assert_eq!(engine.router().mode(), RouterMode::Streaming);

    transport.push("ok\r\nerror:20\r\n");
    let report = engine.poll().unwrap();
    assert_eq!(report.acknowledged, 2);
    assert_eq!(engine.ok_count(), 1);
    assert_eq!(engine.error_count(), 1);
    assert!(engine.send_buffer().is_empty());

    let events = drain_events(&mut events);
    assert!(events.contains(&EngineEvent::Acknowledged {
        kind: AckKind::Ok,
        ok_count: 1,
        error_count: 0,
    }));
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::DeviceError { code: 20, .. })));
    engine.disconnect().unwrap();
}

#[test]
fn test_ack_without_pending_fails_connection() {
    let (mut engine, transport) = engine("engine-desync", quiet_config());
    engine.connect().unwrap();

    transport.push("ok\n");
    let err = engine.poll().unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::ProtocolViolation { .. })));
    assert_eq!(engine.connection_state(), ConnectionState::Fail);
    assert!(!PortRegistry::is_reserved("engine-desync"));

    engine.disconnect().unwrap();
    assert_eq!(engine.connection_state(), ConnectionState::NotConnected);
}

#[test]
fn test_write_failure_fails_connection() {
    let (mut engine, transport) = engine("engine-write-fail", quiet_config());
    engine.connect().unwrap();
    transport.fail_writes();

    engine.sender().enqueue_immediate(vec![b'!']);
    let err = engine.poll().unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(engine.connection_state(), ConnectionState::Fail);

    // FAIL stops all I/O
    let reads = transport.reads();
    engine.poll().unwrap();
    assert_eq!(transport.reads(), reads);
}

#[test]
fn test_read_failure_fails_connection() {
    let (mut engine, transport) = engine("engine-read-fail", quiet_config());
    engine.connect().unwrap();
    transport.fail_reads();

    assert!(engine.poll().is_err());
    assert_eq!(engine.connection_state(), ConnectionState::Fail);
}

#[test]
fn test_status_report_updates_shared_state() {
    let (mut engine, transport) = engine("engine-status", quiet_config());
    engine.connect().unwrap();

    transport.push("<Idle|MPos:1.0,2.0,3.0|FS:500,1000>\n");
    engine.poll().unwrap();

    let state = engine.machine_state();
    assert_eq!(state.machine_pos(), &axis_values(&[1.0, 2.0, 3.0]));
    assert_eq!(state.feed_rate(), 500.0);
    assert_eq!(state.spindle_rate(), 1000.0);
    assert!(!state.pause() && !state.halt() && !state.door());
    engine.disconnect().unwrap();
}

#[test]
fn test_unparsed_lines_are_counted_not_fatal() {
    let (mut engine, transport) = engine("engine-unparsed", quiet_config());
    let mut events = engine.subscribe();
    engine.connect().unwrap();

    transport.push("<Idle|MPos:1,2\nhello there\n[FOO:1]\n");
    engine.poll().unwrap();

    assert_eq!(engine.unparsed_count(), 3);
    assert_eq!(engine.connection_state(), ConnectionState::Connected);
    let unparsed = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::Unparsed { .. }))
        .count();
    assert_eq!(unparsed, 3);
    engine.disconnect().unwrap();
}

#[test]
fn test_alarm_and_message_events() {
    let (mut engine, transport) = engine("engine-alarm", quiet_config());
    let mut events = engine.subscribe();
    engine.connect().unwrap();

    transport.push("ALARM:1\n[MSG:Reset to continue]\n<Alarm|MPos:0,0,0>\n");
    engine.poll().unwrap();

    let state = engine.machine_state();
    assert!(state.halt());
    assert_eq!(state.halt_reason().len(), 1);

    let events = drain_events(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::Alarm { code: 1, .. })));
    assert!(events.contains(&EngineEvent::Message("Reset to continue".into())));
    engine.disconnect().unwrap();
}

#[test]
fn test_startup_commands_sent_after_connect() {
    let config = EngineConfig {
        status_query_interval_ms: 0,
        ..EngineConfig::default()
    };
    let (mut engine, transport) = engine("engine-startup", config);
    engine.connect().unwrap();

    // $I is slow: $G waits for its acknowledgment
    engine.poll().unwrap();
    engine.poll().unwrap();
    assert_eq!(transport.written_text(), "$I\n");

    transport.push("[VER:1.1h.20190825:]\n[OPT:V,15,128]\nok\n");
    engine.poll().unwrap();
    assert_eq!(transport.written_text(), "$I\n$G\n");
    assert_eq!(engine.machine_state().version(), Some("1.1h.20190825"));
    engine.disconnect().unwrap();
}

#[test]
fn test_periodic_status_query() {
    let config = EngineConfig {
        startup_commands: Vec::new(),
        ..EngineConfig::default()
    };
    let transport = MockTransport::new("engine-status-query");
    let clock = ManualClock::new();
    let mut engine =
        ControllerEngine::with_clock(config, Box::new(transport.clone()), Arc::new(clock.clone()))
            .unwrap();
    engine.connect().unwrap();

    engine.poll().unwrap();
    assert_eq!(transport.written(), vec![b"?".to_vec()]);

    clock.advance(Duration::from_millis(100));
    engine.poll().unwrap();
    assert_eq!(transport.written().len(), 1);

    clock.advance(Duration::from_millis(100));
    engine.poll().unwrap();
    assert_eq!(transport.written(), vec![b"?".to_vec(), b"?".to_vec()]);
    engine.disconnect().unwrap();
}

#[test]
fn test_streamed_gcode_updates_modal_state() {
    let (mut engine, transport) = engine("engine-modal", quiet_config());
    engine.connect().unwrap();

    transport.push("[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]\n");
    engine.sender().enqueue_streaming("G91 G1 X1 F100");
    engine.poll().unwrap();
    assert_eq!(engine.machine_state().modal("distance"), Some("G91"));
    assert_eq!(engine.machine_state().modal("motion"), Some("G1"));

    engine.sender().enqueue_streaming("G20");
    let err = engine.poll().unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::UnitsChanged { .. })));
    assert_eq!(engine.connection_state(), ConnectionState::Fail);
}

#[test]
fn test_comments_in_streamed_gcode_are_not_modal() {
    let (mut engine, transport) = engine("engine-modal-comment", quiet_config());
    engine.connect().unwrap();

    transport.push("[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]\n");
    engine.sender().enqueue_streaming("G0 X1 ( converted from G20 )");
    engine.poll().unwrap();
    engine.sender().enqueue_streaming("G91 ; back to G90 and G20 later");
    transport.push("ok\n");
    engine.poll().unwrap();

    let state = engine.machine_state();
    assert_eq!(state.modal("units"), Some("G21"));
    assert_eq!(state.modal("distance"), Some("G91"));
    assert_eq!(engine.connection_state(), ConnectionState::Connected);
    engine.disconnect().unwrap();
}

#[test]
fn test_unspaced_streamed_gcode_updates_modal_state() {
    let (mut engine, transport) = engine("engine-modal-unspaced", quiet_config());
    engine.connect().unwrap();

    transport.push("[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]\n");
    engine.sender().enqueue_streaming("G91G1X1F100");
    engine.poll().unwrap();
    assert_eq!(engine.machine_state().modal("distance"), Some("G91"));
    assert_eq!(engine.machine_state().modal("motion"), Some("G1"));

    engine.sender().enqueue_streaming("G20G0X1");
    transport.push("ok\n");
    let err = engine.poll().unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::UnitsChanged { .. })));
    assert_eq!(engine.machine_state().modal("units"), Some("G20"));
    assert_eq!(engine.connection_state(), ConnectionState::Fail);
}

#[test]
fn test_reconnect_after_failure_drops_old_queue() {
    let (mut engine, transport) = engine("engine-reconnect", quiet_config());
    engine.connect().unwrap();

    let sender = engine.sender();
    for line in ["G0 X1", "G0 X2", "G0 X3"] {
        sender.enqueue_streaming(line);
    }
    engine.poll().unwrap();

    transport.push("ok\nok\n");
    assert!(engine.poll().is_err());
    assert_eq!(engine.connection_state(), ConnectionState::Fail);
    assert_eq!(sender.streaming_len(), 0);

    transport.clear_written();
    engine.connect().unwrap();
    sender.enqueue_streaming("G0 Y5");
    engine.poll().unwrap();
    engine.poll().unwrap();
    assert_eq!(transport.written_text(), "G0 Y5\n");
    engine.disconnect().unwrap();
}

#[test]
fn test_welcome_banner_clears_pending() {
    let (mut engine, transport) = engine("engine-reset", quiet_config());
    engine.connect().unwrap();

    engine.sender().enqueue_streaming("G0 X10");
    engine.poll().unwrap();
    assert_eq!(engine.send_buffer().len(), 1);

    transport.push("\r\nGrbl 1.1h ['$' for help]\r\n");
    engine.poll().unwrap();
    assert!(engine.send_buffer().is_empty());
    assert_eq!(engine.router().mode(), RouterMode::Idle);
    engine.disconnect().unwrap();
}

#[test]
fn test_disconnect_discards_queued_and_pending() {
    let (mut engine, transport) = engine("engine-disconnect", quiet_config());
    engine.connect().unwrap();

    let sender = engine.sender();
    sender.enqueue_streaming("G0 X1");
    engine.poll().unwrap();
    sender.enqueue_streaming("G0 X2");
    sender.enqueue_streaming("G0 X3");
    sender.enqueue_immediate(vec![b'?']);

    engine.disconnect().unwrap();
    assert!(engine.send_buffer().is_empty());
    assert_eq!(sender.streaming_len(), 0);
    assert_eq!(sender.immediate_len(), 0);

    transport.clear_written();
    engine.poll().unwrap();
    assert!(transport.written().is_empty());
}

#[test]
fn test_lines_split_across_reads() {
    let (mut engine, transport) = engine("engine-split", quiet_config());
    engine.connect().unwrap();

    transport.push("<Idle|MPos:5.0,");
    transport.push("");
    transport.push("6.0,7.0>\r");
    transport.push("\n");
    for _ in 0..3 {
        assert_eq!(engine.poll().unwrap().lines, 0);
    }
    assert_eq!(engine.poll().unwrap().lines, 1);
    assert_eq!(
        engine.machine_state().machine_pos(),
        &axis_values(&[5.0, 6.0, 7.0])
    );
    engine.disconnect().unwrap();
}

#[test]
fn test_invalid_config_rejected() {
    let config = EngineConfig {
        rx_buffer_capacity: 0,
        ..EngineConfig::default()
    };
    let result = ControllerEngine::new(config, Box::new(MockTransport::new("engine-bad-config")));
    assert!(matches!(result, Err(Error::Config(_))));
}
