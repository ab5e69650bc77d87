//! End-to-end session scenarios against a real `Engine`, scripted through
//! `ObcSession`.

use msp_core::{Engine, EngineError, ExperimentConfig};
use msp_harness::{
    check_all, format_obc_header, parse_experiment_header, Event, ObcSession, RecordingHandlers,
};
use msp_proto::{ctrl, standard, HEADER_FRAME_LEN};

const EXP_ADDR: u8 = 0x35;
const MTU: u32 = 507;

fn new_engine() -> Engine<RecordingHandlers> {
    let config = ExperimentConfig::new(EXP_ADDR, MTU).unwrap();
    Engine::new(config, RecordingHandlers::new())
}

#[test]
fn empty_polling_cycle_is_stable() {
    let mut engine = new_engine();
    let addr = engine.config().addr();

    let mut first = [0u8; HEADER_FRAME_LEN];
    let len = engine.on_send(&mut first).unwrap();
    assert_eq!(len, HEADER_FRAME_LEN);

    let header = parse_experiment_header(&first[..len], addr).unwrap();
    assert_eq!(header.opcode, ctrl::NULL);
    assert_eq!(header.frame_id, 0);

    let mut second = [0u8; HEADER_FRAME_LEN];
    let len2 = engine.on_send(&mut second).unwrap();
    assert_eq!(&first[..len], &second[..len2]);
}

#[test]
fn system_command_sleep_fires_syscommand_and_sets_flag() {
    let mut engine = new_engine();
    let session = ObcSession::new(engine.config().addr());

    session.run_system_command(&mut engine, standard::SLEEP, 0).unwrap();

    let events = engine.handlers().events();
    assert_eq!(events.iter().filter(|e| matches!(e, Event::RecvSyscommand { .. })).count(), 1);
    assert!(engine.seqflags().is_set(standard::SLEEP, false));
    assert!(check_all(engine.handlers()).is_empty());
}

#[test]
fn duplicate_system_command_does_not_refire() {
    let mut engine = new_engine();
    let session = ObcSession::new(engine.config().addr());

    session.run_system_command(&mut engine, standard::SLEEP, 0).unwrap();
    session.run_system_command(&mut engine, standard::SLEEP, 0).unwrap();

    let events = engine.handlers().events();
    assert_eq!(events.iter().filter(|e| matches!(e, Event::RecvSyscommand { .. })).count(), 1);
}

#[test]
fn request_multi_frame_response() {
    let config = ExperimentConfig::new(EXP_ADDR, 500).unwrap();
    let mut handlers = RecordingHandlers::new();
    let body: Vec<u8> = (0..1200u32).map(|i| (i % 256) as u8).collect();
    handlers.queue_response(standard::REQ_PAYLOAD, body.clone());
    let mut engine = Engine::new(config, handlers);
    let session = ObcSession::new(config.addr());

    let response = session.run_request(&mut engine, standard::REQ_PAYLOAD, 500).unwrap();
    assert_eq!(response, body);

    let events = engine.handlers().events();
    assert_eq!(events.iter().filter(|e| matches!(e, Event::SendComplete { .. })).count(), 1);
    assert!(engine.seqflags().get(standard::REQ_PAYLOAD).is_some());
}

#[test]
fn send_transaction_delivers_payload_then_duplicate_is_silent() {
    let mut engine = new_engine();
    let session = ObcSession::new(engine.config().addr());
    let payload = b"housekeeping-telemetry-blob".to_vec();

    session.run_send_transaction(&mut engine, standard::SEND_TIME, 0, &payload, 8).unwrap();
    assert_eq!(engine.handlers().received(standard::SEND_TIME), payload.as_slice());
    assert_eq!(engine.handlers().recv_start_count(standard::SEND_TIME), 1);

    let before = engine.handlers().events().len();
    session.run_send_transaction(&mut engine, standard::SEND_TIME, 0, &payload, 8).unwrap();
    let after_events = &engine.handlers().events()[before..];

    assert_eq!(engine.handlers().recv_start_count(standard::SEND_TIME), 1);
    assert!(!after_events.iter().any(|e| matches!(e, Event::RecvData { .. })));
}

#[test]
fn fcs_corruption_is_rejected_without_upcalls() {
    let mut engine = new_engine();
    let addr = engine.config().addr();
    let mut header = format_obc_header(standard::SLEEP, 0, 0, addr);
    header[8] ^= 0xFF;

    let err = engine.on_recv(&header).unwrap_err();
    assert!(matches!(err, EngineError::Frame(msp_proto::FrameError::FcsMismatch)));
    assert!(engine.handlers().events().is_empty());
}

#[test]
fn abort_mid_receive_fires_recv_error() {
    let mut engine = new_engine();
    let addr = engine.config().addr();

    let send_header = format_obc_header(standard::SEND_TIME, 0, 100, addr);
    engine.on_recv(&send_header).unwrap();

    let null_header = format_obc_header(ctrl::NULL, 0, 0, addr);
    engine.on_recv(&null_header).unwrap();

    let events = engine.handlers().events();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::RecvError { opcode, error }
            if *opcode == standard::SEND_TIME && *error == EngineError::TransactionAborted.code()
    )));
}
