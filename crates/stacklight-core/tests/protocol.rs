use pretty_assertions::assert_eq;
use stacklight_core::protocol::{
    crc16, query_devices, send_command, CommandKind, Controller, Frame, LineConfig,
    ProtocolError, QueryTiming, ResponseSource, Session, SimTransport, Transport, FRAME_LEN,
};
use std::time::Duration;

fn open_session(sim: &SimTransport) -> Session<SimTransport> {
    Session::open(sim.clone(), LineConfig::new("/dev/ttyUSB0", 9600)).expect("sim line should open")
}

fn fast_timing() -> QueryTiming {
    QueryTiming {
        settle_delay: Duration::ZERO,
        ..QueryTiming::default()
    }
}

#[test]
fn test_crc_matches_captured_red_on_frame() {
    let captured = [0x01, 0x06, 0x00, 0xC2, 0x00, 0x11, 0xE8, 0x3A, 0x00, 0x00];
    let crc = crc16(&captured[..6]);
    assert_eq!(crc.to_le_bytes(), [captured[6], captured[7]]);
    assert_eq!(Frame::command(CommandKind::RedOn).as_bytes(), &captured);
}

#[test]
fn test_every_command_is_written_as_ten_bytes() {
    let sim = SimTransport::new();
    let mut session = open_session(&sim);

    for kind in CommandKind::ALL {
        send_command(&mut session, kind, &QueryTiming::default()).expect("send should succeed");
    }

    let written = sim.written();
    assert_eq!(written.len(), CommandKind::ALL.len());
    for (bytes, kind) in written.iter().zip(CommandKind::ALL) {
        assert_eq!(bytes.len(), FRAME_LEN);
        assert_eq!(&bytes[..5], &[0x01, 0x06, 0x00, 0xC2, 0x00]);
        assert_eq!(bytes[5], kind.opcode());
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), crc16(&bytes[..6]));
        assert_eq!(&bytes[8..], &[0x00, 0x00]);
    }
}

#[test]
fn test_send_command_before_init_writes_nothing() {
    let sim = SimTransport::new();
    let mut tower = Controller::new(sim.clone());

    assert!(!tower.send_command(CommandKind::RedOn));
    assert!(sim.written().is_empty());
}

#[test]
fn test_send_command_after_deinit_fails() {
    let sim = SimTransport::new();
    let mut tower = Controller::new(sim.clone());
    assert!(tower.init(LineConfig::default()));
    tower.deinit();

    assert!(!tower.is_initialized());
    assert!(!sim.is_open());
    assert!(!tower.send_command(CommandKind::GreenOn));
    assert!(sim.written().is_empty());
}

#[test]
fn test_session_use_after_close() {
    let sim = SimTransport::new();
    let mut session = open_session(&sim);
    session.close();

    assert!(matches!(
        send_command(&mut session, CommandKind::LightOff, &QueryTiming::default()),
        Err(ProtocolError::NotOpen)
    ));
    assert!(matches!(session.buffered_len(), Err(ProtocolError::NotOpen)));
    assert!(matches!(session.flush_input(), Err(ProtocolError::NotOpen)));
}

#[test]
fn test_short_write_fails() {
    let sim = SimTransport::new().limit_writes(7);
    let mut session = open_session(&sim);

    let result = send_command(&mut session, CommandKind::YellowOn, &QueryTiming::default());
    assert!(matches!(
        result,
        Err(ProtocolError::PartialWrite {
            written: 7,
            expected: 10
        })
    ));

    let mut tower = Controller::new(SimTransport::new().limit_writes(9));
    assert!(tower.init(LineConfig::default()));
    assert!(!tower.send_command(CommandKind::YellowOn));
}

#[test]
fn test_light_off_twice_is_identical() {
    let sim = SimTransport::new();
    let mut tower = Controller::new(sim.clone());
    assert!(tower.init(LineConfig::default()));

    assert!(tower.send_command(CommandKind::LightOff));
    assert!(tower.send_command(CommandKind::LightOff));

    let written = sim.written();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0], written[1]);
}

#[test]
fn test_drain_timeout_is_not_fatal() {
    let sim = SimTransport::new().drain_timeout();
    let mut tower = Controller::new(sim.clone());
    assert!(tower.init(LineConfig::default()));

    assert!(tower.send_command(CommandKind::RedBurst));
    assert_eq!(sim.written().len(), 1);
}

#[test]
fn test_configured_drain_timeout_applies_to_every_exchange() {
    let sim = SimTransport::tower();
    let timing = QueryTiming {
        tx_drain_timeout: Duration::from_millis(500),
        ..fast_timing()
    };
    let mut tower = Controller::with_timing(sim.clone(), timing);
    assert!(tower.init(LineConfig::default()));

    assert!(tower.send_command(CommandKind::RedOn));
    assert!(tower.send_data(&[0x01, 0x06, 0x00, 0xC2, 0x00, 0x60]));
    assert!(tower.query_devices());

    assert_eq!(sim.drain_timeouts(), vec![Duration::from_millis(500); 3]);
}

#[test]
fn test_double_init_is_rejected() {
    let sim = SimTransport::new();
    let mut tower = Controller::new(sim.clone());

    assert!(tower.init(LineConfig::default()));
    assert!(!tower.init(LineConfig::default()));
    assert!(tower.is_initialized());
    assert_eq!(sim.open_count(), 1);
}

#[test]
fn test_open_rejects_transport_already_open() {
    let mut sim = SimTransport::new();
    sim.open(&LineConfig::default()).unwrap();

    assert!(matches!(
        Session::open(sim.clone(), LineConfig::default()),
        Err(ProtocolError::AlreadyOpen)
    ));
}

#[test]
fn test_failed_open_leaves_nothing_initialized() {
    let sim = SimTransport::new().fail_open("pins cannot be bound");
    let mut tower = Controller::new(sim.clone());

    assert!(!tower.init(LineConfig::default()));
    assert!(!tower.is_initialized());
    assert!(!sim.is_open());

    // A fresh init may be attempted
    assert!(tower.init(LineConfig::default()));
    assert!(tower.is_initialized());
}

#[test]
fn test_invalid_line_config() {
    let sim = SimTransport::new();
    assert!(matches!(
        Session::open(sim.clone(), LineConfig::new("", 9600)),
        Err(ProtocolError::InvalidArgument(_))
    ));
    assert!(matches!(
        Session::open(sim.clone(), LineConfig::new("/dev/ttyUSB0", 0)),
        Err(ProtocolError::InvalidArgument(_))
    ));
    assert_eq!(sim.open_count(), 0);
}

#[test]
fn test_reinit_after_deinit_uses_new_config() {
    let sim = SimTransport::new();
    let mut tower = Controller::new(sim.clone());

    assert!(tower.init(LineConfig::new("/dev/ttyUSB0", 9600)));
    tower.deinit();
    tower.deinit();
    assert!(tower.init(LineConfig::new("/dev/ttyUSB1", 19200)));

    assert_eq!(sim.open_count(), 2);
    assert_eq!(sim.config().map(|c| c.baud_rate), Some(19200));
    assert_eq!(tower.session().config().port, "/dev/ttyUSB1");
}

#[test]
fn test_query_timed_read() {
    let sim = SimTransport::new();
    let mut session = open_session(&sim);
    sim.respond_with(&[0x01, 0x03, 0x02, 0x00, 0x07]);

    let response = query_devices(&mut session, &fast_timing()).expect("query should succeed");
    assert_eq!(response.bytes, vec![0x01, 0x03, 0x02, 0x00, 0x07]);
    assert_eq!(response.source, ResponseSource::TimedRead);

    assert_eq!(sim.written(), vec![Frame::query().as_bytes().to_vec()]);
    assert_eq!(sim.read_timeouts(), vec![Duration::from_millis(1000)]);
}

#[test]
fn test_query_buffered_fallback() {
    let sim = SimTransport::new();
    let mut session = open_session(&sim);
    sim.respond_late(&[0x01, 0x03, 0x00]);

    let response = query_devices(&mut session, &fast_timing()).expect("fallback should succeed");
    assert_eq!(response.bytes, vec![0x01, 0x03, 0x00]);
    assert_eq!(response.source, ResponseSource::BufferedFallback);

    // One timed read, then exactly one zero-timeout drain
    assert_eq!(
        sim.read_timeouts(),
        vec![Duration::from_millis(1000), Duration::ZERO]
    );
}

#[test]
fn test_query_no_response() {
    let sim = SimTransport::new();
    let mut session = open_session(&sim);

    assert!(matches!(
        query_devices(&mut session, &fast_timing()),
        Err(ProtocolError::NoResponse)
    ));
    // No fallback read when nothing is buffered
    assert_eq!(sim.read_timeouts(), vec![Duration::from_millis(1000)]);

    let mut tower = Controller::with_timing(SimTransport::new(), fast_timing());
    assert!(tower.init(LineConfig::default()));
    assert!(!tower.query_devices());
    assert!(tower.last_response().is_none());
}

#[test]
fn test_failed_query_clears_last_response() {
    let sim = SimTransport::new();
    let mut tower = Controller::with_timing(sim.clone(), fast_timing());
    assert!(tower.init(LineConfig::default()));

    sim.respond_with(&[0x01, 0x03, 0x00]);
    assert!(tower.query_devices());
    assert_eq!(
        tower.last_response().map(|r| r.bytes.clone()),
        Some(vec![0x01, 0x03, 0x00])
    );

    // Nothing scripted this time
    assert!(!tower.query_devices());
    assert!(tower.last_response().is_none());
}

#[test]
fn test_query_flushes_stale_input() {
    let sim = SimTransport::new().with_stale_input(&[0xDE, 0xAD]);
    let mut session = open_session(&sim);

    assert!(matches!(
        query_devices(&mut session, &fast_timing()),
        Err(ProtocolError::NoResponse)
    ));
    assert_eq!(sim.flushes(), (1, 2));
}

#[test]
fn test_query_short_write_aborts_before_read() {
    let sim = SimTransport::new().limit_writes(3);
    let mut session = open_session(&sim);
    sim.respond_with(&[0x01]);

    assert!(matches!(
        query_devices(&mut session, &fast_timing()),
        Err(ProtocolError::PartialWrite { .. })
    ));
    assert!(sim.read_timeouts().is_empty());
    assert_eq!(sim.flushes(), (0, 0));
}

#[test]
fn test_controller_against_simulated_tower() {
    let sim = SimTransport::tower();
    let mut tower = Controller::with_timing(sim.clone(), fast_timing());
    assert!(tower.init(LineConfig::default()));

    // Command echoes pile up in the receive buffer and are flushed by the query
    assert!(tower.send_command(CommandKind::GreenOn));
    assert!(tower.send_command(CommandKind::YellowSlow));
    assert!(tower.query_devices());

    let response = tower.last_response().expect("query reply should be captured");
    assert_eq!(response.bytes, SimTransport::query_reply());
    assert_eq!(sim.flushes(), (1, 20));

    assert!(tower.send_data(&[0x01, 0x06, 0x00, 0xC2, 0x00, 0x60]));
    assert!(!tower.send_data(&[]));
}

#[test]
fn test_sessions_are_independent() {
    let first = SimTransport::new();
    let second = SimTransport::new();
    let handles: Vec<_> = [first.clone(), second.clone()]
        .into_iter()
        .enumerate()
        .map(|(i, sim)| {
            std::thread::spawn(move || {
                let mut session = Session::open(sim, LineConfig::default()).unwrap();
                let kind = if i == 0 { CommandKind::RedOn } else { CommandKind::GreenOn };
                send_command(&mut session, kind, &QueryTiming::default()).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(first.last_written(), Some(Frame::command(CommandKind::RedOn).as_bytes().to_vec()));
    assert_eq!(second.last_written(), Some(Frame::command(CommandKind::GreenOn).as_bytes().to_vec()));
}

#[test]
fn test_protocol_error_display() {
    let err = ProtocolError::PartialWrite {
        written: 4,
        expected: 10,
    };
    assert_eq!(err.to_string(), "Partial write: wrote 4 of 10 bytes");
    assert_eq!(
        ProtocolError::CrcMismatch {
            expected: 0x3AE8,
            actual: 0x0000
        }
        .to_string(),
        "CRC mismatch: expected 0x3ae8, got 0x0000"
    );
}
