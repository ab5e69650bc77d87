//! A minimal in-memory OBC: the peer the engine under test talks to.
//!
//! `msp-proto` only ever signs frames as `FromExperiment` (outbound) or
//! validates them as `FromObc` (inbound), since it is the experiment-side
//! codec. The OBC side of the link is out of scope for the firmware this
//! workspace implements, so this module plays that part just well enough to
//! drive a real [`Engine`] through full transactions in tests.

use msp_core::{Engine, EngineError, EngineState, ExperimentHandlers};
use msp_proto::wire::{pack_be32, unpack_be32};
use msp_proto::{ctrl, fcs_valid, generate_fcs, ExpAddr, Direction, Opcode, HEADER_FRAME_LEN};

/// A header frame as seen from the OBC's side of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObcHeader {
    /// The frame's opcode.
    pub opcode: Opcode,
    /// The frame-ID bit.
    pub frame_id: u8,
    /// The declared `DL` field.
    pub dl: u32,
}

/// Formats a header frame signed as if the OBC sent it.
#[must_use]
pub fn format_obc_header(opcode: Opcode, frame_id: u8, dl: u32, addr: ExpAddr) -> [u8; HEADER_FRAME_LEN] {
    let mut buf = [0u8; HEADER_FRAME_LEN];
    buf[0] = opcode.value() | ((frame_id & 1) << 7);
    pack_be32(&mut buf[1..5], dl);
    let fcs = generate_fcs(&buf[..5], Direction::FromObc, addr);
    pack_be32(&mut buf[5..9], fcs);
    buf
}

/// Formats a data frame signed as if the OBC sent it.
#[must_use]
pub fn format_obc_data_frame(frame_id: u8, payload: &[u8], addr: ExpAddr) -> Vec<u8> {
    let mut buf = vec![0u8; 1 + payload.len() + 4];
    buf[0] = ctrl::DATA.value() | ((frame_id & 1) << 7);
    buf[1..1 + payload.len()].copy_from_slice(payload);
    let fcs = generate_fcs(&buf[..1 + payload.len()], Direction::FromObc, addr);
    pack_be32(&mut buf[1 + payload.len()..], fcs);
    buf
}

/// Parses a header frame the experiment signed (`Direction::FromExperiment`),
/// as the OBC would when reading the engine's `on_send` output.
///
/// Returns `None` if `frame` is not exactly [`HEADER_FRAME_LEN`] bytes or its
/// FCS doesn't validate.
#[must_use]
pub fn parse_experiment_header(frame: &[u8], addr: ExpAddr) -> Option<ObcHeader> {
    if frame.len() != HEADER_FRAME_LEN || !fcs_valid(frame, Direction::FromExperiment, addr) {
        return None;
    }
    Some(ObcHeader {
        opcode: Opcode::new(frame[0] & 0x7F),
        frame_id: (frame[0] >> 7) & 1,
        dl: unpack_be32(&frame[1..5]),
    })
}

/// Parses a data frame the experiment signed, as the OBC would when reading
/// the engine's `on_send` output during an `ObcReqTx` phase.
///
/// Returns `None` if `frame` is too short or its FCS doesn't validate.
#[must_use]
pub fn parse_experiment_data_frame(frame: &[u8], addr: ExpAddr) -> Option<(u8, Vec<u8>)> {
    if frame.len() < 6 || !fcs_valid(frame, Direction::FromExperiment, addr) {
        return None;
    }
    let frame_id = (frame[0] >> 7) & 1;
    let payload = frame[1..frame.len() - 4].to_vec();
    Some((frame_id, payload))
}

/// Drives scripted OBC sessions against a real [`Engine`].
pub struct ObcSession {
    addr: ExpAddr,
}

impl ObcSession {
    /// Builds a session driver that signs/validates frames for `addr`.
    #[must_use]
    pub const fn new(addr: ExpAddr) -> Self {
        Self { addr }
    }

    /// Sends a System-family header (a complete single-frame transaction)
    /// and drains the T_ACK the engine produces in reply.
    ///
    /// # Errors
    ///
    /// Propagates whatever [`EngineError`] the engine returns from `on_recv`
    /// or `on_send`.
    ///
    /// # Panics
    ///
    /// Panics if the engine's reply is not a 9-byte `T_ACK` header with the
    /// same `frame_id`, since that would mean the engine under test is
    /// already broken in a way these tests exist to catch.
    pub fn run_system_command<H: ExperimentHandlers>(
        &self,
        engine: &mut Engine<H>,
        opcode: Opcode,
        frame_id: u8,
    ) -> Result<(), EngineError> {
        let header = format_obc_header(opcode, frame_id, 0, self.addr);
        engine.on_recv(&header)?;

        let mut buf = [0u8; HEADER_FRAME_LEN];
        let len = engine.on_send(&mut buf)?;
        #[allow(clippy::expect_used)]
        let ack = parse_experiment_header(&buf[..len], self.addr).expect("valid T_ACK header");
        assert_eq!(ack.opcode, ctrl::T_ACK);
        assert_eq!(ack.frame_id, frame_id);
        Ok(())
    }

    /// Sends a complete OBC Send transaction (`payload` split into chunks of
    /// at most `mtu` bytes) and drains every F_ACK plus the terminal T_ACK.
    ///
    /// # Errors
    ///
    /// Propagates whatever [`EngineError`] the engine returns from `on_recv`
    /// or `on_send`.
    ///
    /// # Panics
    ///
    /// Panics if a reply frame from the engine fails to parse or carries an
    /// unexpected frame-ID, both of which indicate the engine under test is
    /// broken rather than that the session script is wrong.
    pub fn run_send_transaction<H: ExperimentHandlers>(
        &self,
        engine: &mut Engine<H>,
        opcode: Opcode,
        frame_id: u8,
        payload: &[u8],
        mtu: usize,
    ) -> Result<(), EngineError> {
        let header = format_obc_header(opcode, frame_id, payload.len() as u32, self.addr);
        engine.on_recv(&header)?;

        // A duplicate of an already-acknowledged transaction skips the data
        // phase entirely: the engine re-emits T_ACK on the very next poll.
        if engine.state() == EngineState::ObcSendRxDuplicate {
            let mut buf = [0u8; HEADER_FRAME_LEN];
            let len = engine.on_send(&mut buf)?;
            #[allow(clippy::expect_used)]
            let ack = parse_experiment_header(&buf[..len], self.addr).expect("valid T_ACK header");
            assert_eq!(ack.opcode, ctrl::T_ACK);
            assert_eq!(ack.frame_id, frame_id);
            return Ok(());
        }

        // Poll first: the engine already knows whether it has everything it
        // needs (true immediately for a zero-length payload) and answers
        // with T_ACK without waiting for a data frame that will never come.
        let mut offset = 0usize;
        let mut id = frame_id;
        loop {
            let mut buf = [0u8; HEADER_FRAME_LEN];
            let len = engine.on_send(&mut buf)?;
            #[allow(clippy::expect_used)]
            let ack = parse_experiment_header(&buf[..len], self.addr).expect("valid ack header");

            if ack.opcode == ctrl::T_ACK {
                assert_eq!(ack.frame_id, frame_id);
                break;
            }
            assert_eq!(ack.opcode, ctrl::F_ACK);
            assert_eq!(ack.frame_id, id);

            id ^= 1;
            let end = (offset + mtu.max(1)).min(payload.len());
            let data_frame = format_obc_data_frame(id, &payload[offset..end], self.addr);
            engine.on_recv(&data_frame)?;
            offset = end;
        }
        Ok(())
    }

    /// Issues an OBC Request, drains the `EXP_SEND` announcement and every
    /// `DATA` frame (F_ACKing each one), and returns the reassembled
    /// response body.
    ///
    /// # Errors
    ///
    /// Propagates whatever [`EngineError`] the engine returns from `on_recv`
    /// or `on_send`.
    ///
    /// # Panics
    ///
    /// Panics if a reply frame from the engine fails to parse as the
    /// expected kind, indicating the engine under test is broken.
    pub fn run_request<H: ExperimentHandlers>(
        &self,
        engine: &mut Engine<H>,
        opcode: Opcode,
        mtu: usize,
    ) -> Result<Vec<u8>, EngineError> {
        // Request frame-IDs are unused on this direction; 0 is conventional.
        let header = format_obc_header(opcode, 0, 0, self.addr);
        engine.on_recv(&header)?;

        let mut buf = vec![0u8; mtu + 5];
        let len = engine.on_send(&mut buf)?;
        #[allow(clippy::expect_used)]
        let announce =
            parse_experiment_header(&buf[..len], self.addr).expect("valid EXP_SEND header");
        assert_eq!(announce.opcode, ctrl::EXP_SEND);

        let total_len = announce.dl as usize;
        let mut response = Vec::with_capacity(total_len);
        let mut frame_id = announce.frame_id;

        while response.len() < total_len {
            // The F_ACK frame-ID must match the frame-ID the engine is
            // currently expecting (the transaction-ID before the first
            // F_ACK, toggled once per F_ACK/DATA round thereafter); the
            // engine toggles its own copy only after accepting the F_ACK, so
            // this side toggles after sending too, not before.
            let f_ack = format_obc_header(ctrl::F_ACK, frame_id, 0, self.addr);
            engine.on_recv(&f_ack)?;
            frame_id ^= 1;

            let len = engine.on_send(&mut buf)?;
            #[allow(clippy::expect_used)]
            let (_, payload) =
                parse_experiment_data_frame(&buf[..len], self.addr).expect("valid DATA frame");
            response.extend_from_slice(&payload);
        }

        let t_ack = format_obc_header(ctrl::T_ACK, announce.frame_id, 0, self.addr);
        engine.on_recv(&t_ack)?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use msp_core::ExperimentConfig;
    use msp_proto::{ctrl as c, standard};

    use super::*;
    use crate::model::RecordingHandlers;

    const ADDR_RAW: u8 = 0x35;

    #[test]
    fn empty_polling_cycle_emits_null_repeatedly() {
        let config = ExperimentConfig::new(ADDR_RAW, 507).unwrap();
        let mut engine = Engine::new(config, RecordingHandlers::new());

        for _ in 0..3 {
            let mut buf = [0u8; HEADER_FRAME_LEN];
            let len = engine.on_send(&mut buf).unwrap();
            assert_eq!(len, HEADER_FRAME_LEN);
            let header = parse_experiment_header(&buf[..len], config.addr()).unwrap();
            assert_eq!(header.opcode, c::NULL);
            assert_eq!(header.frame_id, 0);
        }
    }

    #[test]
    fn run_system_command_fires_syscommand_once() {
        let config = ExperimentConfig::new(ADDR_RAW, 507).unwrap();
        let mut engine = Engine::new(config, RecordingHandlers::new());
        let session = ObcSession::new(config.addr());

        session.run_system_command(&mut engine, standard::SLEEP, 0).unwrap();
        assert_eq!(
            engine.handlers().events().iter().filter(|e| matches!(e, crate::model::Event::RecvSyscommand { .. })).count(),
            1
        );
    }
}
