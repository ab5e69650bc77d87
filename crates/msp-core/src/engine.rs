//! The experiment-side transaction engine: the five-state machine driven by
//! `on_recv`/`on_send`, and the `ExperimentHandlers` upcall contract.
//!
//! Grounded directly in `msp_exp_callback.c` — every branch here corresponds
//! to a named function there (`handle_incoming_*`/`handle_outgoing_*`/
//! `ensure_ready_state`), kept in the same shape so the control flow can be
//! checked side by side with the original.

use msp_proto::{
    ctrl, fcs_valid, generate_fcs, is_data_frame, pack_be32, unpack_be32, Direction, Family,
    FrameError, HeaderFrame, Opcode, HEADER_FRAME_LEN,
};

use crate::config::ExperimentConfig;
use crate::error::EngineError;
use crate::seqflags::SequenceFlags;

/// The upcall surface the engine invokes into host application logic.
///
/// Each method corresponds to one function in `msp_exp_handler.h`. All are
/// called synchronously, from within `on_recv`/`on_send`, and must not
/// re-enter the engine (no reentrant access is possible since handlers only
/// ever see `&mut self`, never the `Engine`).
pub trait ExperimentHandlers {
    /// Called when the OBC starts a request transaction for `opcode`.
    /// Implementations set `*total_len` to the number of bytes they intend
    /// to send back.
    fn send_start(&mut self, opcode: Opcode, total_len: &mut u32);

    /// Called to fill `buf` with the next `buf.len()` bytes of response
    /// data for `opcode`, starting at `offset` bytes into the response.
    fn send_data(&mut self, opcode: Opcode, buf: &mut [u8], offset: u32);

    /// Called once the OBC has acknowledged the full response to `opcode`.
    fn send_complete(&mut self, opcode: Opcode);

    /// Called when an OBC Request transaction for `opcode` is aborted
    /// before completion, carrying the engine's numeric error code.
    fn send_error(&mut self, opcode: Opcode, error: i32);

    /// Called when the OBC starts sending `dl` bytes of data for `opcode`.
    fn recv_start(&mut self, opcode: Opcode, dl: u32);

    /// Called with each chunk of data the OBC sends for `opcode`, `offset`
    /// bytes into the transfer.
    fn recv_data(&mut self, opcode: Opcode, data: &[u8], offset: u32);

    /// Called once all data for an OBC Send transaction has arrived and
    /// been acknowledged.
    fn recv_complete(&mut self, opcode: Opcode);

    /// Called when an OBC Send transaction for `opcode` is aborted before
    /// completion, carrying the engine's numeric error code.
    fn recv_error(&mut self, opcode: Opcode, error: i32);

    /// Called once a system command transaction for `opcode` has been
    /// acknowledged, to actually execute it.
    fn recv_syscommand(&mut self, opcode: Opcode);
}

impl<T: ExperimentHandlers + ?Sized> ExperimentHandlers for Box<T> {
    fn send_start(&mut self, opcode: Opcode, total_len: &mut u32) {
        (**self).send_start(opcode, total_len);
    }

    fn send_data(&mut self, opcode: Opcode, buf: &mut [u8], offset: u32) {
        (**self).send_data(opcode, buf, offset);
    }

    fn send_complete(&mut self, opcode: Opcode) {
        (**self).send_complete(opcode);
    }

    fn send_error(&mut self, opcode: Opcode, error: i32) {
        (**self).send_error(opcode, error);
    }

    fn recv_start(&mut self, opcode: Opcode, dl: u32) {
        (**self).recv_start(opcode, dl);
    }

    fn recv_data(&mut self, opcode: Opcode, data: &[u8], offset: u32) {
        (**self).recv_data(opcode, data, offset);
    }

    fn recv_complete(&mut self, opcode: Opcode) {
        (**self).recv_complete(opcode);
    }

    fn recv_error(&mut self, opcode: Opcode, error: i32) {
        (**self).recv_error(opcode, error);
    }

    fn recv_syscommand(&mut self, opcode: Opcode) {
        (**self).recv_syscommand(opcode);
    }
}

/// The five states of an experiment-side MSP transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Ready to start a new transaction.
    Ready,
    /// Receiving an OBC Send transaction.
    ObcSendRx,
    /// Re-acknowledging a duplicate OBC Send transaction without re-running
    /// the transfer.
    ObcSendRxDuplicate,
    /// Announced a response length to an OBC Request, waiting for the F_ACK
    /// that starts the data phase.
    ObcReqResponse,
    /// Transmitting response data for an OBC Request.
    ObcReqTx,
}

/// The experiment-side MSP transaction engine.
///
/// Owns the protocol state, the sequence-flag store, the `busy` reentrancy
/// guard, and the link configuration. `on_recv`/`on_send` are the only two
/// entry points, matching `msp_recv_callback`/`msp_send_callback`.
pub struct Engine<H: ExperimentHandlers> {
    config: ExperimentConfig,
    state: EngineState,
    busy: bool,
    seqflags: SequenceFlags,
    transaction_id: u8,
    frame_id: u8,
    last_received_frame_id: u8,
    opcode: Opcode,
    total_length: u32,
    processed_length: u32,
    prev_data_length: u32,
    handlers: H,
}

impl<H: ExperimentHandlers> Engine<H> {
    /// Builds a new engine in the `Ready` state with a fresh sequence-flag
    /// store.
    pub fn new(config: ExperimentConfig, handlers: H) -> Self {
        Self::with_seqflags(config, SequenceFlags::new(), handlers)
    }

    /// Builds a new engine in the `Ready` state, restoring `seqflags` (for
    /// example, decoded from a snapshot persisted before a power cycle).
    pub fn with_seqflags(config: ExperimentConfig, seqflags: SequenceFlags, handlers: H) -> Self {
        Self {
            config,
            state: EngineState::Ready,
            busy: false,
            seqflags,
            transaction_id: 0,
            frame_id: 0,
            last_received_frame_id: 0,
            opcode: ctrl::NULL,
            total_length: 0,
            processed_length: 0,
            prev_data_length: 0,
            handlers,
        }
    }

    /// The engine's current protocol state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// The link configuration this engine was built with.
    #[must_use]
    pub const fn config(&self) -> ExperimentConfig {
        self.config
    }

    /// A snapshot of the current sequence-flag store, for persistence.
    #[must_use]
    pub fn seqflags(&self) -> &SequenceFlags {
        &self.seqflags
    }

    /// Borrows the upcall handlers, so a test driver can inspect whatever
    /// state they recorded after a session.
    #[must_use]
    pub fn handlers(&self) -> &H {
        &self.handlers
    }

    /// Processes a frame received from the OBC.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Busy`] if a call to `on_send` is already in
    /// progress, [`EngineError::Frame`] if the FCS doesn't validate or the
    /// frame is malformed, or one of the transaction-level errors if the
    /// frame violates the protocol's state.
    #[tracing::instrument(level = "debug", skip(self, frame), fields(state = ?self.state))]
    pub fn on_recv(&mut self, frame: &[u8]) -> Result<(), EngineError> {
        if self.busy {
            tracing::debug!("on_recv rejected: engine busy");
            return Err(EngineError::Busy);
        }
        if !fcs_valid(frame, Direction::FromObc, self.config.addr()) {
            tracing::debug!("on_recv rejected: FCS mismatch");
            return Err(EngineError::Frame(FrameError::FcsMismatch));
        }

        self.busy = true;
        let result = self.handle_incoming_frame(frame);
        self.busy = false;

        if let Err(err) = result {
            tracing::debug!(?err, "on_recv rejected frame");
        }
        result
    }

    /// Produces the next frame to send to the OBC into `buf`, returning the
    /// number of bytes written.
    ///
    /// If the engine is busy handling a concurrent `on_recv`, an `EXP_BUSY`
    /// header frame (exactly [`HEADER_FRAME_LEN`] bytes) is written and
    /// [`EngineError::Busy`] is returned; the frame should still be
    /// transmitted. The same holds for [`EngineError::StateError`]: a
    /// fallback `NULL` or `T_ACK` frame is written before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// See above; errors never leave `buf` unwritten up to
    /// [`HEADER_FRAME_LEN`] bytes unless formatting itself failed (a buffer
    /// too small to hold even a header frame).
    #[tracing::instrument(level = "debug", skip(self, buf), fields(state = ?self.state))]
    pub fn on_send(&mut self, buf: &mut [u8]) -> Result<usize, EngineError> {
        if self.busy {
            tracing::debug!("on_send: engine busy, sending EXP_BUSY");
            HeaderFrame::format_empty(ctrl::EXP_BUSY, buf, self.config.addr())?;
            return Err(EngineError::Busy);
        }

        self.busy = true;
        let result = self.handle_outgoing_frame(buf);
        self.busy = false;

        if let Err(err) = &result {
            tracing::debug!(?err, "on_send produced a fallback frame");
        }
        result
    }

    fn handle_incoming_frame(&mut self, frame: &[u8]) -> Result<(), EngineError> {
        let Some(&first) = frame.first() else {
            return Err(EngineError::Frame(FrameError::InvalidHeaderFrame { actual: 0 }));
        };
        let masked_opcode = first & 0x7F;
        let frame_id = (first >> 7) & 1;

        if is_data_frame(masked_opcode) {
            if frame.len() < 6 || frame.len() > self.config.max_frame_size() {
                return Err(EngineError::Frame(FrameError::InvalidDataFrame {
                    actual: frame.len(),
                }));
            }
            self.handle_incoming_data_frame(&frame[1..frame.len() - 4], frame_id)
        } else {
            if frame.len() != HEADER_FRAME_LEN {
                return Err(EngineError::Frame(FrameError::InvalidHeaderFrame {
                    actual: frame.len(),
                }));
            }
            let dl = unpack_be32(&frame[1..5]);
            self.handle_incoming_header_frame(Opcode::new(masked_opcode), frame_id, dl)
        }
    }

    fn handle_incoming_data_frame(&mut self, data: &[u8], frame_id: u8) -> Result<(), EngineError> {
        if self.state != EngineState::ObcSendRx {
            return Err(EngineError::UnexpectedDataFrame);
        }
        if frame_id == self.last_received_frame_id {
            return Err(EngineError::DuplicateFrame);
        }

        let len = data.len() as u32;
        if self.processed_length.saturating_add(len) > self.total_length {
            return Err(EngineError::Frame(FrameError::InvalidDataFrame {
                actual: data.len(),
            }));
        }

        self.handlers.recv_data(self.opcode, data, self.processed_length);
        self.processed_length += len;
        self.last_received_frame_id = frame_id;
        Ok(())
    }

    fn handle_incoming_header_frame(
        &mut self,
        opcode: Opcode,
        frame_id: u8,
        dl: u32,
    ) -> Result<(), EngineError> {
        match opcode.family() {
            Family::Control => self.handle_incoming_control_frame(opcode, frame_id),
            Family::System => {
                self.handle_incoming_system_frame(opcode, frame_id);
                Ok(())
            }
            Family::Request => {
                self.handle_incoming_request_frame(opcode);
                Ok(())
            }
            Family::Send => {
                self.handle_incoming_send_frame(opcode, frame_id, dl);
                Ok(())
            }
        }
    }

    fn handle_incoming_control_frame(
        &mut self,
        opcode: Opcode,
        frame_id: u8,
    ) -> Result<(), EngineError> {
        match opcode {
            ctrl::NULL => {
                self.ensure_ready_state();
                Ok(())
            }
            ctrl::F_ACK => self.handle_f_ack(frame_id),
            ctrl::T_ACK => self.handle_t_ack(frame_id),
            _ => Err(EngineError::FaultyFrame),
        }
    }

    fn handle_f_ack(&mut self, frame_id: u8) -> Result<(), EngineError> {
        if self.processed_length.saturating_add(self.prev_data_length) >= self.total_length {
            // A T_ACK was expected instead.
            return Err(EngineError::FaultyFrame);
        }
        if frame_id != self.frame_id {
            return Err(EngineError::FaultyFrame);
        }

        match self.state {
            EngineState::ObcReqResponse => {
                self.processed_length = 0;
                self.frame_id ^= 1;
                self.state = EngineState::ObcReqTx;
                Ok(())
            }
            EngineState::ObcReqTx => {
                self.processed_length += self.prev_data_length;
                self.frame_id ^= 1;
                Ok(())
            }
            _ => Err(EngineError::FaultyFrame),
        }
    }

    fn handle_t_ack(&mut self, frame_id: u8) -> Result<(), EngineError> {
        if !matches!(self.state, EngineState::ObcReqResponse | EngineState::ObcReqTx) {
            return Err(EngineError::FaultyFrame);
        }
        if frame_id != self.transaction_id {
            return Err(EngineError::FaultyFrame);
        }

        self.handlers.send_complete(self.opcode);
        self.seqflags.set(self.opcode, frame_id != 0);
        self.state = EngineState::Ready;
        Ok(())
    }

    fn handle_incoming_system_frame(&mut self, opcode: Opcode, frame_id: u8) {
        self.ensure_ready_state();

        self.transaction_id = frame_id;
        self.last_received_frame_id = frame_id;
        self.opcode = opcode;
        self.total_length = 0;
        self.processed_length = 0;
        self.prev_data_length = 0;

        self.state = if self.seqflags.is_set(opcode, frame_id != 0) {
            EngineState::ObcSendRxDuplicate
        } else {
            EngineState::ObcSendRx
        };
    }

    fn handle_incoming_request_frame(&mut self, opcode: Opcode) {
        self.ensure_ready_state();

        let transaction_id = self.seqflags.get_next(opcode).unwrap_or(false);
        self.transaction_id = u8::from(transaction_id);
        self.frame_id = self.transaction_id;
        self.opcode = opcode;
        self.processed_length = 0;
        self.prev_data_length = 0;

        let mut total_len = 0u32;
        self.handlers.send_start(opcode, &mut total_len);
        self.total_length = total_len;

        self.state = EngineState::ObcReqResponse;
    }

    fn handle_incoming_send_frame(&mut self, opcode: Opcode, frame_id: u8, dl: u32) {
        self.ensure_ready_state();

        self.transaction_id = frame_id;
        self.last_received_frame_id = frame_id;
        self.opcode = opcode;
        self.total_length = dl;
        self.processed_length = 0;

        if self.seqflags.is_set(opcode, frame_id != 0) {
            self.state = EngineState::ObcSendRxDuplicate;
        } else {
            self.state = EngineState::ObcSendRx;
            self.handlers.recv_start(opcode, dl);
        }
    }

    fn handle_outgoing_frame(&mut self, buf: &mut [u8]) -> Result<usize, EngineError> {
        match self.state {
            EngineState::Ready => {
                HeaderFrame::format_empty(ctrl::NULL, buf, self.config.addr())?;
                Ok(HEADER_FRAME_LEN)
            }
            EngineState::ObcReqResponse => self.handle_outgoing_response_frame(buf),
            EngineState::ObcReqTx => self.handle_outgoing_data_frame(buf),
            EngineState::ObcSendRx | EngineState::ObcSendRxDuplicate => {
                self.handle_outgoing_acknowledge_frame(buf)
            }
        }
    }

    fn handle_outgoing_response_frame(&mut self, buf: &mut [u8]) -> Result<usize, EngineError> {
        HeaderFrame {
            opcode: ctrl::EXP_SEND,
            frame_id: self.transaction_id,
            dl: self.total_length,
        }
        .format(buf, self.config.addr())?;
        Ok(HEADER_FRAME_LEN)
    }

    fn handle_outgoing_data_frame(&mut self, buf: &mut [u8]) -> Result<usize, EngineError> {
        if self.processed_length >= self.total_length {
            self.ensure_ready_state();
            HeaderFrame::format_empty(ctrl::NULL, buf, self.config.addr())?;
            return Err(EngineError::StateError);
        }

        let remaining = self.total_length - self.processed_length;
        let send_len = remaining.min(self.config.mtu());
        self.prev_data_length = send_len;

        let send_len = send_len as usize;
        let total = 1 + send_len + 4;
        if buf.len() < total {
            return Err(EngineError::Frame(FrameError::BufferTooSmall {
                needed: total,
                actual: buf.len(),
            }));
        }

        buf[0] = ctrl::DATA.value() | ((self.frame_id & 1) << 7);
        self.handlers
            .send_data(self.opcode, &mut buf[1..1 + send_len], self.processed_length);

        let fcs = generate_fcs(&buf[..1 + send_len], Direction::FromExperiment, self.config.addr());
        pack_be32(&mut buf[1 + send_len..total], fcs);

        Ok(total)
    }

    fn handle_outgoing_acknowledge_frame(&mut self, buf: &mut [u8]) -> Result<usize, EngineError> {
        if self.state == EngineState::ObcSendRxDuplicate {
            HeaderFrame {
                opcode: ctrl::T_ACK,
                frame_id: self.transaction_id,
                dl: 0,
            }
            .format(buf, self.config.addr())?;
            self.state = EngineState::Ready;
            return Ok(HEADER_FRAME_LEN);
        }

        if self.processed_length >= self.total_length {
            HeaderFrame {
                opcode: ctrl::T_ACK,
                frame_id: self.transaction_id,
                dl: 0,
            }
            .format(buf, self.config.addr())?;
            self.state = EngineState::Ready;

            let opcode = self.opcode;
            let transaction_id = self.transaction_id;
            match opcode.family() {
                Family::System => {
                    self.handlers.recv_syscommand(opcode);
                    self.seqflags.set(opcode, transaction_id != 0);
                    Ok(HEADER_FRAME_LEN)
                }
                Family::Send => {
                    self.handlers.recv_complete(opcode);
                    self.seqflags.set(opcode, transaction_id != 0);
                    Ok(HEADER_FRAME_LEN)
                }
                Family::Control | Family::Request => Err(EngineError::StateError),
            }
        } else {
            HeaderFrame {
                opcode: ctrl::F_ACK,
                frame_id: self.last_received_frame_id,
                dl: 0,
            }
            .format(buf, self.config.addr())?;
            Ok(HEADER_FRAME_LEN)
        }
    }

    /// Aborts whatever transaction is active, dispatching the matching
    /// `send_error`/`recv_error` upcall, then returns to `Ready`.
    ///
    /// Grounded in `ensure_ready_state`: system-command transactions get no
    /// `recv_error` (the OBC Send machinery for system commands has no
    /// "in-flight work" to cancel — the command only executes after the
    /// T_ACK it can't yet have received), and duplicate/ready states are
    /// silent since nothing was ever started.
    fn ensure_ready_state(&mut self) {
        match self.state {
            EngineState::ObcSendRx => {
                if self.opcode.family() != Family::System {
                    self.handlers
                        .recv_error(self.opcode, EngineError::TransactionAborted.code());
                }
            }
            EngineState::ObcReqResponse | EngineState::ObcReqTx => {
                self.handlers
                    .send_error(self.opcode, EngineError::TransactionAborted.code());
            }
            EngineState::Ready | EngineState::ObcSendRxDuplicate => {}
        }
        self.state = EngineState::Ready;
    }
}
