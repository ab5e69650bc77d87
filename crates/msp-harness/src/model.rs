//! A recording [`ExperimentHandlers`] implementation for scripting and
//! inspecting engine sessions, in the spirit of `lockframe-harness`'s
//! `model::ModelClient`: a plain value the test driver can inspect after the
//! fact instead of a mock with expectations baked in.

use std::collections::HashMap;

use msp_core::ExperimentHandlers;
use msp_proto::Opcode;

/// One upcall invocation recorded by [`RecordingHandlers`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `send_start(opcode, total_len)`.
    SendStart {
        /// The opcode the transaction was started for.
        opcode: Opcode,
        /// Total length of the payload to be sent.
        total_len: u32,
    },
    /// `send_data(opcode, len, offset)`.
    SendData {
        /// The opcode the transaction was started for.
        opcode: Opcode,
        /// Length of the chunk handed to the callback.
        len: usize,
        /// Offset of the chunk within the total payload.
        offset: u32,
    },
    /// `send_complete(opcode)`.
    SendComplete {
        /// The opcode the transaction was started for.
        opcode: Opcode,
    },
    /// `send_error(opcode, error)`.
    SendError {
        /// The opcode the transaction was started for.
        opcode: Opcode,
        /// Error code reported to the callback.
        error: i32,
    },
    /// `recv_start(opcode, dl)`.
    RecvStart {
        /// The opcode the transaction was started for.
        opcode: Opcode,
        /// Declared data length of the incoming transaction.
        dl: u32,
    },
    /// `recv_data(opcode, data, offset)`.
    RecvData {
        /// The opcode the transaction was started for.
        opcode: Opcode,
        /// Bytes delivered in this chunk.
        data: Vec<u8>,
        /// Offset of the chunk within the total payload.
        offset: u32,
    },
    /// `recv_complete(opcode)`.
    RecvComplete {
        /// The opcode the transaction was started for.
        opcode: Opcode,
    },
    /// `recv_error(opcode, error)`.
    RecvError {
        /// The opcode the transaction was started for.
        opcode: Opcode,
        /// Error code reported to the callback.
        error: i32,
    },
    /// `recv_syscommand(opcode)`.
    RecvSyscommand {
        /// The opcode the transaction was started for.
        opcode: Opcode,
    },
}

/// Upcall handlers that record every invocation and serve scripted response
/// bytes for OBC Request transactions.
///
/// Each `opcode` can be pre-loaded with the bytes it should hand back on the
/// next `send_start`/`send_data` pair via [`RecordingHandlers::queue_response`].
/// Bytes delivered to `recv_data` are accumulated per opcode and can be read
/// back with [`RecordingHandlers::received`], so a test can assert on the
/// reassembled payload rather than individual chunks.
#[derive(Debug, Default)]
pub struct RecordingHandlers {
    events: Vec<Event>,
    responses: HashMap<Opcode, Vec<u8>>,
    received: HashMap<Opcode, Vec<u8>>,
}

impl RecordingHandlers {
    /// Builds a handler set with no scripted responses and an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `data` as the response body the next Request transaction for
    /// `opcode` should send back.
    pub fn queue_response(&mut self, opcode: Opcode, data: Vec<u8>) {
        self.responses.insert(opcode, data);
    }

    /// The full, in-order log of upcalls observed so far.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The bytes accumulated from `recv_data` calls for `opcode`, in receive
    /// order, or an empty slice if none were ever delivered.
    #[must_use]
    pub fn received(&self, opcode: Opcode) -> &[u8] {
        self.received.get(&opcode).map_or(&[], Vec::as_slice)
    }

    /// How many times `recv_start` fired for `opcode`, used to assert that a
    /// duplicate Send transaction triggers zero restarts.
    #[must_use]
    pub fn recv_start_count(&self, opcode: Opcode) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::RecvStart { opcode: o, .. } if *o == opcode))
            .count()
    }
}

impl ExperimentHandlers for RecordingHandlers {
    fn send_start(&mut self, opcode: Opcode, total_len: &mut u32) {
        let body = self.responses.get(&opcode).cloned().unwrap_or_default();
        *total_len = body.len() as u32;
        self.events.push(Event::SendStart { opcode, total_len: *total_len });
    }

    fn send_data(&mut self, opcode: Opcode, buf: &mut [u8], offset: u32) {
        if let Some(body) = self.responses.get(&opcode) {
            let start = offset as usize;
            buf.copy_from_slice(&body[start..start + buf.len()]);
        }
        self.events.push(Event::SendData { opcode, len: buf.len(), offset });
    }

    fn send_complete(&mut self, opcode: Opcode) {
        self.events.push(Event::SendComplete { opcode });
    }

    fn send_error(&mut self, opcode: Opcode, error: i32) {
        self.events.push(Event::SendError { opcode, error });
    }

    fn recv_start(&mut self, opcode: Opcode, dl: u32) {
        self.received.remove(&opcode);
        self.events.push(Event::RecvStart { opcode, dl });
    }

    fn recv_data(&mut self, opcode: Opcode, data: &[u8], offset: u32) {
        let buf = self.received.entry(opcode).or_default();
        let end = offset as usize + data.len();
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[offset as usize..end].copy_from_slice(data);
        self.events.push(Event::RecvData { opcode, data: data.to_vec(), offset });
    }

    fn recv_complete(&mut self, opcode: Opcode) {
        self.events.push(Event::RecvComplete { opcode });
    }

    fn recv_error(&mut self, opcode: Opcode, error: i32) {
        self.events.push(Event::RecvError { opcode, error });
    }

    fn recv_syscommand(&mut self, opcode: Opcode) {
        self.events.push(Event::RecvSyscommand { opcode });
    }
}
