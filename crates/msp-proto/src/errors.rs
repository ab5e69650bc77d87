//! Frame-layer errors, with a `code()` mapping to the signed integers a
//! transport binding may need to hand back across an FFI boundary, matching
//! `msp_exp_error.h`.

use thiserror::Error;

/// Errors raised while formatting or parsing MSP frames.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// The destination buffer passed to a `format_*` function is too small
    /// to hold the frame being written. This has no counterpart in the
    /// original C API (which trusts the caller's buffer size); here it is a
    /// caller bug, reported rather than risking an out-of-bounds write.
    #[error("buffer too small: need at least {needed} bytes, got {actual}")]
    BufferTooSmall {
        /// Minimum buffer length required.
        needed: usize,
        /// Actual buffer length supplied.
        actual: usize,
    },

    /// A received frame's opcode (masked) was `DATA`, but its length was
    /// outside `6..=max_frame_size`.
    #[error("invalid data frame: length {actual}")]
    InvalidDataFrame {
        /// Actual frame length received.
        actual: usize,
    },

    /// A received frame's opcode (masked) was not `DATA`, so it is a header
    /// frame, but its length was not exactly 9.
    #[error("invalid header frame: length {actual}")]
    InvalidHeaderFrame {
        /// Actual frame length received.
        actual: usize,
    },

    /// An outgoing data frame was asked to carry zero bytes of payload. A
    /// data frame that long can never arise on the wire (see
    /// [`InvalidDataFrame`](FrameError::InvalidDataFrame)'s length bound),
    /// so the codec refuses to produce one.
    #[error("data frame payload must be non-empty")]
    EmptyDataPayload,

    /// The FCS trailing a received frame did not match the computed value.
    #[error("FCS mismatch")]
    FcsMismatch,
}

impl FrameError {
    /// The signed error code carried by this variant, matching
    /// `msp_exp_error.h`.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::FcsMismatch => -2,
            Self::InvalidHeaderFrame { .. } => -3,
            Self::InvalidDataFrame { .. } | Self::EmptyDataPayload => -4,
            Self::BufferTooSmall { .. } => -7,
        }
    }
}
