//! Transaction-engine errors, with a `code()` mapping to the signed
//! integers of `msp_exp_error.h`.

use msp_proto::FrameError;
use thiserror::Error;

/// Errors raised by [`crate::engine::Engine::on_recv`] and
/// [`crate::engine::Engine::on_send`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// The engine is already processing a call on the other entry point;
    /// this call was rejected rather than queued or blocked on.
    #[error("engine is busy processing a concurrent call")]
    Busy,

    /// The frame failed to parse or format.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A data frame arrived while not in the `ObcSendRx` state.
    #[error("unexpected data frame in current state")]
    UnexpectedDataFrame,

    /// A data frame repeated the last-received frame-ID and was discarded.
    #[error("duplicate frame discarded")]
    DuplicateFrame,

    /// A control frame violated the protocol's internal consistency (wrong
    /// frame-ID, wrong acknowledgment for the current state, and so on).
    #[error("faulty frame")]
    FaultyFrame,

    /// `on_send` was called in a state that cannot produce a valid next
    /// frame; a `NULL` or `T_ACK` fallback frame was written regardless so
    /// the caller still has something to transmit.
    #[error("engine state does not permit this operation")]
    StateError,

    /// A transaction the engine was already running was aborted because a
    /// new header frame interrupted it.
    #[error("transaction aborted")]
    TransactionAborted,
}

impl EngineError {
    /// The signed error code carried by this variant, matching
    /// `msp_exp_error.h`.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Busy => -1,
            Self::Frame(e) => e.code(),
            Self::UnexpectedDataFrame => -5,
            Self::DuplicateFrame => -6,
            Self::FaultyFrame => -7,
            Self::StateError => -8,
            Self::TransactionAborted => 2,
        }
    }
}
