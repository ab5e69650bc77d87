//! Deterministic model harness for the experiment-side MSP transaction
//! engine: a recording upcall handler, a minimal in-memory OBC peer, and
//! behavioral invariants checked against recorded sessions.
//!
//! This mirrors `lockframe-harness`'s split of `model` (a plain value
//! standing in for the real collaborator) and `invariants` (properties
//! checked against observable state), scaled down to this protocol's single
//! collaborator: the OBC on the other end of the link.

pub mod invariants;
pub mod model;
pub mod obc;

pub use invariants::{check_all, Invariant, InvariantResult, Violation};
pub use model::{Event, RecordingHandlers};
pub use obc::{
    format_obc_data_frame, format_obc_header, parse_experiment_data_frame,
    parse_experiment_header, ObcHeader, ObcSession,
};
