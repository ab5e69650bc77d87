//! Experiment-side MSP transaction engine: the five-state machine, the
//! sequence-flag store, and the configuration and persistence types that
//! surround them.

pub mod config;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod seqflags;

pub use config::{ConfigError, ExperimentConfig};
pub use engine::{Engine, EngineState, ExperimentHandlers};
pub use error::EngineError;
pub use persistence::{decode_cbor, encode_cbor, PersistenceError, SeqFlagsSnapshot, SNAPSHOT_VERSION};
pub use seqflags::{mask_of, SequenceFlags};
