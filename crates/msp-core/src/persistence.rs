//! Serialization of the sequence-flag store for storage across power
//! cycles, per spec section 6's "Persisted state".
//!
//! The wire format is independent of the in-memory representation: a
//! version byte followed by the two 4-word arrays, each word big-endian.
//! Encoding is versioned so a host reading back a snapshot written by an
//! older firmware revision can detect a format it doesn't understand
//! instead of silently misinterpreting it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u8 = 1;

/// A persistable capture of [`crate::seqflags::SequenceFlags`]'s state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqFlagsSnapshot {
    /// Sequence flag values, one word per opcode family.
    pub values: [u16; 4],
    /// Sequence flag initialization bits, one word per opcode family.
    pub inits: [u16; 4],
}

/// Errors raised while encoding or decoding a [`SeqFlagsSnapshot`].
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// CBOR encoding failed.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),
    /// CBOR decoding failed.
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),
    /// The decoded snapshot's version byte is not one this build understands.
    #[error("unsupported snapshot version {found}, expected {expected}")]
    UnsupportedVersion {
        /// Version byte found in the encoded snapshot.
        found: u8,
        /// Version byte this build writes and expects.
        expected: u8,
    },
}

/// A versioned, CBOR-encoded snapshot: `[version_byte, values, inits]`.
#[derive(Serialize, Deserialize)]
struct VersionedSnapshot {
    version: u8,
    values: [u16; 4],
    inits: [u16; 4],
}

/// Encodes `snapshot` as a versioned CBOR byte buffer.
///
/// # Errors
///
/// Returns [`PersistenceError::Encode`] if CBOR serialization fails.
pub fn encode_cbor(snapshot: &SeqFlagsSnapshot) -> Result<Vec<u8>, PersistenceError> {
    let versioned = VersionedSnapshot {
        version: SNAPSHOT_VERSION,
        values: snapshot.values,
        inits: snapshot.inits,
    };
    let mut buf = Vec::new();
    ciborium::into_writer(&versioned, &mut buf)?;
    Ok(buf)
}

/// Decodes a versioned CBOR byte buffer produced by [`encode_cbor`].
///
/// # Errors
///
/// Returns [`PersistenceError::Decode`] if the bytes are not valid CBOR for
/// this format, or [`PersistenceError::UnsupportedVersion`] if the encoded
/// version byte does not match [`SNAPSHOT_VERSION`].
pub fn decode_cbor(bytes: &[u8]) -> Result<SeqFlagsSnapshot, PersistenceError> {
    let versioned: VersionedSnapshot = ciborium::from_reader(bytes)?;
    if versioned.version != SNAPSHOT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: versioned.version,
            expected: SNAPSHOT_VERSION,
        });
    }
    Ok(SeqFlagsSnapshot {
        values: versioned.values,
        inits: versioned.inits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_through_cbor() {
        let snapshot = SeqFlagsSnapshot {
            values: [0x0001, 0xBEEF, 0, 0xFFFF],
            inits: [0x0001, 0xFFFF, 0, 0x00FF],
        };
        let bytes = encode_cbor(&snapshot).unwrap();
        let decoded = decode_cbor(&bytes).unwrap();
        assert_eq!(snapshot, decoded);
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let mut buf = Vec::new();
        ciborium::into_writer(
            &VersionedSnapshot {
                version: 99,
                values: [0; 4],
                inits: [0; 4],
            },
            &mut buf,
        )
        .unwrap();

        let err = decode_cbor(&buf).unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::UnsupportedVersion {
                found: 99,
                expected: SNAPSHOT_VERSION
            }
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_cbor(&[0xFF, 0x00, 0x01]).is_err());
    }
}
