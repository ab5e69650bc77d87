//! Fuzz target for `decode_cbor`.
//!
//! Hardens the sequence-flag snapshot decoder against malformed CBOR: wrong
//! types, truncated maps, and version bytes this build doesn't understand.
//! Decoding must only ever return `Err`, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use msp_core::decode_cbor;

fuzz_target!(|data: &[u8]| {
    let _ = decode_cbor(data);
});
