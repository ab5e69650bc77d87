//! Fuzz target for `parse_data_frame`.
//!
//! Exercises the variable-length data frame codec against arbitrary byte
//! buffers of arbitrary length, including lengths below the minimum frame
//! size and payloads that would overflow a small MTU.

#![no_main]

use libfuzzer_sys::fuzz_target;
use msp_proto::{parse_data_frame, ExpAddr};

fuzz_target!(|data: &[u8]| {
    let addr = ExpAddr::new(0x35).expect("0x35 fits 7 bits");

    if let Ok(view) = parse_data_frame(data, addr) {
        assert!(view.payload.len() + 5 <= data.len());
    }
});
