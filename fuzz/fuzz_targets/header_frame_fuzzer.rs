//! Fuzz target for `HeaderFrame::parse`.
//!
//! Arbitrary bytes, any length, fed through the experiment's inbound header
//! codec. The parser must never panic: malformed length, corrupted FCS, and
//! out-of-range opcodes are all ordinary `Err` returns, not crashes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use msp_proto::{Direction, ExpAddr, HeaderFrame};

fuzz_target!(|data: &[u8]| {
    let addr = ExpAddr::new(0x35).expect("0x35 fits 7 bits");

    if let Ok(header) = HeaderFrame::parse(data, addr) {
        let mut buf = [0u8; msp_proto::HEADER_FRAME_LEN];
        let _ = header.format(&mut buf, addr);
    }

    let _ = msp_proto::fcs_valid(data, Direction::FromObc, addr);
});
