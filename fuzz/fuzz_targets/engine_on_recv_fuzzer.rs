//! Fuzz target for `Engine::on_recv`.
//!
//! Splits the input into a sequence of inbound frames (length-prefixed by a
//! single byte) and feeds each one to a fresh engine, polling `on_send` in
//! between. No byte sequence should ever panic or deadlock the busy guard.

#![no_main]

use libfuzzer_sys::fuzz_target;
use msp_core::{Engine, ExperimentConfig, ExperimentHandlers};
use msp_proto::HEADER_FRAME_LEN;

struct NoopHandlers;

impl ExperimentHandlers for NoopHandlers {}

fuzz_target!(|data: &[u8]| {
    let config = ExperimentConfig::new(0x35, 64).expect("valid fixed config");
    let mut engine = Engine::new(config, NoopHandlers);

    let mut rest = data;
    while let [len, tail @ ..] = rest {
        let chunk_len = (*len as usize).min(tail.len());
        let (chunk, tail) = tail.split_at(chunk_len);
        rest = tail;

        let _ = engine.on_recv(chunk);

        let mut buf = vec![0u8; HEADER_FRAME_LEN + 64];
        if let Ok(sent) = engine.on_send(&mut buf) {
            assert!(sent <= buf.len());
        }
    }
});
