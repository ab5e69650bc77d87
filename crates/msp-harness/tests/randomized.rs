//! Randomized OBC Send sessions, checking the harness's invariants hold
//! regardless of payload size, MTU, or starting frame-ID.

use msp_core::{Engine, ExperimentConfig};
use msp_harness::{check_all, ObcSession, RecordingHandlers};
use msp_proto::standard;
use proptest::prelude::*;

proptest! {
    #[test]
    fn send_transaction_reassembles_payload_for_any_chunking(
        addr in 0u8..0x80,
        mtu in 1u32..64,
        frame_id in 0u8..=1,
        payload in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let config = ExperimentConfig::new(addr, mtu).unwrap();
        let mut engine = Engine::new(config, RecordingHandlers::new());
        let session = ObcSession::new(config.addr());

        session
            .run_send_transaction(&mut engine, standard::SEND_TIME, frame_id, &payload, mtu as usize)
            .unwrap();

        if !payload.is_empty() {
            prop_assert_eq!(engine.handlers().received(standard::SEND_TIME), payload.as_slice());
        }
        prop_assert!(check_all(engine.handlers()).is_empty());
    }
}
