//! The sequence-flag store: one bit per standard/custom opcode that tracks
//! the transaction-ID of the last successful transaction of that kind, used
//! to detect and silently re-acknowledge duplicate transactions.
//!
//! Grounded in `msp_seqflags.c`. Word 0 holds the eight standard opcodes;
//! words 1-3 hold the 16 possible custom opcodes of the system/request/send
//! families respectively, indexed by `opcode & 0x0F`.

use msp_proto::{Family, Opcode};

use crate::persistence::SeqFlagsSnapshot;

/// Word index and bit mask locating an opcode's sequence flag.
type FlagPos = (usize, u16);

/// Where an opcode's sequence flag lives, or `None` if it carries none.
#[must_use]
pub fn mask_of(opcode: Opcode) -> Option<FlagPos> {
    if opcode.is_custom() {
        let word = match opcode.family() {
            Family::Control => return None,
            Family::System => 1,
            Family::Request => 2,
            Family::Send => 3,
        };
        Some((word, 1u16 << (opcode.value() & 0x0F)))
    } else {
        msp_proto::standard_flag_mask(opcode).map(|mask| (0usize, mask))
    }
}

/// Two 4x16-bit word bit-vectors tracking sequence-flag values and whether
/// each has ever been set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceFlags {
    values: [u16; 4],
    inits: [u16; 4],
}

impl SequenceFlags {
    /// A fresh store with every flag uninitialized and zero-valued.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: [0; 4],
            inits: [0; 4],
        }
    }

    /// Toggles and initializes `opcode`'s flag. Returns `false` if `opcode`
    /// has no designated flag (no state is modified in that case).
    pub fn increment(&mut self, opcode: Opcode) -> bool {
        let Some((word, mask)) = mask_of(opcode) else {
            return false;
        };
        self.values[word] ^= mask;
        self.inits[word] |= mask;
        true
    }

    /// The current value of `opcode`'s flag, or `None` if it has no
    /// designated flag. Returns `Some(false)` for an uninitialized flag.
    #[must_use]
    pub fn get(&self, opcode: Opcode) -> Option<bool> {
        let (word, mask) = mask_of(opcode)?;
        Some(self.values[word] & mask != 0)
    }

    /// The expected transaction-ID of the *next* transaction for `opcode`:
    /// `false` if the flag is uninitialized or currently `true`, `true` if
    /// initialized and currently `false`. `None` if `opcode` has no flag.
    #[must_use]
    pub fn get_next(&self, opcode: Opcode) -> Option<bool> {
        let (word, mask) = mask_of(opcode)?;
        if self.inits[word] & mask == 0 {
            return Some(false);
        }
        Some(self.values[word] & mask == 0)
    }

    /// `true` if `opcode`'s flag is initialized and equals `flag`. `false`
    /// if uninitialized, mismatched, or `opcode` has no designated flag.
    #[must_use]
    pub fn is_set(&self, opcode: Opcode, flag: bool) -> bool {
        let Some((word, mask)) = mask_of(opcode) else {
            return false;
        };
        if self.inits[word] & mask == 0 {
            return false;
        }
        (self.values[word] & mask != 0) == flag
    }

    /// Initializes and sets `opcode`'s flag to `flag`. Returns `false` if
    /// `opcode` has no designated flag.
    pub fn set(&mut self, opcode: Opcode, flag: bool) -> bool {
        let Some((word, mask)) = mask_of(opcode) else {
            return false;
        };
        self.inits[word] |= mask;
        if flag {
            self.values[word] |= mask;
        } else {
            self.values[word] &= !mask;
        }
        true
    }

    /// Captures the store's state for persistence.
    #[must_use]
    pub fn to_snapshot(&self) -> SeqFlagsSnapshot {
        SeqFlagsSnapshot {
            values: self.values,
            inits: self.inits,
        }
    }

    /// Restores a store from a previously captured snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &SeqFlagsSnapshot) -> Self {
        Self {
            values: snapshot.values,
            inits: snapshot.inits,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use msp_proto::{ctrl, standard};

    #[test]
    fn fresh_store_has_every_flag_uninitialized() {
        let flags = SequenceFlags::new();
        assert_eq!(flags.get(standard::ACTIVE), Some(false));
        assert_eq!(flags.get_next(standard::ACTIVE), Some(false));
        assert!(!flags.is_set(standard::ACTIVE, false));
        assert!(!flags.is_set(standard::ACTIVE, true));
    }

    #[test]
    fn control_opcodes_have_no_flag() {
        assert_eq!(mask_of(ctrl::NULL), None);
        assert_eq!(mask_of(ctrl::DATA), None);
        let mut flags = SequenceFlags::new();
        assert!(!flags.increment(ctrl::F_ACK));
        assert!(!flags.set(ctrl::F_ACK, true));
        assert_eq!(flags.get(ctrl::F_ACK), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut flags = SequenceFlags::new();
        assert!(flags.set(standard::REQ_HK, true));
        assert_eq!(flags.get(standard::REQ_HK), Some(true));
        assert!(flags.is_set(standard::REQ_HK, true));
        assert!(!flags.is_set(standard::REQ_HK, false));
    }

    #[test]
    fn increment_toggles_and_initializes() {
        let mut flags = SequenceFlags::new();
        assert_eq!(flags.get_next(standard::SEND_TIME), Some(false));

        assert!(flags.increment(standard::SEND_TIME));
        assert_eq!(flags.get(standard::SEND_TIME), Some(true));
        assert_eq!(flags.get_next(standard::SEND_TIME), Some(false));

        assert!(flags.increment(standard::SEND_TIME));
        assert_eq!(flags.get(standard::SEND_TIME), Some(false));
        assert_eq!(flags.get_next(standard::SEND_TIME), Some(true));
    }

    #[test]
    fn custom_opcodes_are_isolated_per_family_word() {
        let mut flags = SequenceFlags::new();
        let sys_custom = Opcode::new(0x51);
        let req_custom = Opcode::new(0x61);
        let send_custom = Opcode::new(0x71);

        assert!(flags.set(sys_custom, true));
        assert_eq!(flags.get(req_custom), Some(false));
        assert_eq!(flags.get(send_custom), Some(false));
        assert_eq!(flags.get(sys_custom), Some(true));
    }

    #[test]
    fn opcodes_sharing_low_nibble_in_different_families_are_distinct() {
        let mut flags = SequenceFlags::new();
        // 0x51 (sys) and 0x61 (req) share low nibble 0x1 but live in
        // different words.
        assert!(flags.set(Opcode::new(0x51), true));
        assert_eq!(flags.get(Opcode::new(0x61)), Some(false));
    }

    #[test]
    fn snapshot_round_trips() {
        let mut flags = SequenceFlags::new();
        flags.set(standard::ACTIVE, true);
        flags.increment(standard::REQ_PUS);

        let restored = SequenceFlags::from_snapshot(&flags.to_snapshot());
        assert_eq!(flags, restored);
    }

    proptest! {
        #[test]
        fn is_set_agrees_with_get_when_initialized(
            raw_opcode in 0u8..=0x7F,
            flag in any::<bool>(),
        ) {
            let opcode = Opcode::new(raw_opcode);
            let mut flags = SequenceFlags::new();
            if flags.set(opcode, flag) {
                prop_assert_eq!(flags.get(opcode), Some(flag));
                prop_assert!(flags.is_set(opcode, flag));
                prop_assert!(!flags.is_set(opcode, !flag));
            } else {
                prop_assert_eq!(flags.get(opcode), None);
            }
        }

        #[test]
        fn get_next_is_opposite_of_current_value_once_initialized(
            raw_opcode in 0u8..=0x7F,
        ) {
            let opcode = Opcode::new(raw_opcode);
            let mut flags = SequenceFlags::new();
            if flags.set(opcode, true) {
                prop_assert_eq!(flags.get_next(opcode), Some(false));
                flags.set(opcode, false);
                prop_assert_eq!(flags.get_next(opcode), Some(true));
            }
        }
    }
}
