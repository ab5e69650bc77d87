//! Big-endian packing and the MSP CRC-32 variant.
//!
//! The checksum here is deliberately *not* the zlib/PNG CRC-32: the
//! remainder is neither seeded with `0xFFFFFFFF` nor XORed out at the end,
//! because [`crc32`] is meant to be called repeatedly over non-contiguous
//! regions (the pseudo-header, then the frame body) by threading the
//! returned remainder back in as `start`.

/// Polynomial used by the MSP frame check sequence, in reflected form.
pub const CRC32_POLY: u32 = 0xEDB8_8320;

/// Packs `n` into `dst[0..4]` as big-endian.
///
/// # Panics
///
/// Panics if `dst` is shorter than 4 bytes.
pub fn pack_be32(dst: &mut [u8], n: u32) {
    dst[0..4].copy_from_slice(&n.to_be_bytes());
}

/// Unpacks a big-endian `u32` from `src[0..4]`.
///
/// # Panics
///
/// Panics if `src` is shorter than 4 bytes.
#[must_use]
pub fn unpack_be32(src: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&src[0..4]);
    u32::from_be_bytes(bytes)
}

/// Computes the MSP CRC-32 remainder over `data`, continuing from `start`.
///
/// Reflected input and output, polynomial `0xEDB88320`, no final XOR. Pass
/// `0` for `start` when beginning a fresh checksum; thread the returned
/// remainder back in as `start` to extend the computation over a
/// logically-contiguous but physically-split byte range (MSP uses this to
/// fold in the pseudo-header before the frame body).
#[must_use]
pub fn crc32(data: &[u8], start: u32) -> u32 {
    let mut remainder = start;
    for &byte in data {
        remainder ^= u32::from(byte);
        for _ in 0..8 {
            let mask = 0u32.wrapping_sub(remainder & 1);
            remainder = (remainder >> 1) ^ (CRC32_POLY & mask);
        }
    }
    remainder
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn be32_round_trip_zero_and_max() {
        for n in [0u32, 1, 0x7FFF_FFFF, 0xFFFF_FFFF, 0x1234_5678] {
            let mut buf = [0u8; 4];
            pack_be32(&mut buf, n);
            assert_eq!(unpack_be32(&buf), n);
        }
    }

    #[test]
    fn be32_is_big_endian() {
        let mut buf = [0u8; 4];
        pack_be32(&mut buf, 0x0102_0304);
        assert_eq!(buf, [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn crc32_empty_input_is_identity_on_start() {
        assert_eq!(crc32(&[], 0), 0);
        assert_eq!(crc32(&[], 0xDEAD_BEEF), 0xDEAD_BEEF);
    }

    #[test]
    fn crc32_incremental_matches_monolithic() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let whole = crc32(data, 0);

        let mid = data.len() / 2;
        let incremental = crc32(&data[mid..], crc32(&data[..mid], 0));

        assert_eq!(whole, incremental);
    }

    proptest! {
        #[test]
        fn crc32_splitting_anywhere_agrees_with_monolithic(
            data in prop::collection::vec(any::<u8>(), 0..256),
            split in 0usize..256,
        ) {
            let split = split.min(data.len());
            let whole = crc32(&data, 0);
            let incremental = crc32(&data[split..], crc32(&data[..split], 0));
            prop_assert_eq!(whole, incremental);
        }

        #[test]
        fn crc32_changes_on_single_bit_flip(
            mut data in prop::collection::vec(any::<u8>(), 1..64),
            bit in 0usize..8,
        ) {
            let original = crc32(&data, 0);
            let idx = data.len() - 1;
            data[idx] ^= 1 << bit;
            prop_assert_ne!(original, crc32(&data, 0));
        }
    }
}
