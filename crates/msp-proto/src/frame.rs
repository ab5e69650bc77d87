//! Header and data frame formatting/parsing, and the FCS pseudo-header.
//!
//! Grounded directly in `msp_exp_frame.c`: the FCS always covers a
//! synthesized, never-transmitted pseudo-header byte followed by the frame
//! body (everything up to but excluding the FCS field itself), computed by
//! threading the running CRC remainder across the two regions.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::FrameError;
use crate::opcode::{ctrl, Opcode};
use crate::wire::{crc32, pack_be32, unpack_be32};

/// Length in bytes of every header frame.
pub const HEADER_FRAME_LEN: usize = 9;

/// Minimum length in bytes of a data frame (opcode byte + 1-byte payload +
/// 4-byte FCS). A data frame can never carry an empty payload — an
/// empty-bodied transaction ends with a control frame instead.
pub const MIN_DATA_FRAME_LEN: usize = 6;

/// The fixed non-payload overhead of a data frame (opcode byte + FCS).
const DATA_FRAME_OVERHEAD: usize = 5;

/// The minimum receive buffer size needed to hold any frame at a given MTU,
/// per `MSP_EXP_MAX_FRAME_SIZE`.
#[must_use]
pub const fn max_frame_size(mtu: u32) -> usize {
    let data_frame_max = mtu as usize + DATA_FRAME_OVERHEAD;
    if data_frame_max > HEADER_FRAME_LEN {
        data_frame_max
    } else {
        HEADER_FRAME_LEN
    }
}

/// The experiment's 7-bit MSP address, used to build the FCS pseudo-header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExpAddr(u8);

impl ExpAddr {
    /// Builds an address, rejecting values that don't fit 7 bits.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `addr` has bit 7 set.
    pub const fn new(addr: u8) -> Result<Self, AddrOutOfRange> {
        if addr & 0x80 != 0 {
            Err(AddrOutOfRange(addr))
        } else {
            Ok(Self(addr))
        }
    }

    /// The raw 7-bit address value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// An experiment address that does not fit in 7 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("experiment address {0:#04x} does not fit in 7 bits")]
pub struct AddrOutOfRange(u8);

/// Which side of the link a frame is being evaluated as having come from (or
/// being sent as), for pseudo-header construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The frame travels OBC -> experiment.
    FromObc,
    /// The frame travels experiment -> OBC.
    FromExperiment,
}

impl Direction {
    const fn pseudo_header_bit(self) -> u8 {
        match self {
            Self::FromObc => 0,
            Self::FromExperiment => 1,
        }
    }
}

fn pseudo_header(addr: ExpAddr, direction: Direction) -> u8 {
    (addr.value() << 1) | direction.pseudo_header_bit()
}

/// Computes the FCS over `data` (everything in the frame up to but
/// excluding the FCS field itself) for the given direction and address.
#[must_use]
pub fn generate_fcs(data: &[u8], direction: Direction, addr: ExpAddr) -> u32 {
    let header_byte = [pseudo_header(addr, direction)];
    let remainder = crc32(&header_byte, 0);
    crc32(data, remainder)
}

/// Checks whether the last 4 bytes of `frame` match the FCS computed over
/// everything preceding them.
#[must_use]
pub fn fcs_valid(frame: &[u8], direction: Direction, addr: ExpAddr) -> bool {
    if frame.len() < 4 {
        return false;
    }
    let (body, fcs_bytes) = frame.split_at(frame.len() - 4);
    unpack_be32(fcs_bytes) == generate_fcs(body, direction, addr)
}

/// The wire-exact bytes of a header frame, for zero-copy transmutation.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
struct RawHeaderFrame {
    opcode_and_frame_id: u8,
    dl: [u8; 4],
    fcs: [u8; 4],
}

/// A parsed header frame: opcode, frame-ID, and declared data length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFrame {
    /// The frame's opcode (frame-ID bit already stripped).
    pub opcode: Opcode,
    /// The frame-ID bit.
    pub frame_id: u8,
    /// The declared `DL` field.
    pub dl: u32,
}

impl HeaderFrame {
    /// Formats this header frame (including FCS) into `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::BufferTooSmall`] if `dest` is shorter than
    /// [`HEADER_FRAME_LEN`].
    pub fn format(self, dest: &mut [u8], addr: ExpAddr) -> Result<(), FrameError> {
        if dest.len() < HEADER_FRAME_LEN {
            return Err(FrameError::BufferTooSmall {
                needed: HEADER_FRAME_LEN,
                actual: dest.len(),
            });
        }

        let raw = RawHeaderFrame {
            opcode_and_frame_id: self.opcode.value() | ((self.frame_id & 1) << 7),
            dl: self.dl.to_be_bytes(),
            fcs: [0; 4],
        };
        dest[..HEADER_FRAME_LEN].copy_from_slice(raw.as_bytes());

        let fcs = generate_fcs(&dest[..5], Direction::FromExperiment, addr);
        pack_be32(&mut dest[5..9], fcs);
        Ok(())
    }

    /// Formats a header frame with `frame_id` and `dl` set to 0.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::BufferTooSmall`] if `dest` is shorter than
    /// [`HEADER_FRAME_LEN`].
    pub fn format_empty(opcode: Opcode, dest: &mut [u8], addr: ExpAddr) -> Result<(), FrameError> {
        Self {
            opcode,
            frame_id: 0,
            dl: 0,
        }
        .format(dest, addr)
    }

    /// Parses a header frame received from the OBC.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidHeaderFrame`] if `frame` is not exactly
    /// [`HEADER_FRAME_LEN`] bytes, or [`FrameError::FcsMismatch`] if the
    /// trailing FCS does not match.
    pub fn parse(frame: &[u8], addr: ExpAddr) -> Result<Self, FrameError> {
        if frame.len() != HEADER_FRAME_LEN {
            return Err(FrameError::InvalidHeaderFrame {
                actual: frame.len(),
            });
        }
        if !fcs_valid(frame, Direction::FromObc, addr) {
            return Err(FrameError::FcsMismatch);
        }

        #[allow(clippy::expect_used)]
        let raw = RawHeaderFrame::ref_from_bytes(frame)
            .expect("length checked above to equal size_of::<RawHeaderFrame>()");
        Ok(Self {
            opcode: Opcode::new(raw.opcode_and_frame_id & 0x7F),
            frame_id: (raw.opcode_and_frame_id >> 7) & 1,
            dl: u32::from_be_bytes(raw.dl),
        })
    }
}

/// A parsed data frame: the frame-ID bit and a borrowed view of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFrameView<'a> {
    /// The frame-ID bit.
    pub frame_id: u8,
    /// The payload bytes, excluding the opcode byte and the FCS.
    pub payload: &'a [u8],
}

/// Formats a data frame (opcode byte + `payload` + FCS) into `dest`.
///
/// # Errors
///
/// Returns [`FrameError::EmptyDataPayload`] if `payload` is empty, or
/// [`FrameError::BufferTooSmall`] if `dest` cannot hold the frame.
pub fn format_data_frame(
    dest: &mut [u8],
    frame_id: u8,
    payload: &[u8],
    addr: ExpAddr,
) -> Result<(), FrameError> {
    if payload.is_empty() {
        return Err(FrameError::EmptyDataPayload);
    }
    let total = DATA_FRAME_OVERHEAD + payload.len();
    if dest.len() < total {
        return Err(FrameError::BufferTooSmall {
            needed: total,
            actual: dest.len(),
        });
    }

    dest[0] = ctrl::DATA.value() | ((frame_id & 1) << 7);
    dest[1..1 + payload.len()].copy_from_slice(payload);

    let fcs = generate_fcs(&dest[..1 + payload.len()], Direction::FromExperiment, addr);
    pack_be32(&mut dest[1 + payload.len()..total], fcs);
    Ok(())
}

/// Parses a data frame received from the OBC.
///
/// # Errors
///
/// Returns [`FrameError::InvalidDataFrame`] if `frame` is shorter than
/// [`MIN_DATA_FRAME_LEN`], or [`FrameError::FcsMismatch`] if the trailing
/// FCS does not match.
pub fn parse_data_frame(frame: &[u8], addr: ExpAddr) -> Result<DataFrameView<'_>, FrameError> {
    if frame.len() < MIN_DATA_FRAME_LEN {
        return Err(FrameError::InvalidDataFrame {
            actual: frame.len(),
        });
    }
    if !fcs_valid(frame, Direction::FromObc, addr) {
        return Err(FrameError::FcsMismatch);
    }

    let frame_id = (frame[0] >> 7) & 1;
    let payload = &frame[1..frame.len() - 4];
    Ok(DataFrameView { frame_id, payload })
}

/// `true` when `opcode` (masked to 7 bits) marks a frame as a data frame
/// rather than a header frame.
#[must_use]
pub fn is_data_frame(masked_opcode: u8) -> bool {
    masked_opcode == ctrl::DATA.value()
}
