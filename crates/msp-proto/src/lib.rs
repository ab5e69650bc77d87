//! Wire framing for the Mission Support Protocol: endian/CRC primitives, the
//! opcode catalogue, and header/data frame codecs.
//!
//! This crate never allocates: every codec function operates on
//! caller-provided buffers and borrows payload slices rather than copying
//! them.

pub mod errors;
pub mod frame;
pub mod opcode;
pub mod wire;

pub use errors::FrameError;
pub use frame::{
    fcs_valid, format_data_frame, generate_fcs, is_data_frame, max_frame_size, parse_data_frame,
    AddrOutOfRange, DataFrameView, Direction, ExpAddr, HeaderFrame, HEADER_FRAME_LEN,
    MIN_DATA_FRAME_LEN,
};
pub use opcode::{ctrl, standard, standard_flag_mask, Family, Opcode};
pub use wire::{pack_be32, unpack_be32};
