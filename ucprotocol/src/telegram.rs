//! Telegram encoding and decoding
//!
//! Every telegram starts with a five-word header (`length`, `opcode`,
//! `address`, `index`, `correlation`), all signed 32-bit integers, followed
//! by telegram-specific payload words. `length` counts the bytes after the
//! length field itself.
//!
//! # Byte order
//!
//! Fields travel in host byte order. The controller performs no
//! network-order conversion and is little-endian; the original driver sent
//! its C structs to the socket verbatim. The structs here are `bytemuck`
//! `Pod` types serialized the same way.

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

/// Maximum size of a telegram including header and data, in bytes.
pub const UC_MAXSIZE: usize = 512;

/// Size of the common telegram header in bytes (five `i32` words).
pub const HEADER_SIZE: usize = 20;

/// Size of the `length` field that prefixes every telegram.
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Total wire size of a Get telegram (header only).
pub const GET_TELEGRAM_SIZE: usize = 20;

/// Total wire size of a Set telegram (header + value + trailing word).
pub const SET_TELEGRAM_SIZE: usize = 28;

/// Total wire size of the canonical Ack telegram (header + reason + value).
pub const ACK_TELEGRAM_SIZE: usize = 28;

/// Total wire size of a single-word Tell telegram.
pub const TELL_TELEGRAM_SIZE: usize = 24;

/// The `length` field value of a canonical Ack telegram.
///
/// Controllers have been observed declaring other lengths while still
/// sending this payload size; readers substitute this value rather than
/// trusting the wire.
pub const ACK_CANONICAL_LENGTH: i32 = 24;

/// Constant second data word of every Set telegram, kept for wire-format
/// parity with the size the controller expects.
pub const SET_TRAILING_WORD: i32 = 1;

/// Telegram opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Opcode {
    /// Set a value on a controller object.
    Set = 0,
    /// Request a value from a controller object.
    Get = 1,
    /// Acknowledge a Set or answer a Get.
    Ack = 3,
    /// Spontaneous value-change event from the controller.
    Tell = 4,
}

impl Opcode {
    /// Decode a raw opcode word, if it names a known telegram type.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Opcode::Set),
            1 => Some(Opcode::Get),
            3 => Some(Opcode::Ack),
            4 => Some(Opcode::Tell),
            _ => None,
        }
    }
}

/// Common header for all telegram types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TelegramHeader {
    /// Length of the rest of the telegram (everything after this field).
    pub length: i32,
    /// Opcode word, see [`Opcode`].
    pub opcode: i32,
    /// Identifier of the controller object, see [`crate::address`].
    pub address: i32,
    /// Sub-identifier of the object (axis or trigger selector, 0 if unused).
    pub index: i32,
    /// Identity number for matching the answer to the request.
    pub correlation: i32,
}

/// Get telegram: requests a value from a controller object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct GetTelegram {
    pub header: TelegramHeader,
}

/// Set telegram: writes a value to a controller object.
///
/// `data[0]` carries the value; `data[1]` is [`SET_TRAILING_WORD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct SetTelegram {
    pub header: TelegramHeader,
    pub data: [i32; 2],
}

/// Ack telegram: acknowledges a Set or answers a Get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct AckTelegram {
    pub header: TelegramHeader,
    /// Result code, see [`crate::address::reason`].
    pub reason: i32,
    /// The object's value.
    pub data: i32,
}

/// Tell telegram: spontaneous value-change event from the controller.
///
/// May carry more than one data word on the wire; this client does not
/// actively parse inbound Tells, so only the single-word shape is laid
/// out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TellTelegram {
    pub header: TelegramHeader,
    /// The object's new value.
    pub data: i32,
}

/// Errors produced while decoding inbound telegrams.
#[derive(Error, Debug)]
pub enum TelegramError {
    /// The assembled buffer is smaller than the canonical Ack telegram.
    #[error("truncated telegram: got {actual} bytes, need {expected}")]
    Truncated { expected: usize, actual: usize },
}

/// Encode a Get telegram for the given object address and index.
pub fn encode_get(address: i32, index: i32, correlation: i32) -> [u8; GET_TELEGRAM_SIZE] {
    let telegram = GetTelegram {
        header: TelegramHeader {
            length: (GET_TELEGRAM_SIZE - LENGTH_FIELD_SIZE) as i32,
            opcode: Opcode::Get as i32,
            address,
            index,
            correlation,
        },
    };
    let mut out = [0u8; GET_TELEGRAM_SIZE];
    out.copy_from_slice(bytemuck::bytes_of(&telegram));
    out
}

/// Encode a Set telegram writing `value` to the given object.
pub fn encode_set(address: i32, index: i32, correlation: i32, value: i32) -> [u8; SET_TELEGRAM_SIZE] {
    let telegram = SetTelegram {
        header: TelegramHeader {
            length: (SET_TELEGRAM_SIZE - LENGTH_FIELD_SIZE) as i32,
            opcode: Opcode::Set as i32,
            address,
            index,
            correlation,
        },
        data: [value, SET_TRAILING_WORD],
    };
    let mut out = [0u8; SET_TELEGRAM_SIZE];
    out.copy_from_slice(bytemuck::bytes_of(&telegram));
    out
}

/// Read the declared `length` field from the first four bytes of a reply.
///
/// The value is advisory; Ack readers normalize it to
/// [`ACK_CANONICAL_LENGTH`] before reading the remainder.
pub fn declared_length(prefix: &[u8; LENGTH_FIELD_SIZE]) -> i32 {
    i32::from_ne_bytes(*prefix)
}

/// Decode an assembled Ack telegram buffer (length prefix plus remainder).
pub fn decode_ack(bytes: &[u8]) -> Result<AckTelegram, TelegramError> {
    if bytes.len() < ACK_TELEGRAM_SIZE {
        return Err(TelegramError::Truncated {
            expected: ACK_TELEGRAM_SIZE,
            actual: bytes.len(),
        });
    }
    Ok(bytemuck::pod_read_unaligned(&bytes[..ACK_TELEGRAM_SIZE]))
}
