//! NCore telegram protocol elements for the attocube ANC350
//!
//! This crate provides the wire-level building blocks shared by the ANC350
//! driver: the four telegram shapes (Set, Get, Ack, Tell), the correlation
//! number generator used to match replies to requests, the controller's
//! object address catalog, and the axis status bitfield.
//!
//! No I/O happens here; the `anc350` crate layers the transport and the
//! request/reply exchange on top of these types.

pub mod address;
mod correlation;
mod status;
mod telegram;

pub use correlation::{CorrelationCounter, CORRELATION_MAX, CORRELATION_MIN};
pub use status::AxisStatus;
pub use telegram::{
    declared_length, decode_ack, encode_get, encode_set, AckTelegram, GetTelegram, Opcode,
    SetTelegram, TelegramError, TelegramHeader, TellTelegram, ACK_CANONICAL_LENGTH,
    ACK_TELEGRAM_SIZE, GET_TELEGRAM_SIZE, HEADER_SIZE, LENGTH_FIELD_SIZE, SET_TELEGRAM_SIZE,
    SET_TRAILING_WORD, TELL_TELEGRAM_SIZE, UC_MAXSIZE,
};
