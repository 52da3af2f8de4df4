//! Request/reply exchanges over the telegram protocol
//!
//! The controller answers every Get and Set with an Ack carrying the same
//! correlation number. The stream has no framing beyond each telegram's
//! length prefix, so recovery from a lost or mangled reply works by
//! discarding pending input and re-issuing the request under a fresh
//! correlation number.

use tracing::{debug, trace, warn};
use ucprotocol::{
    address::reason, declared_length, decode_ack, encode_get, encode_set, AckTelegram,
    CorrelationCounter, Opcode, ACK_CANONICAL_LENGTH, ACK_TELEGRAM_SIZE, LENGTH_FIELD_SIZE,
};

use crate::transport::{Transport, TransportError};

/// Full exchange attempts (initial try plus one retry) before giving up.
const EXCHANGE_ATTEMPTS: u32 = 2;

/// Read attempts for the length prefix of a reply.
const PREFIX_READ_ATTEMPTS: u32 = 1;

/// Read attempts for the body of a Get reply. Gets carry the data the
/// caller is waiting for, so a slow body gets more patience.
const GET_BODY_READ_ATTEMPTS: u32 = 3;

/// Read attempts for the body of a Set acknowledgement.
const SET_BODY_READ_ATTEMPTS: u32 = 1;

/// Errors from a protocol exchange.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    /// The underlying byte stream failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The transport accepted fewer bytes than the request needs.
    #[error("short write: sent {sent} of {requested} bytes")]
    ShortWrite { requested: usize, sent: usize },

    /// No well-formed Ack with the request's correlation number arrived
    /// within the retry budget.
    #[error("no matching reply for correlation {correlation}")]
    NoMatchingReply { correlation: i32 },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// A synchronous telegram client: one exchange in flight at a time.
///
/// Holds the transport exclusively; callers that share a controller wrap
/// the client in a mutex.
pub struct ProtocolClient {
    transport: Box<dyn Transport>,
    correlation: CorrelationCounter,
}

impl ProtocolClient {
    pub fn new(transport: Box<dyn Transport>, correlation: CorrelationCounter) -> Self {
        Self {
            transport,
            correlation,
        }
    }

    /// Read the value of a controller object.
    pub fn get(&mut self, address: i32, index: i32) -> ProtocolResult<i32> {
        let ack = self.exchange(
            |c| encode_get(address, index, c).to_vec(),
            GET_BODY_READ_ATTEMPTS,
        )?;
        if ack.reason != reason::OK {
            debug!(
                "get 0x{address:04X}[{index}] acknowledged with reason {}",
                ack.reason
            );
        }
        Ok(ack.data)
    }

    /// Write a value to a controller object.
    pub fn set(&mut self, address: i32, index: i32, value: i32) -> ProtocolResult<()> {
        let ack = self.exchange(
            |c| encode_set(address, index, c, value).to_vec(),
            SET_BODY_READ_ATTEMPTS,
        )?;
        if ack.reason != reason::OK {
            debug!(
                "set 0x{address:04X}[{index}] = {value} acknowledged with reason {}",
                ack.reason
            );
        }
        Ok(())
    }

    /// Change the transport's per-call timeout.
    pub fn set_timeout(&mut self, timeout: std::time::Duration) -> ProtocolResult<()> {
        self.transport.set_timeout(timeout)?;
        Ok(())
    }

    fn exchange<F>(&mut self, encode: F, body_attempts: u32) -> ProtocolResult<AckTelegram>
    where
        F: Fn(i32) -> Vec<u8>,
    {
        // Overwritten on every attempt; the loop runs at least once.
        let mut last_err = ProtocolError::NoMatchingReply { correlation: 0 };

        for attempt in 1..=EXCHANGE_ATTEMPTS {
            let correlation = self.correlation.next();
            let request = encode(correlation);

            // Anything still buffered belongs to an exchange that was
            // already abandoned.
            self.transport.discard_input()?;

            trace!("-> {request:02X?}");
            let sent = self.transport.write(&request)?;
            if sent != request.len() {
                warn!(
                    "short write on attempt {attempt}: sent {sent} of {} bytes",
                    request.len()
                );
                last_err = ProtocolError::ShortWrite {
                    requested: request.len(),
                    sent,
                };
                continue;
            }

            match self.read_reply(correlation, body_attempts)? {
                Some(ack) => return Ok(ack),
                None => {
                    debug!("no matching reply for correlation {correlation} on attempt {attempt}");
                    last_err = ProtocolError::NoMatchingReply { correlation };
                }
            }
        }
        Err(last_err)
    }

    /// Read one reply and match it against `correlation`. `Ok(None)` means
    /// this attempt produced nothing usable and the exchange may retry.
    fn read_reply(
        &mut self,
        correlation: i32,
        body_attempts: u32,
    ) -> ProtocolResult<Option<AckTelegram>> {
        let mut prefix = [0u8; LENGTH_FIELD_SIZE];
        if !self.read_exact(&mut prefix, PREFIX_READ_ATTEMPTS)? {
            return Ok(None);
        }

        // The declared length is advisory only; replies always carry the
        // canonical Ack payload regardless of what the field claims.
        let declared = declared_length(&prefix);
        if declared != ACK_CANONICAL_LENGTH {
            debug!("reply declares length {declared}, reading canonical {ACK_CANONICAL_LENGTH}");
        }

        let mut body = [0u8; ACK_CANONICAL_LENGTH as usize];
        if !self.read_exact(&mut body, body_attempts)? {
            return Ok(None);
        }

        let mut raw = [0u8; ACK_TELEGRAM_SIZE];
        raw[..LENGTH_FIELD_SIZE].copy_from_slice(&prefix);
        raw[LENGTH_FIELD_SIZE..].copy_from_slice(&body);
        trace!("<- {raw:02X?}");

        let ack = match decode_ack(&raw) {
            Ok(ack) => ack,
            Err(e) => {
                debug!("undecodable reply: {e}");
                return Ok(None);
            }
        };

        if Opcode::from_raw(ack.header.opcode) != Some(Opcode::Ack) {
            debug!("unexpected opcode {} in reply", ack.header.opcode);
            return Ok(None);
        }
        if ack.header.correlation != correlation {
            debug!(
                "correlation mismatch: got {}, expected {correlation}",
                ack.header.correlation
            );
            return Ok(None);
        }
        Ok(Some(ack))
    }

    /// Fill `buf`, spending one of `attempts` each time the transport
    /// times out with nothing. Returns false when the budget runs out.
    fn read_exact(&mut self, buf: &mut [u8], mut attempts: u32) -> ProtocolResult<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.transport.read(&mut buf[filled..])?;
            if n == 0 {
                attempts -= 1;
                if attempts == 0 {
                    return Ok(false);
                }
            }
            filled += n;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockTransport, Script};
    use ucprotocol::address;

    fn client() -> (ProtocolClient, std::sync::Arc<crate::transport::mock::MockShared>) {
        let (transport, shared) = MockTransport::new();
        (
            ProtocolClient::new(Box::new(transport), CorrelationCounter::new()),
            shared,
        )
    }

    #[test]
    fn get_returns_acknowledged_value() {
        let (mut client, shared) = client();
        shared.push(Script::Ack {
            value: 123_456,
            reason: 0,
        });

        let value = client.get(address::COUNTER, 1).unwrap();
        assert_eq!(value, 123_456);

        let requests = shared.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].opcode, Some(Opcode::Get));
        assert_eq!(requests[0].address, address::COUNTER);
        assert_eq!(requests[0].index, 1);
    }

    #[test]
    fn set_sends_value_word() {
        let (mut client, shared) = client();
        shared.push(Script::Ack {
            value: 0,
            reason: 0,
        });

        client.set(address::TARGET, 2, -50_000).unwrap();

        let requests = shared.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].opcode, Some(Opcode::Set));
        assert_eq!(requests[0].address, address::TARGET);
        assert_eq!(requests[0].index, 2);
        assert_eq!(requests[0].value, Some(-50_000));
    }

    #[test]
    fn nonzero_reason_is_not_an_error() {
        let (mut client, shared) = client();
        shared.push(Script::Ack {
            value: 7,
            reason: 2,
        });

        assert_eq!(client.get(address::AMPL, 1).unwrap(), 7);
    }

    #[test]
    fn mismatched_correlation_triggers_one_retry() {
        let (mut client, shared) = client();
        shared.push(Script::WrongCorrelation { value: 999 });
        shared.push(Script::Ack {
            value: 42,
            reason: 0,
        });

        assert_eq!(client.get(address::STATUS, 1).unwrap(), 42);

        let requests = shared.requests();
        assert_eq!(requests.len(), 2);
        assert_ne!(requests[0].correlation, requests[1].correlation);
    }

    #[test]
    fn silence_on_both_attempts_is_no_matching_reply() {
        let (mut client, shared) = client();
        shared.push_many(&[Script::Silence, Script::Silence]);

        let err = client.get(address::STATUS, 1).unwrap_err();
        assert!(matches!(err, ProtocolError::NoMatchingReply { .. }));
        assert_eq!(shared.requests().len(), 2);
    }

    #[test]
    fn silence_then_reply_succeeds() {
        let (mut client, shared) = client();
        shared.push_many(&[
            Script::Silence,
            Script::Ack {
                value: 11,
                reason: 0,
            },
        ]);

        assert_eq!(client.get(address::REFCOUNTER, 3).unwrap(), 11);
    }

    #[test]
    fn wrong_declared_length_is_normalized() {
        let (mut client, shared) = client();
        shared.push(Script::AckDeclaredLength {
            value: 77,
            declared: 512,
        });

        assert_eq!(client.get(address::COUNTER, 1).unwrap(), 77);
    }

    #[test]
    fn short_write_retries_then_succeeds() {
        let (mut client, shared) = client();
        shared.push_many(&[
            Script::ShortWrite,
            Script::Ack {
                value: 5,
                reason: 0,
            },
        ]);

        assert_eq!(client.get(address::AMPL, 2).unwrap(), 5);
    }

    #[test]
    fn short_write_on_both_attempts_fails() {
        let (mut client, shared) = client();
        shared.push_many(&[Script::ShortWrite, Script::ShortWrite]);

        let err = client.set(address::TARGET, 1, 0).unwrap_err();
        assert!(matches!(err, ProtocolError::ShortWrite { .. }));
    }

    #[test]
    fn correlation_numbers_stay_in_range() {
        let (mut client, shared) = client();
        for _ in 0..30 {
            shared.push(Script::Ack {
                value: 0,
                reason: 0,
            });
        }
        for _ in 0..30 {
            client.get(address::STATUS, 1).unwrap();
        }
        for request in shared.requests() {
            assert!(request.correlation >= 1 && request.correlation <= 10_000);
        }
    }
}
