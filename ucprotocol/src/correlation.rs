//! Correlation number generation
//!
//! Replies carry the correlation number of the request they answer; it is
//! the only message-matching token the protocol has. Numbers are drawn from
//! a shared counter over [1, 10000] that wraps back to 1. Zero is never
//! issued; the controller treats 0 as "no acknowledgement requested".

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Smallest correlation number ever issued.
pub const CORRELATION_MIN: i32 = 1;

/// Largest correlation number; the counter wraps to [`CORRELATION_MIN`]
/// after issuing this value.
pub const CORRELATION_MAX: i32 = 10_000;

/// Shared generator of correlation numbers.
///
/// Cloning yields another handle to the same counter, so every client that
/// talks over the same deployment draws from one sequence. Safe to call
/// from any number of threads.
#[derive(Debug, Clone)]
pub struct CorrelationCounter {
    inner: Arc<AtomicI32>,
}

impl CorrelationCounter {
    /// Create a fresh counter; the first [`next`](Self::next) returns 1.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AtomicI32::new(0)),
        }
    }

    /// Issue the next correlation number, wrapping after
    /// [`CORRELATION_MAX`].
    pub fn next(&self) -> i32 {
        // The closure never returns None, so fetch_update cannot fail.
        self.inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(if current >= CORRELATION_MAX {
                    CORRELATION_MIN
                } else {
                    current + 1
                })
            })
            .map(|prev| {
                if prev >= CORRELATION_MAX {
                    CORRELATION_MIN
                } else {
                    prev + 1
                }
            })
            .unwrap_or(CORRELATION_MIN)
    }
}

impl Default for CorrelationCounter {
    fn default() -> Self {
        Self::new()
    }
}
