//! Time source abstraction.
//!
//! All bridge timing (discovery retries, readiness fallbacks, timestamps) reads
//! the time through [`Clock`], so tests can drive the state machine with a
//! virtual clock instead of sleeping.

/// A millisecond wall clock.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch (or since an arbitrary origin for
    /// virtual clocks).
    fn now_ms(&self) -> u64;
}
