//! Environment abstraction for deterministic testing.
//!
//! Decouples relay logic from system resources (time, randomness). Production
//! uses the system clock and OS entropy; tests plug in a counter clock and a
//! seeded RNG so every run produces the same timestamps and session ids.

use std::time::Duration;

/// Abstract environment providing time and randomness.
///
/// # Invariants
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type used by this environment.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Wall-clock time as Unix milliseconds.
    ///
    /// Used for persisted timestamps (`requestedAt`) and liveness replies.
    /// May jump; never use it to measure intervals.
    fn wall_clock_millis(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// Given the same seed, a test environment produces the same sequence.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`, e.g. for session ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
