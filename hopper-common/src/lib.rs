//! Foundation types shared by the hopper coordinator and the dispenser-node
//! agent: opaque ids, money amounts, timestamps, randomness, and the shutdown
//! channel used to coordinate graceful teardown across tasks.

/// Fiat money amounts with two fractional digits.
pub mod amount;
/// Bounded exponential backoff durations.
pub mod backoff;
/// Opaque 128-bit identifiers.
pub mod ids;
/// Random number generation utilities.
pub mod rng;
/// Shutdown signal plumbing.
pub mod shutdown;
/// Timestamps and the injectable clock.
pub mod time;
