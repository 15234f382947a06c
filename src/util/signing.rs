/// Ephemeral request parameters: timestamps, the reversed timestamp and device ids
///
/// None of these carry state between calls. The clock is a trait so the
/// derived values can be pinned in tests.

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix every generated device id starts with
pub const DEVICE_ID_PREFIX: char = 'e';

const DEVICE_ID_MIN: u64 = 100_000_000_000_000;
const DEVICE_ID_MAX: u64 = 999_999_999_999_999;

/// Source of wall-clock milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// The system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock frozen at a fixed instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0
    }
}

/// Invert the low 32 bits of a millisecond timestamp.
///
/// Computed as `0xFFFFFFFF - low32`, which equals the bitwise NOT of the
/// truncated value. The high half of the timestamp never leaks in.
pub fn reverse_timestamp_of(millis: u64) -> u32 {
    let low = (millis & 0xFFFF_FFFF) as u32;
    u32::MAX - low
}

/// The `rr` nonce sent with sync-detail requests: the 64-bit one's
/// complement of the reversed timestamp, so always negative.
pub fn sync_nonce_of(reverse: u32) -> i64 {
    !(reverse as i64)
}

/// Builds the time and device parameters attached to outbound requests
#[derive(Debug, Clone, Default)]
pub struct SignedRequestBuilder<C = SystemClock> {
    clock: C,
}

impl SignedRequestBuilder<SystemClock> {
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl<C: Clock> SignedRequestBuilder<C> {
    /// Create a builder reading time from the given clock
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    /// Current wall-clock time in milliseconds
    pub fn current_timestamp_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Reversed low-32-bit timestamp, used as `r` on init requests
    pub fn reverse_timestamp(&self) -> u32 {
        reverse_timestamp_of(self.current_timestamp_millis())
    }

    /// Anti-replay nonce for sync-detail bodies
    pub fn sync_nonce(&self) -> i64 {
        sync_nonce_of(self.reverse_timestamp())
    }

    /// A fresh `e` + 15 digit device id
    pub fn new_device_id(&self) -> String {
        let n = rand::thread_rng().gen_range(DEVICE_ID_MIN..=DEVICE_ID_MAX);
        format!("{}{}", DEVICE_ID_PREFIX, n)
    }
}
