//! Unix-seconds helpers shared by the queue, scheduler and stores.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as whole seconds since the Unix epoch.
///
/// Falls back to `0` if the system clock is before the epoch, which only
/// happens on badly misconfigured hosts.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_now_is_monotonic_enough() {
        let a = unix_now();
        let b = unix_now();
        assert!(b >= a);
        // Sometime after 2020-01-01.
        assert!(a > 1_577_836_800);
    }
}
