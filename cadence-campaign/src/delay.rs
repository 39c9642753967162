//! Fixed per-day delay table.

use serde::{Deserialize, Serialize};

/// Maps sequence day → delay before that day's message is sent.
///
/// Externally configurable at startup, never mutated mid-sequence: a
/// recipient entering the campaign today and one who entered last week both
/// see the delays their respective days were scheduled with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayTable {
    /// Delay in hours before each day's send, index 0 = day 1.
    #[serde(default = "default_hours")]
    hours: Vec<u64>,
}

fn default_hours() -> Vec<u64> {
    // Ten-day verification drip: a quick first nudge, then daily, then
    // tapering off.
    vec![1, 24, 24, 24, 48, 48, 72, 72, 96, 120]
}

impl Default for DelayTable {
    fn default() -> Self {
        Self {
            hours: default_hours(),
        }
    }
}

impl DelayTable {
    /// Build a table from per-day hour delays, index 0 = day 1.
    #[must_use]
    pub const fn from_hours(hours: Vec<u64>) -> Self {
        Self { hours }
    }

    /// Number of days in the sequence.
    #[must_use]
    pub fn days(&self) -> u32 {
        u32::try_from(self.hours.len()).unwrap_or(u32::MAX)
    }

    /// Delay in seconds before `day`'s send (days are 1-indexed).
    ///
    /// Returns `None` for day 0 or days past the end of the table.
    #[must_use]
    pub fn delay_secs(&self, day: u32) -> Option<u64> {
        let index = usize::try_from(day.checked_sub(1)?).ok()?;
        self.hours.get(index).map(|hours| hours * 3600)
    }
}
