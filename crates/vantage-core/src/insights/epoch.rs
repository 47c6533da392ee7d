//! Weekly epoch boundary computation.
//!
//! Cache validity is epoch-based, not TTL-based: every entry created after
//! the most recent boundary is current, and all entries sharing an epoch go
//! stale simultaneously at the next one. The boundary weekday and anchor
//! timezone are configuration, not hard-coded.

use chrono::{DateTime, Datelike, Local, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Timezone the epoch boundary is anchored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpochTimezone {
    /// Anchor at UTC midnight.
    #[default]
    Utc,
    /// Anchor at server-local midnight.
    Local,
}

/// The configured weekly boundary: a weekday at 00:00 in an anchor timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochAnchor {
    /// Boundary weekday (default Monday).
    pub weekday: Weekday,
    /// Anchor timezone (default UTC).
    pub timezone: EpochTimezone,
}

impl Default for EpochAnchor {
    fn default() -> Self {
        Self { weekday: Weekday::Mon, timezone: EpochTimezone::Utc }
    }
}

impl EpochAnchor {
    /// The most recent boundary at or before `now`.
    ///
    /// If `now` falls exactly on the boundary weekday, the boundary is that
    /// day's midnight.
    #[must_use]
    pub fn epoch_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.timezone {
            EpochTimezone::Utc => {
                let days_back = Self::days_since_weekday(now.weekday(), self.weekday);
                let boundary_date = now.date_naive() - chrono::Duration::days(days_back);
                boundary_date.and_time(NaiveTime::MIN).and_utc()
            }
            EpochTimezone::Local => {
                let local_now = now.with_timezone(&Local);
                let days_back = Self::days_since_weekday(local_now.weekday(), self.weekday);
                let boundary_date = local_now.date_naive() - chrono::Duration::days(days_back);
                let naive = boundary_date.and_time(NaiveTime::MIN);
                // A DST gap can make local midnight ambiguous or skipped;
                // take the earliest valid instant, falling back to the UTC
                // reading of the same wall-clock time.
                Local
                    .from_local_datetime(&naive)
                    .earliest()
                    .map_or_else(|| naive.and_utc(), |dt| dt.with_timezone(&Utc))
            }
        }
    }

    /// Whether a timestamp falls within the current epoch.
    #[must_use]
    pub fn is_current(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        created_at >= self.epoch_start(now)
    }

    fn days_since_weekday(today: Weekday, anchor: Weekday) -> i64 {
        i64::from((today.num_days_from_monday() + 7 - anchor.num_days_from_monday()) % 7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_boundary_is_most_recent_monday_midnight() {
        let anchor = EpochAnchor::default();
        // Thursday 2026-08-06 → boundary Monday 2026-08-03 00:00.
        let now = utc(2026, 8, 6, 15, 30);
        assert_eq!(anchor.epoch_start(now), utc(2026, 8, 3, 0, 0));
    }

    #[test]
    fn test_boundary_on_anchor_day_is_same_day_midnight() {
        let anchor = EpochAnchor::default();
        // Monday afternoon → boundary is that Monday's midnight.
        let now = utc(2026, 8, 3, 14, 0);
        assert_eq!(anchor.epoch_start(now), utc(2026, 8, 3, 0, 0));

        // Monday exactly at midnight.
        let now = utc(2026, 8, 3, 0, 0);
        assert_eq!(anchor.epoch_start(now), utc(2026, 8, 3, 0, 0));
    }

    #[test]
    fn test_entry_validity_across_boundary() {
        let anchor = EpochAnchor::default();
        let now = utc(2026, 8, 6, 10, 0); // Thursday

        // Created Tuesday of the same week: current.
        assert!(anchor.is_current(utc(2026, 8, 4, 9, 0), now));
        // Created the previous Sunday: stale, even though younger than 7 days.
        assert!(!anchor.is_current(utc(2026, 8, 2, 23, 59), now));
    }

    #[test]
    fn test_all_entries_expire_together_at_boundary() {
        let anchor = EpochAnchor::default();
        let before_boundary = utc(2026, 8, 9, 23, 59); // Sunday night
        let after_boundary = utc(2026, 8, 10, 0, 1); // Monday just past midnight

        let created = utc(2026, 8, 7, 12, 0); // Friday
        assert!(anchor.is_current(created, before_boundary));
        assert!(!anchor.is_current(created, after_boundary));
    }

    #[test]
    fn test_custom_weekday_anchor() {
        let anchor = EpochAnchor { weekday: Weekday::Wed, timezone: EpochTimezone::Utc };
        // Thursday 2026-08-06 → boundary Wednesday 2026-08-05.
        let now = utc(2026, 8, 6, 9, 0);
        assert_eq!(anchor.epoch_start(now), utc(2026, 8, 5, 0, 0));

        // Tuesday 2026-08-04 → boundary the previous Wednesday 2026-07-29.
        let now = utc(2026, 8, 4, 9, 0);
        assert_eq!(anchor.epoch_start(now), utc(2026, 7, 29, 0, 0));
    }

    #[test]
    fn test_local_anchor_produces_some_boundary() {
        let anchor = EpochAnchor { weekday: Weekday::Mon, timezone: EpochTimezone::Local };
        let now = Utc::now();
        let boundary = anchor.epoch_start(now);
        assert!(boundary <= now);
        // Never more than a week plus a timezone offset in the past.
        assert!(now - boundary < chrono::Duration::days(8));
    }
}
