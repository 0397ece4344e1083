//! Wall-clock abstraction.
//!
//! Timestamps carry their UTC offset. Refresh intervals are measured between
//! absolute instants, so a DST change does not stretch or shrink them; quiet
//! hours read the local time of day from the same value. The coordinator
//! reads time through the [`Clock`] trait so tests can drive it together with
//! tokio's paused timer.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime};

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    /// Current local time with its UTC offset.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Clock backed by the system's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Clock anchored at a fixed wall-clock time that advances with the tokio timer.
///
/// Under `#[tokio::test(start_paused = true)]` time only moves when the
/// runtime auto-advances or `tokio::time::advance` is called, so refresh
/// timestamps and sleeps stay in lockstep.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use fleetsync::clock::{AnchoredClock, Clock};
///
/// let anchor = NaiveDate::from_ymd_opt(2024, 5, 1)
///     .unwrap()
///     .and_hms_opt(12, 0, 0)
///     .unwrap();
/// let clock = AnchoredClock::new(anchor);
/// assert!(clock.now().naive_local() >= anchor);
/// ```
#[derive(Debug, Clone)]
pub struct AnchoredClock {
    anchor: DateTime<FixedOffset>,
    started: tokio::time::Instant,
}

impl AnchoredClock {
    /// Create a clock reading `anchor` (at UTC+0) right now.
    pub fn new(anchor: NaiveDateTime) -> Self {
        Self::with_offset(anchor.and_utc().fixed_offset())
    }

    /// Create a clock reading `anchor`, offset included, right now.
    pub fn with_offset(anchor: DateTime<FixedOffset>) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let elapsed = self.started.elapsed();
        let elapsed = chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero());
        self.anchor + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_anchored_clock_follows_tokio_time() {
        let clock = AnchoredClock::new(noon());
        assert_eq!(clock.now().naive_local(), noon());

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(
            clock.now().naive_local(),
            noon() + chrono::Duration::seconds(90)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_anchored_clock_keeps_offset() {
        let cest = FixedOffset::east_opt(2 * 3600).unwrap();
        let anchor = noon().and_local_timezone(cest).unwrap();
        let clock = AnchoredClock::with_offset(anchor);

        assert_eq!(clock.now().offset(), &cest);
        assert_eq!(clock.now().naive_local(), noon());
        assert_eq!(clock.now().naive_utc(), noon() - chrono::Duration::hours(2));
    }

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
