//! Half-open time periods.

use {
    crate::error::{DomainError, Result},
    chrono::{DateTime, Duration, Utc},
    serde::{Deserialize, Serialize},
};

/// A half-open period `[start, end)`. `end = None` means open-ended.
///
/// All timestamps are UTC; Danish civil time only ever matters for display
/// grouping, never for storage or arithmetic.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Result<Self> {
        if let Some(end) = end
            && end <= start
        {
            return Err(DomainError::Validation(format!(
                "period end {end} must be after start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        Self::new(start, Some(end))
    }

    pub fn open_ended(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && self.end.is_none_or(|end| t < end)
    }

    /// Symmetric; an open end counts as infinitely far in the future.
    pub fn overlaps(&self, other: &Period) -> bool {
        self.end.is_none_or(|end| other.start < end)
            && other.end.is_none_or(|end| self.start < end)
    }

    /// A closed copy of this period ending at `end`.
    pub fn closed_at(&self, end: DateTime<Utc>) -> Result<Self> {
        Self::closed(self.start, end)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }

    pub fn whole_days(&self) -> Option<i64> {
        self.duration().map(|d| d.num_days())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone};

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn end_must_be_after_start() {
        assert!(Period::closed(t(2, 0), t(1, 0)).is_err());
        assert!(Period::closed(t(1, 0), t(1, 0)).is_err());
        assert!(Period::closed(t(1, 0), t(2, 0)).is_ok());
    }

    #[test]
    fn contains_is_half_open() {
        let period = Period::closed(t(1, 0), t(2, 0)).unwrap();
        assert!(period.contains(t(1, 0)));
        assert!(period.contains(t(1, 23)));
        assert!(!period.contains(t(2, 0)));

        let open = Period::open_ended(t(1, 0));
        assert!(open.contains(t(31, 0)));
        assert!(!open.contains(t(1, 0) - Duration::seconds(1)));
    }

    #[test]
    fn overlaps_is_symmetric() {
        let a = Period::closed(t(1, 0), t(10, 0)).unwrap();
        let b = Period::closed(t(5, 0), t(15, 0)).unwrap();
        let c = Period::closed(t(10, 0), t(15, 0)).unwrap();
        let open = Period::open_ended(t(12, 0));

        assert!(a.overlaps(&b) && b.overlaps(&a));
        // Half-open: [1, 10) and [10, 15) do not share an instant.
        assert!(!a.overlaps(&c) && !c.overlaps(&a));
        assert!(open.overlaps(&b) && b.overlaps(&open));
        assert!(!open.overlaps(&a) && !a.overlaps(&open));
    }

    #[test]
    fn whole_days_of_january() {
        let period = Period::closed(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        assert_eq!(period.whole_days(), Some(31));
        assert_eq!(Period::open_ended(t(1, 0)).whole_days(), None);
    }
}
