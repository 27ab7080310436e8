//! Versioned metered-data streams.

use {
    crate::{
        error::{DomainError, Result},
        metering::{hour_bucket, QuantityQuality, Resolution},
        period::Period,
        quantity::EnergyQuantity,
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
    uuid::Uuid,
};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub quantity: EnergyQuantity,
    pub quality: QuantityQuality,
}

/// One version of the metered data for a metering point and period.
///
/// The hub revises readings by sending the whole period again; the previous
/// version is superseded and the new one becomes the latest. At most one
/// series per `(metering point, period)` is the latest.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub id: Uuid,
    pub metering_point_id: Uuid,
    pub period: Period,
    pub resolution: Resolution,
    pub version: i32,
    pub is_latest: bool,
    pub transaction_id: Option<String>,
    pub received_at: DateTime<Utc>,
    observations: Vec<Observation>,
}

impl TimeSeries {
    pub fn new(
        metering_point_id: Uuid,
        period: Period,
        resolution: Resolution,
        version: i32,
        transaction_id: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Result<Self> {
        if version < 1 {
            return Err(DomainError::Validation(format!(
                "time series version must be at least 1, got {version}"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            metering_point_id,
            period,
            resolution,
            version,
            is_latest: true,
            transaction_id,
            received_at,
            observations: Vec::new(),
        })
    }

    pub fn add_observation(
        &mut self,
        timestamp: DateTime<Utc>,
        quantity: EnergyQuantity,
        quality: QuantityQuality,
    ) -> Result<()> {
        if !self.period.contains(timestamp) {
            return Err(DomainError::Validation(format!(
                "observation at {timestamp} lies outside the series period"
            )));
        }
        if self.observations.iter().any(|o| o.timestamp == timestamp) {
            return Err(DomainError::IntegrityViolation(format!(
                "series already has an observation at {timestamp}"
            )));
        }
        self.observations.push(Observation {
            timestamp,
            quantity,
            quality,
        });
        self.observations.sort_by_key(|o| o.timestamp);
        Ok(())
    }

    /// Ascending by timestamp.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Irreversible; the replacement becomes the latest in the same
    /// transaction that persists this flag.
    pub fn supersede(&mut self) {
        self.is_latest = false;
    }

    pub fn total_energy(&self) -> EnergyQuantity {
        self.observations.iter().map(|o| o.quantity).sum()
    }

    /// Sums quantities per hour bucket. Used to line sub-hourly migration
    /// artefacts up against hourly billing data; no other aggregation
    /// exists.
    pub fn aggregate_hourly(&self) -> BTreeMap<DateTime<Utc>, EnergyQuantity> {
        let mut buckets: BTreeMap<DateTime<Utc>, EnergyQuantity> = BTreeMap::new();
        for o in &self.observations {
            let bucket = buckets.entry(hour_bucket(o.timestamp)).or_default();
            *bucket = *bucket + o.quantity;
        }
        buckets
    }
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::{Duration, TimeZone}, rust_decimal_macros::dec};

    fn series() -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        TimeSeries::new(
            Uuid::new_v4(),
            Period::closed(start, end).unwrap(),
            Resolution::Pt1h,
            1,
            Some("tx-1".to_owned()),
            end,
        )
        .unwrap()
    }

    #[test]
    fn version_must_be_positive() {
        let ts = series();
        assert!(TimeSeries::new(
            Uuid::new_v4(),
            ts.period,
            Resolution::Pt1h,
            0,
            None,
            ts.received_at,
        )
        .is_err());
    }

    #[test]
    fn observations_stay_inside_period_and_unique() {
        let mut ts = series();
        let t0 = ts.period.start;
        ts.add_observation(t0, EnergyQuantity::new(dec!(1)), QuantityQuality::Measured)
            .unwrap();
        assert!(ts
            .add_observation(t0, EnergyQuantity::new(dec!(2)), QuantityQuality::Measured)
            .is_err());
        assert!(ts
            .add_observation(
                t0 - Duration::hours(1),
                EnergyQuantity::new(dec!(1)),
                QuantityQuality::Measured,
            )
            .is_err());
    }

    #[test]
    fn observations_are_sorted_and_summed() {
        let mut ts = series();
        let t0 = ts.period.start;
        for offset in [3, 1, 2, 0] {
            ts.add_observation(
                t0 + Duration::hours(offset),
                EnergyQuantity::new(dec!(1.5)),
                QuantityQuality::Measured,
            )
            .unwrap();
        }
        let timestamps: Vec<_> = ts.observations().iter().map(|o| o.timestamp).collect();
        assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ts.total_energy().value(), dec!(6));
    }

    #[test]
    fn hourly_aggregation_of_quarter_data() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let mut ts = TimeSeries::new(
            Uuid::new_v4(),
            Period::closed(start, end).unwrap(),
            Resolution::Pt15m,
            1,
            None,
            end,
        )
        .unwrap();
        for quarter in 0..8 {
            ts.add_observation(
                start + Duration::minutes(15 * quarter),
                EnergyQuantity::new(dec!(0.25)),
                QuantityQuality::Measured,
            )
            .unwrap();
        }
        let buckets = ts.aggregate_hourly();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[&start].value(), dec!(1));
        assert_eq!(buckets[&(start + Duration::hours(1))].value(), dec!(1));
    }
}
