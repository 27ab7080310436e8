//! BRS-021 metered data ingest.
//!
//! The hub revises readings by resending the whole period. A resend for a
//! period we already hold supersedes the stored series and bumps the
//! version; the settlement scheduler notices invoiced periods with a newer
//! version and triggers corrections.

use {
    super::{Effect, HandlerOutcome},
    crate::state_machine::advance,
    chrono::{DateTime, NaiveDateTime, Utc},
    cim::Envelope,
    domain::{
        ids::Gsrn,
        metering::{MeteringPoint, QuantityQuality, Resolution},
        period::Period,
        process::{BrsProcess, ProcessRole, ProcessState, ProcessType},
        quantity::EnergyQuantity,
        timeseries::TimeSeries,
        DomainError, Result,
    },
    rust_decimal::Decimal,
    serde_json::Value,
    std::str::FromStr,
};

#[derive(Clone, Debug)]
pub struct MeteredDataSeries {
    pub gsrn: Gsrn,
    pub period: Period,
    pub resolution: Resolution,
    pub transaction_id: Option<String>,
    pub observations: Vec<(DateTime<Utc>, Decimal, QuantityQuality)>,
}

/// Extracts the measure data series from a `NotifyValidatedMeasureData`
/// envelope. Observation timestamps are derived from the interval start and
/// the 1-based point positions.
pub fn parse_series(envelope: &Envelope) -> Result<Vec<MeteredDataSeries>> {
    envelope.series.iter().map(parse_record).collect()
}

fn parse_record(
    record: &std::collections::BTreeMap<String, Value>,
) -> Result<MeteredDataSeries> {
    let gsrn = Gsrn::new(str_field(record, "marketEvaluationPoint.mRID")?)?;
    let period_value = record
        .get("Period")
        .ok_or_else(|| DomainError::Validation("series misses Period".to_owned()))?;

    let resolution: Resolution = nested_str(period_value, &["resolution"])?
        .parse()
        .map_err(|_| DomainError::Validation("unknown resolution".to_owned()))?;
    let start = parse_time(&nested_str(period_value, &["timeInterval", "start"])?)?;
    let end = parse_time(&nested_str(period_value, &["timeInterval", "end"])?)?;
    let period = Period::closed(start, end)?;
    let bucket = resolution.bucket().ok_or_else(|| {
        DomainError::Validation(format!("{resolution} is not a point resolution"))
    })?;

    let points = period_value
        .get("Point")
        .and_then(Value::as_array)
        .ok_or_else(|| DomainError::Validation("Period misses Point array".to_owned()))?;
    let mut observations = Vec::with_capacity(points.len());
    for point in points {
        let position = point
            .get("position")
            .and_then(Value::as_i64)
            .ok_or_else(|| DomainError::Validation("point misses position".to_owned()))?;
        if position < 1 {
            return Err(DomainError::Validation(format!(
                "point position {position} must be 1-based"
            )));
        }
        let offset = i32::try_from(position - 1).map_err(|_| {
            DomainError::Validation(format!("point position {position} is out of range"))
        })?;
        let quantity = point
            .get("quantity")
            .and_then(Value::as_str)
            .map(Decimal::from_str)
            .transpose()
            .map_err(|err| DomainError::Validation(format!("bad point quantity: {err}")))?
            .ok_or_else(|| DomainError::Validation("point misses quantity".to_owned()))?;
        let quality = match point.get("quality").and_then(Value::as_str) {
            Some(raw) => raw
                .parse()
                .map_err(|_| DomainError::Validation(format!("unknown quality {raw:?}")))?,
            None => QuantityQuality::Measured,
        };
        observations.push((start + bucket * offset, quantity, quality));
    }

    Ok(MeteredDataSeries {
        gsrn,
        period,
        resolution,
        transaction_id: record
            .get("mRID")
            .and_then(Value::as_str)
            .map(str::to_owned),
        observations,
    })
}

fn str_field<'a>(
    record: &'a std::collections::BTreeMap<String, Value>,
    key: &str,
) -> Result<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::Validation(format!("series misses {key}")))
}

fn nested_str(value: &Value, path: &[&str]) -> Result<String> {
    let mut current = value;
    for segment in path {
        current = current.get(segment).ok_or_else(|| {
            DomainError::Validation(format!("series misses Period.{}", path.join(".")))
        })?;
    }
    current
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| DomainError::Validation(format!("Period.{} must be a string", path.join("."))))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
        .map(|naive| naive.and_utc())
        .map_err(|err| DomainError::Validation(format!("bad timestamp {raw:?}: {err}")))
}

/// Stores one series. When the latest stored series covers the same period,
/// it is superseded and the new series takes its version plus one.
pub fn handle_metered_data(
    metering_point: &MeteringPoint,
    latest: Option<&mut TimeSeries>,
    series: MeteredDataSeries,
    received_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    if series.gsrn != metering_point.gsrn {
        return Err(DomainError::Validation(format!(
            "series GSRN {} does not match metering point {}",
            series.gsrn, metering_point.gsrn
        )));
    }

    let mut effects = Vec::new();
    let version = match latest {
        Some(previous) if previous.period == series.period => {
            previous.supersede();
            effects.push(Effect::TimeSeriesSuperseded {
                time_series_id: previous.id,
            });
            previous.version + 1
        }
        _ => 1,
    };

    let mut time_series = TimeSeries::new(
        metering_point.id,
        series.period,
        series.resolution,
        version,
        series.transaction_id,
        received_at,
    )?;
    for (timestamp, quantity, quality) in series.observations {
        time_series.add_observation(timestamp, EnergyQuantity::new(quantity), quality)?;
    }
    effects.push(Effect::TimeSeriesCreated(time_series));

    let mut process = BrsProcess::new(
        ProcessType::Brs021,
        ProcessRole::Recipient,
        Some(series.gsrn),
        None,
        None,
        now,
    );
    advance(&mut process, ProcessState::Completed, "metered data stored", now)?;

    let mut outcome = HandlerOutcome::new(process);
    outcome.effects = effects;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::TimeZone,
        cim::{envelope::record, DocumentType},
        domain::{
            ids::GlnNumber,
            metering::{
                MeteringPointCategory, MeteringPointType, SettlementMethod,
            },
        },
        rust_decimal_macros::dec,
        serde_json::json,
        uuid::Uuid,
    };

    fn gln(value: &str) -> GlnNumber {
        GlnNumber::from_trusted(value).unwrap()
    }

    fn metering_point() -> MeteringPoint {
        MeteringPoint::new(
            Gsrn::new("571313180400013562").unwrap(),
            MeteringPointType::Consumption,
            MeteringPointCategory::Physical,
            SettlementMethod::Flex,
            Resolution::Pt1h,
            "DK1".to_owned(),
            gln("5790000432769"),
        )
        .unwrap()
    }

    fn envelope(points: usize) -> Envelope {
        let point_values: Vec<Value> = (1..=points)
            .map(|position| {
                json!({
                    "position": position,
                    "quantity": "1.000",
                    "quality": "Measured",
                })
            })
            .collect();
        Envelope::create(
            DocumentType::NotifyValidatedMeasureData,
            ProcessType::Brs021.process_code(),
            gln("5790000432769"),
        )
        .receiver(gln("5790000432752"))
        .created_at(Utc.with_ymd_and_hms(2026, 2, 1, 1, 0, 0).unwrap())
        .add_series(record([
            ("mRID", json!("tx-21")),
            ("marketEvaluationPoint.mRID", json!("571313180400013562")),
            (
                "Period",
                json!({
                    "resolution": "PT1H",
                    "timeInterval": {
                        "start": "2026-01-01T00:00:00Z",
                        "end": "2026-02-01T00:00:00Z",
                    },
                    "Point": point_values,
                }),
            ),
        ]))
        .build()
        .unwrap()
    }

    #[test]
    fn parses_positions_into_timestamps() {
        let series = parse_series(&envelope(744)).unwrap();
        assert_eq!(series.len(), 1);
        let series = &series[0];
        assert_eq!(series.observations.len(), 744);
        assert_eq!(
            series.observations[0].0,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            series.observations[743].0,
            Utc.with_ymd_and_hms(2026, 1, 31, 23, 0, 0).unwrap()
        );
        assert_eq!(series.transaction_id.as_deref(), Some("tx-21"));
    }

    #[test]
    fn first_series_gets_version_one() {
        let mp = metering_point();
        let series = parse_series(&envelope(744)).unwrap().remove(0);
        let now = Utc::now();

        let outcome = handle_metered_data(&mp, None, series, now, now).unwrap();
        let created = outcome
            .effects
            .iter()
            .find_map(|effect| match effect {
                Effect::TimeSeriesCreated(ts) => Some(ts),
                _ => None,
            })
            .unwrap();
        assert_eq!(created.version, 1);
        assert!(created.is_latest);
        assert_eq!(created.total_energy().value(), dec!(744));
    }

    #[test]
    fn resend_supersedes_and_bumps_the_version() {
        let mp = metering_point();
        let now = Utc::now();
        let first = parse_series(&envelope(744)).unwrap().remove(0);
        let outcome = handle_metered_data(&mp, None, first, now, now).unwrap();
        let mut stored = match outcome.effects.into_iter().next().unwrap() {
            Effect::TimeSeriesCreated(ts) => ts,
            effect => panic!("unexpected effect {effect:?}"),
        };

        let second = parse_series(&envelope(744)).unwrap().remove(0);
        let outcome = handle_metered_data(&mp, Some(&mut stored), second, now, now).unwrap();

        assert!(!stored.is_latest);
        assert!(matches!(
            outcome.effects[0],
            Effect::TimeSeriesSuperseded { time_series_id } if time_series_id == stored.id
        ));
        let created = match &outcome.effects[1] {
            Effect::TimeSeriesCreated(ts) => ts,
            effect => panic!("unexpected effect {effect:?}"),
        };
        assert_eq!(created.version, 2);
    }

    #[test]
    fn foreign_gsrn_is_rejected() {
        let mp = metering_point();
        let mut series = parse_series(&envelope(1)).unwrap().remove(0);
        series.gsrn = Gsrn::new("571313180400013579").unwrap();
        let now = Utc::now();
        assert!(handle_metered_data(&mp, None, series, now, now).is_err());
    }
}
