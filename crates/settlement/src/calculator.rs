//! The settlement calculator.
//!
//! Takes everything it needs as values and produces a settlement whose line
//! amounts reproduce the invoice total exactly. Amounts are rounded once per
//! line; the settlement total sums the already-rounded lines.

use {
    chrono::{DateTime, Duration, Utc},
    domain::{
        metering::Resolution,
        money::Money,
        price::{PriceType, PriceWithPoints, SpotPrice},
        settlement::{Settlement, SettlementHeader, SettlementLine, SettlementLineSource},
        supply::PricingModel,
        timeseries::TimeSeries,
        DomainError, Result,
    },
    itertools::Itertools,
    rust_decimal::Decimal,
    std::collections::BTreeMap,
    uuid::Uuid,
};

/// A margin in force for the settlement period: the base product's plus any
/// concurrent addons. The combined rate is the sum over all entries.
#[derive(Clone, Debug)]
pub struct ActiveMargin {
    pub name: String,
    pub price_dkk_per_kwh: Decimal,
}

pub struct CalculationInput<'a> {
    pub time_series: &'a TimeSeries,
    pub supply_id: Uuid,
    pub datahub_prices: &'a [PriceWithPoints],
    pub spot_prices: &'a [SpotPrice],
    pub margins: &'a [ActiveMargin],
    pub pricing_model: PricingModel,
    pub document_number: i64,
    pub calculated_at: DateTime<Utc>,
}

/// Calculates the settlement for one time series.
///
/// Line order is deterministic: one line per DataHub price in the order
/// given, then the electricity lines (spot before margin). Observations are
/// processed ascending, which `TimeSeries` already guarantees.
pub fn calculate(input: &CalculationInput) -> Result<Settlement> {
    let ts = input.time_series;
    if ts.observations().is_empty() {
        return Err(DomainError::Validation(
            "cannot settle an empty time series".to_owned(),
        ));
    }

    let mut lines = Vec::new();
    for price in input.datahub_prices {
        match price.price().price_type {
            PriceType::Tariff => lines.push(tariff_line(ts, price)),
            PriceType::Subscription => lines.push(subscription_line(ts, price)),
            // Fees are event driven and billed outside periodic settlement.
            PriceType::Fee => (),
        }
    }

    match input.pricing_model {
        PricingModel::SpotAddon => {
            lines.push(spot_line(ts, input.spot_prices));
            if !input.margins.is_empty() {
                lines.push(margin_line(ts, input.margins, None));
            }
        }
        PricingModel::Fixed => {
            lines.push(margin_line(ts, input.margins, Some("Elpris (fast)")));
        }
    }

    Settlement::calculated(
        SettlementHeader {
            metering_point_id: ts.metering_point_id,
            supply_id: input.supply_id,
            period: ts.period,
            time_series_id: ts.id,
            time_series_version: ts.version,
            document_number: input.document_number,
            calculated_at: input.calculated_at,
        },
        ts.total_energy(),
        lines,
    )
}

fn tariff_line(ts: &TimeSeries, price: &PriceWithPoints) -> SettlementLine {
    // A PT15M-resolved charge applied to an hourly series is averaged over
    // the hour; every other combination uses the step function directly.
    let average_per_hour = ts.resolution == Resolution::Pt1h
        && price.price().price_resolution == Some(Resolution::Pt15m);

    let mut total = Decimal::ZERO;
    let mut quantity = Decimal::ZERO;
    for observation in ts.observations() {
        let rate = if average_per_hour {
            price.average_price_in_hour(observation.timestamp)
        } else {
            price.price_at(observation.timestamp)
        };
        // No resolvable rate: the observation contributes nothing, not even
        // to the line quantity. The validator owns completeness.
        let Some(rate) = rate else { continue };
        total += observation.quantity.value() * rate;
        quantity += observation.quantity.value();
    }

    let unit_price = if quantity.is_zero() {
        Decimal::ZERO
    } else {
        total / quantity
    };
    SettlementLine::with_amount(
        SettlementLineSource::DataHubCharge,
        Some(price.price().id),
        price.price().description.clone(),
        quantity,
        unit_price,
        Money::dkk(total),
    )
}

fn subscription_line(ts: &TimeSeries, price: &PriceWithPoints) -> SettlementLine {
    // Subscriptions bill per day. Open-ended periods only occur for
    // migration artefacts and fall back to a 30-day month.
    let days = ts.period.whole_days().unwrap_or(30);
    let daily_rate = price.price_at(ts.period.start).unwrap_or(Decimal::ZERO);
    SettlementLine::new(
        SettlementLineSource::DataHubCharge,
        Some(price.price().id),
        price.price().description.clone(),
        Decimal::from(days),
        daily_rate,
    )
}

fn spot_line(ts: &TimeSeries, spot_prices: &[SpotPrice]) -> SettlementLine {
    let by_time: BTreeMap<DateTime<Utc>, Decimal> = spot_prices
        .iter()
        .map(|spot| (spot.timestamp, spot.price_dkk_per_kwh))
        .collect();

    let mut total = Decimal::ZERO;
    let mut quantity = Decimal::ZERO;
    for observation in ts.observations() {
        let Some(rate) = spot_rate(&by_time, observation.timestamp, ts.resolution) else {
            continue;
        };
        total += observation.quantity.value() * rate;
        quantity += observation.quantity.value();
    }

    let unit_price = if quantity.is_zero() {
        Decimal::ZERO
    } else {
        total / quantity
    };
    SettlementLine::with_amount(
        SettlementLineSource::SpotPrice,
        None,
        "Spotpris".to_owned(),
        quantity,
        unit_price,
        Money::dkk(total),
    )
}

/// The spot rate for one observation. Hourly series average the four
/// quarter-hour spots inside the hour; absent quarters are not counted.
fn spot_rate(
    by_time: &BTreeMap<DateTime<Utc>, Decimal>,
    t: DateTime<Utc>,
    resolution: Resolution,
) -> Option<Decimal> {
    if resolution == Resolution::Pt1h {
        let quarters: Vec<Decimal> = (0..4)
            .filter_map(|q| by_time.get(&(t + Duration::minutes(15 * q))).copied())
            .collect();
        if quarters.is_empty() {
            return None;
        }
        Some(quarters.iter().sum::<Decimal>() / Decimal::from(quarters.len() as u64))
    } else {
        by_time.get(&t).copied()
    }
}

fn margin_line(
    ts: &TimeSeries,
    margins: &[ActiveMargin],
    description_override: Option<&str>,
) -> SettlementLine {
    let rate: Decimal = margins.iter().map(|m| m.price_dkk_per_kwh).sum();
    let description = match description_override {
        Some(description) => description.to_owned(),
        None if margins.is_empty() => "Leverandørtillæg".to_owned(),
        None => margins.iter().map(|m| m.name.as_str()).join(" + "),
    };
    SettlementLine::new(
        SettlementLineSource::SupplierMargin,
        None,
        description,
        ts.total_energy().value(),
        rate,
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        chrono::TimeZone,
        domain::{
            ids::GlnNumber,
            metering::QuantityQuality,
            period::Period,
            price::{Price, PriceArea, PriceCategory},
            quantity::EnergyQuantity,
        },
        rust_decimal_macros::dec,
    };

    pub(crate) fn january() -> Period {
        Period::closed(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    pub(crate) fn hourly_series(period: Period, kwh_per_hour: Decimal) -> TimeSeries {
        let mut ts = TimeSeries::new(
            Uuid::new_v4(),
            period,
            Resolution::Pt1h,
            1,
            None,
            period.end.unwrap(),
        )
        .unwrap();
        let hours = (period.end.unwrap() - period.start).num_hours();
        for hour in 0..hours {
            ts.add_observation(
                period.start + Duration::hours(hour),
                EnergyQuantity::new(kwh_per_hour),
                QuantityQuality::Measured,
            )
            .unwrap();
        }
        ts
    }

    pub(crate) fn charge(
        category: PriceCategory,
        price_type: PriceType,
        description: &str,
        rate: Decimal,
        at: chrono::DateTime<Utc>,
    ) -> PriceWithPoints {
        let mut price = Price::new(
            format!("{category:?}-1"),
            GlnNumber::from_trusted("5790000432752").unwrap(),
            price_type,
            description.to_owned(),
            Period::open_ended(at),
            false,
            Some(Resolution::Pt1h),
            false,
            true,
            category,
        )
        .unwrap();
        price.add_price_point(at, rate).unwrap();
        PriceWithPoints::new(price, None)
    }

    pub(crate) fn constant_spots(period: Period, rate: Decimal) -> Vec<SpotPrice> {
        let hours = (period.end.unwrap() - period.start).num_hours();
        (0..hours)
            .map(|hour| SpotPrice {
                price_area: PriceArea::Dk1,
                timestamp: period.start + Duration::hours(hour),
                price_dkk_per_kwh: rate,
            })
            .collect()
    }

    pub(crate) fn january_charges() -> Vec<PriceWithPoints> {
        let start = january().start;
        vec![
            charge(PriceCategory::Nettarif, PriceType::Tariff, "Nettarif C", dec!(0.40), start),
            charge(PriceCategory::Systemtarif, PriceType::Tariff, "Systemtarif", dec!(0.054), start),
            charge(
                PriceCategory::Transmissionstarif,
                PriceType::Tariff,
                "Transmissionstarif",
                dec!(0.049),
                start,
            ),
            charge(PriceCategory::Elafgift, PriceType::Tariff, "Elafgift", dec!(0.761), start),
            charge(
                PriceCategory::Balancetarif,
                PriceType::Tariff,
                "Balancetarif",
                dec!(0.00229),
                start,
            ),
            charge(
                PriceCategory::NetAbonnement,
                PriceType::Subscription,
                "Net abonnement C",
                dec!(21.56),
                start,
            ),
        ]
    }

    pub(crate) fn margins() -> Vec<ActiveMargin> {
        vec![ActiveMargin {
            name: "Spot Basis".to_owned(),
            price_dkk_per_kwh: dec!(0.15),
        }]
    }

    #[test]
    fn nominal_january_settlement() {
        let period = january();
        let ts = hourly_series(period, dec!(1));
        let charges = january_charges();
        let spots = constant_spots(period, dec!(0.50));
        let margins = margins();
        let input = CalculationInput {
            time_series: &ts,
            supply_id: Uuid::new_v4(),
            datahub_prices: &charges,
            spot_prices: &spots,
            margins: &margins,
            pricing_model: PricingModel::SpotAddon,
            document_number: 1,
            calculated_at: period.end.unwrap(),
        };

        let settlement = calculate(&input).unwrap();
        assert_eq!(settlement.total_energy, EnergyQuantity::new(dec!(744)));
        assert_eq!(settlement.lines.len(), 8);

        let amounts: Vec<Decimal> = settlement.lines.iter().map(|l| l.amount.amount()).collect();
        assert_eq!(
            amounts,
            vec![
                dec!(297.60), // Nettarif
                dec!(40.18),  // Systemtarif
                dec!(36.46),  // Transmissionstarif
                dec!(566.18), // Elafgift
                dec!(1.70),   // Balancetarif
                dec!(668.36), // Net abonnement, 31 days at 21.56
                dec!(372.00), // Spotpris
                dec!(111.60), // margin
            ]
        );
        let tariff_quantities: Vec<Decimal> =
            settlement.lines[..5].iter().map(|l| l.quantity).collect();
        assert!(tariff_quantities.iter().all(|q| *q == dec!(744)));
        assert_eq!(settlement.lines[5].quantity, dec!(31));
        assert_eq!(settlement.total_amount.amount(), dec!(2094.08));
    }

    #[test]
    fn calculation_is_deterministic() {
        let period = january();
        let ts = hourly_series(period, dec!(1.234));
        let charges = january_charges();
        let spots = constant_spots(period, dec!(0.50));
        let margins = margins();
        let input = CalculationInput {
            time_series: &ts,
            supply_id: Uuid::new_v4(),
            datahub_prices: &charges,
            spot_prices: &spots,
            margins: &margins,
            pricing_model: PricingModel::SpotAddon,
            document_number: 1,
            calculated_at: period.end.unwrap(),
        };

        let first = calculate(&input).unwrap();
        let second = calculate(&input).unwrap();
        assert_eq!(first.total_amount, second.total_amount);
        assert_eq!(first.total_energy, second.total_energy);
        for (a, b) in first.lines.iter().zip(&second.lines) {
            assert_eq!((a.quantity, a.unit_price, a.amount), (b.quantity, b.unit_price, b.amount));
        }
    }

    #[test]
    fn empty_time_series_is_rejected() {
        let period = january();
        let ts = TimeSeries::new(
            Uuid::new_v4(),
            period,
            Resolution::Pt1h,
            1,
            None,
            period.end.unwrap(),
        )
        .unwrap();
        let input = CalculationInput {
            time_series: &ts,
            supply_id: Uuid::new_v4(),
            datahub_prices: &[],
            spot_prices: &[],
            margins: &[],
            pricing_model: PricingModel::SpotAddon,
            document_number: 1,
            calculated_at: period.end.unwrap(),
        };
        assert!(matches!(calculate(&input), Err(DomainError::Validation(_))));
    }

    #[test]
    fn quarter_spots_average_into_hourly_observations() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let period = Period::closed(start, start + Duration::hours(1)).unwrap();
        let mut ts = TimeSeries::new(
            Uuid::new_v4(),
            period,
            Resolution::Pt1h,
            1,
            None,
            period.end.unwrap(),
        )
        .unwrap();
        ts.add_observation(start, EnergyQuantity::new(dec!(1)), QuantityQuality::Measured)
            .unwrap();
        let spots: Vec<SpotPrice> = [dec!(0.40), dec!(0.42), dec!(0.44), dec!(0.46)]
            .into_iter()
            .enumerate()
            .map(|(quarter, rate)| SpotPrice {
                price_area: PriceArea::Dk1,
                timestamp: start + Duration::minutes(15 * i64::try_from(quarter).unwrap()),
                price_dkk_per_kwh: rate,
            })
            .collect();
        let input = CalculationInput {
            time_series: &ts,
            supply_id: Uuid::new_v4(),
            datahub_prices: &[],
            spot_prices: &spots,
            margins: &[],
            pricing_model: PricingModel::SpotAddon,
            document_number: 1,
            calculated_at: period.end.unwrap(),
        };

        let settlement = calculate(&input).unwrap();
        let spot = &settlement.lines[0];
        assert_eq!(spot.source, SettlementLineSource::SpotPrice);
        assert_eq!(spot.amount.amount(), dec!(0.43));
    }

    #[test]
    fn missing_spots_leave_a_zero_amount_line() {
        let period = january();
        let ts = hourly_series(period, dec!(1));
        let margins = margins();
        let input = CalculationInput {
            time_series: &ts,
            supply_id: Uuid::new_v4(),
            datahub_prices: &[],
            spot_prices: &[],
            margins: &margins,
            pricing_model: PricingModel::SpotAddon,
            document_number: 1,
            calculated_at: period.end.unwrap(),
        };

        let settlement = calculate(&input).unwrap();
        assert_eq!(settlement.lines[0].source, SettlementLineSource::SpotPrice);
        assert!(settlement.lines[0].amount.is_zero());
        assert_eq!(settlement.lines[1].amount.amount(), dec!(111.60));
    }

    #[test]
    fn fixed_pricing_emits_a_single_electricity_line() {
        let period = january();
        let ts = hourly_series(period, dec!(1));
        let margins = vec![ActiveMargin {
            name: "Fastpris 24".to_owned(),
            price_dkk_per_kwh: dec!(1.05),
        }];
        let input = CalculationInput {
            time_series: &ts,
            supply_id: Uuid::new_v4(),
            datahub_prices: &[],
            spot_prices: &[],
            margins: &margins,
            pricing_model: PricingModel::Fixed,
            document_number: 1,
            calculated_at: period.end.unwrap(),
        };

        let settlement = calculate(&input).unwrap();
        assert_eq!(settlement.lines.len(), 1);
        let line = &settlement.lines[0];
        assert_eq!(line.source, SettlementLineSource::SupplierMargin);
        assert_eq!(line.description, "Elpris (fast)");
        assert_eq!(line.amount.amount(), dec!(781.20));
    }

    #[test]
    fn unpriced_observations_do_not_count_toward_line_quantity() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let period = Period::closed(start, start + Duration::hours(4)).unwrap();
        let mut ts = TimeSeries::new(
            Uuid::new_v4(),
            period,
            Resolution::Pt1h,
            1,
            None,
            period.end.unwrap(),
        )
        .unwrap();
        for hour in 0..4 {
            ts.add_observation(
                start + Duration::hours(hour),
                EnergyQuantity::new(dec!(1)),
                QuantityQuality::Measured,
            )
            .unwrap();
        }
        // The tariff only becomes effective two hours into the period.
        let charges = vec![charge(
            PriceCategory::Nettarif,
            PriceType::Tariff,
            "Nettarif C",
            dec!(0.50),
            start + Duration::hours(2),
        )];
        let input = CalculationInput {
            time_series: &ts,
            supply_id: Uuid::new_v4(),
            datahub_prices: &charges,
            spot_prices: &[],
            margins: &[],
            pricing_model: PricingModel::SpotAddon,
            document_number: 1,
            calculated_at: period.end.unwrap(),
        };

        let settlement = calculate(&input).unwrap();
        let line = &settlement.lines[0];
        assert_eq!(line.quantity, dec!(2));
        assert_eq!(line.amount.amount(), dec!(1.00));
        assert_eq!(line.unit_price, dec!(0.50));
    }
}
