//! The correction engine.
//!
//! When a revised time series arrives for a period that was already
//! invoiced, the new version is settled in full and the difference against
//! the invoiced settlement becomes an adjustment settlement. Only lines
//! whose amount actually moved appear on the adjustment.

use {
    crate::calculator::{calculate, CalculationInput},
    domain::{
        money::Money,
        settlement::{Settlement, SettlementHeader, SettlementLine},
        DomainError, Result,
    },
    rust_decimal::Decimal,
};

/// Calculates the delta settlement for `input.time_series` against
/// `original`, which must be the invoiced settlement of the same period.
///
/// Running this with a time series identical to the one behind `original`
/// produces an adjustment with no lines and a zero total.
pub fn calculate_correction(
    input: &CalculationInput,
    original: &Settlement,
) -> Result<Settlement> {
    if input.time_series.period != original.period {
        return Err(DomainError::Validation(format!(
            "time series period does not match settlement {}",
            original.id
        )));
    }

    let full_new = calculate(input)?;

    let mut lines = Vec::new();
    for new_line in &full_new.lines {
        let original_line = original
            .lines
            .iter()
            .find(|line| line.source == new_line.source && line.price_id == new_line.price_id);
        let (original_amount, original_quantity) = match original_line {
            Some(line) => (line.amount, line.quantity),
            None => (Money::dkk(Decimal::ZERO), Decimal::ZERO),
        };

        let delta_amount = new_line.amount.checked_sub(original_amount)?;
        if delta_amount.is_zero() {
            continue;
        }
        let delta_quantity = new_line.quantity - original_quantity;
        // The recomputed quantity times unit price is the authoritative
        // delta; when the quantity did not move, the new unit price is
        // carried so the line stays explainable.
        let unit_price = if delta_quantity.is_zero() {
            new_line.unit_price
        } else {
            delta_amount.amount() / delta_quantity
        };
        lines.push(SettlementLine::new(
            new_line.source,
            new_line.price_id,
            format!("{} (justering)", new_line.description),
            delta_quantity,
            unit_price,
        ));
    }

    Settlement::correction(
        SettlementHeader {
            metering_point_id: input.time_series.metering_point_id,
            supply_id: input.supply_id,
            period: input.time_series.period,
            time_series_id: input.time_series.id,
            time_series_version: input.time_series.version,
            document_number: input.document_number,
            calculated_at: input.calculated_at,
        },
        input.time_series.total_energy() - original.total_energy,
        lines,
        original.id,
    )
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::calculator::tests::{
            constant_spots, hourly_series, january, january_charges, margins,
        },
        domain::{quantity::EnergyQuantity, settlement::SettlementLineSource},
        rust_decimal::Decimal,
        rust_decimal_macros::dec,
        uuid::Uuid,
    };

    fn settle(kwh_per_hour: Decimal) -> (Settlement, Uuid) {
        let period = january();
        let ts = hourly_series(period, kwh_per_hour);
        let charges = january_charges();
        let spots = constant_spots(period, dec!(0.50));
        let margins = margins();
        let supply_id = Uuid::new_v4();
        let input = CalculationInput {
            time_series: &ts,
            supply_id,
            datahub_prices: &charges,
            spot_prices: &spots,
            margins: &margins,
            pricing_model: domain::supply::PricingModel::SpotAddon,
            document_number: 1,
            calculated_at: period.end.unwrap(),
        };
        (calculate(&input).unwrap(), supply_id)
    }

    #[test]
    fn identical_series_yields_an_empty_correction() {
        let period = january();
        let (original, supply_id) = settle(dec!(1));
        let ts = hourly_series(period, dec!(1));
        let charges = january_charges();
        let spots = constant_spots(period, dec!(0.50));
        let margins = margins();
        let input = CalculationInput {
            time_series: &ts,
            supply_id,
            datahub_prices: &charges,
            spot_prices: &spots,
            margins: &margins,
            pricing_model: domain::supply::PricingModel::SpotAddon,
            document_number: 2,
            calculated_at: period.end.unwrap(),
        };

        let correction = calculate_correction(&input, &original).unwrap();
        assert!(correction.is_correction);
        assert_eq!(correction.previous_settlement_id, Some(original.id));
        assert!(correction.lines.is_empty());
        assert!(correction.total_amount.is_zero());
        assert_eq!(correction.total_energy, EnergyQuantity::ZERO);
    }

    #[test]
    fn meter_revision_down_by_ten_percent() {
        let period = january();
        let (original, supply_id) = settle(dec!(1));
        let ts = hourly_series(period, dec!(0.9));
        let charges = january_charges();
        let spots = constant_spots(period, dec!(0.50));
        let margins = margins();
        let input = CalculationInput {
            time_series: &ts,
            supply_id,
            datahub_prices: &charges,
            spot_prices: &spots,
            margins: &margins,
            pricing_model: domain::supply::PricingModel::SpotAddon,
            document_number: 2,
            calculated_at: period.end.unwrap(),
        };

        let correction = calculate_correction(&input, &original).unwrap();
        assert_eq!(correction.total_energy, EnergyQuantity::new(dec!(-74.4)));
        // The subscription did not move, so seven of the eight lines remain.
        assert_eq!(correction.lines.len(), 7);
        assert!(correction
            .lines
            .iter()
            .all(|line| line.description.ends_with("(justering)")));

        let spot = correction
            .lines
            .iter()
            .find(|line| line.source == SettlementLineSource::SpotPrice)
            .unwrap();
        assert_eq!(spot.quantity, dec!(-74.4));
        assert_eq!(spot.amount.amount(), dec!(-37.20));

        // -10 % of every energy-dependent line, exact to the øre.
        assert_eq!(correction.total_amount.amount(), dec!(-142.57));
    }

    #[test]
    fn mismatched_period_is_rejected() {
        use chrono::TimeZone;
        let (original, supply_id) = settle(dec!(1));
        let start = chrono::Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let period = domain::period::Period::closed(start, start + chrono::Duration::days(28)).unwrap();
        let ts = hourly_series(period, dec!(1));
        let input = CalculationInput {
            time_series: &ts,
            supply_id,
            datahub_prices: &[],
            spot_prices: &[],
            margins: &[],
            pricing_model: domain::supply::PricingModel::SpotAddon,
            document_number: 3,
            calculated_at: period.end.unwrap(),
        };
        assert!(calculate_correction(&input, &original).is_err());
    }
}
