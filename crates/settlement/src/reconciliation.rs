//! Reconciliation of our settlements against the hub's wholesale
//! settlement.

use {
    domain::{
        money::Money,
        period::Period,
        reconciliation::{
            ReconciliationLine, ReconciliationResult, ReconciliationStatus, WholesaleSettlement,
        },
        settlement::{Settlement, SettlementLineSource},
        Result,
    },
    rust_decimal::{Decimal, RoundingStrategy},
    std::collections::{BTreeMap, HashMap},
    uuid::Uuid,
};

/// Anything within half a percent of the hub's total counts as balanced.
const BALANCED_THRESHOLD_PERCENT: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Fallback charge key for lines we cannot tie to a hub charge id.
const UNMATCHED_CHARGE_KEY: &str = "D03";

/// Compares our per-charge settlement totals for `(grid_area, period)` with
/// the hub's wholesale settlement for the same slice.
///
/// Our datahub-charge lines are matched on the charge id behind their linked
/// price; lines without one (spot, margin, migrated) fall back to an exact
/// description match. Everything unmatched on either side stays visible as
/// its own line.
pub fn reconcile(
    grid_area: &str,
    period: Period,
    our_settlements: &[Settlement],
    charge_id_by_price: &HashMap<Uuid, String>,
    hub: &WholesaleSettlement,
) -> Result<ReconciliationResult> {
    let zero = Money::dkk(Decimal::ZERO);

    // Our lines, grouped by hub charge id where we know it and by
    // description where we do not.
    let mut ours_by_charge: BTreeMap<String, (String, Money)> = BTreeMap::new();
    let mut ours_by_description: BTreeMap<String, Money> = BTreeMap::new();
    for settlement in our_settlements {
        for line in &settlement.lines {
            let charge_id = match line.source {
                SettlementLineSource::DataHubCharge => line
                    .price_id
                    .and_then(|price_id| charge_id_by_price.get(&price_id).cloned()),
                SettlementLineSource::SpotPrice | SettlementLineSource::SupplierMargin => None,
            };
            match charge_id {
                Some(charge_id) => {
                    let entry = ours_by_charge
                        .entry(charge_id)
                        .or_insert_with(|| (line.description.clone(), zero));
                    entry.1 = entry.1.checked_add(line.amount)?;
                }
                None => {
                    let entry = ours_by_description
                        .entry(line.description.clone())
                        .or_insert(zero);
                    *entry = entry.checked_add(line.amount)?;
                }
            }
        }
    }

    let mut lines = Vec::new();
    for hub_line in &hub.lines {
        let ours = match ours_by_charge.remove(&hub_line.charge_id) {
            Some((_, amount)) => amount,
            None => ours_by_description
                .remove(&hub_line.description)
                .unwrap_or(zero),
        };
        lines.push(ReconciliationLine {
            charge_key: hub_line.charge_id.clone(),
            description: hub_line.description.clone(),
            our_amount: ours,
            datahub_amount: hub_line.amount,
            difference: ours.checked_sub(hub_line.amount)?,
        });
    }
    for (charge_id, (description, amount)) in ours_by_charge {
        lines.push(ReconciliationLine {
            charge_key: charge_id,
            description,
            our_amount: amount,
            datahub_amount: zero,
            difference: amount,
        });
    }
    for (description, amount) in ours_by_description {
        lines.push(ReconciliationLine {
            charge_key: UNMATCHED_CHARGE_KEY.to_owned(),
            description,
            our_amount: amount,
            datahub_amount: zero,
            difference: amount,
        });
    }

    let mut our_total = zero;
    let mut datahub_total = zero;
    for line in &lines {
        our_total = our_total.checked_add(line.our_amount)?;
        datahub_total = datahub_total.checked_add(line.datahub_amount)?;
    }
    let difference = our_total.checked_sub(datahub_total)?;

    let difference_percent = if !datahub_total.is_zero() {
        (difference.amount() / datahub_total.amount() * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
    } else if difference.is_zero() {
        Decimal::ZERO
    } else {
        Decimal::ONE_HUNDRED
    };
    let status = if difference_percent.abs() <= BALANCED_THRESHOLD_PERCENT {
        ReconciliationStatus::Balanced
    } else {
        ReconciliationStatus::Deviating
    };

    Ok(ReconciliationResult {
        id: Uuid::new_v4(),
        grid_area: grid_area.to_owned(),
        period,
        our_total_dkk: our_total,
        datahub_total_dkk: datahub_total,
        difference_dkk: difference,
        difference_percent,
        status,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::calculator::{
            calculate,
            tests::{constant_spots, hourly_series, january, january_charges, margins},
            CalculationInput,
        },
        chrono::{TimeZone, Utc},
        domain::{reconciliation::WholesaleSettlementLine, supply::PricingModel},
        rust_decimal_macros::dec,
    };

    fn our_settlement() -> (Settlement, HashMap<Uuid, String>) {
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
        let charge_ids = charges
            .iter()
            .map(|price| (price.price().id, price.price().charge_id.clone()))
            .collect();
        (settlement, charge_ids)
    }

    fn hub(lines: Vec<WholesaleSettlementLine>) -> WholesaleSettlement {
        let mut total = Money::dkk(dec!(0));
        for line in &lines {
            total = total.checked_add(line.amount).unwrap();
        }
        WholesaleSettlement {
            id: Uuid::new_v4(),
            grid_area: "DK1".to_owned(),
            period: january(),
            received_at: Utc.with_ymd_and_hms(2026, 2, 5, 0, 0, 0).unwrap(),
            total_amount: total,
            lines,
        }
    }

    fn hub_line(charge_id: &str, description: &str, amount: Decimal) -> WholesaleSettlementLine {
        WholesaleSettlementLine {
            charge_id: charge_id.to_owned(),
            charge_owner: "5790000432752".to_owned(),
            description: description.to_owned(),
            quantity: dec!(744),
            amount: Money::dkk(amount),
        }
    }

    #[test]
    fn matching_totals_are_balanced() {
        let (settlement, charge_ids) = our_settlement();
        let hub = hub(vec![
            hub_line("Nettarif-1", "Nettarif C", dec!(297.60)),
            hub_line("Systemtarif-1", "Systemtarif", dec!(40.18)),
            hub_line("Transmissionstarif-1", "Transmissionstarif", dec!(36.46)),
            hub_line("Elafgift-1", "Elafgift", dec!(566.18)),
            hub_line("Balancetarif-1", "Balancetarif", dec!(1.70)),
            hub_line("NetAbonnement-1", "Net abonnement C", dec!(668.36)),
        ]);

        let result = reconcile(
            "DK1",
            january(),
            std::slice::from_ref(&settlement),
            &charge_ids,
            &hub,
        )
        .unwrap();

        // The charge lines balance; spot and margin are ours alone and show
        // up as unmatched.
        assert_eq!(result.datahub_total_dkk.amount(), dec!(1610.48));
        let charge_lines: Vec<_> = result
            .lines
            .iter()
            .filter(|line| line.charge_key != UNMATCHED_CHARGE_KEY)
            .collect();
        assert_eq!(charge_lines.len(), 6);
        assert!(charge_lines.iter().all(|line| line.difference.is_zero()));
    }

    #[test]
    fn deviation_beyond_half_a_percent_is_flagged() {
        let (settlement, charge_ids) = our_settlement();
        // Keep only the net tariff and understate it by 2 %.
        let hub = hub(vec![hub_line("Nettarif-1", "Nettarif C", dec!(291.65))]);

        let result = reconcile(
            "DK1",
            january(),
            std::slice::from_ref(&settlement),
            &charge_ids,
            &hub,
        )
        .unwrap();

        assert_eq!(result.status, ReconciliationStatus::Deviating);
        let net = result
            .lines
            .iter()
            .find(|line| line.charge_key == "Nettarif-1")
            .unwrap();
        assert_eq!(net.difference.amount(), dec!(5.95));
        // The grand difference is the sum of the line deltas.
        let sum: Decimal = result.lines.iter().map(|l| l.difference.amount()).sum();
        assert_eq!(result.difference_dkk.amount(), sum);
    }

    #[test]
    fn empty_against_empty_is_balanced() {
        let hub = hub(Vec::new());
        let result = reconcile("DK1", january(), &[], &HashMap::new(), &hub).unwrap();
        assert_eq!(result.status, ReconciliationStatus::Balanced);
        assert!(result.difference_percent.is_zero());
    }
}
