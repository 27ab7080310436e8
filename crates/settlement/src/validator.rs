//! Pricing completeness checks.
//!
//! The calculator runs no matter what and silently treats missing rates as
//! zero contributions. These checks run before a settlement may be marked
//! invoiced: every open issue they produce has to be resolved or dismissed
//! first.

use {
    domain::{
        period::Period,
        price::{PriceCategory, PriceType, PriceWithPoints},
        settlement::{IssueType, SettlementIssue},
    },
    uuid::Uuid,
};

/// Every category a fully priced consumption metering point carries.
pub const REQUIRED_CATEGORIES: [PriceCategory; 7] = [
    PriceCategory::SpotPris,
    PriceCategory::Nettarif,
    PriceCategory::Systemtarif,
    PriceCategory::Transmissionstarif,
    PriceCategory::Elafgift,
    PriceCategory::Balancetarif,
    PriceCategory::LeverandoerTillaeg,
];

/// Checks that the actively linked prices cover all required categories and
/// that each of them resolves to a value at the start of the period. One
/// open issue per missing item.
pub fn validate_pricing(
    metering_point_id: Uuid,
    period: Period,
    linked_prices: &[PriceWithPoints],
) -> Vec<SettlementIssue> {
    let mut issues = Vec::new();

    for category in REQUIRED_CATEGORIES {
        if !linked_prices
            .iter()
            .any(|price| price.price().category == category)
        {
            issues.push(SettlementIssue::open(
                metering_point_id,
                period,
                IssueType::MissingPriceCategory,
                category.display_name().to_owned(),
            ));
        }
    }

    for price in linked_prices {
        let resolvable = match price.price().price_type {
            PriceType::Subscription => !price.points().is_empty(),
            PriceType::Tariff => price.price_at(period.start).is_some(),
            // Fees are billed on events, never during periodic settlement.
            PriceType::Fee => true,
        };
        if !resolvable {
            issues.push(SettlementIssue::open(
                metering_point_id,
                period,
                IssueType::MissingPricePoints,
                format!(
                    "{} ({}) has no value at {}",
                    price.price().description,
                    price.price().charge_id,
                    period.start
                ),
            ));
        }
    }

    issues
}
