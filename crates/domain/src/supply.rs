//! Supplies and products.
//!
//! A supply is the time-bounded contract tying a customer to a metering
//! point under one of our supplier identities. Products determine how the
//! electricity itself is priced; regulated charges always come on top.

use {
    crate::{
        error::{DomainError, Result},
        period::Period,
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Supply {
    pub id: Uuid,
    pub metering_point_id: Uuid,
    pub customer_id: Uuid,
    pub period: Period,
}

impl Supply {
    pub fn new(metering_point_id: Uuid, customer_id: Uuid, period: Period) -> Self {
        Self {
            id: Uuid::new_v4(),
            metering_point_id,
            customer_id,
            period,
        }
    }

    pub fn starting_at(metering_point_id: Uuid, customer_id: Uuid, start: DateTime<Utc>) -> Self {
        Self::new(metering_point_id, customer_id, Period::open_ended(start))
    }

    pub fn is_open(&self) -> bool {
        self.period.is_open()
    }

    pub fn end_at(&mut self, end: DateTime<Utc>) -> Result<()> {
        if !self.period.is_open() {
            return Err(DomainError::Conflict(format!(
                "supply {} is already ended",
                self.id
            )));
        }
        self.period = self.period.closed_at(end)?;
        Ok(())
    }
}

/// How the electricity cost line is computed for a supply.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum PricingModel {
    /// Spot price plus the supplier margin.
    SpotAddon,
    /// A fixed price per kWh, the margin alone carries the whole rate.
    Fixed,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SupplierProduct {
    pub id: Uuid,
    pub supplier_identity_id: Uuid,
    pub name: String,
    pub pricing_model: PricingModel,
    pub is_active: bool,
}

impl SupplierProduct {
    pub fn new(
        supplier_identity_id: Uuid,
        name: String,
        pricing_model: PricingModel,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(DomainError::Validation(
                "product name must be set".to_owned(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            supplier_identity_id,
            name,
            pricing_model,
            is_active: true,
        })
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}

/// Assignment of a product to a supply for a period. A supply has one base
/// product and any number of concurrent addon periods.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SupplyProductPeriod {
    pub id: Uuid,
    pub supply_id: Uuid,
    pub supplier_product_id: Uuid,
    pub period: Period,
}

impl SupplyProductPeriod {
    pub fn new(supply_id: Uuid, supplier_product_id: Uuid, period: Period) -> Self {
        Self {
            id: Uuid::new_v4(),
            supply_id,
            supplier_product_id,
            period,
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone};

    #[test]
    fn ending_twice_is_a_conflict() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut supply = Supply::starting_at(Uuid::new_v4(), Uuid::new_v4(), start);

        assert!(supply.is_open());
        supply.end_at(end).unwrap();
        assert!(!supply.is_open());
        assert!(matches!(
            supply.end_at(end),
            Err(DomainError::Conflict(_))
        ));
    }
}
