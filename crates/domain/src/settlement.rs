//! Settlement aggregates.
//!
//! A settlement is built line by line by the calculator and frozen on
//! construction; status is the only thing that moves afterwards, and it only
//! moves forward.

use {
    crate::{
        error::{DomainError, Result},
        money::Money,
        period::Period,
        quantity::EnergyQuantity,
    },
    chrono::{DateTime, Datelike, Utc},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

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
pub enum SettlementStatus {
    Calculated,
    Invoiced,
    Adjusted,
    /// Billed by the legacy system before migration; terminal.
    Migrated,
}

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
pub enum SettlementLineSource {
    DataHubCharge,
    SpotPrice,
    SupplierMargin,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SettlementLine {
    pub id: Uuid,
    pub source: SettlementLineSource,
    pub price_id: Option<Uuid>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Money,
}

impl SettlementLine {
    /// Line with the amount computed from quantity times unit price.
    pub fn new(
        source: SettlementLineSource,
        price_id: Option<Uuid>,
        description: String,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self::with_amount(
            source,
            price_id,
            description,
            quantity,
            unit_price,
            Money::dkk(quantity * unit_price),
        )
    }

    /// Line with an explicitly computed amount. The calculator uses this for
    /// tariff lines, whose amount is the sum of per-observation
    /// contributions rather than a single product.
    pub fn with_amount(
        source: SettlementLineSource,
        price_id: Option<Uuid>,
        description: String,
        quantity: Decimal,
        unit_price: Decimal,
        amount: Money,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            price_id,
            description,
            quantity,
            unit_price,
            amount,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub metering_point_id: Uuid,
    pub supply_id: Uuid,
    pub period: Period,
    pub time_series_id: Uuid,
    pub time_series_version: i32,
    pub total_energy: EnergyQuantity,
    pub total_amount: Money,
    pub status: SettlementStatus,
    pub is_correction: bool,
    pub previous_settlement_id: Option<Uuid>,
    pub lines: Vec<SettlementLine>,
    pub document_number: i64,
    pub calculated_at: DateTime<Utc>,
    pub invoiced_at: Option<DateTime<Utc>>,
    pub external_invoice_reference: Option<String>,
    pub migrated_hourly_json: Option<String>,
}

pub struct SettlementHeader {
    pub metering_point_id: Uuid,
    pub supply_id: Uuid,
    pub period: Period,
    pub time_series_id: Uuid,
    pub time_series_version: i32,
    pub document_number: i64,
    pub calculated_at: DateTime<Utc>,
}

impl Settlement {
    /// A freshly calculated settlement. The total is derived from the
    /// already-rounded line amounts, so it is exact to the øre.
    pub fn calculated(
        header: SettlementHeader,
        total_energy: EnergyQuantity,
        lines: Vec<SettlementLine>,
    ) -> Result<Self> {
        Self::build(header, total_energy, lines, false, None)
    }

    /// A correction: the delta against a previously invoiced settlement.
    pub fn correction(
        header: SettlementHeader,
        delta_energy: EnergyQuantity,
        lines: Vec<SettlementLine>,
        previous_settlement_id: Uuid,
    ) -> Result<Self> {
        Self::build(
            header,
            delta_energy,
            lines,
            true,
            Some(previous_settlement_id),
        )
    }

    fn build(
        header: SettlementHeader,
        total_energy: EnergyQuantity,
        lines: Vec<SettlementLine>,
        is_correction: bool,
        previous_settlement_id: Option<Uuid>,
    ) -> Result<Self> {
        let mut total_amount = Money::dkk(Decimal::ZERO);
        for line in &lines {
            total_amount = total_amount.checked_add(line.amount)?;
        }
        Ok(Self {
            id: Uuid::new_v4(),
            metering_point_id: header.metering_point_id,
            supply_id: header.supply_id,
            period: header.period,
            time_series_id: header.time_series_id,
            time_series_version: header.time_series_version,
            total_energy,
            total_amount,
            status: SettlementStatus::Calculated,
            is_correction,
            previous_settlement_id,
            lines,
            document_number: header.document_number,
            calculated_at: header.calculated_at,
            invoiced_at: None,
            external_invoice_reference: None,
            migrated_hourly_json: None,
        })
    }

    /// `WO-YYYY-NNNNN` work order id printed on the invoice.
    pub fn invoice_document_id(&self) -> String {
        format!(
            "WO-{}-{:05}",
            self.calculated_at.year(),
            self.document_number
        )
    }

    pub fn mark_invoiced(
        &mut self,
        at: DateTime<Utc>,
        external_reference: Option<String>,
    ) -> Result<()> {
        if self.status != SettlementStatus::Calculated {
            return Err(DomainError::Conflict(format!(
                "settlement {} cannot be invoiced from status {}",
                self.id, self.status
            )));
        }
        self.status = SettlementStatus::Invoiced;
        self.invoiced_at = Some(at);
        self.external_invoice_reference = external_reference;
        Ok(())
    }

    /// Marks an invoiced settlement as adjusted once a correction for it has
    /// been calculated.
    pub fn mark_adjusted(&mut self) -> Result<()> {
        if self.status != SettlementStatus::Invoiced {
            return Err(DomainError::Conflict(format!(
                "settlement {} cannot be adjusted from status {}",
                self.id, self.status
            )));
        }
        self.status = SettlementStatus::Adjusted;
        Ok(())
    }
}

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
pub enum IssueType {
    MissingPriceCategory,
    MissingPricePoints,
    MissingSpotPrices,
    MissingSupplierMargin,
}

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
pub enum IssueStatus {
    Open,
    Resolved,
    Dismissed,
}

/// A completeness problem found before or during settlement. Open issues
/// block the affected settlement from being invoiced; they are closed by an
/// operator.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SettlementIssue {
    pub id: Uuid,
    pub metering_point_id: Uuid,
    pub period: Period,
    pub time_series_id: Option<Uuid>,
    pub time_series_version: Option<i32>,
    pub issue_type: IssueType,
    pub message: String,
    pub details: Option<String>,
    pub status: IssueStatus,
}

impl SettlementIssue {
    pub fn open(
        metering_point_id: Uuid,
        period: Period,
        issue_type: IssueType,
        message: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            metering_point_id,
            period,
            time_series_id: None,
            time_series_version: None,
            issue_type,
            message,
            details: None,
            status: IssueStatus::Open,
        }
    }

    pub fn resolve(&mut self) {
        self.status = IssueStatus::Resolved;
    }

    pub fn dismiss(&mut self) {
        self.status = IssueStatus::Dismissed;
    }
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone, rust_decimal_macros::dec};

    fn header() -> SettlementHeader {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        SettlementHeader {
            metering_point_id: Uuid::new_v4(),
            supply_id: Uuid::new_v4(),
            period: Period::closed(start, end).unwrap(),
            time_series_id: Uuid::new_v4(),
            time_series_version: 1,
            document_number: 42,
            calculated_at: end,
        }
    }

    #[test]
    fn total_is_the_sum_of_rounded_lines() {
        let lines = vec![
            SettlementLine::new(
                SettlementLineSource::DataHubCharge,
                Some(Uuid::new_v4()),
                "Nettarif".to_owned(),
                dec!(744),
                dec!(0.40),
            ),
            SettlementLine::new(
                SettlementLineSource::SpotPrice,
                None,
                "Spot".to_owned(),
                dec!(744),
                dec!(0.50),
            ),
        ];
        let settlement =
            Settlement::calculated(header(), EnergyQuantity::new(dec!(744)), lines).unwrap();
        assert_eq!(settlement.total_amount, Money::dkk(dec!(669.60)));
    }

    #[test]
    fn status_progression_is_monotonic() {
        let mut settlement =
            Settlement::calculated(header(), EnergyQuantity::ZERO, Vec::new()).unwrap();
        let now = settlement.calculated_at;

        assert!(settlement.mark_adjusted().is_err());
        settlement.mark_invoiced(now, Some("INV-1".to_owned())).unwrap();
        assert!(settlement.mark_invoiced(now, None).is_err());
        settlement.mark_adjusted().unwrap();
        assert_eq!(settlement.status, SettlementStatus::Adjusted);
    }

    #[test]
    fn invoice_document_id_format() {
        let settlement =
            Settlement::calculated(header(), EnergyQuantity::ZERO, Vec::new()).unwrap();
        assert_eq!(settlement.invoice_document_id(), "WO-2026-00042");
    }
}
