//! The hub's wholesale settlement and our reconciliation against it.

use {
    crate::{money::Money, period::Period},
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// One line of the hub's wholesale settlement, pass-through of external
/// data.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WholesaleSettlementLine {
    pub charge_id: String,
    pub charge_owner: String,
    pub description: String,
    pub quantity: Decimal,
    pub amount: Money,
}

/// The hub's settlement for a grid area and period, ingested via BRS-027.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WholesaleSettlement {
    pub id: Uuid,
    pub grid_area: String,
    pub period: Period,
    pub received_at: DateTime<Utc>,
    pub total_amount: Money,
    pub lines: Vec<WholesaleSettlementLine>,
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
pub enum ReconciliationStatus {
    Balanced,
    Deviating,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationLine {
    pub charge_key: String,
    pub description: String,
    pub our_amount: Money,
    pub datahub_amount: Money,
    pub difference: Money,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub id: Uuid,
    pub grid_area: String,
    pub period: Period,
    pub our_total_dkk: Money,
    pub datahub_total_dkk: Money,
    pub difference_dkk: Money,
    pub difference_percent: Decimal,
    pub status: ReconciliationStatus,
    pub lines: Vec<ReconciliationLine>,
}
