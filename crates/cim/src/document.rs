//! The RSM document catalogue.

use {
    domain::{DomainError, Result},
    serde::{Deserialize, Serialize},
};

/// Every market document schema the engine sends or receives.
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
    strum::EnumIter,
)]
pub enum DocumentType {
    RequestChangeOfSupplier,
    ConfirmRequestChangeOfSupplier,
    RejectRequestChangeOfSupplier,
    RequestEndOfSupply,
    ConfirmRequestEndOfSupply,
    RejectRequestEndOfSupply,
    NotifyValidatedMeasureData,
    RequestValidatedMeasureData,
    NotifyAggregatedMeasureData,
    RequestAggregatedMeasureData,
    RequestWholesaleSettlement,
    NotifyWholesaleServices,
    RequestPriceList,
    NotifyPriceList,
    AccountingPointCharacteristics,
    RequestAccountingPointCharacteristics,
    CharacteristicsOfACustomer,
    Acknowledgement,
}

impl DocumentType {
    /// The top-level JSON document name.
    pub fn wire_name(&self) -> String {
        format!("{self}_MarketDocument")
    }

    /// The RSM schema the document is validated against.
    pub fn rsm(&self) -> &'static str {
        match self {
            Self::RequestChangeOfSupplier => "RSM-001",
            Self::RequestEndOfSupply => "RSM-003",
            Self::ConfirmRequestChangeOfSupplier => "RSM-004",
            Self::RejectRequestChangeOfSupplier => "RSM-005",
            Self::NotifyValidatedMeasureData => "RSM-012",
            Self::NotifyAggregatedMeasureData => "RSM-014",
            Self::RequestValidatedMeasureData => "RSM-015",
            Self::RequestAggregatedMeasureData => "RSM-016",
            Self::RequestWholesaleSettlement => "RSM-017",
            Self::NotifyWholesaleServices => "RSM-019",
            Self::RequestPriceList => "RSM-020",
            Self::AccountingPointCharacteristics => "RSM-022",
            Self::CharacteristicsOfACustomer => "RSM-027",
            Self::RequestAccountingPointCharacteristics => "RSM-031",
            Self::Acknowledgement => "RSM-032",
            Self::NotifyPriceList => "RSM-033",
            Self::ConfirmRequestEndOfSupply => "RSM-034",
            Self::RejectRequestEndOfSupply => "RSM-035",
        }
    }

    pub fn from_wire_name(name: &str) -> Result<Self> {
        let base = name.strip_suffix("_MarketDocument").ok_or_else(|| {
            DomainError::Validation(format!("{name:?} is not a market document name"))
        })?;
        base.parse()
            .map_err(|_| DomainError::Validation(format!("unknown market document {name:?}")))
    }
}
