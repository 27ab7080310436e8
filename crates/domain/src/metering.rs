//! Metering points and their master data.

use {
    crate::{
        error::{DomainError, Result},
        ids::{GlnNumber, Gsrn},
    },
    chrono::{DateTime, Duration, DurationRound, Utc},
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
pub enum MeteringPointType {
    /// E17
    Consumption,
    /// E18
    Production,
    /// E20
    Exchange,
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
pub enum MeteringPointCategory {
    Physical,
    Virtual,
    Calculated,
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
pub enum SettlementMethod {
    Flex,
    Profiled,
    NonProfiled,
}

/// Duration of one observation bucket.
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
pub enum Resolution {
    #[strum(serialize = "PT15M")]
    Pt15m,
    #[strum(serialize = "PT1H")]
    Pt1h,
    #[strum(serialize = "P1D")]
    P1d,
    #[strum(serialize = "P1M")]
    P1m,
}

impl Resolution {
    /// Fixed bucket length; `None` for the calendar-bound monthly resolution.
    pub fn bucket(&self) -> Option<Duration> {
        match self {
            Self::Pt15m => Some(Duration::minutes(15)),
            Self::Pt1h => Some(Duration::hours(1)),
            Self::P1d => Some(Duration::days(1)),
            Self::P1m => None,
        }
    }
}

/// Truncates a timestamp down to the start of its hour.
pub fn hour_bucket(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(Duration::hours(1))
        .expect("hour truncation cannot overflow for in-range timestamps")
}

/// The Danish civil date a timestamp falls on. Storage and arithmetic stay
/// UTC; this is the single DST-aware lookup used when grouping readings
/// into display days.
pub fn danish_civil_date(t: DateTime<Utc>) -> chrono::NaiveDate {
    t.with_timezone(&chrono_tz::Europe::Copenhagen).date_naive()
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
pub enum ConnectionState {
    New,
    Connected,
    Disconnected,
    ClosedDown,
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
pub enum QuantityQuality {
    Measured,
    Estimated,
    Calculated,
    Missing,
}

/// The physical point of energy exchange. Master data is owned by the grid
/// company and reaches us through market processes only.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MeteringPoint {
    pub id: Uuid,
    pub gsrn: Gsrn,
    pub metering_point_type: MeteringPointType,
    pub category: MeteringPointCategory,
    pub settlement_method: SettlementMethod,
    pub resolution: Resolution,
    pub grid_area: String,
    pub grid_company_gln: GlnNumber,
    pub connection_state: ConnectionState,
    pub has_active_supply: bool,
}

impl MeteringPoint {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gsrn: Gsrn,
        metering_point_type: MeteringPointType,
        category: MeteringPointCategory,
        settlement_method: SettlementMethod,
        resolution: Resolution,
        grid_area: String,
        grid_company_gln: GlnNumber,
    ) -> Result<Self> {
        if grid_area.is_empty() {
            return Err(DomainError::Validation("grid area must be set".to_owned()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            gsrn,
            metering_point_type,
            category,
            settlement_method,
            resolution,
            grid_area,
            grid_company_gln,
            connection_state: ConnectionState::New,
            has_active_supply: false,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        match self.connection_state {
            ConnectionState::ClosedDown => Err(DomainError::Conflict(format!(
                "metering point {} is closed down",
                self.gsrn
            ))),
            _ => {
                self.connection_state = ConnectionState::Connected;
                Ok(())
            }
        }
    }

    pub fn disconnect(&mut self) -> Result<()> {
        match self.connection_state {
            ConnectionState::Connected => {
                self.connection_state = ConnectionState::Disconnected;
                Ok(())
            }
            state => Err(DomainError::Conflict(format!(
                "cannot disconnect metering point {} in state {state}",
                self.gsrn
            ))),
        }
    }

    pub fn close_down(&mut self) {
        self.connection_state = ConnectionState::ClosedDown;
        self.has_active_supply = false;
    }

    pub fn set_active_supply(&mut self, active: bool) {
        self.has_active_supply = active;
    }
}
