//! Recipient-only master data processes: BRS-004 new metering point,
//! BRS-006 update, BRS-007 closedown, BRS-008 connection, BRS-013
//! disconnect/reconnect and BRS-036 product obligation.

use {
    super::{Effect, HandlerOutcome},
    crate::state_machine::advance,
    chrono::{DateTime, Utc},
    cim::Envelope,
    domain::{
        ids::{GlnNumber, Gsrn},
        metering::{
            MeteringPoint, MeteringPointCategory, MeteringPointType, Resolution, SettlementMethod,
        },
        period::Period,
        process::{BrsProcess, ProcessRole, ProcessState, ProcessType},
        supply::{Supply, SupplyProductPeriod},
        DomainError, Result,
    },
    serde_json::Value,
    uuid::Uuid,
};

fn completed_process(
    process_type: ProcessType,
    gsrn: Gsrn,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<BrsProcess> {
    let mut process = BrsProcess::new(
        process_type,
        ProcessRole::Recipient,
        Some(gsrn),
        None,
        None,
        now,
    );
    advance(&mut process, ProcessState::Completed, reason, now)?;
    Ok(process)
}

#[derive(Clone, Debug)]
pub struct NewMeteringPoint {
    pub gsrn: Gsrn,
    pub metering_point_type: MeteringPointType,
    pub category: MeteringPointCategory,
    pub settlement_method: SettlementMethod,
    pub resolution: Resolution,
    pub grid_area: String,
    pub grid_company_gln: GlnNumber,
}

/// Extracts the metering point characteristics from an
/// `AccountingPointCharacteristics` envelope.
pub fn parse_metering_point(envelope: &Envelope) -> Result<NewMeteringPoint> {
    let record = envelope.series.first().ok_or_else(|| {
        DomainError::Validation("master data envelope has no series".to_owned())
    })?;
    let field = |key: &str| -> Result<&str> {
        record
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| DomainError::Validation(format!("master data misses {key}")))
    };
    let parse = |key: &str, raw: &str| {
        DomainError::Validation(format!("master data has unknown {key} {raw:?}"))
    };

    let type_raw = field("marketEvaluationPoint.type")?;
    let category_raw = field("marketEvaluationPoint.category")?;
    let method_raw = field("marketEvaluationPoint.settlementMethod")?;
    let resolution_raw = field("marketEvaluationPoint.readCycle")?;
    Ok(NewMeteringPoint {
        gsrn: Gsrn::new(field("marketEvaluationPoint.mRID")?)?,
        metering_point_type: type_raw
            .parse()
            .map_err(|_| parse("type", type_raw))?,
        category: category_raw
            .parse()
            .map_err(|_| parse("category", category_raw))?,
        settlement_method: method_raw
            .parse()
            .map_err(|_| parse("settlement method", method_raw))?,
        resolution: resolution_raw
            .parse()
            .map_err(|_| parse("resolution", resolution_raw))?,
        grid_area: field("meteringGridArea_Domain.mRID")?.to_owned(),
        grid_company_gln: GlnNumber::from_trusted(field(
            "meteringGridAreaOperator_MarketParticipant.mRID",
        )?)?,
    })
}

/// BRS-004: the grid company announces a new metering point.
pub fn handle_new_metering_point(
    params: NewMeteringPoint,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    let metering_point = MeteringPoint::new(
        params.gsrn.clone(),
        params.metering_point_type,
        params.category,
        params.settlement_method,
        params.resolution,
        params.grid_area,
        params.grid_company_gln,
    )?;
    let process = completed_process(
        ProcessType::Brs004,
        params.gsrn,
        "metering point created",
        now,
    )?;
    Ok(HandlerOutcome::new(process).with_effect(Effect::MeteringPointCreated(metering_point)))
}

#[derive(Clone, Debug, Default)]
pub struct MasterDataUpdate {
    pub settlement_method: Option<SettlementMethod>,
    pub resolution: Option<Resolution>,
    pub grid_area: Option<String>,
}

/// BRS-006: selected master data fields change.
pub fn handle_master_data_update(
    metering_point: &mut MeteringPoint,
    update: MasterDataUpdate,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    if let Some(settlement_method) = update.settlement_method {
        metering_point.settlement_method = settlement_method;
    }
    if let Some(resolution) = update.resolution {
        metering_point.resolution = resolution;
    }
    if let Some(grid_area) = update.grid_area {
        metering_point.grid_area = grid_area;
    }
    let process = completed_process(
        ProcessType::Brs006,
        metering_point.gsrn.clone(),
        "master data updated",
        now,
    )?;
    Ok(HandlerOutcome::new(process)
        .with_effect(Effect::MeteringPointUpdated(metering_point.clone())))
}

/// BRS-007: the metering point is closed down for good. An open supply ends
/// with it.
pub fn handle_closedown(
    metering_point: &mut MeteringPoint,
    current_supply: Option<&mut Supply>,
    closedown_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    let process = completed_process(
        ProcessType::Brs007,
        metering_point.gsrn.clone(),
        "metering point closed down",
        now,
    )?;
    let mut outcome = HandlerOutcome::new(process);
    if let Some(supply) = current_supply {
        supply.end_at(closedown_date)?;
        outcome = outcome.with_effect(Effect::SupplyEnded(supply.clone()));
    }
    metering_point.close_down();
    Ok(outcome.with_effect(Effect::MeteringPointUpdated(metering_point.clone())))
}

/// BRS-008: the metering point is physically connected.
pub fn handle_connection(
    metering_point: &mut MeteringPoint,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    metering_point.connect()?;
    let process = completed_process(
        ProcessType::Brs008,
        metering_point.gsrn.clone(),
        "metering point connected",
        now,
    )?;
    Ok(HandlerOutcome::new(process)
        .with_effect(Effect::MeteringPointUpdated(metering_point.clone())))
}

/// BRS-013: disconnect or reconnect, depending on `reconnect`.
pub fn handle_disconnect_reconnect(
    metering_point: &mut MeteringPoint,
    reconnect: bool,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    if reconnect {
        metering_point.connect()?;
    } else {
        metering_point.disconnect()?;
    }
    let process = completed_process(
        ProcessType::Brs013,
        metering_point.gsrn.clone(),
        if reconnect {
            "metering point reconnected"
        } else {
            "metering point disconnected"
        },
        now,
    )?;
    Ok(HandlerOutcome::new(process)
        .with_effect(Effect::MeteringPointUpdated(metering_point.clone())))
}

/// BRS-036: the supply falls under the product obligation; the obligation
/// product is assigned from the given date.
pub fn handle_product_obligation(
    metering_point: &MeteringPoint,
    supply: &Supply,
    obligation_product_id: Uuid,
    from: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    let assignment =
        SupplyProductPeriod::new(supply.id, obligation_product_id, Period::open_ended(from));
    let process = completed_process(
        ProcessType::Brs036,
        metering_point.gsrn.clone(),
        "product obligation applied",
        now,
    )?;
    Ok(HandlerOutcome::new(process).with_effect(Effect::ProductPeriodCreated(assignment)))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::TimeZone,
        domain::{metering::ConnectionState, process::ProcessStatus},
    };

    fn gln(value: &str) -> GlnNumber {
        GlnNumber::from_trusted(value).unwrap()
    }

    fn params() -> NewMeteringPoint {
        NewMeteringPoint {
            gsrn: Gsrn::new("571313180400013562").unwrap(),
            metering_point_type: MeteringPointType::Consumption,
            category: MeteringPointCategory::Physical,
            settlement_method: SettlementMethod::Flex,
            resolution: Resolution::Pt1h,
            grid_area: "DK1".to_owned(),
            grid_company_gln: gln("5790000432769"),
        }
    }

    fn metering_point() -> MeteringPoint {
        match handle_new_metering_point(params(), Utc::now())
            .unwrap()
            .effects
            .remove(0)
        {
            Effect::MeteringPointCreated(mp) => mp,
            effect => panic!("unexpected effect {effect:?}"),
        }
    }

    #[test]
    fn new_metering_point_completes_in_one_step() {
        let outcome = handle_new_metering_point(params(), Utc::now()).unwrap();
        assert_eq!(outcome.process.status, ProcessStatus::Completed);
        assert_eq!(outcome.process.transitions.len(), 1);
        assert!(matches!(outcome.effects[0], Effect::MeteringPointCreated(_)));
    }

    #[test]
    fn closedown_ends_the_supply() {
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        let mut mp = metering_point();
        let mut supply = Supply::starting_at(
            mp.id,
            Uuid::new_v4(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        );

        let outcome = handle_closedown(&mut mp, Some(&mut supply), now, now).unwrap();
        assert_eq!(mp.connection_state, ConnectionState::ClosedDown);
        assert_eq!(supply.period.end, Some(now));
        assert_eq!(outcome.effects.len(), 2);
    }

    #[test]
    fn reconnect_after_disconnect() {
        let now = Utc::now();
        let mut mp = metering_point();
        mp.connect().unwrap();

        handle_disconnect_reconnect(&mut mp, false, now).unwrap();
        assert_eq!(mp.connection_state, ConnectionState::Disconnected);
        handle_disconnect_reconnect(&mut mp, true, now).unwrap();
        assert_eq!(mp.connection_state, ConnectionState::Connected);
        // Disconnecting an already disconnected point is a conflict.
        handle_disconnect_reconnect(&mut mp, false, now).unwrap();
        assert!(handle_disconnect_reconnect(&mut mp, false, now).is_err());
    }
}
