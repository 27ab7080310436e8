//! BRS-027 wholesale settlement ingest.
//!
//! The hub's `NotifyWholesaleServices` carries its per-charge settlement of
//! a grid area and period. We store it verbatim; the reconciliation run
//! compares it against our own totals.

use {
    super::{Effect, HandlerOutcome},
    crate::state_machine::advance,
    chrono::{DateTime, NaiveDateTime, Utc},
    cim::Envelope,
    domain::{
        money::Money,
        period::Period,
        process::{BrsProcess, ProcessRole, ProcessState, ProcessType},
        reconciliation::{WholesaleSettlement, WholesaleSettlementLine},
        DomainError, Result,
    },
    rust_decimal::Decimal,
    serde_json::Value,
    std::str::FromStr,
    uuid::Uuid,
};

/// Parses and stores the wholesale settlement from the envelope. One series
/// record per charge line; the header record names grid area and period.
pub fn handle_wholesale_settlement(
    envelope: &Envelope,
    received_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    let first = envelope.series.first().ok_or_else(|| {
        DomainError::Validation("wholesale settlement has no series".to_owned())
    })?;
    let grid_area = first
        .get("meteringGridArea_Domain.mRID")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            DomainError::Validation("wholesale settlement misses the grid area".to_owned())
        })?
        .to_owned();
    let start = parse_time(first, "period.timeInterval.start")?;
    let end = parse_time(first, "period.timeInterval.end")?;
    let period = Period::closed(start, end)?;

    let mut lines = Vec::with_capacity(envelope.series.len());
    let mut total = Money::dkk(Decimal::ZERO);
    for record in &envelope.series {
        let amount = Money::dkk(decimal_field(record, "amount_Sum.quantity")?);
        total = total.checked_add(amount)?;
        lines.push(WholesaleSettlementLine {
            charge_id: str_field(record, "chargeType.mRID")?.to_owned(),
            charge_owner: str_field(record, "chargeTypeOwner_MarketParticipant.mRID")?.to_owned(),
            description: record
                .get("chargeType.description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            quantity: decimal_field(record, "energy_Sum.quantity")?,
            amount,
        });
    }

    let settlement = WholesaleSettlement {
        id: Uuid::new_v4(),
        grid_area,
        period,
        received_at,
        total_amount: total,
        lines,
    };

    let mut process = BrsProcess::new(
        ProcessType::Brs027,
        ProcessRole::Recipient,
        None,
        None,
        None,
        now,
    );
    advance(
        &mut process,
        ProcessState::Completed,
        "wholesale settlement stored",
        now,
    )?;
    Ok(HandlerOutcome::new(process).with_effect(Effect::WholesaleSettlementStored(settlement)))
}

fn str_field<'a>(
    record: &'a std::collections::BTreeMap<String, Value>,
    key: &str,
) -> Result<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::Validation(format!("wholesale line misses {key}")))
}

fn decimal_field(
    record: &std::collections::BTreeMap<String, Value>,
    key: &str,
) -> Result<Decimal> {
    Decimal::from_str(str_field(record, key)?)
        .map_err(|err| DomainError::Validation(format!("bad {key}: {err}")))
}

fn parse_time(
    record: &std::collections::BTreeMap<String, Value>,
    key: &str,
) -> Result<DateTime<Utc>> {
    let raw = str_field(record, key)?;
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
        .map(|naive| naive.and_utc())
        .map_err(|err| DomainError::Validation(format!("bad {key} {raw:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::TimeZone,
        cim::{envelope::record, DocumentType},
        domain::ids::GlnNumber,
        rust_decimal_macros::dec,
        serde_json::json,
    };

    fn gln(value: &str) -> GlnNumber {
        GlnNumber::from_trusted(value).unwrap()
    }

    fn envelope() -> Envelope {
        let line = |charge: &str, description: &str, energy: &str, amount: &str| {
            record([
                ("meteringGridArea_Domain.mRID", json!("DK1")),
                ("period.timeInterval.start", json!("2026-01-01T00:00:00Z")),
                ("period.timeInterval.end", json!("2026-02-01T00:00:00Z")),
                ("chargeType.mRID", json!(charge)),
                ("chargeTypeOwner_MarketParticipant.mRID", json!("5790000432769")),
                ("chargeType.description", json!(description)),
                ("energy_Sum.quantity", json!(energy)),
                ("amount_Sum.quantity", json!(amount)),
            ])
        };
        Envelope::create(
            DocumentType::NotifyWholesaleServices,
            ProcessType::Brs027.process_code(),
            gln("5790000432769"),
        )
        .receiver(gln("5790000432752"))
        .created_at(Utc.with_ymd_and_hms(2026, 2, 5, 0, 0, 0).unwrap())
        .add_series(line("40010", "Nettarif C", "744.000", "297.60"))
        .add_series(line("41000", "Systemtarif", "744.000", "40.18"))
        .build()
        .unwrap()
    }

    #[test]
    fn stores_the_hub_settlement() {
        let now = Utc::now();
        let outcome = handle_wholesale_settlement(&envelope(), now, now).unwrap();
        let stored = match outcome.effects.into_iter().next().unwrap() {
            Effect::WholesaleSettlementStored(settlement) => settlement,
            effect => panic!("unexpected effect {effect:?}"),
        };
        assert_eq!(stored.grid_area, "DK1");
        assert_eq!(stored.lines.len(), 2);
        assert_eq!(stored.total_amount.amount(), dec!(337.78));
        assert_eq!(stored.lines[0].quantity, dec!(744));
    }

    #[test]
    fn missing_amount_is_a_validation_error() {
        let mut envelope = envelope();
        envelope.series[0].remove("amount_Sum.quantity");
        let now = Utc::now();
        assert!(matches!(
            handle_wholesale_settlement(&envelope, now, now),
            Err(DomainError::Validation(_))
        ));
    }
}
