//! BRS-031 price lists: D18 charge information, D08 price points, D17
//! charge links.

use {
    super::{Effect, HandlerOutcome},
    crate::state_machine::advance,
    chrono::{DateTime, NaiveDateTime, Utc},
    cim::Envelope,
    domain::{
        ids::{GlnNumber, Gsrn},
        metering::{MeteringPoint, Resolution},
        period::Period,
        price::{Price, PriceCategory, PriceLink, PriceType},
        process::{BrsProcess, ProcessRole, ProcessState, ProcessType},
        DomainError, Result,
    },
    rust_decimal::Decimal,
    serde_json::Value,
    std::str::FromStr,
};

fn completed_process(gsrn: Option<Gsrn>, reason: &str, now: DateTime<Utc>) -> Result<BrsProcess> {
    let mut process = BrsProcess::new(
        ProcessType::Brs031,
        ProcessRole::Recipient,
        gsrn,
        None,
        None,
        now,
    );
    advance(&mut process, ProcessState::Completed, reason, now)?;
    Ok(process)
}

#[derive(Clone, Debug)]
pub struct ChargeInformation {
    pub charge_id: String,
    pub owner_gln: GlnNumber,
    pub price_type: PriceType,
    pub description: String,
    pub validity: Period,
    pub vat_exempt: bool,
    pub price_resolution: Option<Resolution>,
    pub is_tax: bool,
    pub is_pass_through: bool,
    pub category: PriceCategory,
}

/// D18: create the charge or refresh its metadata.
pub fn handle_charge_information(
    existing: Option<&mut Price>,
    info: ChargeInformation,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    let effect = match existing {
        Some(price) => {
            price.update_price_info(info.description, info.price_type);
            price.update_validity(info.validity);
            price.update_category(info.category);
            price.update_vat_exempt(info.vat_exempt);
            Effect::PriceUpdated(price.clone())
        }
        None => {
            let price = Price::new(
                info.charge_id,
                info.owner_gln,
                info.price_type,
                info.description,
                info.validity,
                info.vat_exempt,
                info.price_resolution,
                info.is_tax,
                info.is_pass_through,
                info.category,
            )?;
            Effect::PriceCreated(price)
        }
    };
    let process = completed_process(None, "charge information applied", now)?;
    Ok(HandlerOutcome::new(process).with_effect(effect))
}

/// D08: replace the points inside `[from, to)` with the published sequence.
pub fn handle_price_points(
    price: &mut Price,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    points: Vec<(DateTime<Utc>, Decimal)>,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    price.replace_price_points(from, to, points.clone());
    let process = completed_process(None, "price points replaced", now)?;
    Ok(HandlerOutcome::new(process)
        .with_effect(Effect::PricePointsReplaced {
            price_id: price.id,
            from,
            to,
            points,
        })
        .with_effect(Effect::PriceUpdated(price.clone())))
}

/// D17: link the charge to a metering point. An existing open link for the
/// same pair is closed where the new one begins.
pub fn handle_price_link(
    metering_point: &MeteringPoint,
    price: &Price,
    link_period: Period,
    existing_open_link: Option<&mut PriceLink>,
    now: DateTime<Utc>,
) -> Result<HandlerOutcome> {
    let process = completed_process(
        Some(metering_point.gsrn.clone()),
        "charge link applied",
        now,
    )?;
    let mut outcome = HandlerOutcome::new(process);
    if let Some(link) = existing_open_link
        && link.period.is_open()
    {
        link.period = link.period.closed_at(link_period.start)?;
        outcome = outcome.with_effect(Effect::PriceLinkEnded(link.clone()));
    }
    let link = PriceLink::new(metering_point.id, price.id, link_period);
    Ok(outcome.with_effect(Effect::PriceLinkCreated(link)))
}

fn record_str<'a>(
    record: &'a std::collections::BTreeMap<String, Value>,
    key: &str,
) -> Result<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::Validation(format!("price list series misses {key}")))
}

fn record_time(
    record: &std::collections::BTreeMap<String, Value>,
    key: &str,
) -> Result<DateTime<Utc>> {
    let raw = record_str(record, key)?;
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
        .map(|naive| naive.and_utc())
        .map_err(|err| DomainError::Validation(format!("bad {key} {raw:?}: {err}")))
}

/// Extracts the D18 charge metadata from a `NotifyPriceList` envelope.
pub fn parse_charge_information(envelope: &Envelope) -> Result<ChargeInformation> {
    let record = envelope.series.first().ok_or_else(|| {
        DomainError::Validation("price list envelope has no series".to_owned())
    })?;
    let validity_start = record_time(record, "validityStart_DateAndOrTime.dateTime")?;
    let validity_end = record
        .get("validityEnd_DateAndOrTime.dateTime")
        .and_then(Value::as_str)
        .map(|raw| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
                .map(|naive| naive.and_utc())
                .map_err(|err| DomainError::Validation(format!("bad validity end: {err}")))
        })
        .transpose()?;
    Ok(ChargeInformation {
        charge_id: record_str(record, "chargeType.mRID")?.to_owned(),
        owner_gln: GlnNumber::from_trusted(record_str(
            record,
            "chargeTypeOwner_MarketParticipant.mRID",
        )?)?,
        price_type: record_str(record, "chargeType.type")?
            .parse()
            .map_err(|_| DomainError::Validation("unknown charge type".to_owned()))?,
        description: record_str(record, "chargeType.description")?.to_owned(),
        validity: Period::new(validity_start, validity_end)?,
        vat_exempt: record
            .get("chargeType.vatExempt")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        price_resolution: record
            .get("chargeType.resolution")
            .and_then(Value::as_str)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| DomainError::Validation("unknown resolution".to_owned()))
            })
            .transpose()?,
        is_tax: record
            .get("chargeType.tax")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        is_pass_through: record
            .get("chargeType.passThrough")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        category: record_str(record, "chargeType.category")?
            .parse()
            .map_err(|_| DomainError::Validation("unknown charge category".to_owned()))?,
    })
}

#[derive(Clone, Debug)]
pub struct PricePointsUpdate {
    pub charge_id: String,
    pub owner_gln: GlnNumber,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub points: Vec<(DateTime<Utc>, Decimal)>,
}

/// Extracts the D08 point series from a `NotifyPriceList` envelope. Point
/// timestamps are derived from the interval start and the point positions
/// at the published resolution.
pub fn parse_price_points(envelope: &Envelope) -> Result<PricePointsUpdate> {
    let record = envelope.series.first().ok_or_else(|| {
        DomainError::Validation("price list envelope has no series".to_owned())
    })?;
    let from = record_time(record, "period.timeInterval.start")?;
    let to = record_time(record, "period.timeInterval.end")?;
    let resolution: Resolution = record_str(record, "period.resolution")?
        .parse()
        .map_err(|_| DomainError::Validation("unknown resolution".to_owned()))?;
    let bucket = resolution.bucket().ok_or_else(|| {
        DomainError::Validation(format!("{resolution} is not a point resolution"))
    })?;

    let raw_points = record
        .get("Point")
        .and_then(Value::as_array)
        .ok_or_else(|| DomainError::Validation("price list misses Point array".to_owned()))?;
    let mut points = Vec::with_capacity(raw_points.len());
    for point in raw_points {
        let position = point
            .get("position")
            .and_then(Value::as_i64)
            .filter(|position| *position >= 1)
            .ok_or_else(|| DomainError::Validation("point misses position".to_owned()))?;
        let offset = i32::try_from(position - 1)
            .map_err(|_| DomainError::Validation("point position out of range".to_owned()))?;
        let price = point
            .get("price.amount")
            .and_then(Value::as_str)
            .map(Decimal::from_str)
            .transpose()
            .map_err(|err| DomainError::Validation(format!("bad point price: {err}")))?
            .ok_or_else(|| DomainError::Validation("point misses price.amount".to_owned()))?;
        points.push((from + bucket * offset, price));
    }

    Ok(PricePointsUpdate {
        charge_id: record_str(record, "chargeType.mRID")?.to_owned(),
        owner_gln: GlnNumber::from_trusted(record_str(
            record,
            "chargeTypeOwner_MarketParticipant.mRID",
        )?)?,
        from,
        to,
        points,
    })
}

#[derive(Clone, Debug)]
pub struct PriceLinkUpdate {
    pub gsrn: Gsrn,
    pub charge_id: String,
    pub owner_gln: GlnNumber,
    pub period: Period,
}

/// Extracts the D17 charge link from a `NotifyPriceList` envelope.
pub fn parse_price_link(envelope: &Envelope) -> Result<PriceLinkUpdate> {
    let record = envelope.series.first().ok_or_else(|| {
        DomainError::Validation("price list envelope has no series".to_owned())
    })?;
    let start = record_time(record, "validityStart_DateAndOrTime.dateTime")?;
    let end = record
        .get("validityEnd_DateAndOrTime.dateTime")
        .and_then(Value::as_str)
        .map(|raw| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
                .map(|naive| naive.and_utc())
                .map_err(|err| DomainError::Validation(format!("bad link end: {err}")))
        })
        .transpose()?;
    Ok(PriceLinkUpdate {
        gsrn: Gsrn::new(record_str(record, "marketEvaluationPoint.mRID")?)?,
        charge_id: record_str(record, "chargeType.mRID")?.to_owned(),
        owner_gln: GlnNumber::from_trusted(record_str(
            record,
            "chargeTypeOwner_MarketParticipant.mRID",
        )?)?,
        period: Period::new(start, end)?,
    })
}
