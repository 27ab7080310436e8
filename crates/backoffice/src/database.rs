//! The Postgres façade the workers talk to.
//!
//! Rows live in the `database` crate; domain values in `domain`. This
//! module owns the mapping between the two plus the explicit fetch plans,
//! so the calculator and the handlers stay free of I/O.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use database::PgTransaction;
use domain::{
    customer::Customer,
    messages::OutboxMessage,
    metering::{MeteringPoint, QuantityQuality, Resolution},
    period::Period,
    price::{Price, PricePoint, PriceWithPoints, SpotPrice},
    process::{BrsProcess, ProcessState, ProcessTransition},
    reconciliation::{WholesaleSettlement, WholesaleSettlementLine},
    settlement::{Settlement, SettlementIssue},
    supply::{PricingModel, Supply},
    timeseries::TimeSeries,
    EnergyQuantity, GlnNumber, Gsrn, Money,
};
use settlement::calculator::ActiveMargin;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct Postgres(pub PgPool);

/// Everything the calculator needs for one metering point and period, in
/// one explicit fetch.
pub struct PricingContext {
    pub supply: Supply,
    pub pricing_model: PricingModel,
    pub datahub_prices: Vec<PriceWithPoints>,
    pub spot_prices: Vec<SpotPrice>,
    pub margins: Vec<ActiveMargin>,
}

impl Postgres {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url)
            .await
            .context("failed to connect to postgres")?;
        Ok(Self(pool))
    }

    pub async fn metering_point_by_gsrn(&self, gsrn: &Gsrn) -> Result<Option<MeteringPoint>> {
        let mut ex = self.0.acquire().await?;
        let row = database::metering_points::by_gsrn(&mut ex, gsrn.as_str()).await?;
        row.map(metering_point_from_row).transpose()
    }

    pub async fn open_supply(&self, metering_point_id: Uuid) -> Result<Option<Supply>> {
        let mut ex = self.0.acquire().await?;
        let row = database::supplies::open_for_metering_point(&mut ex, metering_point_id).await?;
        Ok(row.map(supply_from_row))
    }

    pub async fn latest_time_series(
        &self,
        metering_point_id: Uuid,
        period: Period,
    ) -> Result<Option<TimeSeries>> {
        let mut ex = self.0.acquire().await?;
        let end = period
            .end
            .ok_or_else(|| anyhow!("time series periods are always closed"))?;
        let Some(row) =
            database::time_series::latest_for_period(&mut ex, metering_point_id, period.start, end)
                .await?
        else {
            return Ok(None);
        };
        let observations = database::time_series::observations_for(&mut ex, row.id).await?;
        time_series_from_rows(row, observations).map(Some)
    }

    /// The explicit fetch plan behind every settlement calculation.
    pub async fn load_pricing_context(
        &self,
        metering_point: &MeteringPoint,
        period: Period,
    ) -> Result<Option<PricingContext>> {
        let mut ex = self.0.acquire().await?;
        let end = period
            .end
            .ok_or_else(|| anyhow!("settlement periods are always closed"))?;

        let Some(supply_row) =
            database::supplies::covering(&mut ex, metering_point.id, period.start).await?
        else {
            return Ok(None);
        };
        let supply = supply_from_row(supply_row);

        let links =
            database::price_links::overlapping(&mut ex, metering_point.id, period.start, end)
                .await?;
        let mut datahub_prices = Vec::with_capacity(links.len());
        for link in links {
            let Some(price_row) = price_by_id(&mut ex, link.price_id).await? else {
                continue;
            };
            let points = database::prices::points_for_price(&mut ex, link.price_id).await?;
            datahub_prices.push(PriceWithPoints::new(
                price_from_rows(price_row, points)?,
                None,
            ));
        }

        let price_area = metering_point.grid_area.parse().unwrap_or_else(|_| {
            tracing::warn!(
                grid_area = %metering_point.grid_area,
                "grid area has no price area, assuming DK1"
            );
            domain::price::PriceArea::Dk1
        });
        let spot_rows =
            database::spot_prices::in_period(&mut ex, &price_area.to_string(), period.start, end)
                .await?;
        let spot_prices = spot_rows
            .into_iter()
            .map(|row| SpotPrice {
                price_area,
                timestamp: row.timestamp,
                price_dkk_per_kwh: row.price_dkk_per_kwh,
            })
            .collect();

        let products =
            database::products::active_for_supply(&mut ex, supply.id, period.start, end).await?;
        let mut pricing_model = PricingModel::SpotAddon;
        let mut margins = Vec::new();
        for (index, product) in products.iter().enumerate() {
            if index == 0 {
                pricing_model = parse_enum(&product.pricing_model, "pricing model")?;
            }
            let steps = database::supplier_margins::for_product(&mut ex, product.id).await?;
            let steps: Vec<_> = steps
                .into_iter()
                .map(|row| domain::price::SupplierMargin {
                    id: row.id,
                    supplier_product_id: row.supplier_product_id,
                    valid_from: row.valid_from,
                    price_dkk_per_kwh: row.price_dkk_per_kwh,
                })
                .collect();
            if let Some(margin) = domain::price::margin_at(&steps, period.start) {
                margins.push(ActiveMargin {
                    name: product.name.clone(),
                    price_dkk_per_kwh: margin.price_dkk_per_kwh,
                });
            }
        }

        Ok(Some(PricingContext {
            supply,
            pricing_model,
            datahub_prices,
            spot_prices,
            margins,
        }))
    }

    pub async fn save_outcome(
        &self,
        outcome: processes::HandlerOutcome,
    ) -> Result<()> {
        let mut tx = self.0.begin().await?;
        save_process(&mut tx, &outcome.process).await?;
        if let Some(outbox) = &outcome.outbox {
            database::outbox::insert(&mut tx, &outbox_to_row(outbox)).await?;
        }
        apply_effects(&mut tx, &outcome.effects).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Persists every effect a handler produced, inside the caller's
/// transaction.
pub async fn apply_effects(
    tx: &mut PgTransaction<'_>,
    effects: &[processes::Effect],
) -> Result<()> {
    use processes::Effect::*;
    for effect in effects {
        match effect {
            SupplyCreated(supply) => {
                database::supplies::insert(tx, &supply_to_row(supply)).await?;
            }
            SupplyEnded(supply) => {
                let end = supply
                    .period
                    .end
                    .ok_or_else(|| anyhow!("ended supply {} has an open period", supply.id))?;
                database::supplies::end(tx, supply.id, end).await?;
            }
            CustomerCreated(customer) => {
                database::customers::insert(tx, &customer_to_row(customer)).await?;
            }
            CustomerUpdated(customer) => {
                database::customers::update_contact(tx, &customer_to_row(customer)).await?;
            }
            MeteringPointCreated(mp) => {
                database::metering_points::insert(tx, &metering_point_to_row(mp)).await?;
            }
            MeteringPointUpdated(mp) => {
                database::metering_points::update(tx, &metering_point_to_row(mp)).await?;
            }
            ProductPeriodCreated(period) => {
                database::products::insert_period(
                    tx,
                    &database::products::SupplyProductPeriod {
                        id: period.id,
                        supply_id: period.supply_id,
                        supplier_product_id: period.supplier_product_id,
                        period_start: period.period.start,
                        period_end: period.period.end,
                    },
                )
                .await?;
            }
            // Supersession happens inside `insert_as_latest` together with
            // the insert of the replacement.
            TimeSeriesSuperseded { .. } => (),
            TimeSeriesCreated(series) => {
                let (row, observations) = time_series_to_rows(series)?;
                database::time_series::insert_as_latest(tx, &row, &observations).await?;
            }
            PriceCreated(price) | PriceUpdated(price) => {
                database::prices::upsert(tx, &price_to_row(price)).await?;
            }
            PricePointsReplaced {
                price_id,
                from,
                to,
                points,
            } => {
                database::prices::replace_points(tx, *price_id, *from, *to, points).await?;
            }
            PriceLinkEnded(link) => {
                let end = link
                    .period
                    .end
                    .ok_or_else(|| anyhow!("ended link {} has an open period", link.id))?;
                database::price_links::end(tx, link.id, end).await?;
            }
            PriceLinkCreated(link) => {
                database::price_links::insert(
                    tx,
                    &database::price_links::PriceLink {
                        id: link.id,
                        metering_point_id: link.metering_point_id,
                        price_id: link.price_id,
                        period_start: link.period.start,
                        period_end: link.period.end,
                    },
                )
                .await?;
            }
            WholesaleSettlementStored(settlement) => {
                let (row, lines) = wholesale_to_rows(settlement)?;
                database::wholesale::insert(tx, &row, &lines).await?;
            }
        }
    }
    Ok(())
}

pub async fn save_process(tx: &mut PgTransaction<'_>, process: &BrsProcess) -> Result<()> {
    let (row, transitions) = process_to_rows(process);
    database::processes::save(tx, &row, &transitions).await?;
    Ok(())
}

async fn price_by_id(
    ex: &mut sqlx::PgConnection,
    id: Uuid,
) -> Result<Option<database::prices::Price>> {
    // Links reference prices by id; the store keys them by charge. A small
    // scan keeps the row module surface minimal.
    const QUERY: &str = "SELECT * FROM prices WHERE id = $1";
    Ok(sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await?)
}

fn parse_enum<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| anyhow!("stored {what} {raw:?} is not recognized"))
}

pub fn metering_point_from_row(
    row: database::metering_points::MeteringPoint,
) -> Result<MeteringPoint> {
    Ok(MeteringPoint {
        id: row.id,
        gsrn: Gsrn::new(&row.gsrn).map_err(|err| anyhow!("{err}"))?,
        metering_point_type: parse_enum(&row.metering_point_type, "metering point type")?,
        category: parse_enum(&row.category, "category")?,
        settlement_method: parse_enum(&row.settlement_method, "settlement method")?,
        resolution: parse_enum(&row.resolution, "resolution")?,
        grid_area: row.grid_area,
        grid_company_gln: GlnNumber::from_trusted(&row.grid_company_gln)
            .map_err(|err| anyhow!("{err}"))?,
        connection_state: parse_enum(&row.connection_state, "connection state")?,
        has_active_supply: row.has_active_supply,
    })
}

pub fn metering_point_to_row(mp: &MeteringPoint) -> database::metering_points::MeteringPoint {
    database::metering_points::MeteringPoint {
        id: mp.id,
        gsrn: mp.gsrn.to_string(),
        metering_point_type: mp.metering_point_type.to_string(),
        category: mp.category.to_string(),
        settlement_method: mp.settlement_method.to_string(),
        resolution: mp.resolution.to_string(),
        grid_area: mp.grid_area.clone(),
        grid_company_gln: mp.grid_company_gln.to_string(),
        connection_state: mp.connection_state.to_string(),
        has_active_supply: mp.has_active_supply,
    }
}

pub fn supply_from_row(row: database::supplies::Supply) -> Supply {
    Supply {
        id: row.id,
        metering_point_id: row.metering_point_id,
        customer_id: row.customer_id,
        period: Period {
            start: row.period_start,
            end: row.period_end,
        },
    }
}

pub fn supply_to_row(supply: &Supply) -> database::supplies::Supply {
    database::supplies::Supply {
        id: supply.id,
        metering_point_id: supply.metering_point_id,
        customer_id: supply.customer_id,
        period_start: supply.period.start,
        period_end: supply.period.end,
    }
}

pub fn customer_to_row(customer: &Customer) -> database::customers::Customer {
    let address = customer.address.as_ref();
    database::customers::Customer {
        id: customer.id,
        name: customer.name.clone(),
        cpr: customer.cpr.as_ref().map(|cpr| cpr.as_str().to_owned()),
        cvr: customer.cvr.as_ref().map(|cvr| cvr.as_str().to_owned()),
        supplier_identity_id: customer.supplier_identity_id,
        address_street: address.map(|a| a.street.clone()),
        address_building_number: address.map(|a| a.building_number.clone()),
        address_postal_code: address.map(|a| a.postal_code.clone()),
        address_city: address.map(|a| a.city.clone()),
        email: customer.email.clone(),
        phone: customer.phone.clone(),
    }
}

pub fn price_from_rows(
    row: database::prices::Price,
    points: Vec<database::prices::PricePoint>,
) -> Result<Price> {
    Ok(Price {
        id: row.id,
        charge_id: row.charge_id,
        owner_gln: GlnNumber::from_trusted(&row.owner_gln).map_err(|err| anyhow!("{err}"))?,
        price_type: parse_enum(&row.price_type, "price type")?,
        description: row.description,
        validity: Period {
            start: row.validity_start,
            end: row.validity_end,
        },
        vat_exempt: row.vat_exempt,
        is_tax: row.is_tax,
        is_pass_through: row.is_pass_through,
        category: parse_enum(&row.category, "price category")?,
        price_resolution: row
            .price_resolution
            .as_deref()
            .map(|raw| parse_enum::<Resolution>(raw, "price resolution"))
            .transpose()?,
        points: points
            .into_iter()
            .map(|point| PricePoint {
                id: point.id,
                price_id: point.price_id,
                timestamp: point.timestamp,
                price: point.price,
            })
            .collect(),
    })
}

pub fn price_to_row(price: &Price) -> database::prices::Price {
    database::prices::Price {
        id: price.id,
        charge_id: price.charge_id.clone(),
        owner_gln: price.owner_gln.to_string(),
        price_type: price.price_type.to_string(),
        description: price.description.clone(),
        validity_start: price.validity.start,
        validity_end: price.validity.end,
        vat_exempt: price.vat_exempt,
        is_tax: price.is_tax,
        is_pass_through: price.is_pass_through,
        category: price.category.to_string(),
        price_resolution: price.price_resolution.map(|r| r.to_string()),
    }
}

pub fn time_series_from_rows(
    row: database::time_series::TimeSeries,
    observations: Vec<database::time_series::Observation>,
) -> Result<TimeSeries> {
    let mut series = TimeSeries::new(
        row.metering_point_id,
        Period::closed(row.period_start, row.period_end).map_err(|err| anyhow!("{err}"))?,
        parse_enum(&row.resolution, "resolution")?,
        row.version,
        row.transaction_id,
        row.received_at,
    )
    .map_err(|err| anyhow!("{err}"))?;
    series.id = row.id;
    series.is_latest = row.is_latest;
    for observation in observations {
        series
            .add_observation(
                observation.timestamp,
                EnergyQuantity::new(observation.quantity),
                parse_enum::<QuantityQuality>(&observation.quality, "quality")?,
            )
            .map_err(|err| anyhow!("{err}"))?;
    }
    Ok(series)
}

pub fn time_series_to_rows(
    series: &TimeSeries,
) -> Result<(
    database::time_series::TimeSeries,
    Vec<database::time_series::Observation>,
)> {
    let end = series
        .period
        .end
        .ok_or_else(|| anyhow!("time series {} has an open period", series.id))?;
    let row = database::time_series::TimeSeries {
        id: series.id,
        metering_point_id: series.metering_point_id,
        period_start: series.period.start,
        period_end: end,
        resolution: series.resolution.to_string(),
        version: series.version,
        is_latest: series.is_latest,
        transaction_id: series.transaction_id.clone(),
        received_at: series.received_at,
    };
    let observations = series
        .observations()
        .iter()
        .map(|observation| database::time_series::Observation {
            time_series_id: series.id,
            timestamp: observation.timestamp,
            quantity: observation.quantity.value(),
            quality: observation.quality.to_string(),
        })
        .collect();
    Ok((row, observations))
}

pub fn settlement_to_rows(
    settlement: &Settlement,
) -> (
    database::settlements::Settlement,
    Vec<database::settlements::SettlementLine>,
) {
    let row = database::settlements::Settlement {
        id: settlement.id,
        metering_point_id: settlement.metering_point_id,
        supply_id: settlement.supply_id,
        period_start: settlement.period.start,
        period_end: settlement.period.end,
        time_series_id: settlement.time_series_id,
        time_series_version: settlement.time_series_version,
        total_energy: settlement.total_energy.value(),
        total_amount: settlement.total_amount.amount(),
        status: settlement.status.to_string(),
        is_correction: settlement.is_correction,
        previous_settlement_id: settlement.previous_settlement_id,
        document_number: settlement.document_number,
        calculated_at: settlement.calculated_at,
        invoiced_at: settlement.invoiced_at,
        external_invoice_reference: settlement.external_invoice_reference.clone(),
        migrated_hourly_json: settlement.migrated_hourly_json.clone(),
    };
    let lines = settlement
        .lines
        .iter()
        .enumerate()
        .map(|(index, line)| database::settlements::SettlementLine {
            id: line.id,
            settlement_id: settlement.id,
            source: line.source.to_string(),
            price_id: line.price_id,
            description: line.description.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            amount: line.amount.amount(),
            ordinal: i32::try_from(index).unwrap_or(i32::MAX),
        })
        .collect();
    (row, lines)
}

pub fn settlement_from_rows(
    row: database::settlements::Settlement,
    lines: Vec<database::settlements::SettlementLine>,
) -> Result<Settlement> {
    use domain::settlement::{SettlementLine as DomainLine, SettlementLineSource, SettlementStatus};
    let lines = lines
        .into_iter()
        .map(|line| {
            Ok(DomainLine::with_amount(
                parse_enum::<SettlementLineSource>(&line.source, "line source")?,
                line.price_id,
                line.description,
                line.quantity,
                line.unit_price,
                Money::dkk(line.amount),
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Settlement {
        id: row.id,
        metering_point_id: row.metering_point_id,
        supply_id: row.supply_id,
        period: Period {
            start: row.period_start,
            end: row.period_end,
        },
        time_series_id: row.time_series_id,
        time_series_version: row.time_series_version,
        total_energy: EnergyQuantity::new(row.total_energy),
        total_amount: Money::dkk(row.total_amount),
        status: parse_enum::<SettlementStatus>(&row.status, "settlement status")?,
        is_correction: row.is_correction,
        previous_settlement_id: row.previous_settlement_id,
        lines,
        document_number: row.document_number,
        calculated_at: row.calculated_at,
        invoiced_at: row.invoiced_at,
        external_invoice_reference: row.external_invoice_reference,
        migrated_hourly_json: row.migrated_hourly_json,
    })
}

pub fn issue_to_row(issue: &SettlementIssue) -> database::settlement_issues::SettlementIssue {
    database::settlement_issues::SettlementIssue {
        id: issue.id,
        metering_point_id: issue.metering_point_id,
        period_start: issue.period.start,
        period_end: issue.period.end,
        time_series_id: issue.time_series_id,
        time_series_version: issue.time_series_version,
        issue_type: issue.issue_type.to_string(),
        message: issue.message.clone(),
        details: issue.details.clone(),
        status: issue.status.to_string(),
    }
}

pub fn process_to_rows(
    process: &BrsProcess,
) -> (
    database::processes::BrsProcess,
    Vec<database::processes::ProcessTransition>,
) {
    let row = database::processes::BrsProcess {
        id: process.id,
        process_type: process.process_type.to_string(),
        role: process.role.to_string(),
        current_state: process.current_state.to_string(),
        status: process.status.to_string(),
        transaction_id: process.transaction_id.clone(),
        gsrn: process.gsrn.as_ref().map(|gsrn| gsrn.to_string()),
        effective_date: process.effective_date,
        counterpart_gln: process.counterpart_gln.as_ref().map(|gln| gln.to_string()),
        started_at: process.started_at,
        completed_at: process.completed_at,
        error_message: process.error_message.clone(),
    };
    let transitions = process
        .transitions
        .iter()
        .enumerate()
        .map(|(index, transition)| database::processes::ProcessTransition {
            process_id: process.id,
            ordinal: i32::try_from(index).unwrap_or(i32::MAX),
            from_state: transition.from_state.to_string(),
            to_state: transition.to_state.to_string(),
            reason: transition.reason.clone(),
            transitioned_at: transition.transitioned_at,
        })
        .collect();
    (row, transitions)
}

pub fn process_from_rows(
    row: database::processes::BrsProcess,
    transitions: Vec<database::processes::ProcessTransition>,
) -> Result<BrsProcess> {
    let transitions = transitions
        .into_iter()
        .map(|transition| {
            Ok(ProcessTransition {
                from_state: parse_enum::<ProcessState>(&transition.from_state, "state")?,
                to_state: parse_enum::<ProcessState>(&transition.to_state, "state")?,
                reason: transition.reason,
                transitioned_at: transition.transitioned_at,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(BrsProcess {
        id: row.id,
        process_type: parse_enum(&row.process_type, "process type")?,
        role: parse_enum(&row.role, "role")?,
        current_state: parse_enum(&row.current_state, "state")?,
        status: parse_enum(&row.status, "status")?,
        transaction_id: row.transaction_id,
        gsrn: row
            .gsrn
            .as_deref()
            .map(Gsrn::new)
            .transpose()
            .map_err(|err| anyhow!("{err}"))?,
        effective_date: row.effective_date,
        counterpart_gln: row
            .counterpart_gln
            .as_deref()
            .map(GlnNumber::from_trusted)
            .transpose()
            .map_err(|err| anyhow!("{err}"))?,
        transitions,
        started_at: row.started_at,
        completed_at: row.completed_at,
        error_message: row.error_message,
    })
}

pub fn outbox_to_row(message: &OutboxMessage) -> database::outbox::OutboxMessage {
    database::outbox::OutboxMessage {
        id: message.id,
        message_id: message.message_id.clone(),
        document_type: message.document_type.clone(),
        business_process: message.business_process.clone(),
        sender_gln: message.sender_gln.to_string(),
        receiver_gln: message.receiver_gln.to_string(),
        payload: message.payload.clone(),
        created_at: message.created_at,
        scheduled_for: message.scheduled_for,
        is_sent: message.is_sent,
        sent_at: message.sent_at,
        send_attempts: message.send_attempts,
        response: message.response.clone(),
        send_error: message.send_error.clone(),
        next_attempt_at: None,
    }
}

pub fn wholesale_to_rows(
    settlement: &WholesaleSettlement,
) -> Result<(
    database::wholesale::WholesaleSettlement,
    Vec<database::wholesale::WholesaleSettlementLine>,
)> {
    let end = settlement
        .period
        .end
        .ok_or_else(|| anyhow!("wholesale settlement period is open"))?;
    let row = database::wholesale::WholesaleSettlement {
        id: settlement.id,
        grid_area: settlement.grid_area.clone(),
        period_start: settlement.period.start,
        period_end: end,
        received_at: settlement.received_at,
        total_amount: settlement.total_amount.amount(),
    };
    let lines = settlement
        .lines
        .iter()
        .map(|line| database::wholesale::WholesaleSettlementLine {
            wholesale_settlement_id: settlement.id,
            charge_id: line.charge_id.clone(),
            charge_owner: line.charge_owner.clone(),
            description: line.description.clone(),
            quantity: line.quantity,
            amount: line.amount.amount(),
        })
        .collect();
    Ok((row, lines))
}

pub fn wholesale_from_rows(
    row: database::wholesale::WholesaleSettlement,
    lines: Vec<database::wholesale::WholesaleSettlementLine>,
) -> Result<WholesaleSettlement> {
    Ok(WholesaleSettlement {
        id: row.id,
        grid_area: row.grid_area,
        period: Period::closed(row.period_start, row.period_end)
            .map_err(|err| anyhow!("{err}"))?,
        received_at: row.received_at,
        total_amount: Money::dkk(row.total_amount),
        lines: lines
            .into_iter()
            .map(|line| WholesaleSettlementLine {
                charge_id: line.charge_id,
                charge_owner: line.charge_owner,
                description: line.description,
                quantity: line.quantity,
                amount: Money::dkk(line.amount),
            })
            .collect(),
    })
}

/// Charge ids behind our datahub-charge settlement lines, for the
/// reconciliation matcher.
pub async fn charge_ids_for_prices(
    ex: &mut sqlx::PgConnection,
    price_ids: &[Uuid],
) -> Result<HashMap<Uuid, String>> {
    const QUERY: &str = "SELECT id, charge_id FROM prices WHERE id = ANY($1)";
    let rows: Vec<(Uuid, String)> = sqlx::query_as(QUERY).bind(price_ids).fetch_all(ex).await?;
    Ok(rows.into_iter().collect())
}
