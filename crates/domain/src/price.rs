//! Regulated charges, their dated price points, spot prices and supplier
//! margins.

use {
    crate::{
        error::{DomainError, Result},
        ids::GlnNumber,
        metering::Resolution,
        period::Period,
    },
    chrono::{DateTime, Duration, Utc},
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
pub enum PriceType {
    /// Rate per kWh, stepwise over time.
    Tariff,
    /// Rate per day, a single point carries the whole validity.
    Subscription,
    /// One-off, event driven; never part of periodic settlement.
    Fee,
}

/// Category of a charge. Display names are the Danish terms an invoice
/// reader expects.
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
pub enum PriceCategory {
    SpotPris,
    Nettarif,
    Systemtarif,
    Transmissionstarif,
    Elafgift,
    Balancetarif,
    LeverandoerTillaeg,
    NetAbonnement,
    Gebyr,
    Andet,
}

impl PriceCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SpotPris => "Spotpris",
            Self::Nettarif => "Nettarif",
            Self::Systemtarif => "Systemtarif",
            Self::Transmissionstarif => "Transmissionstarif",
            Self::Elafgift => "Elafgift",
            Self::Balancetarif => "Balancetarif",
            Self::LeverandoerTillaeg => "Leverandørtillæg",
            Self::NetAbonnement => "Net abonnement",
            Self::Gebyr => "Gebyr",
            Self::Andet => "Andet",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub id: Uuid,
    pub price_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

/// A charge definition as published by its owner (grid company, TSO, state,
/// or ourselves). The dated points carry the actual rates.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: Uuid,
    pub charge_id: String,
    pub owner_gln: GlnNumber,
    pub price_type: PriceType,
    pub description: String,
    pub validity: Period,
    pub vat_exempt: bool,
    pub is_tax: bool,
    pub is_pass_through: bool,
    pub category: PriceCategory,
    pub price_resolution: Option<Resolution>,
    pub points: Vec<PricePoint>,
}

impl Price {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        charge_id: String,
        owner_gln: GlnNumber,
        price_type: PriceType,
        description: String,
        validity: Period,
        vat_exempt: bool,
        price_resolution: Option<Resolution>,
        is_tax: bool,
        is_pass_through: bool,
        category: PriceCategory,
    ) -> Result<Self> {
        if charge_id.is_empty() {
            return Err(DomainError::Validation("charge id must be set".to_owned()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            charge_id,
            owner_gln,
            price_type,
            description,
            validity,
            vat_exempt,
            is_tax,
            is_pass_through,
            category,
            price_resolution,
            points: Vec::new(),
        })
    }

    pub fn update_price_info(&mut self, description: String, price_type: PriceType) {
        self.description = description;
        self.price_type = price_type;
    }

    pub fn update_validity(&mut self, validity: Period) {
        self.validity = validity;
    }

    pub fn update_category(&mut self, category: PriceCategory) {
        self.category = category;
    }

    pub fn update_vat_exempt(&mut self, vat_exempt: bool) {
        self.vat_exempt = vat_exempt;
    }

    pub fn add_price_point(&mut self, timestamp: DateTime<Utc>, price: Decimal) -> Result<()> {
        if self.points.iter().any(|p| p.timestamp == timestamp) {
            return Err(DomainError::IntegrityViolation(format!(
                "price {} already has a point at {timestamp}",
                self.charge_id
            )));
        }
        self.points.push(PricePoint {
            id: Uuid::new_v4(),
            price_id: self.id,
            timestamp,
            price,
        });
        self.points.sort_by_key(|p| p.timestamp);
        Ok(())
    }

    /// Replaces every point with `from <= timestamp < to` by the supplied
    /// sequence. Returns the number of points written.
    pub fn replace_price_points(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        points: Vec<(DateTime<Utc>, Decimal)>,
    ) -> usize {
        self.points
            .retain(|p| p.timestamp < from || p.timestamp >= to);
        let written = points.len();
        for (timestamp, price) in points {
            self.points.push(PricePoint {
                id: Uuid::new_v4(),
                price_id: self.id,
                timestamp,
                price,
            });
        }
        self.points.sort_by_key(|p| p.timestamp);
        written
    }
}

/// Read-only lookup over a price and its points, sorted once at
/// construction.
///
/// The optional cutoff serves migrated settlements: points published on or
/// after the cutoff are invisible, freezing the rate to what was effective
/// when the legacy system billed the period.
#[derive(Clone, Debug)]
pub struct PriceWithPoints {
    price: Price,
    points: Vec<PricePoint>,
}

impl PriceWithPoints {
    pub fn new(price: Price, points_cutoff: Option<DateTime<Utc>>) -> Self {
        let mut points: Vec<PricePoint> = price
            .points
            .iter()
            .filter(|p| points_cutoff.is_none_or(|cutoff| p.timestamp < cutoff))
            .cloned()
            .collect();
        points.sort_by_key(|p| p.timestamp);
        Self { price, points }
    }

    pub fn price(&self) -> &Price {
        &self.price
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// The rate effective at `t`.
    ///
    /// Subscriptions carry a single conceptual rate, so the first point wins
    /// regardless of `t`. Tariffs and fees follow the step function: the
    /// latest point at or before `t`, none if `t` predates all points.
    pub fn price_at(&self, t: DateTime<Utc>) -> Option<Decimal> {
        match self.price.price_type {
            PriceType::Subscription => self.points.first().map(|p| p.price),
            PriceType::Tariff | PriceType::Fee => {
                let index = self.points.partition_point(|p| p.timestamp <= t);
                index.checked_sub(1).map(|i| self.points[i].price)
            }
        }
    }

    /// Mean of the points inside `[hour_start, hour_start + 1h)`, falling
    /// back to the step function when the hour has no points.
    pub fn average_price_in_hour(&self, hour_start: DateTime<Utc>) -> Option<Decimal> {
        let hour_end = hour_start + Duration::hours(1);
        let in_hour: Vec<Decimal> = self
            .points
            .iter()
            .filter(|p| p.timestamp >= hour_start && p.timestamp < hour_end)
            .map(|p| p.price)
            .collect();
        if in_hour.is_empty() {
            return self.price_at(hour_start);
        }
        let sum: Decimal = in_hour.iter().sum();
        Some(sum / Decimal::from(in_hour.len() as u64))
    }
}

/// Assignment of a charge to a metering point for a period.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PriceLink {
    pub id: Uuid,
    pub metering_point_id: Uuid,
    pub price_id: Uuid,
    pub period: Period,
}

impl PriceLink {
    pub fn new(metering_point_id: Uuid, price_id: Uuid, period: Period) -> Self {
        Self {
            id: Uuid::new_v4(),
            metering_point_id,
            price_id,
            period,
        }
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
pub enum PriceArea {
    #[strum(serialize = "DK1")]
    Dk1,
    #[strum(serialize = "DK2")]
    Dk2,
}

/// Nordpool day-ahead price for one bucket in one price area.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SpotPrice {
    pub price_area: PriceArea,
    pub timestamp: DateTime<Utc>,
    pub price_dkk_per_kwh: Decimal,
}

/// Our own per-kWh mark-up for a product. Step function over `valid_from`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SupplierMargin {
    pub id: Uuid,
    pub supplier_product_id: Uuid,
    pub valid_from: DateTime<Utc>,
    pub price_dkk_per_kwh: Decimal,
}

/// Latest margin with `valid_from <= t`.
pub fn margin_at(margins: &[SupplierMargin], t: DateTime<Utc>) -> Option<&SupplierMargin> {
    margins
        .iter()
        .filter(|m| m.valid_from <= t)
        .max_by_key(|m| m.valid_from)
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone, rust_decimal_macros::dec};

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap()
    }

    fn tariff(points: &[(DateTime<Utc>, Decimal)]) -> Price {
        let mut price = Price::new(
            "NT-1".to_owned(),
            GlnNumber::from_trusted("5790000432752").unwrap(),
            PriceType::Tariff,
            "Nettarif C".to_owned(),
            Period::open_ended(t(1)),
            false,
            Some(Resolution::Pt1h),
            false,
            true,
            PriceCategory::Nettarif,
        )
        .unwrap();
        for (timestamp, value) in points {
            price.add_price_point(*timestamp, *value).unwrap();
        }
        price
    }

    #[test]
    fn step_function_lookup() {
        let price = tariff(&[(t(1), dec!(1)), (t(10), dec!(2)), (t(20), dec!(3))]);
        let lookup = PriceWithPoints::new(price, None);

        assert_eq!(lookup.price_at(t(1) - Duration::hours(1)), None);
        assert_eq!(lookup.price_at(t(1)), Some(dec!(1)));
        assert_eq!(lookup.price_at(t(9)), Some(dec!(1)));
        assert_eq!(lookup.price_at(t(10)), Some(dec!(2)));
        assert_eq!(lookup.price_at(t(19)), Some(dec!(2)));
        assert_eq!(lookup.price_at(t(20)), Some(dec!(3)));
        assert_eq!(lookup.price_at(t(31)), Some(dec!(3)));
    }

    #[test]
    fn subscription_always_returns_first_point() {
        let mut price = tariff(&[(t(1), dec!(21.56)), (t(10), dec!(30))]);
        price.price_type = PriceType::Subscription;
        let lookup = PriceWithPoints::new(price, None);

        assert_eq!(lookup.price_at(t(1) - Duration::days(5)), Some(dec!(21.56)));
        assert_eq!(lookup.price_at(t(15)), Some(dec!(21.56)));
    }

    #[test]
    fn cutoff_hides_later_points() {
        let price = tariff(&[(t(1), dec!(1)), (t(10), dec!(2))]);
        let lookup = PriceWithPoints::new(price, Some(t(10)));
        assert_eq!(lookup.price_at(t(15)), Some(dec!(1)));
    }

    #[test]
    fn hourly_average_of_quarter_points() {
        let hour = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let price = tariff(&[
            (hour, dec!(0.40)),
            (hour + Duration::minutes(15), dec!(0.42)),
            (hour + Duration::minutes(30), dec!(0.44)),
            (hour + Duration::minutes(45), dec!(0.46)),
        ]);
        let lookup = PriceWithPoints::new(price, None);
        assert_eq!(lookup.average_price_in_hour(hour), Some(dec!(0.43)));
        // An hour without points falls back to the step function.
        assert_eq!(
            lookup.average_price_in_hour(hour + Duration::hours(1)),
            Some(dec!(0.46))
        );
    }

    #[test]
    fn replace_points_is_half_open() {
        let mut price = tariff(&[(t(1), dec!(1)), (t(10), dec!(2)), (t(20), dec!(3))]);
        let written = price.replace_price_points(
            t(10),
            t(20),
            vec![(t(10), dec!(4)), (t(15), dec!(5))],
        );
        assert_eq!(written, 2);
        let values: Vec<Decimal> = price.points.iter().map(|p| p.price).collect();
        assert_eq!(values, vec![dec!(1), dec!(4), dec!(5), dec!(3)]);
    }

    #[test]
    fn duplicate_point_is_rejected() {
        let mut price = tariff(&[(t(1), dec!(1))]);
        assert!(matches!(
            price.add_price_point(t(1), dec!(2)),
            Err(DomainError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn margin_step_function() {
        let product = Uuid::new_v4();
        let margins = vec![
            SupplierMargin {
                id: Uuid::new_v4(),
                supplier_product_id: product,
                valid_from: t(1),
                price_dkk_per_kwh: dec!(0.10),
            },
            SupplierMargin {
                id: Uuid::new_v4(),
                supplier_product_id: product,
                valid_from: t(15),
                price_dkk_per_kwh: dec!(0.15),
            },
        ];
        assert_eq!(
            margin_at(&margins, t(14)).unwrap().price_dkk_per_kwh,
            dec!(0.10)
        );
        assert_eq!(
            margin_at(&margins, t(15)).unwrap().price_dkk_per_kwh,
            dec!(0.15)
        );
        assert!(margin_at(&margins, t(1) - Duration::days(1)).is_none());
    }
}
