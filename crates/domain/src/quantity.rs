//! Energy quantities.

use {
    rust_decimal::{Decimal, RoundingStrategy},
    serde::{Deserialize, Serialize},
    std::{fmt, iter::Sum, ops},
};

/// Energy in kWh, kept at 3 decimals with banker's rounding applied at
/// construction.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EnergyQuantity(Decimal);

impl EnergyQuantity {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(kwh: Decimal) -> Self {
        Self(kwh.round_dp_with_strategy(3, RoundingStrategy::MidpointNearestEven))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl ops::Add for EnergyQuantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.0 + rhs.0)
    }
}

impl ops::Sub for EnergyQuantity {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.0 - rhs.0)
    }
}

impl ops::Neg for EnergyQuantity {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for EnergyQuantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, q| acc + q)
    }
}

impl fmt::Display for EnergyQuantity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} kWh", self.0)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rust_decimal_macros::dec};

    #[test]
    fn rounds_to_three_decimals_bankers() {
        assert_eq!(EnergyQuantity::new(dec!(1.2345)).value(), dec!(1.234));
        assert_eq!(EnergyQuantity::new(dec!(1.2355)).value(), dec!(1.236));
        assert_eq!(EnergyQuantity::new(dec!(1.23449)).value(), dec!(1.234));
    }

    #[test]
    fn arithmetic() {
        let a = EnergyQuantity::new(dec!(1.5));
        let b = EnergyQuantity::new(dec!(0.25));
        assert_eq!((a + b).value(), dec!(1.75));
        assert_eq!((a - b).value(), dec!(1.25));
        assert_eq!((-a).value(), dec!(-1.5));
        let total: EnergyQuantity = [a, b, b].into_iter().sum();
        assert_eq!(total.value(), dec!(2));
    }
}
