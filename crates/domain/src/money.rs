//! Monetary amounts.
//!
//! Money is always decimal, never floating point. Amounts are rounded to two
//! decimals (the øre) with banker's rounding at construction; sums therefore
//! operate on already-rounded values.

use {
    crate::error::DomainError,
    rust_decimal::{Decimal, RoundingStrategy},
    serde::{Deserialize, Serialize},
    std::fmt,
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
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Dkk,
    Eur,
}

#[derive(Debug, thiserror::Error)]
#[error("currency mismatch: {0} vs {1}")]
pub struct CurrencyMismatch(pub Currency, pub Currency);

impl From<CurrencyMismatch> for DomainError {
    fn from(err: CurrencyMismatch) -> Self {
        DomainError::Validation(err.to_string())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven),
            currency,
        }
    }

    pub fn dkk(amount: Decimal) -> Self {
        Self::new(amount, Currency::Dkk)
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, CurrencyMismatch> {
        if self.currency != rhs.currency {
            return Err(CurrencyMismatch(self.currency, rhs.currency));
        }
        Ok(Self {
            amount: self.amount + rhs.amount,
            currency: self.currency,
        })
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, CurrencyMismatch> {
        if self.currency != rhs.currency {
            return Err(CurrencyMismatch(self.currency, rhs.currency));
        }
        Ok(Self {
            amount: self.amount - rhs.amount,
            currency: self.currency,
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rust_decimal_macros::dec};

    #[test]
    fn rounds_to_ore_bankers() {
        assert_eq!(Money::dkk(dec!(100.555)).amount(), dec!(100.56));
        assert_eq!(Money::dkk(dec!(100.565)).amount(), dec!(100.56));
        assert_eq!(Money::dkk(dec!(100.5651)).amount(), dec!(100.57));
    }

    #[test]
    fn mixed_currency_arithmetic_fails() {
        let dkk = Money::dkk(dec!(10));
        let eur = Money::new(dec!(10), Currency::Eur);
        assert!(dkk.checked_add(eur).is_err());
        assert!(dkk.checked_sub(eur).is_err());
        assert_eq!(
            dkk.checked_add(Money::dkk(dec!(5.25))).unwrap().amount(),
            dec!(15.25)
        );
    }

    #[test]
    fn display() {
        assert_eq!(Money::dkk(dec!(1.5)).to_string(), "1.50 DKK");
    }
}
