//! Market participant and metering point identifiers.
//!
//! The identifier formats are fixed by the Danish DataHub: GSRN for metering
//! points, GLN for market participants, CPR/CVR for private and business
//! customers. They are kept as validated strings; leading zeroes are
//! significant.

use {
    crate::error::{DomainError, Result},
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

fn all_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// 18-digit global service relation number identifying a metering point.
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gsrn(String);

impl Gsrn {
    pub fn new(value: &str) -> Result<Self> {
        if value.len() != 18 || !all_digits(value) {
            return Err(DomainError::Validation(format!(
                "GSRN must be exactly 18 digits, got {value:?}"
            )));
        }
        Ok(Self(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Gsrn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Gsrn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Gsrn({})", self.0)
    }
}

impl FromStr for Gsrn {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// 13-digit global location number with a GS1 check digit, identifying a
/// market participant (supplier, grid company, the hub itself).
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlnNumber(String);

impl GlnNumber {
    pub fn new(value: &str) -> Result<Self> {
        if value.len() != 13 || !all_digits(value) {
            return Err(DomainError::Validation(format!(
                "GLN must be exactly 13 digits, got {value:?}"
            )));
        }
        if Self::check_digit(&value[..12]) != value.as_bytes()[12] - b'0' {
            return Err(DomainError::Validation(format!(
                "GLN {value} has an invalid check digit"
            )));
        }
        Ok(Self(value.to_owned()))
    }

    /// Skips check digit validation. Used for codes received from the hub,
    /// which validates them on its side.
    pub fn from_trusted(value: &str) -> Result<Self> {
        if value.len() != 13 || !all_digits(value) {
            return Err(DomainError::Validation(format!(
                "GLN must be exactly 13 digits, got {value:?}"
            )));
        }
        Ok(Self(value.to_owned()))
    }

    // GS1 mod-10: weights 1 and 3 alternating from the left over the first
    // twelve digits.
    fn check_digit(data: &str) -> u8 {
        let sum: u32 = data
            .bytes()
            .enumerate()
            .map(|(i, b)| u32::from(b - b'0') * if i % 2 == 0 { 1 } else { 3 })
            .sum();
        ((10 - sum % 10) % 10) as u8
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GlnNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for GlnNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GlnNumber({})", self.0)
    }
}

impl FromStr for GlnNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Danish personal identification number. The full number is personal data;
/// `Debug` and log output only ever see the masked form.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cpr(String);

impl Cpr {
    pub fn new(value: &str) -> Result<Self> {
        if value.len() != 10 || !all_digits(value) {
            return Err(DomainError::Validation(
                "CPR must be exactly 10 digits".to_owned(),
            ));
        }
        Ok(Self(value.to_owned()))
    }

    /// Birth date part only, e.g. `010190xxxx`.
    pub fn masked(&self) -> String {
        format!("{}xxxx", &self.0[..6])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Cpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Cpr({})", self.masked())
    }
}

/// Danish company registration number.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cvr(String);

impl Cvr {
    pub fn new(value: &str) -> Result<Self> {
        if value.len() != 8 || !all_digits(value) {
            return Err(DomainError::Validation(format!(
                "CVR must be exactly 8 digits, got {value:?}"
            )));
        }
        Ok(Self(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cvr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Cvr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Cvr({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gsrn_accepts_exactly_18_digits() {
        assert!(Gsrn::new("571313180400013562").is_ok());
        assert!(Gsrn::new("57131318040001356").is_err());
        assert!(Gsrn::new("5713131804000135621").is_err());
        assert!(Gsrn::new("57131318040001356x").is_err());
        assert!(Gsrn::new("").is_err());
    }

    #[test]
    fn gln_validates_check_digit() {
        assert!(GlnNumber::new("5790000432752").is_ok());
        assert!(GlnNumber::new("5790000432753").is_err());
        // Trusted construction skips the checksum but not the shape.
        assert!(GlnNumber::from_trusted("5790000432753").is_ok());
        assert!(GlnNumber::from_trusted("579000043275").is_err());
    }

    #[test]
    fn cpr_masks_the_serial_part() {
        let cpr = Cpr::new("0101901234").unwrap();
        assert_eq!(cpr.masked(), "010190xxxx");
        assert_eq!(format!("{cpr:?}"), "Cpr(010190xxxx)");
    }

    #[test]
    fn cvr_is_8_digits() {
        assert!(Cvr::new("12345678").is_ok());
        assert!(Cvr::new("1234567").is_err());
        assert!(Cvr::new("1234567a").is_err());
    }
}
