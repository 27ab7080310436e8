//! Our own supplier identities.
//!
//! A retailer can operate several balance supplier GLNs (brands, acquired
//! books). Everything downstream hangs off one of these identities.

use {
    crate::{
        error::{DomainError, Result},
        ids::{Cvr, GlnNumber},
    },
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SupplierIdentity {
    pub id: Uuid,
    pub gln: GlnNumber,
    pub name: String,
    pub cvr: Option<Cvr>,
    pub is_active: bool,
    pub is_archived: bool,
}

impl SupplierIdentity {
    pub fn new(gln: GlnNumber, name: String, cvr: Option<Cvr>) -> Result<Self> {
        if name.is_empty() {
            return Err(DomainError::Validation(
                "supplier name must be set".to_owned(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            gln,
            name,
            cvr,
            is_active: true,
            is_archived: false,
        })
    }

    /// Archiving retires the identity; an archived identity is never active.
    pub fn archive(&mut self) {
        self.is_active = false;
        self.is_archived = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_deactivates() {
        let mut supplier = SupplierIdentity::new(
            GlnNumber::from_trusted("5790000432752").unwrap(),
            "Testel A/S".to_owned(),
            None,
        )
        .unwrap();
        assert!(supplier.is_active && !supplier.is_archived);
        supplier.archive();
        assert!(!supplier.is_active && supplier.is_archived);
    }
}
