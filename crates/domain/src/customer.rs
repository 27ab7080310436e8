//! Customers.

use {
    crate::{
        error::{DomainError, Result},
        ids::{Cpr, Cvr},
    },
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub building_number: String,
    pub postal_code: String,
    pub city: String,
}

/// A customer is either a private person (CPR) or a business (CVR), never
/// both and never neither.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub cpr: Option<Cpr>,
    pub cvr: Option<Cvr>,
    pub supplier_identity_id: Uuid,
    pub address: Option<Address>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Customer {
    pub fn new(
        name: String,
        cpr: Option<Cpr>,
        cvr: Option<Cvr>,
        supplier_identity_id: Uuid,
    ) -> Result<Self> {
        match (&cpr, &cvr) {
            (Some(_), None) | (None, Some(_)) => (),
            _ => {
                return Err(DomainError::Validation(
                    "customer requires exactly one of CPR and CVR".to_owned(),
                ));
            }
        }
        if name.is_empty() {
            return Err(DomainError::Validation(
                "customer name must be set".to_owned(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            cpr,
            cvr,
            supplier_identity_id,
            address: None,
            email: None,
            phone: None,
        })
    }

    pub fn update_contact(
        &mut self,
        name: Option<String>,
        address: Option<Address>,
        email: Option<String>,
        phone: Option<String>,
    ) {
        if let Some(name) = name {
            self.name = name;
        }
        if address.is_some() {
            self.address = address;
        }
        if email.is_some() {
            self.email = email;
        }
        if phone.is_some() {
            self.phone = phone;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_exactly_one_of_cpr_and_cvr() {
        let supplier = Uuid::new_v4();
        let cpr = Cpr::new("0101901234").unwrap();
        let cvr = Cvr::new("12345678").unwrap();

        assert!(Customer::new("A".to_owned(), Some(cpr.clone()), None, supplier).is_ok());
        assert!(Customer::new("B".to_owned(), None, Some(cvr.clone()), supplier).is_ok());
        assert!(Customer::new("C".to_owned(), None, None, supplier).is_err());
        assert!(Customer::new("D".to_owned(), Some(cpr), Some(cvr), supplier).is_err());
    }
}
