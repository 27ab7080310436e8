use sqlx::PgConnection;
use uuid::Uuid;

/// One row in the `customers` table. Address fields are stored inline.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub cpr: Option<String>,
    pub cvr: Option<String>,
    pub supplier_identity_id: Uuid,
    pub address_street: Option<String>,
    pub address_building_number: Option<String>,
    pub address_postal_code: Option<String>,
    pub address_city: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

pub async fn insert(ex: &mut PgConnection, customer: &Customer) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO customers (
    id,
    name,
    cpr,
    cvr,
    supplier_identity_id,
    address_street,
    address_building_number,
    address_postal_code,
    address_city,
    email,
    phone
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    "#;
    sqlx::query(QUERY)
        .bind(customer.id)
        .bind(&customer.name)
        .bind(&customer.cpr)
        .bind(&customer.cvr)
        .bind(customer.supplier_identity_id)
        .bind(&customer.address_street)
        .bind(&customer.address_building_number)
        .bind(&customer.address_postal_code)
        .bind(&customer.address_city)
        .bind(&customer.email)
        .bind(&customer.phone)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn by_id(ex: &mut PgConnection, id: Uuid) -> Result<Option<Customer>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM customers WHERE id = $1
    "#;
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

pub async fn update_contact(ex: &mut PgConnection, customer: &Customer) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE customers
SET name = $2,
    address_street = $3,
    address_building_number = $4,
    address_postal_code = $5,
    address_city = $6,
    email = $7,
    phone = $8
WHERE id = $1
    "#;
    sqlx::query(QUERY)
        .bind(customer.id)
        .bind(&customer.name)
        .bind(&customer.address_street)
        .bind(&customer.address_building_number)
        .bind(&customer.address_postal_code)
        .bind(&customer.address_city)
        .bind(&customer.email)
        .bind(&customer.phone)
        .execute(ex)
        .await?;
    Ok(())
}
