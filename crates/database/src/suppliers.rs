use sqlx::PgConnection;
use uuid::Uuid;

/// One row in the `supplier_identities` table.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct SupplierIdentity {
    pub id: Uuid,
    pub gln: String,
    pub name: String,
    pub cvr: Option<String>,
    pub is_active: bool,
    pub is_archived: bool,
}

pub async fn insert(ex: &mut PgConnection, supplier: &SupplierIdentity) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO supplier_identities (id, gln, name, cvr, is_active, is_archived)
VALUES ($1, $2, $3, $4, $5, $6)
    "#;
    sqlx::query(QUERY)
        .bind(supplier.id)
        .bind(&supplier.gln)
        .bind(&supplier.name)
        .bind(&supplier.cvr)
        .bind(supplier.is_active)
        .bind(supplier.is_archived)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn by_gln(
    ex: &mut PgConnection,
    gln: &str,
) -> Result<Option<SupplierIdentity>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM supplier_identities WHERE gln = $1
    "#;
    sqlx::query_as(QUERY).bind(gln).fetch_optional(ex).await
}

pub async fn archive(ex: &mut PgConnection, id: Uuid) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE supplier_identities SET is_active = false, is_archived = true WHERE id = $1
    "#;
    sqlx::query(QUERY).bind(id).execute(ex).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        sqlx::{Connection, PgConnection},
    };

    #[tokio::test]
    #[ignore]
    async fn postgres_roundtrip() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let supplier = SupplierIdentity {
            id: Uuid::new_v4(),
            gln: "5790000432752".to_owned(),
            name: "Testel A/S".to_owned(),
            cvr: Some("12345678".to_owned()),
            is_active: true,
            is_archived: false,
        };
        insert(&mut db, &supplier).await.unwrap();
        assert_eq!(by_gln(&mut db, &supplier.gln).await.unwrap(), Some(supplier.clone()));

        archive(&mut db, supplier.id).await.unwrap();
        let archived = by_gln(&mut db, &supplier.gln).await.unwrap().unwrap();
        assert!(!archived.is_active && archived.is_archived);
    }
}
