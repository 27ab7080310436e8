pub mod customers;
pub mod inbox;
pub mod metering_points;
pub mod outbox;
pub mod price_links;
pub mod prices;
pub mod processes;
pub mod products;
pub mod reconciliation;
pub mod settlement_issues;
pub mod settlements;
pub mod spot_prices;
pub mod suppliers;
pub mod supplier_margins;
pub mod supplies;
pub mod time_series;
pub mod wholesale;

use sqlx::{Executor, PgPool};

// Design:
//
// Functions that execute multiple statements take `&mut PgTransaction` so
// the whole function succeeds or fails together. Functions that execute a
// single statement take `&mut PgConnection`. We call the parameter `ex` for
// `Executor`, the trait whose methods run the queries. PgTransaction derefs
// to PgConnection, so callers decide whether a function joins a bigger
// transaction or runs standalone; committing is the caller's job.
//
// Enum-valued columns are stored as text holding the domain enum's canonical
// name; the mapping layer round-trips them through strum. Value objects are
// stored inline with prefixed columns, open-ended periods with a NULL end.
//
// For tests the useful pattern is to begin a transaction, run all queries on
// it and never commit. The rollback on drop keeps parallel Postgres tests
// from seeing each other.

pub type PgTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// The names of all tables we use in the db.
pub const ALL_TABLES: &[&str] = &[
    "supplier_identities",
    "customers",
    "metering_points",
    "supplies",
    "supplier_products",
    "supply_product_periods",
    "prices",
    "price_points",
    "price_links",
    "spot_prices",
    "supplier_margins",
    "time_series",
    "observations",
    "settlements",
    "settlement_lines",
    "settlement_issues",
    "brs_processes",
    "process_transitions",
    "inbox_messages",
    "outbox_messages",
    "wholesale_settlements",
    "wholesale_settlement_lines",
    "reconciliation_results",
    "reconciliation_lines",
];

/// Delete all data in the database. Only used by tests.
#[allow(non_snake_case)]
pub async fn clear_DANGER_(ex: &mut PgTransaction<'_>) -> sqlx::Result<()> {
    for table in ALL_TABLES {
        ex.execute(format!("TRUNCATE {table} CASCADE;").as_str()).await?;
    }
    Ok(())
}

/// Like above but more ergonomic for some tests that use a pool.
#[allow(non_snake_case)]
pub async fn clear_DANGER(pool: &PgPool) -> sqlx::Result<()> {
    let mut transaction = pool.begin().await?;
    clear_DANGER_(&mut transaction).await?;
    transaction.commit().await
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        sqlx::{Connection, PgConnection},
    };

    #[tokio::test]
    #[ignore]
    async fn postgres_clear() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        clear_DANGER_(&mut db).await.unwrap();
    }
}
