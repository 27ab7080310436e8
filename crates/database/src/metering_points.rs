use sqlx::PgConnection;
use uuid::Uuid;

/// One row in the `metering_points` table. Enum-valued columns carry the
/// domain enum's canonical name as text.
#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct MeteringPoint {
    pub id: Uuid,
    pub gsrn: String,
    pub metering_point_type: String,
    pub category: String,
    pub settlement_method: String,
    pub resolution: String,
    pub grid_area: String,
    pub grid_company_gln: String,
    pub connection_state: String,
    pub has_active_supply: bool,
}

pub async fn insert(ex: &mut PgConnection, mp: &MeteringPoint) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO metering_points (
    id,
    gsrn,
    metering_point_type,
    category,
    settlement_method,
    resolution,
    grid_area,
    grid_company_gln,
    connection_state,
    has_active_supply
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    "#;
    sqlx::query(QUERY)
        .bind(mp.id)
        .bind(&mp.gsrn)
        .bind(&mp.metering_point_type)
        .bind(&mp.category)
        .bind(&mp.settlement_method)
        .bind(&mp.resolution)
        .bind(&mp.grid_area)
        .bind(&mp.grid_company_gln)
        .bind(&mp.connection_state)
        .bind(mp.has_active_supply)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn update(ex: &mut PgConnection, mp: &MeteringPoint) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE metering_points
SET metering_point_type = $2,
    category = $3,
    settlement_method = $4,
    resolution = $5,
    grid_area = $6,
    grid_company_gln = $7,
    connection_state = $8,
    has_active_supply = $9
WHERE id = $1
    "#;
    sqlx::query(QUERY)
        .bind(mp.id)
        .bind(&mp.metering_point_type)
        .bind(&mp.category)
        .bind(&mp.settlement_method)
        .bind(&mp.resolution)
        .bind(&mp.grid_area)
        .bind(&mp.grid_company_gln)
        .bind(&mp.connection_state)
        .bind(mp.has_active_supply)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn by_gsrn(
    ex: &mut PgConnection,
    gsrn: &str,
) -> Result<Option<MeteringPoint>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM metering_points WHERE gsrn = $1
    "#;
    sqlx::query_as(QUERY).bind(gsrn).fetch_optional(ex).await
}

pub async fn by_id(ex: &mut PgConnection, id: Uuid) -> Result<Option<MeteringPoint>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM metering_points WHERE id = $1
    "#;
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

pub async fn in_grid_area(
    ex: &mut PgConnection,
    grid_area: &str,
) -> Result<Vec<MeteringPoint>, sqlx::Error> {
    const QUERY: &str = r#"
SELECT * FROM metering_points WHERE grid_area = $1 ORDER BY gsrn
    "#;
    sqlx::query_as(QUERY).bind(grid_area).fetch_all(ex).await
}
