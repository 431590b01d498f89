use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use tracing::info;

use super::{CoordinateStore, Occupancy, Point3, ReferencePoint, Slot, StoreError, StoredItem};
use crate::config::DatabaseConfig;

const SLOT_COLUMNS: &str =
    "name, x, y, z, status, productCode, productType, additionalInfo, datetime";

/// SQLite-backed coordinate store
pub struct SqliteCoordinateStore {
    pool: SqlitePool,
}

impl SqliteCoordinateStore {
    /// Open (creating if needed) the database and optionally run migrations
    pub async fn connect(db_config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = db_config.url.as_str();
        let in_memory = url.contains(":memory:");

        if !in_memory && !sqlx::Sqlite::database_exists(url).await? {
            info!("Creating database at {}", url);
            sqlx::Sqlite::create_database(url).await?;
        }

        let pool = SqlitePoolOptions::new()
            // an in-memory database lives and dies with its single connection
            .max_connections(if in_memory { 1 } else { db_config.max_connections })
            .connect(url)
            .await?;

        if db_config.auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }

    async fn slot_exists(&self, name: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM zones WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

fn slot_from_row(row: &SqliteRow) -> Result<Slot, StoreError> {
    let name: String = row.try_get("name")?;
    let position = Point3::new(row.try_get("x")?, row.try_get("y")?, row.try_get("z")?);
    let status: String = row.try_get("status")?;

    let occupancy = match status.as_str() {
        "available" => Occupancy::Available,
        "occupied" => {
            let product_code: Option<String> = row.try_get("productCode")?;
            let product_code = product_code.ok_or_else(|| StoreError::Corrupt {
                name: name.clone(),
                reason: "occupied without a product code".to_string(),
            })?;
            let stored_at: Option<String> = row.try_get("datetime")?;
            let stored_at = stored_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .map_err(|reason| StoreError::Corrupt {
                    name: name.clone(),
                    reason,
                })?
                .ok_or_else(|| StoreError::Corrupt {
                    name: name.clone(),
                    reason: "occupied without a timestamp".to_string(),
                })?;

            Occupancy::Occupied(StoredItem {
                product_code,
                product_type: row.try_get::<Option<String>, _>("productType")?.unwrap_or_default(),
                additional_info: row
                    .try_get::<Option<String>, _>("additionalInfo")?
                    .unwrap_or_default(),
                stored_at,
            })
        }
        other => {
            return Err(StoreError::Corrupt {
                name,
                reason: format!("unknown status '{other}'"),
            })
        }
    };

    Ok(Slot {
        name,
        position,
        occupancy,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{raw}': {e}"))
}

#[async_trait]
impl CoordinateStore for SqliteCoordinateStore {
    async fn get_reference_point(&self, name: &str) -> Result<ReferencePoint, StoreError> {
        let row = sqlx::query("SELECT name, x, y, z FROM coordinates WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::ReferencePointNotFound(name.to_string()))?;

        Ok(ReferencePoint {
            name: row.try_get("name")?,
            position: Point3::new(row.try_get("x")?, row.try_get("y")?, row.try_get("z")?),
        })
    }

    async fn get_slot(&self, name: &str) -> Result<Slot, StoreError> {
        let row = sqlx::query(&format!("SELECT {SLOT_COLUMNS} FROM zones WHERE name = ?1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::SlotNotFound(name.to_string()))?;

        slot_from_row(&row)
    }

    async fn list_slots(&self) -> Result<Vec<Slot>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {SLOT_COLUMNS} FROM zones ORDER BY name ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(slot_from_row).collect()
    }

    async fn list_available_slot_names(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT name FROM zones WHERE status = 'available' ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn mark_occupied(&self, name: &str, item: &StoredItem) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE zones
            SET status = 'occupied', productCode = ?1, productType = ?2, additionalInfo = ?3, datetime = ?4
            WHERE name = ?5 AND status = 'available'
            "#,
        )
        .bind(&item.product_code)
        .bind(&item.product_type)
        .bind(&item.additional_info)
        .bind(item.stored_at.to_rfc3339())
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        if self.slot_exists(name).await? {
            Err(StoreError::AlreadyOccupied(name.to_string()))
        } else {
            Err(StoreError::SlotNotFound(name.to_string()))
        }
    }

    async fn mark_available(&self, name: &str) -> Result<StoredItem, StoreError> {
        // payload is read first; the guarded UPDATE below still decides a race
        let slot = self.get_slot(name).await?;
        let item = match slot.occupancy {
            Occupancy::Occupied(item) => item,
            Occupancy::Available => return Err(StoreError::AlreadyAvailable(name.to_string())),
        };

        let result = sqlx::query(
            r#"
            UPDATE zones
            SET status = 'available', productCode = NULL, productType = NULL, additionalInfo = NULL, datetime = NULL
            WHERE name = ?1 AND status = 'occupied'
            "#,
        )
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(item)
        } else {
            Err(StoreError::AlreadyAvailable(name.to_string()))
        }
    }

    async fn seed_reference_point(&self, point: &ReferencePoint) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO coordinates (name, x, y, z) VALUES (?1, ?2, ?3, ?4)")
            .bind(&point.name)
            .bind(point.position.x)
            .bind(point.position.y)
            .bind(point.position.z)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn seed_slot(&self, name: &str, position: Point3) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO zones (name, x, y, z, status) VALUES (?1, ?2, ?3, ?4, 'available')",
        )
        .bind(name)
        .bind(position.x)
        .bind(position.y)
        .bind(position.z)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
