// Coordinate Store - reference points and storage slots
//
// Reference points are seeded once and read-only afterwards. Slots carry the
// only mutable state in the system: their occupancy, which changes only when a
// physical task has fully completed.

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::LayoutConfig;

pub use memory::InMemoryCoordinateStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteCoordinateStore;

/// Where items are presented to the camera before storage
pub const PICKUP_POINT: &str = "pickup_zone";
/// Where retrieved items are released
pub const DROP_POINT: &str = "drop_zone";
/// Transit point between operations
pub const SAFE_POINT: &str = "safe_zone";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Same point, raised by `dz`
    pub fn raised(&self, dz: f64) -> Self {
        Self {
            z: self.z + dz,
            ..*self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub name: String,
    pub position: Point3,
}

/// Payload recorded for an occupied slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub product_code: String,
    pub product_type: String,
    pub additional_info: String,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Occupancy {
    Available,
    Occupied(StoredItem),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Occupied,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Occupied => "occupied",
        }
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub name: String,
    pub position: Point3,
    pub occupancy: Occupancy,
}

impl Slot {
    /// A freshly created slot is always available
    pub fn new(name: impl Into<String>, position: Point3) -> Self {
        Self {
            name: name.into(),
            position,
            occupancy: Occupancy::Available,
        }
    }

    pub fn status(&self) -> SlotStatus {
        match self.occupancy {
            Occupancy::Available => SlotStatus::Available,
            Occupancy::Occupied(_) => SlotStatus::Occupied,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.occupancy, Occupancy::Available)
    }

    pub fn item(&self) -> Option<&StoredItem> {
        match &self.occupancy {
            Occupancy::Occupied(item) => Some(item),
            Occupancy::Available => None,
        }
    }

    pub fn product_code(&self) -> Option<&str> {
        self.item().map(|item| item.product_code.as_str())
    }
}

/// Flat view of a slot, shaped like the zone records clients already consume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub status: SlotStatus,
    pub product_code: Option<String>,
    pub product_type: Option<String>,
    pub additional_info: Option<String>,
    pub datetime: Option<DateTime<Utc>>,
}

impl From<&Slot> for SlotView {
    fn from(slot: &Slot) -> Self {
        let item = slot.item();
        Self {
            name: slot.name.clone(),
            x: slot.position.x,
            y: slot.position.y,
            z: slot.position.z,
            status: slot.status(),
            product_code: item.map(|i| i.product_code.clone()),
            product_type: item.map(|i| i.product_type.clone()),
            additional_info: item.map(|i| i.additional_info.clone()),
            datetime: item.map(|i| i.stored_at),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Reference point '{0}' not found")]
    ReferencePointNotFound(String),
    #[error("Zone '{0}' not found")]
    SlotNotFound(String),
    #[error("Zone '{0}' is already occupied")]
    AlreadyOccupied(String),
    #[error("Zone '{0}' is already available")]
    AlreadyAvailable(String),
    #[error("Zone '{name}' has inconsistent stored state: {reason}")]
    Corrupt { name: String, reason: String },
    #[error("Database error: {0}")]
    Database(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

#[cfg(feature = "database")]
impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Persistence contract for reference points and slots.
///
/// Every mutation touches exactly one slot and is guarded on the slot's
/// current status, so re-applying a transition fails instead of silently
/// overwriting the stored payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoordinateStore: Send + Sync {
    async fn get_reference_point(&self, name: &str) -> Result<ReferencePoint, StoreError>;

    async fn get_slot(&self, name: &str) -> Result<Slot, StoreError>;

    /// All slots ordered by name
    async fn list_slots(&self) -> Result<Vec<Slot>, StoreError>;

    /// Names of available slots, ordered by name
    async fn list_available_slot_names(&self) -> Result<Vec<String>, StoreError>;

    /// Flip an available slot to occupied, recording `item`
    async fn mark_occupied(&self, name: &str, item: &StoredItem) -> Result<(), StoreError>;

    /// Flip an occupied slot back to available, returning the payload it held
    async fn mark_available(&self, name: &str) -> Result<StoredItem, StoreError>;

    /// Insert the reference point unless one with the same name exists
    async fn seed_reference_point(&self, point: &ReferencePoint) -> Result<(), StoreError>;

    /// Insert an available slot unless one with the same name exists
    async fn seed_slot(&self, name: &str, position: Point3) -> Result<(), StoreError>;
}

/// Seed the configured layout. Existing rows, and their occupancy, are kept.
pub async fn seed_layout(store: &dyn CoordinateStore, layout: &LayoutConfig) -> Result<(), StoreError> {
    for seed in &layout.reference_points {
        store
            .seed_reference_point(&ReferencePoint {
                name: seed.name.clone(),
                position: seed.position(),
            })
            .await?;
    }
    for seed in &layout.slots {
        store.seed_slot(&seed.name, seed.position()).await?;
    }

    info!(
        reference_points = layout.reference_points.len(),
        slots = layout.slots.len(),
        "Layout seeded"
    );
    Ok(())
}
