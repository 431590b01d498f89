//! Slot state survives closing and reopening the database file
#![cfg(feature = "database")]

use chrono::Utc;
use slotkeeper::config::{DatabaseConfig, LayoutConfig};
use slotkeeper::store::{seed_layout, CoordinateStore, SlotStatus, SqliteCoordinateStore, StoreError, StoredItem};

fn database(dir: &tempfile::TempDir) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite:{}", dir.path().join("zones.db").display()),
        max_connections: 2,
        auto_migrate: true,
    }
}

#[tokio::test]
async fn test_occupancy_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = database(&dir);

    let store = SqliteCoordinateStore::connect(&config).await.unwrap();
    seed_layout(&store, &LayoutConfig::default()).await.unwrap();
    store
        .mark_occupied(
            "A3",
            &StoredItem {
                product_code: "SKU555".to_string(),
                product_type: "books".to_string(),
                additional_info: "paperback".to_string(),
                stored_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    store.shutdown().await;

    let reopened = SqliteCoordinateStore::connect(&config).await.unwrap();
    // reseeding keeps existing occupancy
    seed_layout(&reopened, &LayoutConfig::default()).await.unwrap();

    let slot = reopened.get_slot("A3").await.unwrap();
    assert_eq!(slot.status(), SlotStatus::Occupied);
    assert_eq!(slot.product_code(), Some("SKU555"));
    assert_eq!(slot.item().unwrap().additional_info, "paperback");

    let err = reopened
        .mark_occupied(
            "A3",
            &StoredItem {
                product_code: "OTHER".to_string(),
                product_type: "books".to_string(),
                additional_info: String::new(),
                stored_at: Utc::now(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyOccupied(_)));

    reopened.shutdown().await;
}
