use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{CoordinateStore, Occupancy, Point3, ReferencePoint, Slot, StoreError, StoredItem};

/// Coordinate store kept entirely in memory.
///
/// Used for `--ephemeral` runs and tests. `BTreeMap` keeps listings ordered
/// by name without an explicit sort.
#[derive(Debug, Default)]
pub struct InMemoryCoordinateStore {
    points: RwLock<BTreeMap<String, ReferencePoint>>,
    slots: RwLock<BTreeMap<String, Slot>>,
}

impl InMemoryCoordinateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinateStore for InMemoryCoordinateStore {
    async fn get_reference_point(&self, name: &str) -> Result<ReferencePoint, StoreError> {
        self.points
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::ReferencePointNotFound(name.to_string()))
    }

    async fn get_slot(&self, name: &str) -> Result<Slot, StoreError> {
        self.slots
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::SlotNotFound(name.to_string()))
    }

    async fn list_slots(&self) -> Result<Vec<Slot>, StoreError> {
        Ok(self.slots.read().await.values().cloned().collect())
    }

    async fn list_available_slot_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .slots
            .read()
            .await
            .values()
            .filter(|slot| slot.is_available())
            .map(|slot| slot.name.clone())
            .collect())
    }

    async fn mark_occupied(&self, name: &str, item: &StoredItem) -> Result<(), StoreError> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(name)
            .ok_or_else(|| StoreError::SlotNotFound(name.to_string()))?;

        if !slot.is_available() {
            return Err(StoreError::AlreadyOccupied(name.to_string()));
        }
        slot.occupancy = Occupancy::Occupied(item.clone());
        Ok(())
    }

    async fn mark_available(&self, name: &str) -> Result<StoredItem, StoreError> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(name)
            .ok_or_else(|| StoreError::SlotNotFound(name.to_string()))?;

        match std::mem::replace(&mut slot.occupancy, Occupancy::Available) {
            Occupancy::Occupied(item) => Ok(item),
            Occupancy::Available => Err(StoreError::AlreadyAvailable(name.to_string())),
        }
    }

    async fn seed_reference_point(&self, point: &ReferencePoint) -> Result<(), StoreError> {
        self.points
            .write()
            .await
            .entry(point.name.clone())
            .or_insert_with(|| point.clone());
        Ok(())
    }

    async fn seed_slot(&self, name: &str, position: Point3) -> Result<(), StoreError> {
        self.slots
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Slot::new(name, position));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(code: &str) -> StoredItem {
        StoredItem {
            product_code: code.to_string(),
            product_type: "electronics".to_string(),
            additional_info: "fragile".to_string(),
            stored_at: Utc::now(),
        }
    }

    async fn seeded() -> InMemoryCoordinateStore {
        let store = InMemoryCoordinateStore::new();
        for (name, y) in [("B1", 103.2), ("A2", -3.4), ("A1", 108.2)] {
            store.seed_slot(name, Point3::new(285.9, y, -72.0)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_listings_are_ordered_by_name() {
        let store = seeded().await;
        let names: Vec<String> = store.list_slots().await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["A1", "A2", "B1"]);

        store.mark_occupied("A2", &item("SKU1")).await.unwrap();
        assert_eq!(store.list_available_slot_names().await.unwrap(), vec!["A1", "B1"]);
    }

    #[tokio::test]
    async fn test_mark_occupied_twice_is_rejected() {
        let store = seeded().await;
        store.mark_occupied("A1", &item("SKU1")).await.unwrap();

        let err = store.mark_occupied("A1", &item("SKU2")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyOccupied(ref n) if n == "A1"));
        // first payload untouched
        assert_eq!(store.get_slot("A1").await.unwrap().product_code(), Some("SKU1"));
    }

    #[tokio::test]
    async fn test_mark_available_returns_payload_and_clears() {
        let store = seeded().await;
        store.mark_occupied("B1", &item("SKU9")).await.unwrap();

        let released = store.mark_available("B1").await.unwrap();
        assert_eq!(released.product_code, "SKU9");

        let slot = store.get_slot("B1").await.unwrap();
        assert!(slot.is_available());
        assert!(slot.item().is_none());

        let err = store.mark_available("B1").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyAvailable(_)));
    }

    #[tokio::test]
    async fn test_seeding_keeps_existing_state() {
        let store = seeded().await;
        store.mark_occupied("A1", &item("SKU1")).await.unwrap();
        store.seed_slot("A1", Point3::new(0.0, 0.0, 0.0)).await.unwrap();

        let slot = store.get_slot("A1").await.unwrap();
        assert_eq!(slot.product_code(), Some("SKU1"));
        assert_eq!(slot.position.x, 285.9);
    }

    #[test]
    fn test_unknown_names() {
        tokio_test::block_on(async {
            let store = seeded().await;
            assert!(matches!(
                store.get_slot("Z9").await,
                Err(StoreError::SlotNotFound(_))
            ));
            assert!(matches!(
                store.get_reference_point("nowhere").await,
                Err(StoreError::ReferencePointNotFound(_))
            ));
            assert!(matches!(
                store.mark_occupied("Z9", &item("X")).await,
                Err(StoreError::SlotNotFound(_))
            ));
        });
    }
}
