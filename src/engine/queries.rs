use crate::model::*;

use super::admission::parse_date;
use super::calendar::query_slots;
use super::{Engine, EngineError, store_failure};

impl Engine {
    /// Slot answer for a `YYYY-MM-DD` date. Reads the active set as stored,
    /// without sweeping.
    pub async fn slots(&self, date: &str) -> Result<SlotAnswer, EngineError> {
        let date = parse_date(date)?;
        let now = self.clock.now();
        let active = self.store.lock().await.load_active().map_err(store_failure)?;
        let catalog = self.catalog.read().await;
        Ok(query_slots(date, now, &active, &catalog))
    }

    /// The active set after a sweep at the current time.
    pub async fn active_reservations(&self) -> Result<Vec<Reservation>, EngineError> {
        let now = self.clock.now();
        let mut store = self.store.lock().await;
        Self::load_swept(&mut **store, now)
    }

    pub async fn archived_reservations(&self) -> Result<Vec<ArchivedReservation>, EngineError> {
        self.store.lock().await.load_archived().map_err(store_failure)
    }

    /// Counters for the shop's overview, taken after a sweep.
    pub async fn dashboard(&self) -> Result<Dashboard, EngineError> {
        let active = self.active_reservations().await?;
        Ok(Dashboard {
            pending_count: active.iter().filter(|r| r.status == Status::Pending).count(),
            total_count: active.len(),
            latest_created_at: active.iter().filter_map(|r| r.created_at).max(),
        })
    }

    pub async fn services(&self) -> Vec<Service> {
        self.catalog.read().await.list().to_vec()
    }
}
