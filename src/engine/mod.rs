mod admission;
mod calendar;
mod error;
mod lifecycle;
mod mutations;
mod queries;
mod store;

pub use admission::admit;
pub use calendar::{
    CLOSING_HOUR, LEAD_TIME_MINUTES, OPENING_HOUR, SLOT_MINUTES, available_slots, is_slot_boundary,
    occupancy, occupied_slots, query_slots, working_slots,
};
pub use error::EngineError;
pub use lifecycle::{
    CONFIRMED_RETENTION_HOURS, PENDING_MAX_AGE_DAYS, REJECTED_RETENTION_HOURS, apply_action, sweep,
};
pub use store::{ACTIVE_FILE, ARCHIVE_FILE, FileStore, InMemoryStore, ReservationStore};

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};
use ulid::Ulid;

use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::model::*;
use crate::notify::{Notifier, ShopProfile};
use crate::observability;

pub const CATALOG_FILE: &str = "services.json";

/// The booking engine: one shop, one store, one catalog.
///
/// Every operation that reads and rewrites the active set holds `store` for its
/// whole read-sweep-write cycle, so concurrent callers never lose updates.
pub struct Engine {
    pub(super) store: Mutex<Box<dyn ReservationStore>>,
    pub(super) catalog: RwLock<Catalog>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) shop: ShopProfile,
}

impl Engine {
    pub fn new(
        store: Box<dyn ReservationStore>,
        catalog: Catalog,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        shop: ShopProfile,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            catalog: RwLock::new(catalog),
            clock,
            notifier,
            shop,
        }
    }

    /// Open the file-backed engine under `data_dir`.
    pub fn open(
        data_dir: &Path,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        shop: ShopProfile,
    ) -> io::Result<Self> {
        let store = FileStore::open(data_dir)?;
        let catalog = Catalog::open(&data_dir.join(CATALOG_FILE))?;
        info!(
            "opened store at {} ({} services)",
            data_dir.display(),
            catalog.list().len()
        );
        Ok(Self::new(Box::new(store), catalog, clock, notifier, shop))
    }

    /// Time-derived unique reservation id.
    pub(super) fn next_id(&self, now: NaiveDateTime) -> String {
        Ulid::from_datetime(now.and_utc().into()).to_string()
    }

    /// Load the active set and sweep it at `now`, persisting any archive batch.
    pub(super) fn load_swept(
        store: &mut dyn ReservationStore,
        now: NaiveDateTime,
    ) -> Result<Vec<Reservation>, EngineError> {
        let active = store.load_active().map_err(store_failure)?;
        Self::sweep_and_persist(store, active, now, false)
    }

    /// Sweep `active` at `now` and write the result back. The active set is
    /// rewritten when the sweep archived something or when `dirty` is set.
    ///
    /// The archive is appended before the active set is rewritten: a crash in
    /// between leaves a reservation in both files, never in neither.
    pub(super) fn sweep_and_persist(
        store: &mut dyn ReservationStore,
        active: Vec<Reservation>,
        now: NaiveDateTime,
        dirty: bool,
    ) -> Result<Vec<Reservation>, EngineError> {
        let before = active.len();
        let (remaining, archived) = sweep(active, now);
        if !archived.is_empty() {
            store.append_archived(&archived).map_err(store_failure)?;
            for a in &archived {
                metrics::counter!(observability::RESERVATIONS_ARCHIVED_TOTAL, "reason" => a.reason.as_str())
                    .increment(1);
            }
            info!("archived {} of {} active reservations", archived.len(), before);
        }
        if dirty || !archived.is_empty() {
            Self::persist(store, &remaining)?;
        }
        Ok(remaining)
    }

    /// Rewrite the active set, timing the write.
    pub(super) fn persist(
        store: &mut dyn ReservationStore,
        active: &[Reservation],
    ) -> Result<(), EngineError> {
        let start = Instant::now();
        store.replace_active(active).map_err(store_failure)?;
        metrics::histogram!(observability::STORE_WRITE_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        Ok(())
    }
}

fn store_failure(e: io::Error) -> EngineError {
    error!("store failure: {e}");
    EngineError::from(e)
}
