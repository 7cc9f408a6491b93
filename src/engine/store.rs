use std::io;
use std::path::Path;

use tracing::warn;

use crate::ledger::{RecordLog, Row};
use crate::model::*;

/// Persistence boundary for the active reservation set and the archive.
///
/// Implementations are synchronous; the engine serializes every call behind
/// one mutex, so `&mut self` is never contended.
pub trait ReservationStore: Send {
    fn load_active(&mut self) -> io::Result<Vec<Reservation>>;

    /// Atomically replace the whole active set.
    fn replace_active(&mut self, reservations: &[Reservation]) -> io::Result<()>;

    /// Append retired reservations to the archive. Never rewrites earlier entries.
    fn append_archived(&mut self, archived: &[ArchivedReservation]) -> io::Result<()>;

    fn load_archived(&mut self) -> io::Result<Vec<ArchivedReservation>>;
}

/// Store kept entirely in memory. Used by tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    active: Vec<Reservation>,
    archived: Vec<ArchivedReservation>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active(active: Vec<Reservation>) -> Self {
        Self {
            active,
            archived: Vec::new(),
        }
    }
}

impl ReservationStore for InMemoryStore {
    fn load_active(&mut self) -> io::Result<Vec<Reservation>> {
        Ok(self.active.clone())
    }

    fn replace_active(&mut self, reservations: &[Reservation]) -> io::Result<()> {
        self.active = reservations.to_vec();
        Ok(())
    }

    fn append_archived(&mut self, archived: &[ArchivedReservation]) -> io::Result<()> {
        self.archived.extend_from_slice(archived);
        Ok(())
    }

    fn load_archived(&mut self) -> io::Result<Vec<ArchivedReservation>> {
        Ok(self.archived.clone())
    }
}

pub const ACTIVE_FILE: &str = "reservations.log";
pub const ARCHIVE_FILE: &str = "archive.log";

/// File-backed store: the active set is rewritten whole, the archive is append-only.
#[derive(Debug)]
pub struct FileStore {
    active: RecordLog,
    archive: RecordLog,
}

impl FileStore {
    /// Open the store under `dir`, creating the directory if needed.
    ///
    /// A torn tail left in the archive by an interrupted append is cut off
    /// here, before anything else is appended behind it.
    pub fn open(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let archive = RecordLog::new(dir.join(ARCHIVE_FILE));
        archive.repair()?;
        Ok(Self {
            active: RecordLog::new(dir.join(ACTIVE_FILE)),
            archive,
        })
    }
}

impl ReservationStore for FileStore {
    fn load_active(&mut self) -> io::Result<Vec<Reservation>> {
        Ok(self
            .active
            .replay()?
            .iter()
            .map(|row| Reservation::from_fields(&row.fields))
            .collect())
    }

    fn replace_active(&mut self, reservations: &[Reservation]) -> io::Result<()> {
        let rows: Vec<Row> = reservations.iter().map(|r| Row::new(r.to_fields())).collect();
        self.active.rewrite(&rows)
    }

    fn append_archived(&mut self, archived: &[ArchivedReservation]) -> io::Result<()> {
        let rows: Vec<Row> = archived.iter().map(|a| Row::new(a.to_fields())).collect();
        self.archive.append(&rows)
    }

    fn load_archived(&mut self) -> io::Result<Vec<ArchivedReservation>> {
        let rows = self.archive.replay()?;
        let mut archived = Vec::with_capacity(rows.len());
        for row in &rows {
            match ArchivedReservation::from_fields(&row.fields) {
                Some(a) => archived.push(a),
                None => warn!(
                    "{}: skipping archive row with unreadable archive columns (id={})",
                    self.archive.path().display(),
                    row.field(0)
                ),
            }
        }
        Ok(archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    fn tmp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("baybook_test_store").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn reservation(id: &str) -> Reservation {
        let created = NaiveDate::from_ymd_opt(2026, 10, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Reservation {
            id: id.into(),
            created_at: Some(created),
            customer_name: "Ana".into(),
            email: "ana@example.com".into(),
            phone: "0700".into(),
            vehicle_make: "Dacia".into(),
            vehicle_model: "Duster".into(),
            service_ids: vec!["tire-change".into()],
            requested_date: NaiveDate::from_ymd_opt(2026, 10, 20),
            requested_time: NaiveTime::from_hms_opt(9, 0, 0),
            status: Status::Pending,
            status_updated_at: Some(created),
            price: Decimal::from(150),
        }
    }

    #[test]
    fn file_store_round_trips_active_set() {
        let dir = tmp_dir("active");
        let mut store = FileStore::open(&dir).unwrap();
        assert!(store.load_active().unwrap().is_empty());

        let rs = vec![reservation("a"), reservation("b")];
        store.replace_active(&rs).unwrap();
        assert_eq!(store.load_active().unwrap(), rs);

        store.replace_active(&rs[1..]).unwrap();
        let mut reopened = FileStore::open(&dir).unwrap();
        assert_eq!(reopened.load_active().unwrap(), vec![reservation("b")]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn archive_only_grows() {
        let dir = tmp_dir("archive");
        let mut store = FileStore::open(&dir).unwrap();
        let archived_at = NaiveDate::from_ymd_opt(2026, 10, 21)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let entry = |id: &str, reason| ArchivedReservation {
            reservation: reservation(id),
            archived_at,
            reason,
        };
        store.append_archived(&[entry("a", ArchiveReason::ExpiredAtSlotTime)]).unwrap();
        store.append_archived(&[]).unwrap();
        store.append_archived(&[entry("b", ArchiveReason::ConfirmedPast8h)]).unwrap();

        let archived = store.load_archived().unwrap();
        assert_eq!(archived.len(), 2);
        assert_eq!(archived[0].reservation.id, "a");
        assert_eq!(archived[1].reason, ArchiveReason::ConfirmedPast8h);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn archive_survives_an_interrupted_append() {
        let dir = tmp_dir("torn_archive");
        let archived_at = NaiveDate::from_ymd_opt(2026, 10, 21)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let entry = |id: &str| ArchivedReservation {
            reservation: reservation(id),
            archived_at,
            reason: ArchiveReason::RejectedPast24h,
        };
        let mut store = FileStore::open(&dir).unwrap();
        store.append_archived(&[entry("a")]).unwrap();
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(dir.join(ARCHIVE_FILE))
                .unwrap();
            f.write_all(&[0u8; 6]).unwrap();
        }

        let mut reopened = FileStore::open(&dir).unwrap();
        reopened.append_archived(&[entry("b")]).unwrap();
        reopened.append_archived(&[entry("c")]).unwrap();
        let ids: Vec<String> = reopened
            .load_archived()
            .unwrap()
            .into_iter()
            .map(|a| a.reservation.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn older_rows_without_trailing_columns_load() {
        let dir = tmp_dir("legacy_rows");
        let mut store = FileStore::open(&dir).unwrap();
        let mut fields = reservation("old").to_fields();
        fields.truncate(10);
        RecordLog::new(dir.join(ACTIVE_FILE)).rewrite(&[Row::new(fields)]).unwrap();

        let loaded = store.load_active().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, Status::Unknown(String::new()));
        assert_eq!(loaded[0].status_updated_at, loaded[0].created_at);
        assert_eq!(loaded[0].price, Decimal::ZERO);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn in_memory_store_replaces_and_appends() {
        let mut store = InMemoryStore::with_active(vec![reservation("a")]);
        assert_eq!(store.load_active().unwrap().len(), 1);
        store.replace_active(&[]).unwrap();
        assert!(store.load_active().unwrap().is_empty());
        assert!(store.load_archived().unwrap().is_empty());
    }
}
