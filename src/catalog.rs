use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::EngineError;
use crate::limits::*;
use crate::model::Service;

/// Duration used when a reservation names no services at all.
pub const DEFAULT_DURATION_MINUTES: u32 = 30;

/// Services that existed before the catalog was editable. Consulted only for
/// ids missing from the live catalog: `(id, duration minutes, price)`.
const LEGACY_SERVICES: [(&str, u32, i64); 2] = [("tire-change", 60, 150), ("balancing", 30, 50)];

fn legacy(id: &str) -> Option<(u32, Decimal)> {
    LEGACY_SERVICES
        .iter()
        .find(|(legacy_id, _, _)| *legacy_id == id)
        .map(|&(_, minutes, price)| (minutes, Decimal::from(price)))
}

/// Catalog seeded on first start.
pub fn default_services() -> Vec<Service> {
    vec![
        Service {
            id: "tire-change".into(),
            name: "Seasonal Tire Change".into(),
            duration_minutes: 60,
            price: Decimal::ZERO,
            description: "Full swap of the tires for the current season".into(),
        },
        Service {
            id: "balancing".into(),
            name: "Wheel Balancing".into(),
            duration_minutes: 30,
            price: Decimal::ZERO,
            description: "Professional wheel balancing".into(),
        },
    ]
}

#[derive(Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    services: Vec<Service>,
}

/// The service catalog, optionally backed by a JSON file.
#[derive(Debug, Clone)]
pub struct Catalog {
    services: Vec<Service>,
    path: Option<PathBuf>,
}

/// Rules every catalog entry obeys, whether added live or read from disk.
fn check_service(service: &Service) -> Result<(), EngineError> {
    if service.id.trim().is_empty() {
        return Err(EngineError::InvalidService("empty id"));
    }
    if service.id.contains(',') {
        return Err(EngineError::InvalidService("id may not contain ','"));
    }
    if service.duration_minutes == 0 {
        return Err(EngineError::InvalidService("duration must be positive"));
    }
    if service.duration_minutes > MAX_SERVICE_DURATION_MINUTES {
        return Err(EngineError::LimitExceeded("service duration too long"));
    }
    if service.price.is_sign_negative() {
        return Err(EngineError::InvalidService("price must not be negative"));
    }
    if [&service.id, &service.name, &service.description]
        .iter()
        .any(|f| f.len() > MAX_FIELD_LEN)
    {
        return Err(EngineError::LimitExceeded("service field too long"));
    }
    Ok(())
}

/// Keep the loaded entries that `add` would have accepted, in file order.
fn accept_loaded(path: &Path, loaded: Vec<Service>) -> Vec<Service> {
    let mut services: Vec<Service> = Vec::with_capacity(loaded.len());
    for service in loaded {
        let verdict = if services.len() >= MAX_CATALOG_SIZE {
            Err(EngineError::LimitExceeded("too many services"))
        } else if services.iter().any(|s| s.id == service.id) {
            Err(EngineError::ServiceExists(service.id.clone()))
        } else {
            check_service(&service)
        };
        match verdict {
            Ok(()) => services.push(service),
            Err(e) => warn!("{}: skipping service {:?}: {e}", path.display(), service.id),
        }
    }
    services
}

impl Catalog {
    /// In-memory catalog.
    pub fn new(services: Vec<Service>) -> Self {
        Self {
            services,
            path: None,
        }
    }

    /// Load the catalog from `path`, writing the default one if the file is missing.
    pub fn open(path: &Path) -> io::Result<Self> {
        let services = match fs::read_to_string(path) {
            Ok(text) => {
                let file: CatalogFile = serde_json::from_str(&text)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                accept_loaded(path, file.services)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("creating default service catalog at {}", path.display());
                let catalog = Self {
                    services: default_services(),
                    path: Some(path.to_path_buf()),
                };
                catalog.save()?;
                return Ok(catalog);
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            services,
            path: Some(path.to_path_buf()),
        })
    }

    fn save(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = CatalogFile {
            services: self.services.clone(),
        };
        let text = serde_json::to_string_pretty(&file)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, path)
    }

    pub fn list(&self) -> &[Service] {
        &self.services
    }

    pub fn get(&self, id: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.id == id)
    }

    pub fn add(&mut self, service: Service) -> Result<(), EngineError> {
        check_service(&service)?;
        if self.services.len() >= MAX_CATALOG_SIZE {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        if self.get(&service.id).is_some() {
            return Err(EngineError::ServiceExists(service.id));
        }
        self.services.push(service);
        self.save()?;
        Ok(())
    }

    /// Remove a service. Returns whether it existed; a missing id is not an error.
    pub fn remove(&mut self, id: &str) -> io::Result<bool> {
        let before = self.services.len();
        self.services.retain(|s| s.id != id);
        let removed = self.services.len() != before;
        self.save()?;
        Ok(removed)
    }

    /// Change a service's price. Returns whether the service exists.
    pub fn update_price(&mut self, id: &str, price: Decimal) -> Result<bool, EngineError> {
        if price.is_sign_negative() {
            return Err(EngineError::InvalidService("price must not be negative"));
        }
        let found = match self.services.iter_mut().find(|s| s.id == id) {
            Some(service) => {
                service.price = price;
                true
            }
            None => false,
        };
        self.save()?;
        Ok(found)
    }

    /// Minutes a reservation with these services occupies.
    ///
    /// Catalog durations first, then the legacy table; anything else adds nothing.
    /// An empty list falls back to [`DEFAULT_DURATION_MINUTES`].
    pub fn duration_of(&self, ids: &[String]) -> u32 {
        if ids.is_empty() {
            return DEFAULT_DURATION_MINUTES;
        }
        ids.iter()
            .map(|id| match self.get(id) {
                Some(service) => service.duration_minutes,
                None => legacy(id).map_or(0, |(minutes, _)| minutes),
            })
            .fold(0, u32::saturating_add)
    }

    /// Total price of these services, resolved the same way as [`Catalog::duration_of`].
    pub fn price_of(&self, ids: &[String]) -> Decimal {
        ids.iter()
            .map(|id| match self.get(id) {
                Some(service) => service.price,
                None => legacy(id).map_or(Decimal::ZERO, |(_, price)| price),
            })
            .fold(Decimal::ZERO, |acc, p| acc + p)
    }

    /// Human-readable label for a service list, falling back to raw ids.
    pub fn label_of(&self, ids: &[String]) -> String {
        ids.iter()
            .map(|id| self.get(id).map_or(id.as_str(), |s| s.name.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn service(id: &str, minutes: u32, price: i64) -> Service {
        Service {
            id: id.into(),
            name: id.to_uppercase(),
            duration_minutes: minutes,
            price: Decimal::from(price),
            description: String::new(),
        }
    }

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("baybook_test_catalog");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn catalog_entries_win_over_legacy_table() {
        let catalog = Catalog::new(vec![service("tire-change", 90, 200)]);
        assert_eq!(catalog.duration_of(&ids(&["tire-change"])), 90);
        assert_eq!(catalog.price_of(&ids(&["tire-change"])), Decimal::from(200));
    }

    #[test]
    fn legacy_ids_resolve_when_absent() {
        let catalog = Catalog::new(vec![]);
        assert_eq!(catalog.duration_of(&ids(&["tire-change", "balancing"])), 90);
        assert_eq!(catalog.price_of(&ids(&["tire-change", "balancing"])), Decimal::from(200));
    }

    #[test]
    fn unknown_ids_contribute_nothing() {
        let catalog = Catalog::new(vec![service("wash", 45, 30)]);
        assert_eq!(catalog.duration_of(&ids(&["wash", "ghost"])), 45);
        assert_eq!(catalog.price_of(&ids(&["wash", "ghost"])), Decimal::from(30));
        assert_eq!(catalog.duration_of(&ids(&["ghost"])), 0);
    }

    #[test]
    fn empty_service_list_defaults_to_thirty_minutes() {
        let catalog = Catalog::new(default_services());
        assert_eq!(catalog.duration_of(&[]), DEFAULT_DURATION_MINUTES);
        assert_eq!(catalog.price_of(&[]), Decimal::ZERO);
    }

    #[test]
    fn add_rejects_duplicates_and_bad_values() {
        let mut catalog = Catalog::new(default_services());
        catalog.add(service("wash", 45, 30)).unwrap();
        assert!(matches!(
            catalog.add(service("wash", 45, 30)),
            Err(EngineError::ServiceExists(_))
        ));
        assert!(matches!(
            catalog.add(service("zero", 0, 30)),
            Err(EngineError::InvalidService(_))
        ));
        assert!(matches!(
            catalog.add(service("cheap", 30, -1)),
            Err(EngineError::InvalidService(_))
        ));
        assert_eq!(catalog.list().len(), 3);
    }

    #[test]
    fn remove_and_update_price_tolerate_missing_ids() {
        let mut catalog = Catalog::new(default_services());
        assert!(!catalog.remove("ghost").unwrap());
        assert!(!catalog.update_price("ghost", Decimal::ONE).unwrap());
        assert!(catalog.update_price("balancing", Decimal::from(55)).unwrap());
        assert_eq!(catalog.get("balancing").unwrap().price, Decimal::from(55));
        assert!(catalog.remove("balancing").unwrap());
        // Gone from the catalog: the legacy price applies again.
        assert_eq!(catalog.price_of(&ids(&["balancing"])), Decimal::from(50));
    }

    #[test]
    fn open_seeds_defaults_and_persists_edits() {
        let path = tmp_path("services.json");
        let mut catalog = Catalog::open(&path).unwrap();
        assert_eq!(catalog.list(), default_services().as_slice());
        assert!(path.exists());

        catalog.add(service("wash", 45, 30)).unwrap();
        let reopened = Catalog::open(&path).unwrap();
        assert_eq!(reopened.list().len(), 3);
        assert_eq!(reopened.get("wash").unwrap().duration_minutes, 45);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn open_skips_entries_add_would_refuse() {
        let path = tmp_path("hand_edited.json");
        fs::write(
            &path,
            r#"{"services": [
                {"id": "wash", "name": "Wash", "duration": 0},
                {"id": "rebuild", "name": "Rebuild", "duration": 4000000000},
                {"id": "alignment", "name": "Alignment", "duration": 45, "price": 90},
                {"id": "alignment", "name": "Again", "duration": 30}
            ]}"#,
        )
        .unwrap();

        let catalog = Catalog::open(&path).unwrap();
        assert_eq!(catalog.list().len(), 1);
        assert_eq!(catalog.get("alignment").unwrap().name, "Alignment");
        assert_eq!(catalog.duration_of(&ids(&["rebuild"])), 0);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn duration_sum_saturates() {
        let mut long = service("long", 600, 0);
        long.duration_minutes = u32::MAX;
        let catalog = Catalog::new(vec![long]);
        assert_eq!(catalog.duration_of(&ids(&["long", "long"])), u32::MAX);
    }

    #[test]
    fn label_prefers_names() {
        let catalog = Catalog::new(default_services());
        assert_eq!(
            catalog.label_of(&ids(&["balancing", "ghost"])),
            "Wheel Balancing, ghost"
        );
    }
}
