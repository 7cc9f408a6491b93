use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::limits::*;
use crate::model::*;
use crate::notify;
use crate::observability;

use super::admission::{admit, parse_requested};
use super::lifecycle::apply_action;
use super::{Engine, EngineError, store_failure};

impl Engine {
    /// Admit a customer booking and append it to the active set as `Pending`.
    ///
    /// Slot occupancy is not re-checked: two bookings for the same slot are
    /// both accepted and left to the shop to resolve.
    pub async fn submit_booking(&self, req: BookingRequest) -> Result<Reservation, EngineError> {
        req.validate_fields()?;
        let now = self.clock.now();
        let at = match admit(&req.date, &req.time, now) {
            Ok(at) => at,
            Err(e) => {
                debug!("booking for {} {} refused: {e}", req.date, req.time);
                metrics::counter!(observability::BOOKINGS_REJECTED_TOTAL, "reason" => e.label())
                    .increment(1);
                return Err(e);
            }
        };
        let price = self.catalog.read().await.price_of(&req.service_ids);

        let mut store = self.store.lock().await;
        let mut active = store.load_active().map_err(store_failure)?;
        if active.len() >= MAX_ACTIVE_RESERVATIONS {
            return Err(EngineError::LimitExceeded("too many active reservations"));
        }
        let reservation = Reservation {
            id: self.next_id(now),
            created_at: Some(now),
            customer_name: req.customer_name,
            email: req.email,
            phone: req.phone,
            vehicle_make: req.vehicle_make,
            vehicle_model: req.vehicle_model,
            service_ids: req.service_ids,
            requested_date: Some(at.date()),
            requested_time: Some(at.time()),
            status: Status::Pending,
            status_updated_at: Some(now),
            price,
        };
        active.push(reservation.clone());
        Self::persist(&mut **store, &active)?;
        drop(store);

        metrics::counter!(observability::BOOKINGS_ADMITTED_TOTAL).increment(1);
        debug!("booking {} admitted for {at}", reservation.id);
        Ok(reservation)
    }

    /// Enter a walk-in reservation. It starts out `Confirmed`, carries no email
    /// and no price, and skips the temporal admission rules.
    pub async fn add_manual_reservation(&self, manual: ManualReservation) -> Result<Reservation, EngineError> {
        manual.validate_fields()?;
        let at = parse_requested(&manual.date, &manual.time)?;
        let now = self.clock.now();

        let mut store = self.store.lock().await;
        let mut active = store.load_active().map_err(store_failure)?;
        if active.len() >= MAX_ACTIVE_RESERVATIONS {
            return Err(EngineError::LimitExceeded("too many active reservations"));
        }
        let reservation = Reservation {
            id: self.next_id(now),
            created_at: Some(now),
            customer_name: manual.customer_name,
            email: String::new(),
            phone: manual.phone,
            vehicle_make: manual.vehicle_make,
            vehicle_model: manual.vehicle_model,
            service_ids: manual.service_ids,
            requested_date: Some(at.date()),
            requested_time: Some(at.time()),
            status: Status::Confirmed,
            status_updated_at: Some(now),
            price: Decimal::ZERO,
        };
        active.push(reservation.clone());
        Self::persist(&mut **store, &active)?;
        drop(store);

        info!("manual reservation {} entered for {at}", reservation.id);
        Ok(reservation)
    }

    /// Confirm or reject a reservation, then sweep and persist.
    ///
    /// Returns the reservation as it was right after the transition. An
    /// unknown id changes nothing apart from the sweep and yields `NotFound`.
    /// The customer is notified after the store is written; a failed delivery
    /// is logged and counted but never turns into an error.
    pub async fn set_status(&self, id: &str, action: StatusAction) -> Result<Reservation, EngineError> {
        let now = self.clock.now();
        let mut store = self.store.lock().await;
        let mut active = store.load_active().map_err(store_failure)?;
        let updated = active.iter_mut().find(|r| r.id == id).map(|r| {
            apply_action(r, action, now);
            r.clone()
        });
        Self::sweep_and_persist(&mut **store, active, now, true)?;
        drop(store);

        let Some(reservation) = updated else {
            debug!("status change for unknown reservation {id} ignored");
            return Err(EngineError::NotFound(id.to_string()));
        };
        info!("reservation {} is now {}", reservation.id, reservation.status.as_str());
        self.notify_status(&reservation).await;
        Ok(reservation)
    }

    async fn notify_status(&self, reservation: &Reservation) {
        if reservation.email.is_empty() {
            return;
        }
        let message = match (&reservation.status, reservation.scheduled_at()) {
            (Status::Confirmed, Some(at)) => {
                let label = self.catalog.read().await.label_of(&reservation.service_ids);
                notify::confirmation(&self.shop, &reservation.email, &reservation.customer_name, &label, at)
            }
            (Status::Confirmed, None) => {
                warn!("reservation {} confirmed without a schedule; no mail sent", reservation.id);
                return;
            }
            _ => notify::rejection(
                &self.shop,
                &reservation.email,
                &reservation.customer_name,
                reservation.scheduled_at(),
            ),
        };
        if !self.notifier.send(&message).await {
            warn!("notification for reservation {} to {} failed", reservation.id, reservation.email);
            metrics::counter!(observability::NOTIFICATIONS_FAILED_TOTAL).increment(1);
        }
    }

    // ── Service catalog ──────────────────────────────────────

    pub async fn add_service(&self, service: Service) -> Result<(), EngineError> {
        let id = service.id.clone();
        self.catalog.write().await.add(service)?;
        info!("service {id} added");
        Ok(())
    }

    /// Remove a service. Unknown ids are not an error; returns whether it existed.
    pub async fn remove_service(&self, id: &str) -> Result<bool, EngineError> {
        let removed = self.catalog.write().await.remove(id)?;
        if removed {
            info!("service {id} removed");
        }
        Ok(removed)
    }

    /// Change a service's price. Unknown ids are not an error; returns whether it existed.
    pub async fn update_service_price(&self, id: &str, price: Decimal) -> Result<bool, EngineError> {
        let found = self.catalog.write().await.update_price(id, price)?;
        if found {
            info!("service {id} now costs {price}");
        }
        Ok(found)
    }
}
