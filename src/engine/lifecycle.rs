use chrono::{NaiveDateTime, TimeDelta};

use crate::model::*;

/// Confirmed reservations stay visible this long past their slot.
pub const CONFIRMED_RETENTION_HOURS: i64 = 8;
/// Rejected reservations stay visible this long past the rejection.
pub const REJECTED_RETENTION_HOURS: i64 = 24;
/// Pending reservations older than this are expired regardless of their slot.
pub const PENDING_MAX_AGE_DAYS: i64 = 72;

/// Apply an administrative decision. Stamps `status_updated_at` either way.
pub fn apply_action(reservation: &mut Reservation, action: StatusAction, now: NaiveDateTime) {
    reservation.status = match action {
        StatusAction::Confirm => Status::Confirmed,
        StatusAction::Reject => Status::Rejected,
    };
    reservation.status_updated_at = Some(now);
}

/// Decide whether a reservation retires at `now`, expiring stale pending ones
/// in place. Exactly one rule applies, chosen by the current status.
fn retire(reservation: &mut Reservation, now: NaiveDateTime) -> Option<ArchiveReason> {
    match reservation.status {
        Status::Confirmed => {
            let scheduled = reservation.scheduled_at()?;
            (now >= scheduled + TimeDelta::hours(CONFIRMED_RETENTION_HOURS))
                .then_some(ArchiveReason::ConfirmedPast8h)
        }
        Status::Rejected => {
            let decided = reservation.status_updated_at.or(reservation.created_at)?;
            (now >= decided + TimeDelta::hours(REJECTED_RETENTION_HOURS))
                .then_some(ArchiveReason::RejectedPast24h)
        }
        Status::Pending => {
            let reason = if reservation.scheduled_at().is_some_and(|at| now >= at) {
                ArchiveReason::ExpiredAtSlotTime
            } else if reservation
                .created_at
                .is_some_and(|at| now >= at + TimeDelta::days(PENDING_MAX_AGE_DAYS))
            {
                ArchiveReason::Expired72Days
            } else {
                return None;
            };
            reservation.status = Status::Rejected;
            reservation.status_updated_at = Some(now);
            Some(reason)
        }
        Status::Unknown(_) => None,
    }
}

/// Partition the active set into `(remaining, archived)` at `now`.
///
/// Remaining reservations keep their input order and are returned unchanged.
/// Running the sweep again on `remaining` with the same `now` archives nothing.
pub fn sweep(active: Vec<Reservation>, now: NaiveDateTime) -> (Vec<Reservation>, Vec<ArchivedReservation>) {
    let mut remaining = Vec::with_capacity(active.len());
    let mut archived = Vec::new();
    for mut reservation in active {
        match retire(&mut reservation, now) {
            Some(reason) => archived.push(ArchivedReservation {
                reservation,
                archived_at: now,
                reason,
            }),
            None => remaining.push(reservation),
        }
    }
    (remaining, archived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn reservation(status: Status, created: NaiveDateTime, scheduled: NaiveDateTime) -> Reservation {
        Reservation {
            id: format!("{status:?}-{scheduled}"),
            created_at: Some(created),
            customer_name: "Ion".into(),
            email: String::new(),
            phone: String::new(),
            vehicle_make: String::new(),
            vehicle_model: String::new(),
            service_ids: vec!["balancing".into()],
            requested_date: Some(scheduled.date()),
            requested_time: Some(scheduled.time()),
            status,
            status_updated_at: Some(created),
            price: Decimal::ZERO,
        }
    }

    #[test]
    fn apply_action_stamps_time() {
        let mut r = reservation(Status::Pending, at(1, 9, 0), at(20, 10, 0));
        apply_action(&mut r, StatusAction::Confirm, at(2, 9, 0));
        assert_eq!(r.status, Status::Confirmed);
        assert_eq!(r.status_updated_at, Some(at(2, 9, 0)));
        apply_action(&mut r, StatusAction::Reject, at(3, 9, 0));
        assert_eq!(r.status, Status::Rejected);
        assert_eq!(r.status_updated_at, Some(at(3, 9, 0)));
    }

    #[test]
    fn confirmed_retained_until_eight_hours_after_slot() {
        let r = reservation(Status::Confirmed, at(1, 9, 0), at(20, 10, 0));

        let (remaining, archived) = sweep(vec![r.clone()], at(20, 17, 59));
        assert_eq!(remaining, vec![r.clone()]);
        assert!(archived.is_empty());

        let (remaining, archived) = sweep(vec![r.clone()], at(20, 18, 0));
        assert!(remaining.is_empty());
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].reason, ArchiveReason::ConfirmedPast8h);
        assert_eq!(archived[0].reservation.status, Status::Confirmed);
        assert_eq!(archived[0].archived_at, at(20, 18, 0));
    }

    #[test]
    fn confirmed_without_schedule_is_kept() {
        let mut r = reservation(Status::Confirmed, at(1, 9, 0), at(2, 10, 0));
        r.requested_time = None;
        let (remaining, archived) = sweep(vec![r], at(30, 0, 0));
        assert_eq!(remaining.len(), 1);
        assert!(archived.is_empty());
    }

    #[test]
    fn rejected_retained_for_a_day_after_decision() {
        let mut r = reservation(Status::Rejected, at(1, 9, 0), at(20, 10, 0));
        r.status_updated_at = Some(at(5, 12, 0));

        let (remaining, _) = sweep(vec![r.clone()], at(6, 11, 59));
        assert_eq!(remaining.len(), 1);

        let (remaining, archived) = sweep(vec![r], at(6, 12, 0));
        assert!(remaining.is_empty());
        assert_eq!(archived[0].reason, ArchiveReason::RejectedPast24h);
    }

    #[test]
    fn rejected_falls_back_to_creation_time() {
        let mut r = reservation(Status::Rejected, at(1, 9, 0), at(20, 10, 0));
        r.status_updated_at = None;
        let (_, archived) = sweep(vec![r], at(2, 9, 0));
        assert_eq!(archived[0].reason, ArchiveReason::RejectedPast24h);
    }

    #[test]
    fn pending_past_slot_is_rejected_and_archived() {
        let r = reservation(Status::Pending, at(1, 9, 0), at(19, 10, 0));
        let now = at(19, 10, 1);
        let (remaining, archived) = sweep(vec![r], now);
        assert!(remaining.is_empty());
        assert_eq!(archived[0].reason, ArchiveReason::ExpiredAtSlotTime);
        assert_eq!(archived[0].reservation.status, Status::Rejected);
        assert_eq!(archived[0].reservation.status_updated_at, Some(now));
    }

    #[test]
    fn pending_expires_after_seventy_two_days() {
        let created = at(1, 9, 0);
        let mut r = reservation(Status::Pending, created, at(1, 10, 0));
        // Slot far in the future so only the age rule can fire.
        r.requested_date = NaiveDate::from_ymd_opt(2027, 6, 1);
        r.requested_time = NaiveTime::from_hms_opt(10, 0, 0);

        let (remaining, _) = sweep(vec![r.clone()], created + TimeDelta::days(72) - TimeDelta::seconds(1));
        assert_eq!(remaining.len(), 1);

        let (remaining, archived) = sweep(vec![r], created + TimeDelta::days(72));
        assert!(remaining.is_empty());
        assert_eq!(archived[0].reason, ArchiveReason::Expired72Days);
        assert_eq!(archived[0].reservation.status, Status::Rejected);
    }

    #[test]
    fn pending_slot_rule_wins_over_age_rule() {
        let created = at(1, 9, 0);
        let r = reservation(Status::Pending, created, at(2, 10, 0));
        let (_, archived) = sweep(vec![r], created + TimeDelta::days(100));
        assert_eq!(archived[0].reason, ArchiveReason::ExpiredAtSlotTime);
    }

    #[test]
    fn unrecognized_status_is_left_alone() {
        let mut r = reservation(Status::Pending, at(1, 9, 0), at(2, 10, 0));
        r.status = Status::Unknown("on hold".into());
        let (remaining, archived) = sweep(vec![r.clone()], at(19, 12, 0) + TimeDelta::days(100));
        assert!(archived.is_empty());
        assert_eq!(remaining, vec![r]);
    }

    #[test]
    fn sweep_is_idempotent_and_order_preserving() {
        let now = at(19, 12, 0);
        let active = vec![
            reservation(Status::Pending, at(1, 9, 0), at(25, 9, 0)),
            reservation(Status::Pending, at(1, 9, 0), at(19, 9, 0)),
            reservation(Status::Confirmed, at(1, 9, 0), at(21, 9, 0)),
            reservation(Status::Confirmed, at(1, 9, 0), at(18, 9, 0)),
        ];
        let (remaining, archived) = sweep(active.clone(), now);
        assert_eq!(remaining, vec![active[0].clone(), active[2].clone()]);
        assert_eq!(archived.len(), 2);

        let (again, archived_again) = sweep(remaining.clone(), now);
        assert_eq!(again, remaining);
        assert!(archived_again.is_empty());
    }
}
