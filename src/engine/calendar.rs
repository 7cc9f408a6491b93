use std::collections::{BTreeSet, HashSet};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

use crate::catalog::Catalog;
use crate::model::*;

// ── Slot Calendar ────────────────────────────────────────────────

pub const OPENING_HOUR: u32 = 8;
pub const CLOSING_HOUR: u32 = 18;
pub const SLOT_MINUTES: u32 = 30;
/// Minimum distance between "now" and a bookable slot.
pub const LEAD_TIME_MINUTES: i64 = 20;
/// Occupancy never extends past one full turn of the clock.
const DAY_MINUTES: u32 = 24 * 60;

/// Every bookable slot of a day: 30-minute boundaries from 08:00 up to (not
/// including) 18:00, ascending.
pub fn working_slots() -> Vec<NaiveTime> {
    (OPENING_HOUR..CLOSING_HOUR)
        .flat_map(|h| {
            (0..60)
                .step_by(SLOT_MINUTES as usize)
                .filter_map(move |m| NaiveTime::from_hms_opt(h, m, 0))
        })
        .collect()
}

pub fn is_slot_boundary(t: NaiveTime) -> bool {
    t.second() == 0
        && t.nanosecond() == 0
        && t.minute() % SLOT_MINUTES == 0
        && (OPENING_HOUR..CLOSING_HOUR).contains(&t.hour())
}

/// Slot steps taken by reservations on `date`, in reservation order.
///
/// Each non-rejected reservation covers every 30-minute step from its start
/// inclusive to `start + duration` exclusive, so a 45-minute job takes two
/// steps. Steps past midnight wrap, and the list may hold duplicates when
/// reservations overlap.
pub fn occupancy(date: NaiveDate, reservations: &[Reservation], catalog: &Catalog) -> Vec<NaiveTime> {
    let mut taken = Vec::new();
    for r in reservations {
        if r.requested_date != Some(date) || r.status == Status::Rejected {
            continue;
        }
        let Some(start) = r.requested_time else {
            continue;
        };
        let minutes = catalog.duration_of(&r.service_ids).min(DAY_MINUTES);
        let mut offset = 0;
        while offset < minutes {
            taken.push(start + TimeDelta::minutes(offset as i64));
            offset += SLOT_MINUTES;
        }
    }
    taken
}

pub fn occupied_slots(date: NaiveDate, reservations: &[Reservation], catalog: &Catalog) -> BTreeSet<NaiveTime> {
    occupancy(date, reservations, catalog).into_iter().collect()
}

/// Split the day into (available, taken).
///
/// `taken` starts with the occupancy steps and then receives every slot the
/// clock rules out, in slot order. For today a slot is ruled out when it is at
/// or before now, or at or before now + lead time. The second check subsumes
/// the first except when now + lead time crosses midnight; both are kept.
fn partition_day(
    date: NaiveDate,
    now: NaiveDateTime,
    reservations: &[Reservation],
    catalog: &Catalog,
) -> (Vec<NaiveTime>, Vec<NaiveTime>) {
    let mut taken = occupancy(date, reservations, catalog);
    let occupied: HashSet<NaiveTime> = taken.iter().copied().collect();
    let today = now.date();
    let lead = (now + TimeDelta::minutes(LEAD_TIME_MINUTES)).time();

    let mut available = Vec::new();
    for slot in working_slots() {
        if date == today {
            if slot <= now.time() || slot <= lead {
                taken.push(slot);
                continue;
            }
        } else if date < today {
            taken.push(slot);
            continue;
        }
        if !occupied.contains(&slot) {
            available.push(slot);
        }
    }
    (available, taken)
}

/// Free slots on `date`, ascending. Empty for past days.
pub fn available_slots(
    date: NaiveDate,
    now: NaiveDateTime,
    reservations: &[Reservation],
    catalog: &Catalog,
) -> Vec<NaiveTime> {
    partition_day(date, now, reservations, catalog).0
}

/// The client-facing slot answer: available slots for future days, taken
/// slots for today and earlier.
pub fn query_slots(
    date: NaiveDate,
    now: NaiveDateTime,
    reservations: &[Reservation],
    catalog: &Catalog,
) -> SlotAnswer {
    let (available, taken) = partition_day(date, now, reservations, catalog);
    if date > now.date() {
        SlotAnswer {
            kind: SlotKind::Available,
            slots: available,
        }
    } else {
        SlotAnswer {
            kind: SlotKind::Unavailable,
            slots: taken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::default_services;
    use rust_decimal::Decimal;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn reservation(date: NaiveDate, time: NaiveTime, services: &[&str], status: Status) -> Reservation {
        Reservation {
            id: format!("r-{time}"),
            created_at: None,
            customer_name: String::new(),
            email: String::new(),
            phone: String::new(),
            vehicle_make: String::new(),
            vehicle_model: String::new(),
            service_ids: services.iter().map(|s| s.to_string()).collect(),
            requested_date: Some(date),
            requested_time: Some(time),
            status,
            status_updated_at: None,
            price: Decimal::ZERO,
        }
    }

    fn catalog() -> Catalog {
        let mut services = default_services();
        services.push(Service {
            id: "alignment".into(),
            name: "Alignment".into(),
            duration_minutes: 45,
            price: Decimal::ZERO,
            description: String::new(),
        });
        Catalog::new(services)
    }

    #[test]
    fn twenty_slots_from_eight_to_half_past_five() {
        let slots = working_slots();
        assert_eq!(slots.len(), 20);
        assert_eq!(slots[0], t(8, 0));
        assert_eq!(slots[1], t(8, 30));
        assert_eq!(slots[19], t(17, 30));
        assert!(slots.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn slot_boundaries() {
        assert!(is_slot_boundary(t(8, 0)));
        assert!(is_slot_boundary(t(17, 30)));
        assert!(!is_slot_boundary(t(7, 30)));
        assert!(!is_slot_boundary(t(18, 0)));
        assert!(!is_slot_boundary(t(9, 15)));
    }

    #[test]
    fn empty_future_day_is_fully_available() {
        let now = day(19).and_time(t(12, 0));
        let answer = query_slots(day(20), now, &[], &catalog());
        assert_eq!(answer.kind, SlotKind::Available);
        assert_eq!(answer.slots, working_slots());
    }

    #[test]
    fn forty_five_minutes_blocks_two_slots() {
        let rs = vec![reservation(day(20), t(9, 0), &["alignment"], Status::Pending)];
        let occupied = occupied_slots(day(20), &rs, &catalog());
        assert_eq!(occupied.into_iter().collect::<Vec<_>>(), vec![t(9, 0), t(9, 30)]);
    }

    #[test]
    fn multi_service_duration_is_summed() {
        let rs = vec![reservation(day(20), t(10, 0), &["tire-change", "balancing"], Status::Confirmed)];
        let now = day(19).and_time(t(12, 0));
        let free = available_slots(day(20), now, &rs, &catalog());
        assert_eq!(free.len(), 17);
        for slot in [t(10, 0), t(10, 30), t(11, 0)] {
            assert!(!free.contains(&slot));
        }
        assert!(free.contains(&t(11, 30)));
    }

    #[test]
    fn rejected_and_other_days_do_not_occupy() {
        let rs = vec![
            reservation(day(20), t(9, 0), &["balancing"], Status::Rejected),
            reservation(day(21), t(9, 0), &["balancing"], Status::Pending),
        ];
        assert!(occupied_slots(day(20), &rs, &catalog()).is_empty());
    }

    #[test]
    fn no_services_defaults_to_one_slot() {
        let rs = vec![reservation(day(20), t(9, 0), &[], Status::Pending)];
        assert_eq!(occupancy(day(20), &rs, &catalog()), vec![t(9, 0)]);
    }

    #[test]
    fn unknown_only_services_occupy_nothing() {
        let rs = vec![reservation(day(20), t(9, 0), &["ghost"], Status::Pending)];
        assert!(occupancy(day(20), &rs, &catalog()).is_empty());
    }

    #[test]
    fn occupancy_may_run_past_closing() {
        let rs = vec![reservation(day(20), t(17, 30), &["tire-change"], Status::Pending)];
        assert_eq!(occupancy(day(20), &rs, &catalog()), vec![t(17, 30), t(18, 0)]);
    }

    #[test]
    fn huge_service_lists_stop_after_a_day() {
        let ids = vec!["balancing"; 200];
        let rs = vec![reservation(day(20), t(9, 0), &ids, Status::Unknown("on hold".into()))];
        let steps = occupancy(day(20), &rs, &catalog());
        assert_eq!(steps.len(), 48);
        assert_eq!(steps[47], t(8, 30));
    }

    #[test]
    fn today_drops_slots_within_lead_time() {
        let now = day(19).and_time(t(10, 5));
        let free = available_slots(day(19), now, &[], &catalog());
        // 10:25 is the cutoff: 10:30 is the first slot strictly after it.
        assert_eq!(free.first(), Some(&t(10, 30)));
        assert_eq!(free.len(), 15);

        let now = day(19).and_time(t(10, 10));
        let free = available_slots(day(19), now, &[], &catalog());
        assert_eq!(free.first(), Some(&t(11, 0)));
    }

    #[test]
    fn today_answer_lists_taken_slots() {
        let now = day(19).and_time(t(16, 0));
        let rs = vec![reservation(day(19), t(17, 0), &["balancing"], Status::Pending)];
        let answer = query_slots(day(19), now, &rs, &catalog());
        assert_eq!(answer.kind, SlotKind::Unavailable);
        // Occupancy first, then every slot up to 16:20 in slot order.
        let mut expected = vec![t(17, 0)];
        expected.extend(working_slots().into_iter().filter(|s| *s <= t(16, 20)));
        assert_eq!(answer.slots, expected);
    }

    #[test]
    fn late_evening_marks_every_slot_taken() {
        // now + 20min wraps to 00:10; the plain "<= now" check still applies.
        let now = day(19).and_time(t(23, 50));
        let answer = query_slots(day(19), now, &[], &catalog());
        assert_eq!(answer.kind, SlotKind::Unavailable);
        assert_eq!(answer.slots, working_slots());
        assert!(available_slots(day(19), now, &[], &catalog()).is_empty());
    }

    #[test]
    fn past_day_is_all_taken() {
        let now = day(19).and_time(t(9, 0));
        let rs = vec![reservation(day(18), t(9, 0), &["balancing"], Status::Confirmed)];
        let answer = query_slots(day(18), now, &rs, &catalog());
        assert_eq!(answer.kind, SlotKind::Unavailable);
        assert_eq!(answer.slots.len(), 21);
        assert_eq!(answer.slots[0], t(9, 0));
        assert!(available_slots(day(18), now, &rs, &catalog()).is_empty());
    }
}
