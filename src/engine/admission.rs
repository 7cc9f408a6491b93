use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::limits::*;
use crate::model::*;

use super::EngineError;
use super::calendar::{LEAD_TIME_MINUTES, is_slot_boundary};

/// Parse a requested `YYYY-MM-DD` date and `HH:MM` time.
pub(crate) fn parse_requested(date: &str, time: &str) -> Result<NaiveDateTime, EngineError> {
    NaiveDateTime::parse_from_str(&format!("{} {}", date.trim(), time.trim()), "%Y-%m-%d %H:%M")
        .map_err(|_| EngineError::BadDateTimeFormat)
}

pub(crate) fn parse_date(date: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).map_err(|_| EngineError::BadDateTimeFormat)
}

/// Temporal admission rules for a new booking. Returns the scheduled start.
///
/// Occupancy is deliberately not checked here: the slot list shown to the
/// client is advisory and two bookings for the same slot are both accepted.
pub fn admit(date: &str, time: &str, now: NaiveDateTime) -> Result<NaiveDateTime, EngineError> {
    let requested = parse_requested(date, time)?;
    if requested <= now {
        return Err(EngineError::PastBooking);
    }
    if requested <= now + TimeDelta::minutes(LEAD_TIME_MINUTES) {
        return Err(EngineError::TooSoon);
    }
    if !is_slot_boundary(requested.time()) {
        return Err(EngineError::OffSchedule(requested.time()));
    }
    Ok(requested)
}

pub(crate) fn validate_fields(fields: &[&str], service_ids: &[String]) -> Result<(), EngineError> {
    if fields.iter().any(|f| f.len() > MAX_FIELD_LEN) {
        return Err(EngineError::LimitExceeded("field too long"));
    }
    if service_ids.len() > MAX_SERVICES_PER_BOOKING {
        return Err(EngineError::LimitExceeded("too many services"));
    }
    if service_ids.iter().any(|id| id.len() > MAX_FIELD_LEN) {
        return Err(EngineError::LimitExceeded("service id too long"));
    }
    Ok(())
}

impl BookingRequest {
    pub(crate) fn validate_fields(&self) -> Result<(), EngineError> {
        validate_fields(
            &[
                self.customer_name.as_str(),
                self.email.as_str(),
                self.phone.as_str(),
                self.vehicle_make.as_str(),
                self.vehicle_model.as_str(),
            ],
            &self.service_ids,
        )
    }
}

impl ManualReservation {
    pub(crate) fn validate_fields(&self) -> Result<(), EngineError> {
        validate_fields(
            &[
                self.customer_name.as_str(),
                self.phone.as_str(),
                self.vehicle_make.as_str(),
                self.vehicle_model.as_str(),
            ],
            &self.service_ids,
        )
    }
}
