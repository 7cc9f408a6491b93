use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `createdAt`, `statusUpdatedAt` and `archivedAt` on disk and on the wire.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// Column order of an active reservation row. Archive rows append [`ARCHIVE_FIELDS`].
pub const RESERVATION_FIELDS: [&str; 13] = [
    "id",
    "created_at",
    "customer_name",
    "email",
    "phone",
    "vehicle_make",
    "vehicle_model",
    "services",
    "requested_date",
    "requested_time",
    "status",
    "status_updated_at",
    "price",
];

pub const ARCHIVE_FIELDS: [&str; 2] = ["archived_at", "archive_reason"];

/// A bookable service from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Confirmed,
    Rejected,
    /// Stored text that names none of the above. Kept verbatim; no sweep rule
    /// applies to it.
    Unknown(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Pending => "pending",
            Status::Confirmed => "confirmed",
            Status::Rejected => "rejected",
            Status::Unknown(s) => s,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Status::Pending),
            "confirmed" => Some(Status::Confirmed),
            "rejected" => Some(Status::Rejected),
            _ => None,
        }
    }
}

/// Administrative decision on a reservation. Anything but `confirm` rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Confirm,
    Reject,
}

impl StatusAction {
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("confirm") {
            StatusAction::Confirm
        } else {
            StatusAction::Reject
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveReason {
    ConfirmedPast8h,
    RejectedPast24h,
    ExpiredAtSlotTime,
    Expired72Days,
}

impl ArchiveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveReason::ConfirmedPast8h => "confirmed_past_8h",
            ArchiveReason::RejectedPast24h => "rejected_past_24h",
            ArchiveReason::ExpiredAtSlotTime => "expired_at_slot_time",
            ArchiveReason::Expired72Days => "expired_72_days",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmed_past_8h" => Some(ArchiveReason::ConfirmedPast8h),
            "rejected_past_24h" => Some(ArchiveReason::RejectedPast24h),
            "expired_at_slot_time" => Some(ArchiveReason::ExpiredAtSlotTime),
            "expired_72_days" => Some(ArchiveReason::Expired72Days),
            _ => None,
        }
    }
}

/// An active reservation.
///
/// Timestamps and the requested slot are optional because rows written by older
/// versions may carry empty or unparseable values; such rows are kept verbatim
/// and simply never match the time-driven sweep rules that need them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: String,
    pub created_at: Option<NaiveDateTime>,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub service_ids: Vec<String>,
    pub requested_date: Option<NaiveDate>,
    pub requested_time: Option<NaiveTime>,
    pub status: Status,
    pub status_updated_at: Option<NaiveDateTime>,
    pub price: Decimal,
}

impl Reservation {
    /// Requested date and time combined, if both are known.
    pub fn scheduled_at(&self) -> Option<NaiveDateTime> {
        Some(self.requested_date?.and_time(self.requested_time?))
    }

    pub fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            fmt_timestamp(self.created_at),
            self.customer_name.clone(),
            self.email.clone(),
            self.phone.clone(),
            self.vehicle_make.clone(),
            self.vehicle_model.clone(),
            self.service_ids.join(","),
            self.requested_date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            self.requested_time
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_default(),
            self.status.as_str().to_string(),
            fmt_timestamp(self.status_updated_at),
            self.price.to_string(),
        ]
    }

    /// Decode a row in [`RESERVATION_FIELDS`] order. Missing trailing fields read as empty.
    pub fn from_fields(fields: &[String]) -> Self {
        let field = |i: usize| fields.get(i).map(String::as_str).unwrap_or("");
        let created_at = parse_timestamp(field(1));
        Self {
            id: field(0).to_string(),
            created_at,
            customer_name: field(2).to_string(),
            email: field(3).to_string(),
            phone: field(4).to_string(),
            vehicle_make: field(5).to_string(),
            vehicle_model: field(6).to_string(),
            service_ids: split_service_ids(field(7)),
            requested_date: NaiveDate::parse_from_str(field(8), DATE_FORMAT).ok(),
            requested_time: NaiveTime::parse_from_str(field(9), TIME_FORMAT).ok(),
            status: Status::parse(field(10)).unwrap_or_else(|| Status::Unknown(field(10).to_string())),
            // Older rows carry no status timestamp: it starts out equal to creation.
            status_updated_at: parse_timestamp(field(11)).or(created_at),
            price: Decimal::from_str(field(12)).unwrap_or(Decimal::ZERO),
        }
    }
}

/// A retired reservation in the archive log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedReservation {
    pub reservation: Reservation,
    pub archived_at: NaiveDateTime,
    pub reason: ArchiveReason,
}

impl ArchivedReservation {
    pub fn to_fields(&self) -> Vec<String> {
        let mut fields = self.reservation.to_fields();
        fields.push(self.archived_at.format(TIMESTAMP_FORMAT).to_string());
        fields.push(self.reason.as_str().to_string());
        fields
    }

    /// `None` when the archive columns themselves are unreadable.
    pub fn from_fields(fields: &[String]) -> Option<Self> {
        let n = RESERVATION_FIELDS.len();
        let archived_at = parse_timestamp(fields.get(n)?)?;
        let reason = ArchiveReason::parse(fields.get(n + 1)?)?;
        Some(Self {
            reservation: Reservation::from_fields(&fields[..n]),
            archived_at,
            reason,
        })
    }
}

/// A booking as submitted by a customer, before admission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingRequest {
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub service_ids: Vec<String>,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
}

/// A walk-in entered by the shop. Skips admission and starts out confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualReservation {
    pub customer_name: String,
    pub phone: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub service_ids: Vec<String>,
    pub date: String,
    pub time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Future day: the slots still free.
    Available,
    /// Today or earlier: the slots that cannot be taken.
    Unavailable,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Available => "available",
            SlotKind::Unavailable => "unavailable",
        }
    }
}

/// Answer to a slot query. Which list `slots` holds depends on `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAnswer {
    pub kind: SlotKind,
    pub slots: Vec<NaiveTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub pending_count: usize,
    pub total_count: usize,
    pub latest_created_at: Option<NaiveDateTime>,
}

// ── Field helpers ────────────────────────────────────────────────

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

pub fn fmt_timestamp(ts: Option<NaiveDateTime>) -> String {
    ts.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

/// Split a comma-separated service list, dropping empty entries.
pub fn split_service_ids(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
