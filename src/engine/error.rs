use chrono::NaiveTime;

#[derive(Debug)]
pub enum EngineError {
    /// Requested date/time is not `YYYY-MM-DD` / `HH:MM`.
    BadDateTimeFormat,
    PastBooking,
    TooSoon,
    OffSchedule(NaiveTime),
    NotFound(String),
    ServiceExists(String),
    InvalidService(&'static str),
    LimitExceeded(&'static str),
    StoreError(String),
}

impl EngineError {
    /// SQLSTATE reported to clients.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            EngineError::BadDateTimeFormat => "22007",
            EngineError::PastBooking | EngineError::TooSoon | EngineError::OffSchedule(_) => {
                "22023"
            }
            EngineError::NotFound(_) => "P0002",
            EngineError::ServiceExists(_) => "23505",
            EngineError::InvalidService(_) => "22023",
            EngineError::LimitExceeded(_) => "54000",
            EngineError::StoreError(_) => "58030",
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::BadDateTimeFormat => "bad_datetime_format",
            EngineError::PastBooking => "past_booking",
            EngineError::TooSoon => "too_soon",
            EngineError::OffSchedule(_) => "off_schedule",
            EngineError::NotFound(_) => "not_found",
            EngineError::ServiceExists(_) => "service_exists",
            EngineError::InvalidService(_) => "invalid_service",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::StoreError(_) => "store_error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::BadDateTimeFormat => {
                write!(f, "invalid date/time format (expected YYYY-MM-DD and HH:MM)")
            }
            EngineError::PastBooking => write!(f, "reservations cannot be made in the past"),
            EngineError::TooSoon => {
                write!(f, "reservations must be at least 20 minutes in the future")
            }
            EngineError::OffSchedule(t) => {
                write!(f, "{} is not a bookable slot", t.format("%H:%M"))
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::ServiceExists(id) => write!(f, "service already exists: {id}"),
            EngineError::InvalidService(msg) => write!(f, "invalid service: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StoreError(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::StoreError(e.to_string())
    }
}
