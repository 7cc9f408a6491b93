//! Hard limits enforced at the engine boundary.

/// Longest accepted customer/vehicle/service text field, in bytes.
pub const MAX_FIELD_LEN: usize = 256;

/// Most services a single reservation may combine.
pub const MAX_SERVICES_PER_BOOKING: usize = 16;

/// Active reservations kept in the store before new bookings are refused.
pub const MAX_ACTIVE_RESERVATIONS: usize = 10_000;

/// Services the catalog may hold.
pub const MAX_CATALOG_SIZE: usize = 256;

/// Longest single service. One working day.
pub const MAX_SERVICE_DURATION_MINUTES: u32 = 600;
