//! Hard caps that keep a single tenant from exhausting memory or the WAL.

use crate::model::Ms;

pub const MAX_TENANTS: usize = 1_024;
pub const MAX_TENANT_NAME_LEN: usize = 256;

pub const MAX_SERVICES_PER_TENANT: usize = 10_000;
pub const MAX_RESOURCES_PER_TENANT: usize = 100_000;
pub const MAX_APPOINTMENTS_PER_RESOURCE: usize = 100_000;

pub const MAX_NAME_LEN: usize = 256;

/// One full day; longer visits are not appointments.
pub const MAX_SERVICE_DURATION_MINUTES: u32 = 24 * 60;
pub const MAX_PRICE_CENTS: u64 = i64::MAX as u64;

/// 1970-01-01 .. 2200-01-01
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

/// Widest window a calendar listing or slot search may cover (366 days).
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;
