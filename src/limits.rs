use crate::model::{Amount, Ms};

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;
/// One week.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * 24 * 3_600_000;

pub const MAX_CLIENT_NAME_LEN: usize = 200;
pub const MAX_PRODUCT_NAME_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 2_000;
pub const MAX_PRODUCTS_PER_APPOINTMENT: usize = 64;

/// Upper bound on a single price in minor units. With
/// `MAX_PRODUCTS_PER_APPOINTMENT` this keeps every total inside `i64`.
pub const MAX_PRICE: Amount = 1_000_000_000_000;

/// Longest accepted request line on the wire, in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;
