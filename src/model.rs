use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Money in integer minor units (e.g. cents).
pub type Amount = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Strict on both ends: a span ending exactly where another begins does not overlap it.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A catalog entry that appointments reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Ulid,
    pub name: String,
    pub price: Amount,
    pub description: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// A committed booking. `products` holds full records, duplicates preserved.
/// The engine refreshes them from the catalog on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub client_name: String,
    pub span: Span,
    pub products: Vec<Product>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

// ── Inputs ───────────────────────────────────────────────────────

/// A proposed appointment as submitted by a caller. Nothing here is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub client_name: String,
    pub start: Ms,
    pub end: Ms,
    pub product_ids: Vec<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Amount,
    pub description: Option<String>,
}

// ── Store payloads ───────────────────────────────────────────────

/// Validated, resolved appointment content. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentData {
    pub client_name: String,
    pub span: Span,
    pub products: Vec<Product>,
}

/// Validated product content. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductData {
    pub name: String,
    pub price: Amount,
    pub description: Option<String>,
}

/// Flat event types, one per state change. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ProductCreated { product: Product },
    ProductUpdated { product: Product },
    ProductDeleted { id: Ulid },
    AppointmentCreated { appointment: Appointment },
    AppointmentUpdated { appointment: Appointment },
    AppointmentCancelled { id: Ulid },
}
