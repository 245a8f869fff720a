//! The booking engine: the single entry point for appointment and catalog mutations.

mod appointments;
mod conflict;
mod error;
mod pricing;
mod products;
mod resolver;
#[cfg(test)]
mod tests;

pub use conflict::{find_conflict, has_conflict};
pub use error::EngineError;
pub use pricing::total_price;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::clock::Clock;
use crate::store::{AppointmentStore, MemoryStore, ProductStore};

#[derive(Clone)]
pub(super) struct Stores {
    pub(super) appointments: Arc<dyn AppointmentStore>,
    pub(super) products: Arc<dyn ProductStore>,
}

/// Booking scheduler and product catalog over a pair of stores.
///
/// All appointments compete for one implicit resource. Appointment mutations
/// run one at a time behind `booking`, so the read-check-write of an overlap
/// check can never interleave with another booking. Catalog mutations are
/// serialized the same way behind `catalog` for the name-uniqueness scan.
/// Reads take no lock.
pub struct Engine {
    stores: Stores,
    clock: Arc<dyn Clock>,
    booking: Arc<Mutex<()>>,
    catalog: Arc<Mutex<()>>,
}

impl Engine {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        products: Arc<dyn ProductStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            stores: Stores { appointments, products },
            clock,
            booking: Arc::new(Mutex::new(())),
            catalog: Arc::new(Mutex::new(())),
        }
    }

    /// Engine over a fresh [`MemoryStore`] that serves both roles.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(MemoryStore::new(clock.clone()));
        Self::new(store.clone(), store, clock)
    }

    pub(super) async fn lock_booking(&self) -> OwnedMutexGuard<()> {
        self.booking.clone().lock_owned().await
    }

    pub(super) async fn lock_catalog(&self) -> OwnedMutexGuard<()> {
        self.catalog.clone().lock_owned().await
    }
}

/// Run a critical section to completion on its own task, holding `guard` until it ends.
///
/// Waiting for the lock is cancellable by dropping the caller's future. Once
/// the guard is held, dropping the caller no longer interrupts the work, so
/// the lock is never released while a store write is still in flight.
pub(super) async fn run_detached<T, F>(guard: OwnedMutexGuard<()>, work: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, EngineError>> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let _guard = guard;
        work.await
    });
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(EngineError::Aborted),
    }
}
