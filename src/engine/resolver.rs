use std::collections::HashMap;

use ulid::Ulid;

use crate::model::{Appointment, Product};
use crate::store::{ProductStore, StoreError};

use super::EngineError;

/// Replace product references with the current store records.
///
/// All or nothing: the first id that does not resolve fails the whole call
/// with `ProductNotFound`. Output order and duplicates follow the input.
pub(crate) async fn resolve_products(
    store: &dyn ProductStore,
    ids: &[Ulid],
) -> Result<Vec<Product>, EngineError> {
    let mut resolved = Vec::with_capacity(ids.len());
    for &id in ids {
        match store.get_product(id).await {
            Ok(product) => resolved.push(product),
            Err(StoreError::NotFound(_)) => return Err(EngineError::ProductNotFound(id)),
            Err(e) => return Err(EngineError::Storage(e)),
        }
    }
    Ok(resolved)
}

/// Re-read an appointment's products from the catalog.
///
/// Prices and names come from the current records. References to products
/// deleted since the booking are dropped; order and duplicates are kept.
pub(crate) async fn refresh_products(
    store: &dyn ProductStore,
    appointment: Appointment,
) -> Result<Appointment, EngineError> {
    let mut current = Vec::with_capacity(appointment.products.len());
    for stored in &appointment.products {
        match store.get_product(stored.id).await {
            Ok(product) => current.push(product),
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(EngineError::Storage(e)),
        }
    }
    Ok(Appointment { products: current, ..appointment })
}

/// The whole catalog keyed by id, for refreshing many appointments at once.
pub(crate) async fn current_catalog(store: &dyn ProductStore) -> Result<HashMap<Ulid, Product>, EngineError> {
    let all = store.list_products().await.map_err(EngineError::Storage)?;
    Ok(all.into_iter().map(|p| (p.id, p)).collect())
}

/// [`refresh_products`] against a catalog already in hand.
pub(crate) fn refresh_from(catalog: &HashMap<Ulid, Product>, appointment: Appointment) -> Appointment {
    let current = appointment
        .products
        .iter()
        .filter_map(|stored| catalog.get(&stored.id).cloned())
        .collect();
    Appointment { products: current, ..appointment }
}
