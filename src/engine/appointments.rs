use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_window};
use super::resolver::{current_catalog, refresh_from, refresh_products, resolve_products};
use super::{pricing, run_detached, Engine, EngineError, Stores};

/// Proposed → Validated: window first, then the remaining input checks.
fn validate_candidate(candidate: &NewAppointment, now: Ms) -> Result<Span, EngineError> {
    let span = validate_window(candidate.start, candidate.end, now)?;
    if candidate.client_name.trim().is_empty() {
        return Err(EngineError::InvalidInput("client name is required"));
    }
    if candidate.client_name.len() > MAX_CLIENT_NAME_LEN {
        return Err(EngineError::LimitExceeded("client name too long"));
    }
    if candidate.product_ids.len() > MAX_PRODUCTS_PER_APPOINTMENT {
        return Err(EngineError::LimitExceeded("too many products"));
    }
    Ok(span)
}

/// Validated → Committed | Rejected. Caller holds the booking lock.
///
/// Conflicts are checked before products resolve, so an overlap wins over a
/// bad product reference.
async fn commit(
    stores: Stores,
    replacing: Option<Ulid>,
    span: Span,
    candidate: NewAppointment,
) -> Result<Appointment, EngineError> {
    let existing = stores.appointments.list_appointments().await?;
    check_no_conflict(&span, &existing, replacing)?;

    let products = resolve_products(stores.products.as_ref(), &candidate.product_ids).await?;
    let data = AppointmentData {
        client_name: candidate.client_name,
        span,
        products,
    };
    let committed = match replacing {
        Some(id) => stores.appointments.update_appointment(id, data).await?,
        None => stores.appointments.create_appointment(data).await?,
    };
    Ok(committed)
}

impl Engine {
    pub async fn create_appointment(&self, candidate: NewAppointment) -> Result<Appointment, EngineError> {
        let now = self.clock.now_ms();
        let span = validate_candidate(&candidate, now).inspect_err(|e| {
            debug!("rejected appointment for {:?}: {e}", candidate.client_name);
        })?;

        let guard = self.lock_booking().await;
        let result = run_detached(guard, commit(self.stores.clone(), None, span, candidate)).await;
        match &result {
            Ok(a) => info!("booked appointment {} [{}, {})", a.id, a.span.start, a.span.end),
            Err(e) => debug!("booking rejected [{}, {}): {e}", span.start, span.end),
        }
        result
    }

    /// Full replacement of an existing appointment's client, window and products.
    /// The appointment's own prior window never conflicts with the new one.
    pub async fn update_appointment(
        &self,
        id: Ulid,
        candidate: NewAppointment,
    ) -> Result<Appointment, EngineError> {
        let guard = self.lock_booking().await;
        let now = self.clock.now_ms();
        let stores = self.stores.clone();
        let result = run_detached(guard, async move {
            let existing = stores.appointments.get_appointment(id).await?;
            let span = validate_candidate(&candidate, now)?;
            commit(stores, Some(existing.id), span, candidate).await
        })
        .await;
        match &result {
            Ok(a) => info!("rebooked appointment {id} [{}, {})", a.span.start, a.span.end),
            Err(e) => debug!("update of appointment {id} rejected: {e}"),
        }
        result
    }

    /// Committed → Cancelled. The record and its product snapshot are discarded.
    pub async fn cancel_appointment(&self, id: Ulid) -> Result<(), EngineError> {
        let guard = self.lock_booking().await;
        let stores = self.stores.clone();
        run_detached(guard, async move {
            stores.appointments.get_appointment(id).await?;
            stores.appointments.delete_appointment(id).await?;
            Ok(())
        })
        .await?;
        info!("cancelled appointment {id}");
        Ok(())
    }

    /// The appointment with its products as the catalog holds them now.
    pub async fn get_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        let stored = self.stores.appointments.get_appointment(id).await?;
        refresh_products(self.stores.products.as_ref(), stored).await
    }

    pub async fn list_appointments(&self) -> Result<Vec<Appointment>, EngineError> {
        let stored = self.stores.appointments.list_appointments().await?;
        let catalog = current_catalog(self.stores.products.as_ref()).await?;
        Ok(stored
            .into_iter()
            .map(|appointment| refresh_from(&catalog, appointment))
            .collect())
    }

    /// Total of the appointment's products at their current catalog prices.
    pub async fn total_price(&self, id: Ulid) -> Result<Amount, EngineError> {
        let appointment = self.get_appointment(id).await?;
        Ok(pricing::total_price(&appointment.products))
    }
}
