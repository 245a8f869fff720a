use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;

use super::{AppointmentStore, ProductStore, StoreError};

/// Materialized catalog and calendar. Every mutation is expressed as an
/// [`Event`] and goes through [`MemoryStore::apply`], so the durable store can
/// reuse the same state after logging the event.
pub struct MemoryStore {
    appointments: DashMap<Ulid, Appointment>,
    products: DashMap<Ulid, Product>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            appointments: DashMap::new(),
            products: DashMap::new(),
            clock,
        }
    }

    pub fn appointment_count(&self) -> usize {
        self.appointments.len()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    // ── Event application ────────────────────────────────────

    pub fn apply(&self, event: &Event) {
        match event {
            Event::ProductCreated { product } | Event::ProductUpdated { product } => {
                self.products.insert(product.id, product.clone());
            }
            Event::ProductDeleted { id } => {
                self.products.remove(id);
            }
            Event::AppointmentCreated { appointment } | Event::AppointmentUpdated { appointment } => {
                self.appointments.insert(appointment.id, appointment.clone());
            }
            Event::AppointmentCancelled { id } => {
                self.appointments.remove(id);
            }
        }
    }

    /// The minimal event list that rebuilds the current state. Products come
    /// first so a replayed log reads in dependency order.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .sorted_products()
            .into_iter()
            .map(|product| Event::ProductCreated { product })
            .collect();
        events.extend(
            self.sorted_appointments()
                .into_iter()
                .map(|appointment| Event::AppointmentCreated { appointment }),
        );
        events
    }

    // ── Record construction ──────────────────────────────────

    pub(super) fn new_appointment(&self, data: AppointmentData) -> Appointment {
        let now = self.clock.now_ms();
        Appointment {
            id: Ulid::new(),
            client_name: data.client_name,
            span: data.span,
            products: data.products,
            created_at: now,
            updated_at: now,
        }
    }

    pub(super) fn replaced_appointment(
        &self,
        id: Ulid,
        data: AppointmentData,
    ) -> Result<Appointment, StoreError> {
        let created_at = self
            .appointments
            .get(&id)
            .map(|a| a.created_at)
            .ok_or(StoreError::NotFound(id))?;
        Ok(Appointment {
            id,
            client_name: data.client_name,
            span: data.span,
            products: data.products,
            created_at,
            updated_at: self.clock.now_ms(),
        })
    }

    pub(super) fn new_product(&self, data: ProductData) -> Product {
        let now = self.clock.now_ms();
        Product {
            id: Ulid::new(),
            name: data.name,
            price: data.price,
            description: data.description,
            created_at: now,
            updated_at: now,
        }
    }

    pub(super) fn replaced_product(&self, id: Ulid, data: ProductData) -> Result<Product, StoreError> {
        let created_at = self
            .products
            .get(&id)
            .map(|p| p.created_at)
            .ok_or(StoreError::NotFound(id))?;
        Ok(Product {
            id,
            name: data.name,
            price: data.price,
            description: data.description,
            created_at,
            updated_at: self.clock.now_ms(),
        })
    }

    // ── Reads ────────────────────────────────────────────────

    pub(super) fn appointment(&self, id: Ulid) -> Result<Appointment, StoreError> {
        self.appointments
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound(id))
    }

    pub(super) fn product(&self, id: Ulid) -> Result<Product, StoreError> {
        self.products
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound(id))
    }

    pub(super) fn sorted_appointments(&self) -> Vec<Appointment> {
        let mut all: Vec<Appointment> = self.appointments.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|a| (a.span.start, a.id));
        all
    }

    pub(super) fn sorted_products(&self) -> Vec<Product> {
        let mut all: Vec<Product> = self.products.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|p| (p.created_at, p.id));
        all
    }

    pub(super) fn has_appointment(&self, id: Ulid) -> bool {
        self.appointments.contains_key(&id)
    }

    pub(super) fn has_product(&self, id: Ulid) -> bool {
        self.products.contains_key(&id)
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn create_appointment(&self, data: AppointmentData) -> Result<Appointment, StoreError> {
        let appointment = self.new_appointment(data);
        self.apply(&Event::AppointmentCreated { appointment: appointment.clone() });
        Ok(appointment)
    }

    async fn get_appointment(&self, id: Ulid) -> Result<Appointment, StoreError> {
        self.appointment(id)
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.sorted_appointments())
    }

    async fn update_appointment(
        &self,
        id: Ulid,
        data: AppointmentData,
    ) -> Result<Appointment, StoreError> {
        let appointment = self.replaced_appointment(id, data)?;
        self.apply(&Event::AppointmentUpdated { appointment: appointment.clone() });
        Ok(appointment)
    }

    async fn delete_appointment(&self, id: Ulid) -> Result<(), StoreError> {
        if !self.has_appointment(id) {
            return Err(StoreError::NotFound(id));
        }
        self.apply(&Event::AppointmentCancelled { id });
        Ok(())
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn create_product(&self, data: ProductData) -> Result<Product, StoreError> {
        let product = self.new_product(data);
        self.apply(&Event::ProductCreated { product: product.clone() });
        Ok(product)
    }

    async fn get_product(&self, id: Ulid) -> Result<Product, StoreError> {
        self.product(id)
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.sorted_products())
    }

    async fn update_product(&self, id: Ulid, data: ProductData) -> Result<Product, StoreError> {
        let product = self.replaced_product(id, data)?;
        self.apply(&Event::ProductUpdated { product: product.clone() });
        Ok(product)
    }

    async fn delete_product(&self, id: Ulid) -> Result<(), StoreError> {
        if !self.has_product(id) {
            return Err(StoreError::NotFound(id));
        }
        self.apply(&Event::ProductDeleted { id });
        Ok(())
    }
}
