//! Storage collaborators for the booking engine.
//!
//! The engine only sees [`AppointmentStore`] and [`ProductStore`]. Stores
//! assign identifiers and timestamps; they never validate windows, names or
//! overlaps.

mod durable;
mod memory;

pub use durable::DurableStore;
pub use memory::MemoryStore;

use std::io;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::{Appointment, AppointmentData, Product, ProductData};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("WAL error: {0}")]
    Wal(#[from] io::Error),
    #[error("WAL writer unavailable: {0}")]
    WriterGone(&'static str),
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn create_appointment(&self, data: AppointmentData) -> Result<Appointment, StoreError>;

    async fn get_appointment(&self, id: Ulid) -> Result<Appointment, StoreError>;

    /// Every appointment, ordered by start instant.
    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError>;

    /// Full replace of the content under `id`. Keeps `created_at`.
    async fn update_appointment(
        &self,
        id: Ulid,
        data: AppointmentData,
    ) -> Result<Appointment, StoreError>;

    async fn delete_appointment(&self, id: Ulid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn create_product(&self, data: ProductData) -> Result<Product, StoreError>;

    async fn get_product(&self, id: Ulid) -> Result<Product, StoreError>;

    /// Every product, ordered by `created_at` then id.
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    async fn update_product(&self, id: Ulid, data: ProductData) -> Result<Product, StoreError>;

    async fn delete_product(&self, id: Ulid) -> Result<(), StoreError>;
}
