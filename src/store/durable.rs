use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use ulid::Ulid;

use crate::clock::Clock;
use crate::model::*;
use crate::wal::Wal;

use super::{AppointmentStore, MemoryStore, ProductStore, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and is the only writer of the in-memory state.
/// 1. Block until the first Append arrives.
/// 2. Drain all immediately available Appends into one batch.
/// 3. One flush_sync for the whole batch.
/// 4. Apply the batch to memory only if the flush succeeded, then respond.
///
/// A caller that stops waiting does not stop its event from landing.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>, state: Arc<MemoryStore>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, &state, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &state, batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, &state, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, state: &MemoryStore, batch: Vec<Pending>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        tracing::error!("WAL flush failed for batch of {}: {e}", batch.len());
    }
    for (event, tx) in batch {
        let reply = match &result {
            Ok(()) => {
                state.apply(&event);
                Ok(())
            }
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    let appended = batch.iter().try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after an append error so half-buffered bytes don't leak into the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, state: &MemoryStore, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { response } => {
            // Safe without extra locking: this task is the only one that mutates `state`.
            let _ = response.send(wal.compact(&state.snapshot()));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, state, vec![(event, response)]),
    }
}

/// [`MemoryStore`] made durable by a write-ahead log with group commit.
///
/// Opening replays the log into memory. Every mutation is prepared against the
/// current state, logged, and applied by the writer task once fsynced.
pub struct DurableStore {
    state: Arc<MemoryStore>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl DurableStore {
    /// Must be called inside a tokio runtime; it spawns the writer task.
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let state = Arc::new(MemoryStore::new(clock));
        for event in &events {
            state.apply(event);
        }
        tracing::info!(
            "replayed {} events from {}: {} products, {} appointments",
            events.len(),
            path.display(),
            state.product_count(),
            state.appointment_count()
        );

        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx, state.clone()));
        Ok(Self { state, wal_tx })
    }

    async fn commit(&self, event: Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| StoreError::WriterGone("WAL writer shut down"))?;
        rx.await
            .map_err(|_| StoreError::WriterGone("WAL writer dropped response"))??;
        Ok(())
    }

    /// Rewrite the log as the current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { response: tx })
            .await
            .map_err(|_| StoreError::WriterGone("WAL writer shut down"))?;
        rx.await
            .map_err(|_| StoreError::WriterGone("WAL writer dropped response"))??;
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl AppointmentStore for DurableStore {
    async fn create_appointment(&self, data: AppointmentData) -> Result<Appointment, StoreError> {
        let appointment = self.state.new_appointment(data);
        self.commit(Event::AppointmentCreated { appointment: appointment.clone() }).await?;
        Ok(appointment)
    }

    async fn get_appointment(&self, id: Ulid) -> Result<Appointment, StoreError> {
        self.state.appointment(id)
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.state.sorted_appointments())
    }

    async fn update_appointment(
        &self,
        id: Ulid,
        data: AppointmentData,
    ) -> Result<Appointment, StoreError> {
        let appointment = self.state.replaced_appointment(id, data)?;
        self.commit(Event::AppointmentUpdated { appointment: appointment.clone() }).await?;
        Ok(appointment)
    }

    async fn delete_appointment(&self, id: Ulid) -> Result<(), StoreError> {
        if !self.state.has_appointment(id) {
            return Err(StoreError::NotFound(id));
        }
        self.commit(Event::AppointmentCancelled { id }).await
    }
}

#[async_trait]
impl ProductStore for DurableStore {
    async fn create_product(&self, data: ProductData) -> Result<Product, StoreError> {
        let product = self.state.new_product(data);
        self.commit(Event::ProductCreated { product: product.clone() }).await?;
        Ok(product)
    }

    async fn get_product(&self, id: Ulid) -> Result<Product, StoreError> {
        self.state.product(id)
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.state.sorted_products())
    }

    async fn update_product(&self, id: Ulid, data: ProductData) -> Result<Product, StoreError> {
        let product = self.state.replaced_product(id, data)?;
        self.commit(Event::ProductUpdated { product: product.clone() }).await?;
        Ok(product)
    }

    async fn delete_product(&self, id: Ulid) -> Result<(), StoreError> {
        if !self.state.has_product(id) {
            return Err(StoreError::NotFound(id));
        }
        self.commit(Event::ProductDeleted { id }).await
    }
}
