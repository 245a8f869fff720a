use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ulid::Ulid;

use super::*;
use crate::clock::ManualClock;
use crate::model::*;
use crate::store::StoreError;

const H: Ms = 3_600_000; // 1 hour in ms
const M: Ms = 60_000; // 1 minute in ms

/// 2027-01-15T08:00:00Z
const NOW: Ms = 1_800_000_000_000;

fn setup() -> (Arc<ManualClock>, Arc<MemoryStore>, Engine) {
    let clock = Arc::new(ManualClock::new(NOW));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let engine = Engine::new(store.clone(), store.clone(), clock.clone());
    (clock, store, engine)
}

fn candidate(client: &str, start: Ms, end: Ms, product_ids: Vec<Ulid>) -> NewAppointment {
    NewAppointment {
        client_name: client.into(),
        start,
        end,
        product_ids,
    }
}

fn draft(name: &str, price: Amount) -> NewProduct {
    NewProduct {
        name: name.into(),
        price,
        description: None,
    }
}

async fn add_product(engine: &Engine, name: &str, price: Amount) -> Product {
    engine.create_product(draft(name, price)).await.unwrap()
}

/// MemoryStore with a widened read-then-write window and injectable failures.
struct SlowStore {
    inner: MemoryStore,
    list_delay: Duration,
    fail_product_list: AtomicBool,
    fail_appointment_writes: AtomicBool,
}

impl SlowStore {
    fn new(clock: Arc<ManualClock>, list_delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(clock),
            list_delay,
            fail_product_list: AtomicBool::new(false),
            fail_appointment_writes: AtomicBool::new(false),
        }
    }

    fn broken() -> StoreError {
        StoreError::Wal(std::io::Error::other("disk on fire"))
    }
}

#[async_trait]
impl AppointmentStore for SlowStore {
    async fn create_appointment(&self, data: AppointmentData) -> Result<Appointment, StoreError> {
        if self.fail_appointment_writes.load(Ordering::SeqCst) {
            return Err(Self::broken());
        }
        self.inner.create_appointment(data).await
    }

    async fn get_appointment(&self, id: Ulid) -> Result<Appointment, StoreError> {
        self.inner.get_appointment(id).await
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        let snapshot = self.inner.list_appointments().await?;
        tokio::time::sleep(self.list_delay).await;
        Ok(snapshot)
    }

    async fn update_appointment(&self, id: Ulid, data: AppointmentData) -> Result<Appointment, StoreError> {
        if self.fail_appointment_writes.load(Ordering::SeqCst) {
            return Err(Self::broken());
        }
        self.inner.update_appointment(id, data).await
    }

    async fn delete_appointment(&self, id: Ulid) -> Result<(), StoreError> {
        self.inner.delete_appointment(id).await
    }
}

#[async_trait]
impl ProductStore for SlowStore {
    async fn create_product(&self, data: ProductData) -> Result<Product, StoreError> {
        self.inner.create_product(data).await
    }

    async fn get_product(&self, id: Ulid) -> Result<Product, StoreError> {
        self.inner.get_product(id).await
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        if self.fail_product_list.load(Ordering::SeqCst) {
            return Err(Self::broken());
        }
        self.inner.list_products().await
    }

    async fn update_product(&self, id: Ulid, data: ProductData) -> Result<Product, StoreError> {
        self.inner.update_product(id, data).await
    }

    async fn delete_product(&self, id: Ulid) -> Result<(), StoreError> {
        self.inner.delete_product(id).await
    }
}

fn slow_setup(list_delay: Duration) -> (Arc<SlowStore>, Engine) {
    let clock = Arc::new(ManualClock::new(NOW));
    let store = Arc::new(SlowStore::new(clock.clone(), list_delay));
    let engine = Engine::new(store.clone(), store.clone(), clock);
    (store, engine)
}

fn no_two_overlap(all: &[Appointment]) -> bool {
    all.iter()
        .enumerate()
        .all(|(i, a)| all[i + 1..].iter().all(|b| !a.span.overlaps(&b.span)))
}

// ── Overlap detection ────────────────────────────────────

fn appt(start: Ms, end: Ms) -> Appointment {
    Appointment {
        id: Ulid::new(),
        client_name: "x".into(),
        span: Span::new(start, end),
        products: vec![],
        created_at: 0,
        updated_at: 0,
    }
}

#[test]
fn find_conflict_returns_overlapping_appointment() {
    let existing = vec![appt(0, 100), appt(200, 300)];
    let hit = find_conflict(&Span::new(250, 400), &existing, None).unwrap();
    assert_eq!(hit.id, existing[1].id);
    assert!(find_conflict(&Span::new(100, 200), &existing, None).is_none());
}

#[test]
fn find_conflict_excludes_self() {
    let existing = vec![appt(100, 200)];
    let span = Span::new(150, 250);
    assert!(has_conflict(&span, &existing, None));
    assert!(!has_conflict(&span, &existing, Some(existing[0].id)));
    // Excluding an unrelated id changes nothing.
    assert!(has_conflict(&span, &existing, Some(Ulid::new())));
}

#[test]
fn find_conflict_on_empty_set() {
    assert!(!has_conflict(&Span::new(0, 1), &[], None));
}

#[test]
fn validate_window_rules() {
    use super::conflict::validate_window;
    assert!(validate_window(NOW + 1, NOW + 2, NOW).is_ok());
    assert!(matches!(validate_window(NOW, NOW + H, NOW), Err(EngineError::InvalidWindow(_))));
    assert!(matches!(validate_window(NOW - H, NOW + H, NOW), Err(EngineError::InvalidWindow(_))));
    assert!(matches!(validate_window(NOW + H, NOW + H, NOW), Err(EngineError::InvalidWindow(_))));
    assert!(matches!(validate_window(NOW + 2 * H, NOW + H, NOW), Err(EngineError::InvalidWindow(_))));
    assert!(matches!(
        validate_window(NOW + H, NOW + H + 8 * 24 * H, NOW),
        Err(EngineError::LimitExceeded(_))
    ));
}

// ── Create ───────────────────────────────────────────────

#[tokio::test]
async fn create_returns_persisted_appointment() {
    let (_, _, engine) = setup();
    let cut = add_product(&engine, "Haircut", 15_000).await;

    let a = engine
        .create_appointment(candidate("Juan Perez", NOW + H, NOW + 2 * H, vec![cut.id]))
        .await
        .unwrap();
    assert_eq!(a.client_name, "Juan Perez");
    assert_eq!(a.span, Span::new(NOW + H, NOW + 2 * H));
    assert_eq!(a.products, vec![cut]);
    assert_eq!(a.created_at, NOW);
    assert_eq!(a.updated_at, NOW);
    assert_eq!(engine.get_appointment(a.id).await.unwrap(), a);
}

#[tokio::test]
async fn back_to_back_appointments_do_not_conflict() {
    let (_, _, engine) = setup();
    engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![])).await.unwrap();
    engine.create_appointment(candidate("B", NOW + 2 * H, NOW + 3 * H, vec![])).await.unwrap();
    // and the slot before
    engine.create_appointment(candidate("C", NOW + 30 * M, NOW + H, vec![])).await.unwrap();
    assert_eq!(engine.list_appointments().await.unwrap().len(), 3);
}

#[tokio::test]
async fn overlapping_create_rejected() {
    let (_, store, engine) = setup();
    let first = engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![])).await.unwrap();

    for (start, end) in [
        (NOW + H, NOW + 2 * H),                // identical
        (NOW + H + 30 * M, NOW + 3 * H),       // tail
        (NOW + 30 * M, NOW + H + 1),           // head, by one ms
        (NOW + H + 10 * M, NOW + H + 20 * M),  // inside
        (NOW + 10 * M, NOW + 5 * H),           // around
    ] {
        let result = engine.create_appointment(candidate("B", start, end, vec![])).await;
        assert!(
            matches!(result, Err(EngineError::SchedulingConflict(id)) if id == first.id),
            "[{start}, {end}) should conflict"
        );
    }
    assert_eq!(store.appointment_count(), 1);
}

#[tokio::test]
async fn create_rejects_invalid_windows() {
    let (_, store, engine) = setup();
    for (start, end) in [
        (NOW, NOW + H),             // start == now
        (NOW - H, NOW + H),         // past
        (NOW + H, NOW + H),         // empty
        (NOW + 2 * H, NOW + H),     // reversed
    ] {
        let result = engine.create_appointment(candidate("A", start, end, vec![])).await;
        assert!(matches!(result, Err(EngineError::InvalidWindow(_))), "[{start}, {end})");
    }
    assert_eq!(store.appointment_count(), 0);
}

#[tokio::test]
async fn now_is_read_from_engine_clock() {
    let (clock, _, engine) = setup();
    clock.set(NOW + 2 * H);
    let result = engine.create_appointment(candidate("A", NOW + H, NOW + 3 * H, vec![])).await;
    assert!(matches!(result, Err(EngineError::InvalidWindow(_))));
    clock.set(NOW + H - 1);
    engine.create_appointment(candidate("A", NOW + H, NOW + 3 * H, vec![])).await.unwrap();
}

#[tokio::test]
async fn create_rejects_blank_client_and_oversized_inputs() {
    let (_, store, engine) = setup();
    let result = engine.create_appointment(candidate("  ", NOW + H, NOW + 2 * H, vec![])).await;
    assert!(matches!(result, Err(EngineError::InvalidInput(_))));

    let long = "x".repeat(crate::limits::MAX_CLIENT_NAME_LEN + 1);
    let result = engine.create_appointment(candidate(&long, NOW + H, NOW + 2 * H, vec![])).await;
    assert!(matches!(result, Err(EngineError::LimitExceeded(_))));

    let ids = vec![Ulid::new(); crate::limits::MAX_PRODUCTS_PER_APPOINTMENT + 1];
    let result = engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, ids)).await;
    assert!(matches!(result, Err(EngineError::LimitExceeded(_))));
    assert_eq!(store.appointment_count(), 0);
}

#[tokio::test]
async fn window_error_precedes_input_errors() {
    let (_, _, engine) = setup();
    let result = engine.create_appointment(candidate("", NOW - H, NOW, vec![])).await;
    assert!(matches!(result, Err(EngineError::InvalidWindow(_))));
}

#[tokio::test]
async fn unknown_product_fails_without_partial_write() {
    let (_, store, engine) = setup();
    let cut = add_product(&engine, "Haircut", 15_000).await;
    let missing = Ulid::new();

    let result = engine
        .create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![cut.id, missing]))
        .await;
    assert!(matches!(result, Err(EngineError::ProductNotFound(id)) if id == missing));
    assert_eq!(store.appointment_count(), 0);
}

#[tokio::test]
async fn conflict_reported_before_unknown_product() {
    let (_, _, engine) = setup();
    let first = engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![])).await.unwrap();
    let result = engine
        .create_appointment(candidate("B", NOW + H, NOW + 2 * H, vec![Ulid::new()]))
        .await;
    assert!(matches!(result, Err(EngineError::SchedulingConflict(id)) if id == first.id));
}

#[tokio::test]
async fn products_resolve_in_order_with_duplicates() {
    let (_, _, engine) = setup();
    let cut = add_product(&engine, "Haircut", 15_000).await;
    let wash = add_product(&engine, "Hair wash", 8_000).await;

    let a = engine
        .create_appointment(candidate("Ana", NOW + H, NOW + 2 * H, vec![wash.id, cut.id, wash.id]))
        .await
        .unwrap();
    assert_eq!(a.products, vec![wash.clone(), cut, wash]);
    assert_eq!(engine.total_price(a.id).await.unwrap(), 31_000);
}

#[tokio::test]
async fn storage_failure_surfaces_as_storage_error() {
    let (store, engine) = slow_setup(Duration::ZERO);
    store.fail_appointment_writes.store(true, Ordering::SeqCst);
    let result = engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![])).await;
    assert!(matches!(result, Err(EngineError::Storage(StoreError::Wal(_)))));
    assert_eq!(store.inner.appointment_count(), 0);
}

// ── Update ───────────────────────────────────────────────

#[tokio::test]
async fn update_with_own_window_does_not_self_conflict() {
    let (clock, _, engine) = setup();
    let a = engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![])).await.unwrap();
    clock.advance(M);

    let updated = engine
        .update_appointment(a.id, candidate("A. Lopez", NOW + H, NOW + 2 * H, vec![]))
        .await
        .unwrap();
    assert_eq!(updated.id, a.id);
    assert_eq!(updated.client_name, "A. Lopez");
    assert_eq!(updated.created_at, a.created_at);
    assert_eq!(updated.updated_at, NOW + M);
}

#[tokio::test]
async fn update_can_shift_within_own_window() {
    let (_, _, engine) = setup();
    let a = engine.create_appointment(candidate("A", NOW + H, NOW + 3 * H, vec![])).await.unwrap();
    let moved = engine
        .update_appointment(a.id, candidate("A", NOW + 2 * H, NOW + 4 * H, vec![]))
        .await
        .unwrap();
    assert_eq!(moved.span, Span::new(NOW + 2 * H, NOW + 4 * H));
    assert_eq!(engine.list_appointments().await.unwrap(), vec![moved]);
}

#[tokio::test]
async fn update_into_another_appointment_rejected() {
    let (_, _, engine) = setup();
    let a = engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![])).await.unwrap();
    let b = engine.create_appointment(candidate("B", NOW + 3 * H, NOW + 4 * H, vec![])).await.unwrap();

    let result = engine
        .update_appointment(a.id, candidate("A", NOW + 90 * M, NOW + 3 * H + 1, vec![]))
        .await;
    assert!(matches!(result, Err(EngineError::SchedulingConflict(id)) if id == b.id));
    assert_eq!(engine.get_appointment(a.id).await.unwrap(), a);
}

#[tokio::test]
async fn update_missing_is_not_found() {
    let (_, _, engine) = setup();
    let id = Ulid::new();
    let result = engine.update_appointment(id, candidate("A", NOW + H, NOW + 2 * H, vec![])).await;
    assert!(matches!(result, Err(EngineError::NotFound(x)) if x == id));
}

#[tokio::test]
async fn update_not_found_precedes_window_check() {
    let (_, _, engine) = setup();
    let result = engine.update_appointment(Ulid::new(), candidate("A", NOW - H, NOW, vec![])).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn update_validates_window() {
    let (clock, _, engine) = setup();
    let a = engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![])).await.unwrap();
    clock.set(NOW + H + 30 * M);
    // The appointment already started; its own window is now in the past.
    let result = engine.update_appointment(a.id, candidate("A", NOW + H, NOW + 2 * H, vec![])).await;
    assert!(matches!(result, Err(EngineError::InvalidWindow(_))));
}

#[tokio::test]
async fn update_re_resolves_products() {
    let (_, _, engine) = setup();
    let cut = add_product(&engine, "Haircut", 15_000).await;
    let wash = add_product(&engine, "Hair wash", 8_000).await;
    let a = engine
        .create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![cut.id]))
        .await
        .unwrap();

    let missing = Ulid::new();
    let result = engine
        .update_appointment(a.id, candidate("A", NOW + H, NOW + 2 * H, vec![wash.id, missing]))
        .await;
    assert!(matches!(result, Err(EngineError::ProductNotFound(id)) if id == missing));
    assert_eq!(engine.get_appointment(a.id).await.unwrap().products, vec![cut]);

    let updated = engine
        .update_appointment(a.id, candidate("A", NOW + H, NOW + 2 * H, vec![wash.id, wash.id]))
        .await
        .unwrap();
    assert_eq!(updated.products, vec![wash.clone(), wash]);
    assert_eq!(engine.total_price(a.id).await.unwrap(), 16_000);
}

#[tokio::test]
async fn reads_reflect_current_product_prices() {
    let (_, _, engine) = setup();
    let cut = add_product(&engine, "Haircut", 15_000).await;
    let a = engine
        .create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![cut.id, cut.id]))
        .await
        .unwrap();
    assert_eq!(engine.total_price(a.id).await.unwrap(), 30_000);

    let repriced = engine
        .update_product(cut.id, NewProduct { name: "Haircut".into(), price: 17_000, description: Some("scissors".into()) })
        .await
        .unwrap();

    assert_eq!(engine.total_price(a.id).await.unwrap(), 34_000);
    let shown = engine.get_appointment(a.id).await.unwrap();
    assert_eq!(shown.products, vec![repriced.clone(), repriced.clone()]);
    assert_eq!(engine.list_appointments().await.unwrap()[0].products, vec![repriced.clone(), repriced]);
}

// ── Cancel & price ───────────────────────────────────────

#[tokio::test]
async fn cancel_missing_leaves_store_unchanged() {
    let (_, store, engine) = setup();
    engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![])).await.unwrap();
    let result = engine.cancel_appointment(Ulid::new()).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
    assert_eq!(store.appointment_count(), 1);
}

#[tokio::test]
async fn cancel_frees_the_slot() {
    let (_, _, engine) = setup();
    let a = engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![])).await.unwrap();
    engine.cancel_appointment(a.id).await.unwrap();
    assert!(matches!(engine.get_appointment(a.id).await, Err(EngineError::NotFound(_))));
    assert!(matches!(engine.cancel_appointment(a.id).await, Err(EngineError::NotFound(_))));
    engine.create_appointment(candidate("B", NOW + H, NOW + 2 * H, vec![])).await.unwrap();
}

#[tokio::test]
async fn total_price_sums_products() {
    let (_, _, engine) = setup();
    let cut = add_product(&engine, "Haircut", 15_000).await;
    let styling = add_product(&engine, "Special styling", 10_000).await;

    let priced = engine
        .create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![cut.id, styling.id]))
        .await
        .unwrap();
    let empty = engine.create_appointment(candidate("B", NOW + 2 * H, NOW + 3 * H, vec![])).await.unwrap();

    assert_eq!(engine.total_price(priced.id).await.unwrap(), 25_000);
    assert_eq!(engine.total_price(empty.id).await.unwrap(), 0);
    assert!(matches!(engine.total_price(Ulid::new()).await, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn deleted_product_drops_from_existing_appointments() {
    let (_, _, engine) = setup();
    let shave = add_product(&engine, "Classic shave", 18_000).await;
    let wash = add_product(&engine, "Hair wash", 8_000).await;
    let a = engine
        .create_appointment(candidate("Carlos", NOW + H, NOW + 2 * H, vec![shave.id, wash.id]))
        .await
        .unwrap();
    engine.delete_product(shave.id).await.unwrap();

    assert_eq!(engine.total_price(a.id).await.unwrap(), 8_000);
    assert_eq!(engine.get_appointment(a.id).await.unwrap().products, vec![wash.clone()]);
    assert_eq!(engine.list_appointments().await.unwrap()[0].products, vec![wash]);

    let result = engine
        .create_appointment(candidate("Luis", NOW + 3 * H, NOW + 4 * H, vec![shave.id]))
        .await;
    assert!(matches!(result, Err(EngineError::ProductNotFound(_))));
}

// ── Concurrency ──────────────────────────────────────────

/// The bug class the booking lock exists for: two unsynchronized
/// check-then-write sequences both see an empty calendar and both commit.
#[tokio::test]
async fn unsynchronized_check_then_write_double_books() {
    let clock = Arc::new(ManualClock::new(NOW));
    let store = SlowStore::new(clock, Duration::from_millis(20));
    let span = Span::new(NOW + H, NOW + 2 * H);

    let naive = |client: &'static str| {
        let store = &store;
        async move {
            let existing = store.list_appointments().await.unwrap();
            if has_conflict(&span, &existing, None) {
                return false;
            }
            store
                .create_appointment(AppointmentData { client_name: client.into(), span, products: vec![] })
                .await
                .unwrap();
            true
        }
    };
    let (a, b) = tokio::join!(naive("A"), naive("B"));
    assert!(a && b);
    let all = store.list_appointments().await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(!no_two_overlap(&all));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_creates_exactly_one_wins() {
    let (store, engine) = slow_setup(Duration::from_millis(10));
    let engine = Arc::new(engine);

    let (a, b) = tokio::join!(
        engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![])),
        engine.create_appointment(candidate("B", NOW + 90 * M, NOW + 3 * H, vec![])),
    );
    let wins = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(wins, 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(EngineError::SchedulingConflict(_))));
    assert_eq!(store.inner.appointment_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_racing_bookings_never_overlap() {
    let (store, engine) = slow_setup(Duration::from_millis(1));
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for i in 0..24 {
        let engine = engine.clone();
        // Windows of 90 min every 30 min: each overlaps its neighbours.
        let start = NOW + H + i * 30 * M;
        handles.push(tokio::spawn(async move {
            engine
                .create_appointment(candidate(&format!("c{i}"), start, start + 90 * M, vec![]))
                .await
        }));
    }
    let mut committed = 0;
    for h in handles {
        if h.await.unwrap().is_ok() {
            committed += 1;
        }
    }
    let all = store.inner.list_appointments().await.unwrap();
    assert_eq!(all.len(), committed);
    // Each winner blocks at most five start slots, so any arrival order fits five.
    assert!(committed >= 5, "got {committed}");
    assert!(no_two_overlap(&all));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_update_and_create_cannot_collide() {
    let (store, engine) = slow_setup(Duration::from_millis(10));
    let engine = Arc::new(engine);
    let a = engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![])).await.unwrap();

    // A moves to 3h-4h while B tries to book 3h-4h.
    let (moved, fresh) = tokio::join!(
        engine.update_appointment(a.id, candidate("A", NOW + 3 * H, NOW + 4 * H, vec![])),
        engine.create_appointment(candidate("B", NOW + 3 * H, NOW + 4 * H, vec![])),
    );
    assert_ne!(moved.is_ok(), fresh.is_ok());
    assert!(no_two_overlap(&store.inner.list_appointments().await.unwrap()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_caller_still_commits_under_lock() {
    let (store, engine) = slow_setup(Duration::from_millis(50));
    let engine = Arc::new(engine);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(5),
        engine.create_appointment(candidate("A", NOW + H, NOW + 2 * H, vec![])),
    )
    .await;
    assert!(abandoned.is_err(), "caller should have timed out");

    // The booking lock is still held by A's commit; B then sees it.
    let result = engine.create_appointment(candidate("B", NOW + H, NOW + 2 * H, vec![])).await;
    assert!(matches!(result, Err(EngineError::SchedulingConflict(_))));
    assert_eq!(store.inner.appointment_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_same_name_products_exactly_one_wins() {
    let (_, _, engine) = setup();
    let engine = Arc::new(engine);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.create_product(draft("Haircut", 15_000)).await }));
    }
    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert!(matches!(e, EngineError::DuplicateName(_))),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(engine.list_products().await.unwrap().len(), 1);
}

// ── Product catalog ──────────────────────────────────────

#[tokio::test]
async fn product_create_validates_input() {
    let (_, store, engine) = setup();
    for (name, price) in [("", 100), ("   ", 100), ("Haircut", 0), ("Haircut", -5)] {
        let result = engine.create_product(draft(name, price)).await;
        assert!(matches!(result, Err(EngineError::InvalidInput(_))), "{name:?} {price}");
    }
    let result = engine.create_product(draft("Haircut", crate::limits::MAX_PRICE + 1)).await;
    assert!(matches!(result, Err(EngineError::LimitExceeded(_))));
    let wordy = NewProduct {
        name: "Haircut".into(),
        price: 15_000,
        description: Some("x".repeat(crate::limits::MAX_DESCRIPTION_LEN + 1)),
    };
    assert!(matches!(engine.create_product(wordy).await, Err(EngineError::LimitExceeded(_))));
    assert_eq!(store.product_count(), 0);
}

#[tokio::test]
async fn product_create_rejects_duplicate_name() {
    let (_, store, engine) = setup();
    add_product(&engine, "Haircut", 15_000).await;
    let result = engine.create_product(draft("Haircut", 9_000)).await;
    assert!(matches!(result, Err(EngineError::DuplicateName(ref n)) if n == "Haircut"));
    // Case matters.
    add_product(&engine, "haircut", 9_000).await;
    assert_eq!(store.product_count(), 2);
}

#[tokio::test]
async fn product_update_excludes_itself_from_duplicate_check() {
    let (_, _, engine) = setup();
    let cut = add_product(&engine, "Haircut", 15_000).await;
    let beard = add_product(&engine, "Haircut + Beard", 25_000).await;

    let same_name = engine
        .update_product(cut.id, NewProduct { name: "Haircut".into(), price: 16_000, description: Some("now with wash".into()) })
        .await
        .unwrap();
    assert_eq!(same_name.id, cut.id);
    assert_eq!(same_name.price, 16_000);
    assert_eq!(same_name.created_at, cut.created_at);

    let result = engine.update_product(beard.id, draft("Haircut", 25_000)).await;
    assert!(matches!(result, Err(EngineError::DuplicateName(_))));
    assert_eq!(engine.get_product(beard.id).await.unwrap(), beard);
}

#[tokio::test]
async fn product_update_validates_and_checks_existence() {
    let (_, _, engine) = setup();
    let cut = add_product(&engine, "Haircut", 15_000).await;
    assert!(matches!(engine.update_product(cut.id, draft("", 1)).await, Err(EngineError::InvalidInput(_))));
    assert!(matches!(engine.update_product(cut.id, draft("Haircut", 0)).await, Err(EngineError::InvalidInput(_))));
    assert!(matches!(
        engine.update_product(Ulid::new(), draft("Haircut", 1)).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn product_update_propagates_scan_failure() {
    let (store, engine) = slow_setup(Duration::ZERO);
    let cut = engine.create_product(draft("Haircut", 15_000)).await.unwrap();
    store.fail_product_list.store(true, Ordering::SeqCst);

    let result = engine.update_product(cut.id, draft("Haircut", 20_000)).await;
    assert!(matches!(result, Err(EngineError::Storage(_))));
    assert_eq!(store.inner.get_product(cut.id).await.unwrap().price, 15_000);
}

#[tokio::test]
async fn product_delete_checks_existence() {
    let (_, store, engine) = setup();
    let cut = add_product(&engine, "Haircut", 15_000).await;
    assert!(matches!(engine.delete_product(Ulid::new()).await, Err(EngineError::NotFound(_))));
    assert_eq!(store.product_count(), 1);
    engine.delete_product(cut.id).await.unwrap();
    assert!(matches!(engine.get_product(cut.id).await, Err(EngineError::NotFound(_))));
    assert!(engine.list_products().await.unwrap().is_empty());
}

#[tokio::test]
async fn engine_over_durable_store_survives_restart() {
    let dir = std::env::temp_dir().join("slotbook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{}.wal", Ulid::new()));
    let clock = Arc::new(ManualClock::new(NOW));

    let booked = {
        let store = Arc::new(crate::store::DurableStore::open(&path, clock.clone()).unwrap());
        let engine = Engine::new(store.clone(), store, clock.clone());
        let cut = add_product(&engine, "Haircut", 15_000).await;
        engine
            .create_appointment(candidate("Juan", NOW + H, NOW + 2 * H, vec![cut.id]))
            .await
            .unwrap()
    };

    let store = Arc::new(crate::store::DurableStore::open(&path, clock.clone()).unwrap());
    let engine = Engine::new(store.clone(), store, clock);
    assert_eq!(engine.get_appointment(booked.id).await.unwrap(), booked);
    let result = engine.create_appointment(candidate("Maria", NOW + H, NOW + 2 * H, vec![])).await;
    assert!(matches!(result, Err(EngineError::SchedulingConflict(_))));
    let _ = std::fs::remove_file(&path);
}
