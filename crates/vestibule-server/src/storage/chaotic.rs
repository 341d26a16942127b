//! Chaotic store wrapper for fault injection testing
//!
//! Delegates to an inner store but fails a deterministic fraction of calls
//! with `StoreError::Unavailable` before they reach it. A failed call never
//! touches the inner store, so failures are atomic.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use vestibule_core::{JoinRequest, Room};
use vestibule_proto::{RequestStatus, RoomId, UserId};

use super::{RoomStore, StoreError};

/// Store wrapper that injects `Unavailable` failures at a seeded rate.
#[derive(Clone)]
pub struct ChaoticStore<S: RoomStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<AtomicUsize>,
    injected_failures: Arc<AtomicUsize>,
}

/// Linear congruential generator, reproducible from its seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: RoomStore> ChaoticStore<S> {
    /// Wrap `inner` with the default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
            injected_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying store (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of store calls attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Number of calls failed by injection.
    pub fn injected_failures(&self) -> usize {
        self.injected_failures.load(Ordering::Relaxed)
    }

    /// Count the call and decide whether it fails.
    fn roll(&self) -> Result<(), StoreError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);

        let fail = self.rng.lock().unwrap_or_else(PoisonError::into_inner).next() < self.failure_rate;
        if fail {
            self.injected_failures.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::Unavailable("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: RoomStore> RoomStore for ChaoticStore<S> {
    async fn get_room(&self, room_id: &RoomId) -> Result<Option<Room>, StoreError> {
        self.roll()?;
        self.inner.get_room(room_id).await
    }

    async fn create_room(&self, room: &Room) -> Result<bool, StoreError> {
        self.roll()?;
        self.inner.create_room(room).await
    }

    async fn put_join_request(&self, request: &JoinRequest) -> Result<(), StoreError> {
        self.roll()?;
        self.inner.put_join_request(request).await
    }

    async fn get_join_request(
        &self,
        room_id: &RoomId,
        requester_id: &UserId,
    ) -> Result<Option<JoinRequest>, StoreError> {
        self.roll()?;
        self.inner.get_join_request(room_id, requester_id).await
    }

    async fn list_join_requests(&self, room_id: &RoomId) -> Result<Vec<JoinRequest>, StoreError> {
        self.roll()?;
        self.inner.list_join_requests(room_id).await
    }

    async fn update_join_request_status(
        &self,
        room_id: &RoomId,
        requester_id: &UserId,
        status: RequestStatus,
    ) -> Result<JoinRequest, StoreError> {
        self.roll()?;
        self.inner.update_join_request_status(room_id, requester_id, status).await
    }

    async fn add_participant(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, StoreError> {
        self.roll()?;
        self.inner.add_participant(room_id, user_id).await
    }
}
