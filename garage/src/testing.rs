//! In-memory stand-ins for the REST backend and a car visual.

use crate::animation::CarVisual;
use crate::api::{ApiError, EngineControl, WinnerStore};
use reqwest::StatusCode;
use shared::protocol::{CarId, EngineResponse, Winner};
use shared::timing::{linear_offset, travel_time};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub const DISTANCE: f64 = 500_000.0;

/// Engine and winner endpoints backed by maps. Drives take `distance / velocity`
/// of tokio time, so tests should run with a paused clock.
#[derive(Default)]
pub struct FakeBackend {
    engines: RefCell<HashMap<CarId, EngineResponse>>,
    broken: RefCell<HashSet<CarId>>,
    start_delay: Cell<Duration>,
    fail_stop: Cell<bool>,
    fail_writes: Cell<bool>,
    winners: RefCell<HashMap<CarId, Winner>>,
    calls: RefCell<Vec<(&'static str, CarId)>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_car(&self, id: CarId, velocity: f64) {
        self.engines.borrow_mut().insert(
            id,
            EngineResponse {
                velocity,
                distance: DISTANCE,
            },
        );
    }

    /// The drive request fails halfway through the run.
    pub fn break_engine(&self, id: CarId) {
        self.broken.borrow_mut().insert(id);
    }

    pub fn set_start_delay(&self, delay: Duration) {
        self.start_delay.set(delay);
    }

    pub fn fail_stops(&self) {
        self.fail_stop.set(true);
    }

    pub fn fail_winner_writes(&self) {
        self.fail_writes.set(true);
    }

    pub fn put_winner(&self, winner: Winner) {
        self.winners.borrow_mut().insert(winner.id, winner);
    }

    pub fn winner(&self, id: CarId) -> Option<Winner> {
        self.winners.borrow().get(&id).copied()
    }

    pub fn winner_count(&self) -> usize {
        self.winners.borrow().len()
    }

    pub fn calls_for(&self, op: &str) -> usize {
        self.calls.borrow().iter().filter(|(name, _)| *name == op).count()
    }

    fn record(&self, op: &'static str, id: CarId) {
        self.calls.borrow_mut().push((op, id));
    }
}

impl EngineControl for FakeBackend {
    async fn start_engine(&self, id: CarId) -> Result<EngineResponse, ApiError> {
        self.record("start", id);
        sleep(self.start_delay.get()).await;
        self.engines
            .borrow()
            .get(&id)
            .copied()
            .ok_or(ApiError::NotFound(id))
    }

    async fn stop_engine(&self, id: CarId) -> Result<EngineResponse, ApiError> {
        self.record("stop", id);
        if self.fail_stop.get() {
            return Err(ApiError::Status(StatusCode::INTERNAL_SERVER_ERROR));
        }
        Ok(EngineResponse {
            velocity: 0.0,
            distance: DISTANCE,
        })
    }

    async fn drive(&self, id: CarId) -> Result<(), ApiError> {
        self.record("drive", id);
        let engine = self.engines.borrow().get(&id).copied();
        let Some(duration) = engine.as_ref().and_then(travel_time) else {
            return Err(ApiError::NotFound(id));
        };
        if self.broken.borrow().contains(&id) {
            sleep(duration / 2).await;
            return Err(ApiError::DriveRefused {
                id,
                status: StatusCode::INTERNAL_SERVER_ERROR,
            });
        }
        sleep(duration).await;
        Ok(())
    }
}

impl WinnerStore for FakeBackend {
    async fn get_winner(&self, id: CarId) -> Option<Winner> {
        self.record("get_winner", id);
        self.winner(id)
    }

    async fn create_winner(&self, winner: &Winner) -> Result<Winner, ApiError> {
        self.record("create_winner", winner.id);
        if self.fail_writes.get() {
            return Err(ApiError::Status(StatusCode::INTERNAL_SERVER_ERROR));
        }
        self.put_winner(*winner);
        Ok(*winner)
    }

    async fn update_winner(&self, winner: &Winner) -> Result<Winner, ApiError> {
        self.record("update_winner", winner.id);
        if self.fail_writes.get() {
            return Err(ApiError::Status(StatusCode::INTERNAL_SERVER_ERROR));
        }
        self.put_winner(*winner);
        Ok(*winner)
    }
}

/// Records everything the driver asks of it. Track 100 wide, car 8 wide.
#[derive(Default)]
pub struct FakeVisual {
    pub running: Cell<bool>,
    pub target: Cell<Option<(f64, Duration)>>,
    pub held: Cell<Option<f64>>,
    pub returned: Cell<usize>,
    started: Cell<Option<Instant>>,
}

impl FakeVisual {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CarVisual for FakeVisual {
    fn set_running(&self, running: bool) {
        self.running.set(running);
    }

    fn track_width(&self) -> f64 {
        100.0
    }

    fn car_width(&self) -> f64 {
        8.0
    }

    fn begin_transition(&self, target: f64, duration: Duration) {
        self.target.set(Some((target, duration)));
        self.started.set(Some(Instant::now()));
        self.held.set(None);
    }

    fn offset(&self) -> f64 {
        if let Some(held) = self.held.get() {
            return held;
        }
        match (self.target.get(), self.started.get()) {
            (Some((target, duration)), Some(started)) => {
                linear_offset(target, started.elapsed(), duration)
            }
            _ => 0.0,
        }
    }

    fn hold_at(&self, offset: f64) {
        self.started.set(None);
        self.held.set(Some(offset));
    }

    fn return_to_start(&self) {
        self.target.set(None);
        self.started.set(None);
        self.held.set(None);
        self.returned.set(self.returned.get() + 1);
    }
}
