//! Race orchestration over every registered car.
//!
//! Everything here runs on one task. Car runs are joined, never spawned, so
//! they interleave only at their `.await` points. Winner capture is a plain
//! check-and-set with no await in between, which is what makes "first
//! finisher wins" hold when several cars complete in the same tick.

use crate::animation::{animate, AnimationOutcome, CarVisual};
use crate::api::{EngineControl, WinnerStore};
use crate::winners::{reconcile, RaceResult, WinnerNotice};
use futures::future::join_all;
use rust_fsm::StateMachineImpl;
use shared::fsm::{RaceEvent, RaceState};
use shared::protocol::CarId;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, error, info, warn};

/// Advisory cancellation flag shared by everything started under one race.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

struct SessionInner {
    token: CancelToken,
    winner: RefCell<Option<RaceResult>>,
    recorded: Cell<bool>,
}

/// One start-to-reset cycle. Cloning hands out another handle to the same session.
#[derive(Clone)]
pub struct RaceSession {
    inner: Rc<SessionInner>,
}

impl RaceSession {
    fn begin() -> Self {
        Self {
            inner: Rc::new(SessionInner {
                token: CancelToken::new(),
                winner: RefCell::new(None),
                recorded: Cell::new(false),
            }),
        }
    }

    pub fn token(&self) -> &CancelToken {
        &self.inner.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn winner(&self) -> Option<RaceResult> {
        self.inner.winner.borrow().clone()
    }

    /// Claims the win for `result` unless another car already has it.
    pub fn try_capture(&self, result: RaceResult) -> bool {
        let mut slot = self.inner.winner.borrow_mut();
        if slot.is_some() {
            return false;
        }
        *slot = Some(result);
        true
    }

    fn cancel(&self) {
        self.inner.token.cancel();
    }

    fn same_as(&self, other: &RaceSession) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RaceSummary {
    /// First finisher, whether or not it made it into the winners table.
    pub winner: Option<RaceResult>,
    pub recorded: bool,
    pub finished: usize,
    pub failed: usize,
    pub cancelled: bool,
}

struct Registration<V> {
    name: String,
    visual: Rc<V>,
}

impl<V> Clone for Registration<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            visual: Rc::clone(&self.visual),
        }
    }
}

type WinnerCallback = Box<dyn Fn(&WinnerNotice)>;

pub struct RaceOrchestrator<B, V> {
    backend: B,
    registry: RefCell<Vec<(CarId, Registration<V>)>>,
    state: Cell<RaceState>,
    session: RefCell<Option<RaceSession>>,
    solo: RefCell<HashMap<CarId, CancelToken>>,
    on_winner: Option<WinnerCallback>,
}

impl<B, V> RaceOrchestrator<B, V>
where
    B: EngineControl + WinnerStore,
    V: CarVisual,
{
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            registry: RefCell::new(Vec::new()),
            state: Cell::new(RaceState::default()),
            session: RefCell::new(None),
            solo: RefCell::new(HashMap::new()),
            on_winner: None,
        }
    }

    /// Called with every winner that was written back successfully.
    pub fn with_winner_callback(mut self, callback: impl Fn(&WinnerNotice) + 'static) -> Self {
        self.on_winner = Some(Box::new(callback));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> RaceState {
        self.state.get()
    }

    pub fn is_racing(&self) -> bool {
        self.state.get() == RaceState::Racing
    }

    /// Adds a car, or replaces the handles of one already registered.
    pub fn register(&self, id: CarId, name: impl Into<String>, visual: Rc<V>) {
        let registration = Registration {
            name: name.into(),
            visual,
        };
        let mut registry = self.registry.borrow_mut();
        match registry.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, slot)) => *slot = registration,
            None => registry.push((id, registration)),
        }
    }

    pub fn unregister(&self, id: CarId) {
        self.registry.borrow_mut().retain(|(existing, _)| *existing != id);
    }

    pub fn clear(&self) {
        self.registry.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.borrow().is_empty()
    }

    /// Registered cars in registration order.
    pub fn entries(&self) -> Vec<(CarId, String, Rc<V>)> {
        self.registry
            .borrow()
            .iter()
            .map(|(id, reg)| (*id, reg.name.clone(), Rc::clone(&reg.visual)))
            .collect()
    }

    fn snapshot(&self) -> Vec<(CarId, Registration<V>)> {
        self.registry.borrow().clone()
    }

    fn registration(&self, id: CarId) -> Option<Registration<V>> {
        self.registry
            .borrow()
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, reg)| reg.clone())
    }

    fn is_current(&self, session: &RaceSession) -> bool {
        self.session
            .borrow()
            .as_ref()
            .is_some_and(|current| current.same_as(session))
    }

    /// Runs every registered car at once and waits for all of them to settle.
    ///
    /// Returns `None` without doing anything when a race is already running.
    pub async fn start(&self) -> Option<RaceSummary> {
        let Some(next) = RaceState::transition(&self.state.get(), &RaceEvent::Start) else {
            debug!("Race already running, ignoring start");
            return None;
        };
        self.state.set(next);

        let session = RaceSession::begin();
        *self.session.borrow_mut() = Some(session.clone());

        let entries = self.snapshot();
        info!("Starting race with {} cars", entries.len());

        let runs = entries.into_iter().map(|(id, reg)| {
            let session = session.clone();
            async move {
                let outcome = animate(&self.backend, id, &*reg.visual, session.token()).await;
                if let AnimationOutcome::Finished { time } = outcome {
                    let result = RaceResult {
                        car_id: id,
                        name: reg.name.clone(),
                        time,
                    };
                    if session.try_capture(result.clone()) {
                        self.settle_winner(&session, &result).await;
                    } else {
                        debug!("Car {} finished after the winner was decided", id);
                    }
                }
                outcome
            }
        });
        let outcomes = join_all(runs).await;

        if self.is_current(&session) {
            if let Some(next) = RaceState::transition(&self.state.get(), &RaceEvent::AllSettled) {
                self.state.set(next);
            }
        }

        let finished = outcomes.iter().filter(|o| o.is_success()).count();
        let summary = RaceSummary {
            winner: session.winner(),
            recorded: session.inner.recorded.get(),
            finished,
            failed: outcomes.len() - finished,
            cancelled: session.is_cancelled(),
        };
        info!(
            "Race settled: {} finished, {} did not, winner {:?}",
            summary.finished,
            summary.failed,
            summary.winner.as_ref().map(|w| w.car_id)
        );
        Some(summary)
    }

    async fn settle_winner(&self, session: &RaceSession, result: &RaceResult) {
        if session.is_cancelled() {
            info!("Race was reset before car {} could be recorded", result.car_id);
            return;
        }
        match reconcile(&self.backend, result).await {
            Ok(record) => {
                session.inner.recorded.set(true);
                let notice = WinnerNotice {
                    name: result.name.clone(),
                    time: result.time,
                    record,
                };
                info!("Winner: {}", notice);
                if let Some(callback) = &self.on_winner {
                    callback(&notice);
                }
            }
            Err(e) => error!("Failed to record winner {}: {}", result.car_id, e),
        }
    }

    /// Cancels the current race and sends every registered car back to the start.
    ///
    /// Cars already in motion only notice the reset at their next checkpoint.
    /// Engine-stop failures are logged and otherwise ignored.
    pub async fn reset(&self) {
        let previous = self.session.borrow_mut().take();
        if let Some(session) = previous {
            session.cancel();
        }
        let solo: Vec<CancelToken> = self.solo.borrow_mut().drain().map(|(_, t)| t).collect();
        for token in solo {
            token.cancel();
        }
        if let Some(next) = RaceState::transition(&self.state.get(), &RaceEvent::Reset) {
            self.state.set(next);
        }

        let entries = self.snapshot();
        debug!("Resetting {} cars", entries.len());
        join_all(
            entries
                .into_iter()
                .map(|(id, reg)| async move { self.return_car(id, &*reg.visual).await }),
        )
        .await;
    }

    /// Drives a single car outside of a race. No winner is recorded.
    pub async fn start_car(&self, id: CarId) -> Option<AnimationOutcome> {
        let reg = self.registration(id)?;
        let token = CancelToken::new();
        let previous = self.solo.borrow_mut().insert(id, token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        Some(animate(&self.backend, id, &*reg.visual, &token).await)
    }

    /// Stops a single car's engine and sends it back to the start.
    pub async fn reset_car(&self, id: CarId) -> bool {
        let Some(reg) = self.registration(id) else {
            return false;
        };
        let token = self.solo.borrow_mut().remove(&id);
        if let Some(token) = token {
            token.cancel();
        }
        self.return_car(id, &*reg.visual).await;
        true
    }

    async fn return_car(&self, id: CarId, visual: &V) {
        if let Err(e) = self.backend.stop_engine(id).await {
            warn!("Failed to stop engine for car {}: {}", id, e);
        }
        visual.return_to_start();
        visual.set_running(false);
    }
}
