use crate::api::EngineControl;
use crate::race::CancelToken;
use shared::protocol::CarId;
use shared::timing::{finish_offset, travel_time};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What the race needs from a car's on-screen representation.
///
/// Implementations own the actual motion: once `begin_transition` is called
/// the car keeps moving towards `target` on its own clock until it is held
/// or sent back, so nothing here can stop a transition that is underway.
pub trait CarVisual {
    /// `true` disables the car's start control and enables its reset control.
    fn set_running(&self, running: bool);
    fn track_width(&self) -> f64;
    fn car_width(&self) -> f64;
    /// Linear motion from the origin to `target` over `duration`.
    fn begin_transition(&self, target: f64, duration: Duration);
    /// Current offset from the origin as laid out right now.
    fn offset(&self) -> f64;
    /// Stop any motion and stay at `offset`.
    fn hold_at(&self, offset: f64);
    fn return_to_start(&self);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimationOutcome {
    /// Crossed the line; `time` in seconds.
    Finished { time: f64 },
    Failed,
    /// The race was reset before the engine answered.
    Cancelled,
}

impl AnimationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AnimationOutcome::Finished { .. })
    }

    pub fn time(&self) -> Option<f64> {
        match self {
            AnimationOutcome::Finished { time } => Some(*time),
            _ => None,
        }
    }
}

/// Runs one car from engine start to the finish line.
///
/// Every failure is folded into the outcome so one car never takes the rest
/// of the race down with it. The token is consulted once, right after the
/// engine answers: a reset that lands later does not stop a car that is
/// already moving.
pub async fn animate<E, V>(engine: &E, id: CarId, visual: &V, token: &CancelToken) -> AnimationOutcome
where
    E: EngineControl + ?Sized,
    V: CarVisual + ?Sized,
{
    visual.set_running(true);

    let response = match engine.start_engine(id).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Car {} could not start: {}", id, e);
            return AnimationOutcome::Failed;
        }
    };

    if token.is_cancelled() {
        debug!("Car {} reset before its engine started", id);
        visual.return_to_start();
        return AnimationOutcome::Cancelled;
    }

    let Some(duration) = travel_time(&response) else {
        warn!(
            "Car {} reported an unusable velocity {} for distance {}",
            id, response.velocity, response.distance
        );
        return AnimationOutcome::Failed;
    };

    let target = finish_offset(visual.track_width(), visual.car_width());
    visual.begin_transition(target, duration);

    let started = Instant::now();
    match engine.drive(id).await {
        Ok(()) => {
            let time = started.elapsed().as_secs_f64();
            info!("Car {} finished in {:.2}s", id, time);
            AnimationOutcome::Finished { time }
        }
        Err(e) if token.is_cancelled() => {
            warn!("Car {} failed after a reset: {}", id, e);
            AnimationOutcome::Failed
        }
        Err(e) => {
            let offset = visual.offset();
            visual.hold_at(offset);
            warn!("Car {} stopped at {:.1}: {}", id, offset, e);
            AnimationOutcome::Failed
        }
    }
}
