use crate::api::{ApiError, WinnerStore};
use shared::protocol::{CarId, Winner};
use shared::timing::format_time;
use std::fmt;
use tracing::debug;

/// First successful finisher of a race.
#[derive(Clone, Debug, PartialEq)]
pub struct RaceResult {
    pub car_id: CarId,
    pub name: String,
    pub time: f64,
}

/// Shown once a race winner has been written back.
#[derive(Clone, Debug, PartialEq)]
pub struct WinnerNotice {
    pub name: String,
    pub time: f64,
    pub record: Winner,
}

impl fmt::Display for WinnerNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} finished in {}s!", self.name, format_time(self.time))
    }
}

/// Folds a race result into the stored winner record for that car.
///
/// An existing record gains a win and keeps the better of the two times,
/// even when the new time is slower. A missing record is created with one win.
pub async fn reconcile<S>(store: &S, result: &RaceResult) -> Result<Winner, ApiError>
where
    S: WinnerStore + ?Sized,
{
    match store.get_winner(result.car_id).await {
        Some(existing) => {
            let updated = existing.record_win(result.time);
            debug!(
                "Updating winner {}: wins {} -> {}, best {} -> {}",
                result.car_id, existing.wins, updated.wins, existing.time, updated.time
            );
            store.update_winner(&updated).await
        }
        None => {
            debug!("Creating winner record for car {}", result.car_id);
            store
                .create_winner(&Winner::first_win(result.car_id, result.time))
                .await
        }
    }
}
