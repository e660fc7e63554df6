use crate::protocol::EngineResponse;
use std::time::Duration;

/// Gap left between the car and the right edge of the track at the finish.
pub const FINISH_MARGIN: f64 = 2.0;

/// Travel time reported by the engine: distance / velocity, in milliseconds.
/// `None` when the velocity cannot produce a finite, positive run.
pub fn travel_time(engine: &EngineResponse) -> Option<Duration> {
    if engine.velocity <= 0.0 || engine.distance < 0.0 {
        return None;
    }
    let millis = engine.distance / engine.velocity;
    Duration::try_from_secs_f64(millis / 1000.0).ok()
}

/// Offset the car travels to reach the finish line, clamped at zero.
pub fn finish_offset(track_width: f64, car_width: f64) -> f64 {
    (track_width - car_width - FINISH_MARGIN).max(0.0)
}

/// Linear position along `target` after `elapsed` of a `duration`-long run.
pub fn linear_offset(target: f64, elapsed: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return target;
    }
    let progress = (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0);
    target * progress
}

/// Race times are always shown with two decimals.
pub fn format_time(seconds: f64) -> String {
    format!("{:.2}", seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_travel_time() {
        // 500000 / 100 = 5000 ms
        let engine = EngineResponse { velocity: 100.0, distance: 500_000.0 };
        assert_eq!(travel_time(&engine), Some(Duration::from_secs(5)));

        // Edge case: stalled engine
        let stalled = EngineResponse { velocity: 0.0, distance: 500_000.0 };
        assert_eq!(travel_time(&stalled), None);
    }

    #[test]
    fn test_travel_time_out_of_range() {
        let crawling = EngineResponse { velocity: 1e-20, distance: 500_000.0 };
        assert_eq!(travel_time(&crawling), None);

        let nan = EngineResponse { velocity: f64::NAN, distance: 500_000.0 };
        assert_eq!(travel_time(&nan), None);
    }

    #[test]
    fn test_finish_offset() {
        assert_eq!(finish_offset(60.0, 3.0), 55.0);
        assert_eq!(finish_offset(2.0, 3.0), 0.0);
    }

    #[test]
    fn test_linear_offset() {
        let d = Duration::from_secs(4);
        assert_eq!(linear_offset(40.0, Duration::from_secs(1), d), 10.0);
        assert_eq!(linear_offset(40.0, Duration::from_secs(9), d), 40.0);
        assert_eq!(linear_offset(40.0, Duration::ZERO, Duration::ZERO), 40.0);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(4.0), "4.00");
        assert_eq!(format_time(3.14159), "3.14");
    }
}
