//! Terminal rendering of the track and the wheel.

use crate::animation::CarVisual;
use shared::names::hex_to_rgb;
use shared::protocol::{Car, CarId};
use shared::timing::linear_offset;
use shared::wheel::WheelOption;
use std::cell::Cell;
use std::fmt::Write;
use std::time::Duration;
use tokio::time::Instant;

const CAR_GLYPH: char = '>';
const FLAG: char = '|';

#[derive(Clone, Copy, Debug)]
struct Motion {
    started: Instant,
    target: f64,
    duration: Duration,
}

/// One lane of the track, measured in terminal columns.
#[derive(Debug)]
pub struct TrackVisual {
    car: Car,
    width: u16,
    motion: Cell<Option<Motion>>,
    resting: Cell<f64>,
    running: Cell<bool>,
}

impl TrackVisual {
    pub fn new(car: Car, width: u16) -> Self {
        Self {
            car,
            width: width.max(4),
            motion: Cell::new(None),
            resting: Cell::new(0.0),
            running: Cell::new(false),
        }
    }

    pub fn car(&self) -> &Car {
        &self.car
    }

    /// Start control is disabled and reset enabled while this is set.
    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn is_moving(&self) -> bool {
        match self.motion.get() {
            Some(motion) => motion.started.elapsed() < motion.duration,
            None => false,
        }
    }

    /// `[ 3] Tesla Model S   |      >            |`
    pub fn render(&self) -> String {
        let lane = self.width as usize;
        let column = (self.offset().round().max(0.0) as usize).min(lane - 1);

        let mut line = String::new();
        let _ = write!(line, "[{:>3}] {:<20.20} {}", self.car.id, self.car.name, FLAG);
        line.push_str(&" ".repeat(column));
        line.push_str(&paint(&self.car.color, CAR_GLYPH));
        line.push_str(&" ".repeat(lane - column - 1));
        line.push(FLAG);
        line.push_str(if self.running.get() { "  [reset]" } else { "  [start]" });
        line
    }
}

impl CarVisual for TrackVisual {
    fn set_running(&self, running: bool) {
        self.running.set(running);
    }

    fn track_width(&self) -> f64 {
        self.width as f64
    }

    fn car_width(&self) -> f64 {
        1.0
    }

    fn begin_transition(&self, target: f64, duration: Duration) {
        self.motion.set(Some(Motion {
            started: Instant::now(),
            target,
            duration,
        }));
    }

    fn offset(&self) -> f64 {
        match self.motion.get() {
            Some(m) => linear_offset(m.target, m.started.elapsed(), m.duration),
            None => self.resting.get(),
        }
    }

    fn hold_at(&self, offset: f64) {
        self.motion.set(None);
        self.resting.set(offset);
    }

    fn return_to_start(&self) {
        self.motion.set(None);
        self.resting.set(0.0);
    }
}

/// Colours `glyph` with the car's `#rrggbb` using a 24-bit escape.
pub fn paint(color: &str, glyph: char) -> String {
    match hex_to_rgb(color) {
        Some((r, g, b)) => format!("\x1b[38;2;{};{};{}m{}\x1b[0m", r, g, b, glyph),
        None => glyph.to_string(),
    }
}

/// Sector list, marking `highlighted` when given.
pub fn render_wheel(options: &[WheelOption], highlighted: Option<usize>) -> String {
    let mut out = String::new();
    for (i, option) in options.iter().enumerate() {
        let marker = if Some(i) == highlighted { "=>" } else { "  " };
        let _ = writeln!(out, "{} {} (weight {})", marker, option.text, option.weight);
    }
    out
}

/// One spin frame: the whole list redrawn in place with `current` marked.
pub fn wheel_frame(options: &[WheelOption], current: &WheelOption) -> String {
    let index = options.iter().position(|o| o.id == current.id);
    format!("\x1b[2J\x1b[H{}", render_wheel(options, index))
}
