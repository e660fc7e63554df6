//! Decision wheel core: the weighted option list, sector geometry and spin timing.
//!
//! Angles are in degrees. Sectors are laid out clockwise starting under the
//! pointer, each sweeping `weight / total_weight * 360` degrees.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const MIN_DURATION_SECS: u64 = 5;
pub const MAX_DURATION_SECS: u64 = 30;
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Full turns made before the random landing angle.
pub const FULL_TURNS: f64 = 5.0;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WheelOption {
    pub id: u32,
    pub text: String,
    pub weight: f64,
}

impl WheelOption {
    /// Only options with some text and a positive weight take part in a spin.
    pub fn is_valid(&self) -> bool {
        !self.text.trim().is_empty() && self.weight > 0.0
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum WheelError {
    #[error("options file is not valid JSON: {0}")]
    Malformed(String),
    #[error("options file must contain a JSON array")]
    NotAnArray,
    #[error("option at index {index} is invalid: {reason}")]
    InvalidEntry { index: usize, reason: String },
    #[error("at least two valid options are required to spin the wheel")]
    NotEnoughOptions,
    #[error("duration must be at least {} seconds", MIN_DURATION_SECS)]
    DurationTooShort,
    #[error("duration must be at most {} seconds", MAX_DURATION_SECS)]
    DurationTooLong,
    #[error("the wheel is still spinning")]
    Busy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WheelState {
    Initial,
    Picking,
    Picked,
}

/// Ordered option list with monotonically assigned ids.
#[derive(Clone, Debug, PartialEq)]
pub struct OptionList {
    options: Vec<WheelOption>,
    next_id: u32,
}

impl Default for OptionList {
    fn default() -> Self {
        Self {
            options: Vec::new(),
            next_id: 1,
        }
    }
}

impl OptionList {
    /// The state a fresh or cleared list starts in: one empty row.
    pub fn with_default_row() -> Self {
        let mut list = Self::default();
        list.add("", DEFAULT_WEIGHT);
        list
    }

    pub fn from_options(options: Vec<WheelOption>) -> Self {
        let mut list = Self::default();
        list.replace(options);
        list
    }

    pub fn options(&self) -> &[WheelOption] {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&WheelOption> {
        self.options.iter().find(|o| o.id == id)
    }

    pub fn add(&mut self, text: impl Into<String>, weight: f64) -> u32 {
        let id = self.take_id();
        self.options.push(WheelOption {
            id,
            text: text.into(),
            weight,
        });
        id
    }

    pub fn set_text(&mut self, id: u32, text: impl Into<String>) -> bool {
        match self.options.iter_mut().find(|o| o.id == id) {
            Some(option) => {
                option.text = text.into();
                true
            }
            None => false,
        }
    }

    pub fn set_weight(&mut self, id: u32, weight: f64) -> bool {
        match self.options.iter_mut().find(|o| o.id == id) {
            Some(option) => {
                option.weight = weight;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.options.len();
        self.options.retain(|o| o.id != id);
        if self.options.is_empty() {
            self.next_id = 1;
        }
        self.options.len() != before
    }

    pub fn clear(&mut self) {
        *self = Self::with_default_row();
    }

    /// Bulk replace, keeping incoming ids. Repeated ids get fresh ones.
    pub fn replace(&mut self, incoming: Vec<WheelOption>) {
        let max_id = incoming.iter().map(|o| o.id).max().unwrap_or(0);
        self.next_id = max_id.saturating_add(1);
        self.options.clear();

        let mut seen = std::collections::HashSet::new();
        let mut repeated = Vec::new();
        for option in incoming {
            if !seen.insert(option.id) {
                repeated.push(self.options.len());
            }
            self.options.push(option);
        }
        for index in repeated {
            let id = self.take_id();
            self.options[index].id = id;
        }
        if self.options.is_empty() {
            self.next_id = 1;
        }
    }

    /// Next free id. Once the counter is exhausted the list is renumbered
    /// from 1 in display order.
    fn take_id(&mut self) -> u32 {
        if self.next_id == u32::MAX {
            for (id, option) in (1..).zip(self.options.iter_mut()) {
                option.id = id;
            }
            self.next_id = self.options.len() as u32 + 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Bulk replace from pasted `(text, weight)` pairs with fresh ids.
    pub fn replace_with_entries(&mut self, entries: Vec<(String, f64)>) {
        *self = Self::default();
        for (text, weight) in entries {
            self.add(text, weight);
        }
    }

    pub fn valid_options(&self) -> Vec<WheelOption> {
        self.options.iter().filter(|o| o.is_valid()).cloned().collect()
    }

    pub fn can_spin(&self) -> bool {
        self.options.iter().filter(|o| o.is_valid()).count() >= 2
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.options)
    }
}

/// Strict import: the document must be an array and every entry must carry
/// a numeric `id`, a string `text` and a numeric `weight`. The first bad
/// entry rejects the whole file.
pub fn parse_options_json(input: &str) -> Result<Vec<WheelOption>, WheelError> {
    let value: serde_json::Value =
        serde_json::from_str(input).map_err(|e| WheelError::Malformed(e.to_string()))?;
    let entries = value.as_array().ok_or(WheelError::NotAnArray)?;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value::<WheelOption>(entry.clone()).map_err(|e| {
                WheelError::InvalidEntry {
                    index,
                    reason: e.to_string(),
                }
            })
        })
        .collect()
}

/// Paste format: one `text,weight` per line, split at the last comma so the
/// text itself may contain commas. Lines without a usable weight are skipped.
pub fn parse_pasted(input: &str) -> Vec<(String, f64)> {
    input
        .lines()
        .filter_map(|line| {
            let (text, weight) = line.trim().rsplit_once(',')?;
            let text = text.trim();
            let weight: f64 = weight.trim().parse().ok()?;
            if text.is_empty() || !weight.is_finite() || weight <= 0.0 {
                return None;
            }
            Some((text.to_string(), weight))
        })
        .collect()
}

/// Weight typed into a field. Unparsable or zero input falls back to 1.
pub fn parse_weight(input: &str) -> f64 {
    match input.trim().parse::<f64>() {
        Ok(w) if w.is_finite() && w != 0.0 => w,
        _ => DEFAULT_WEIGHT,
    }
}

pub fn total_weight(options: &[WheelOption]) -> f64 {
    options.iter().map(|o| o.weight).sum()
}

/// Cumulative end angle of every sector.
pub fn sector_boundaries(options: &[WheelOption]) -> Vec<f64> {
    let total = total_weight(options);
    let mut end = 0.0;
    options
        .iter()
        .map(|o| {
            end += o.weight / total * 360.0;
            end
        })
        .collect()
}

/// Index of the sector containing `angle`. Rounding slack just below 360
/// belongs to the last sector.
pub fn sector_index_at(angle: f64, options: &[WheelOption]) -> usize {
    let total = total_weight(options);
    if options.is_empty() || total <= 0.0 {
        return 0;
    }
    let angle = angle.rem_euclid(360.0);

    let mut start = 0.0;
    for (i, option) in options.iter().enumerate() {
        let sweep = option.weight / total * 360.0;
        if angle >= start && angle < start + sweep {
            return i;
        }
        start += sweep;
    }
    options.len() - 1
}

/// Wheel angle under the fixed pointer after rotating the wheel clockwise by `rotation`.
pub fn pointer_angle(rotation: f64) -> f64 {
    (360.0 - rotation.rem_euclid(360.0)).rem_euclid(360.0)
}

pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Rotation the user asked for, rejected outside 5..=30 seconds.
pub fn validate_duration(seconds: f64) -> Result<Duration, WheelError> {
    if seconds.is_nan() || seconds < MIN_DURATION_SECS as f64 {
        return Err(WheelError::DurationTooShort);
    }
    if seconds > MAX_DURATION_SECS as f64 {
        return Err(WheelError::DurationTooLong);
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// Stored preference, pulled back into range instead of rejected.
pub fn clamp_duration(seconds: f64) -> Duration {
    let seconds = if seconds.is_nan() { MIN_DURATION_SECS as f64 } else { seconds };
    Duration::from_secs_f64(seconds.clamp(MIN_DURATION_SECS as f64, MAX_DURATION_SECS as f64))
}

pub fn random_sector_color<R: Rng + ?Sized>(rng: &mut R) -> String {
    let hue = rng.gen_range(0..360);
    let saturation = rng.gen_range(60..100);
    let lightness = rng.gen_range(40..70);
    format!("hsl({}, {}%, {}%)", hue, saturation, lightness)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpinPlan {
    pub total_rotation: f64,
    pub duration: Duration,
}

impl SpinPlan {
    pub fn new<R: Rng + ?Sized>(rng: &mut R, duration: Duration) -> Self {
        let landing: f64 = rng.gen_range(0.0..360.0);
        Self {
            total_rotation: 360.0 * FULL_TURNS + landing,
            duration,
        }
    }

    pub fn progress(&self, elapsed: Duration) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    pub fn rotation_at(&self, elapsed: Duration) -> f64 {
        self.total_rotation * ease_out_cubic(self.progress(elapsed))
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        self.progress(elapsed) >= 1.0
    }

    /// Sector under the pointer once the wheel stops.
    pub fn landing_index(&self, options: &[WheelOption]) -> usize {
        sector_index_at(pointer_angle(self.total_rotation), options)
    }
}
