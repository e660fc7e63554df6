//! Decision wheel persistence and the spin driver.

use anyhow::Context;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::wheel::{
    clamp_duration, pointer_angle, random_sector_color, sector_index_at, validate_duration,
    OptionList, SpinPlan, WheelError, WheelOption, WheelState, MIN_DURATION_SECS,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const OPTIONS_KEY: &str = "wheelOptions";
pub const INITIALIZED_KEY: &str = "wheelInitialized";
pub const MUTED_KEY: &str = "wheelSoundMuted";
pub const DURATION_KEY: &str = "wheelRotationDuration";

/// String values under fixed keys, the shape of browser local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[derive(Default, Debug)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A single JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RefCell<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("Wheel store {} is not a JSON object", path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        Ok(Self {
            path,
            values: RefCell::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(&*self.values.borrow())?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self.flush()
    }
}

/// Typed view of the wheel's stored options and preferences.
pub struct WheelRepository<S> {
    store: S,
}

impl<S: KeyValueStore> WheelRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The very first load seeds one empty row. Later loads return what was
    /// saved, falling back to the empty row if it cannot be read.
    pub fn load_options(&self) -> OptionList {
        if self.store.get(INITIALIZED_KEY).is_none() {
            let list = OptionList::with_default_row();
            let seeded = self
                .save_options(&list)
                .and_then(|_| self.store.set(INITIALIZED_KEY, "true"));
            if let Err(e) = seeded {
                warn!("Failed to seed wheel options: {:#}", e);
            }
            return list;
        }

        let Some(raw) = self.store.get(OPTIONS_KEY) else {
            return OptionList::with_default_row();
        };
        match serde_json::from_str::<Vec<WheelOption>>(&raw) {
            Ok(options) => OptionList::from_options(options),
            Err(e) => {
                warn!("Stored wheel options are unreadable, starting over: {}", e);
                OptionList::with_default_row()
            }
        }
    }

    pub fn save_options(&self, list: &OptionList) -> anyhow::Result<()> {
        let json = serde_json::to_string(list.options())?;
        self.store.set(OPTIONS_KEY, &json)
    }

    pub fn is_muted(&self) -> bool {
        self.store.get(MUTED_KEY).as_deref() == Some("true")
    }

    pub fn set_muted(&self, muted: bool) -> anyhow::Result<()> {
        self.store.set(MUTED_KEY, if muted { "true" } else { "false" })
    }

    /// Stored spin duration, pulled into range. Missing or garbage means the minimum.
    pub fn rotation_duration(&self) -> Duration {
        let seconds = self
            .store
            .get(DURATION_KEY)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .unwrap_or(MIN_DURATION_SECS as f64);
        clamp_duration(seconds)
    }

    pub fn set_rotation_duration(&self, seconds: f64) -> anyhow::Result<Duration> {
        let duration = validate_duration(seconds)?;
        self.store
            .set(DURATION_KEY, &duration.as_secs_f64().to_string())?;
        Ok(duration)
    }
}

/// One slice of the wheel as drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct Sector {
    pub option: WheelOption,
    pub color: String,
}

/// A wheel built from the valid options in random order.
///
/// Mute and duration live here while the wheel page is open so they can be
/// refused mid-spin; callers persist accepted changes through the repository.
pub struct WheelSpinner {
    sectors: Vec<Sector>,
    state: Cell<WheelState>,
    muted: Cell<bool>,
    duration: Cell<Duration>,
}

impl WheelSpinner {
    pub fn prepare<R: Rng + ?Sized>(
        list: &OptionList,
        muted: bool,
        duration: Duration,
        rng: &mut R,
    ) -> Result<Self, WheelError> {
        if !list.can_spin() {
            return Err(WheelError::NotEnoughOptions);
        }
        let mut options = list.valid_options();
        options.shuffle(rng);
        let sectors = options
            .into_iter()
            .map(|option| Sector {
                option,
                color: random_sector_color(rng),
            })
            .collect();
        Ok(Self {
            sectors,
            state: Cell::new(WheelState::Initial),
            muted: Cell::new(muted),
            duration: Cell::new(duration),
        })
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn options(&self) -> Vec<WheelOption> {
        self.sectors.iter().map(|s| s.option.clone()).collect()
    }

    pub fn state(&self) -> WheelState {
        self.state.get()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    pub fn duration(&self) -> Duration {
        self.duration.get()
    }

    /// Returns the new mute setting.
    pub fn toggle_mute(&self) -> Result<bool, WheelError> {
        self.ensure_idle()?;
        self.muted.set(!self.muted.get());
        Ok(self.muted.get())
    }

    pub fn set_duration(&self, seconds: f64) -> Result<Duration, WheelError> {
        self.ensure_idle()?;
        let duration = validate_duration(seconds)?;
        self.duration.set(duration);
        Ok(duration)
    }

    pub fn plan<R: Rng + ?Sized>(&self, rng: &mut R) -> SpinPlan {
        SpinPlan::new(rng, self.duration.get())
    }

    /// Animates `plan` on a `tick` interval, calling `on_highlight` each time
    /// the pointer enters a different sector, and returns the option it
    /// stops on.
    pub async fn spin<F>(
        &self,
        plan: SpinPlan,
        tick: Duration,
        mut on_highlight: F,
    ) -> Result<WheelOption, WheelError>
    where
        F: FnMut(&WheelOption),
    {
        self.ensure_idle()?;
        self.state.set(WheelState::Picking);
        debug!("Spinning {:.1} degrees over {:?}", plan.total_rotation, plan.duration);

        let options = self.options();
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();
        let mut highlighted = None;

        loop {
            ticker.tick().await;
            let elapsed = started.elapsed();
            let index = sector_index_at(pointer_angle(plan.rotation_at(elapsed)), &options);
            if highlighted != Some(index) {
                highlighted = Some(index);
                on_highlight(&options[index]);
            }
            if plan.is_done(elapsed) {
                break;
            }
        }

        let picked = options[plan.landing_index(&options)].clone();
        self.state.set(WheelState::Picked);
        info!("Wheel picked {:?}", picked.text);
        Ok(picked)
    }

    fn ensure_idle(&self) -> Result<(), WheelError> {
        match self.state.get() {
            WheelState::Picking => Err(WheelError::Busy),
            _ => Ok(()),
        }
    }
}
