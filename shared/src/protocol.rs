use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

/// Server-assigned car identifier. Winners share the id of their car.
pub type CarId = u32;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Car {
    pub id: CarId,
    pub name: String,
    pub color: String,
}

/// Body of a create/update request; the server owns the id.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NewCar {
    pub name: String,
    pub color: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct EngineResponse {
    pub velocity: f64,
    pub distance: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    Started,
    Stopped,
    Drive,
}

impl EngineStatus {
    pub fn as_query(&self) -> &'static str {
        match self {
            EngineStatus::Started => "started",
            EngineStatus::Stopped => "stopped",
            EngineStatus::Drive => "drive",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Winner {
    pub id: CarId,
    #[serde(deserialize_with = "at_least_one")]
    pub wins: u32,
    /// Best (lowest) finishing time in seconds.
    pub time: f64,
}

impl Winner {
    pub fn first_win(id: CarId, time: f64) -> Self {
        Self { id, wins: 1, time }
    }

    /// Every finish counts as a win; the stored time only ever improves.
    pub fn record_win(&self, time: f64) -> Self {
        Self {
            id: self.id,
            wins: self.wins.saturating_add(1),
            time: self.time.min(time),
        }
    }
}

/// A stored winner has won at least once.
fn at_least_one<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let wins = u32::deserialize(deserializer)?;
    if wins == 0 {
        return Err(de::Error::custom("wins must be at least 1"));
    }
    Ok(wins)
}

/// PUT body for `/winners/:id`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct WinnerUpdate {
    pub wins: u32,
    pub time: f64,
}

impl From<&Winner> for WinnerUpdate {
    fn from(w: &Winner) -> Self {
        Self { wins: w.wins, time: w.time }
    }
}

/// One page of a paginated listing plus the `X-Total-Count` header value.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
        }
    }
}

/// Number of pages needed for `total` items, never less than one.
pub fn page_count(total: usize, limit: usize) -> usize {
    if limit == 0 {
        return 1;
    }
    total.div_ceil(limit).max(1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortField {
    Id,
    Wins,
    Time,
}

impl SortField {
    pub fn as_query(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Wins => "wins",
            SortField::Time => "time",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_query(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortState {
    pub field: SortField,
    pub order: SortOrder,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            field: SortField::Wins,
            order: SortOrder::Asc,
        }
    }
}

impl SortState {
    /// Clicking a column header: the same field flips ASC to DESC, anything else starts at ASC.
    pub fn toggle(self, field: SortField) -> Self {
        let order = if self.field == field && self.order == SortOrder::Asc {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        };
        Self { field, order }
    }
}

impl fmt::Display for SortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.as_query(), self.order.as_query())
    }
}
