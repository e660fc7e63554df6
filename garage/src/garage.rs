//! Garage and winners page state plus the car management flows behind them.

use crate::api::{ApiClient, ApiError};
use crate::config::{GARAGE_PAGE_SIZE, WINNERS_PAGE_SIZE};
use futures::future::join_all;
use shared::names::{is_hex_color, random_car};
use shared::protocol::{page_count, Car, CarId, NewCar, Page, SortField, SortState};
use tracing::{info, warn};

pub const DEFAULT_COLOR: &str = "#000000";

#[derive(Clone, Debug, PartialEq)]
pub struct GarageState {
    pub page: usize,
    pub selected: Option<CarId>,
    pub create_form: NewCar,
    pub update_form: NewCar,
}

impl Default for GarageState {
    fn default() -> Self {
        Self {
            page: 1,
            selected: None,
            create_form: blank_form(),
            update_form: blank_form(),
        }
    }
}

fn blank_form() -> NewCar {
    NewCar {
        name: String::new(),
        color: DEFAULT_COLOR.to_string(),
    }
}

impl GarageState {
    /// Copies the car into the update form and enables it.
    pub fn select(&mut self, car: &Car) {
        self.selected = Some(car.id);
        self.update_form = NewCar {
            name: car.name.clone(),
            color: car.color.clone(),
        };
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.update_form = blank_form();
    }

    pub fn reset_create_form(&mut self) {
        self.create_form = blank_form();
    }

    pub fn next_page(&mut self, total_cars: usize) -> bool {
        step_page(&mut self.page, total_cars, GARAGE_PAGE_SIZE, 1)
    }

    pub fn prev_page(&mut self, total_cars: usize) -> bool {
        step_page(&mut self.page, total_cars, GARAGE_PAGE_SIZE, -1)
    }

    /// Pulls the page back after deletions left it past the end.
    pub fn clamp_page(&mut self, total_cars: usize) {
        self.page = self.page.clamp(1, page_count(total_cars, GARAGE_PAGE_SIZE));
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WinnersState {
    pub page: usize,
    pub sort: SortState,
}

impl Default for WinnersState {
    fn default() -> Self {
        Self {
            page: 1,
            sort: SortState::default(),
        }
    }
}

impl WinnersState {
    pub fn sort_by(&mut self, field: SortField) {
        self.sort = self.sort.toggle(field);
    }

    pub fn next_page(&mut self, total_winners: usize) -> bool {
        step_page(&mut self.page, total_winners, WINNERS_PAGE_SIZE, 1)
    }

    pub fn prev_page(&mut self, total_winners: usize) -> bool {
        step_page(&mut self.page, total_winners, WINNERS_PAGE_SIZE, -1)
    }
}

fn step_page(page: &mut usize, total: usize, limit: usize, delta: isize) -> bool {
    let last = page_count(total, limit);
    let target = page.saturating_add_signed(delta).clamp(1, last);
    let moved = target != *page;
    *page = target;
    moved
}

/// Trimmed name and a `#rrggbb` colour, or nothing to submit.
pub fn car_form(name: &str, color: &str) -> Option<NewCar> {
    let name = name.trim();
    if name.is_empty() || !is_hex_color(color) {
        return None;
    }
    Some(NewCar {
        name: name.to_string(),
        color: color.to_lowercase(),
    })
}

pub async fn load_garage(api: &ApiClient, state: &GarageState) -> Page<Car> {
    api.list_cars(state.page, GARAGE_PAGE_SIZE).await
}

/// Deletes the car and then its winner record. A winner that never existed is fine.
pub async fn remove_car(api: &ApiClient, id: CarId) -> Result<(), ApiError> {
    api.delete_car(id).await?;
    match api.delete_winner(id).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => {
            warn!("Car {} deleted but its winner record was not: {}", id, e);
            Err(e)
        }
    }
}

/// Creates `count` randomly named and coloured cars concurrently.
/// Returns how many were actually created.
pub async fn generate_random_cars(api: &ApiClient, count: usize) -> usize {
    let cars: Vec<NewCar> = {
        let mut rng = rand::thread_rng();
        (0..count).map(|_| random_car(&mut rng)).collect()
    };
    let results = join_all(cars.iter().map(|car| api.create_car(car))).await;
    let created = results.iter().filter(|r| r.is_ok()).count();
    if created < count {
        warn!("Generated {} of {} cars", created, count);
    } else {
        info!("Generated {} cars", created);
    }
    created
}

#[derive(Clone, Debug, PartialEq)]
pub struct WinnerRow {
    pub position: usize,
    pub car: Car,
    pub wins: u32,
    pub time: f64,
}

/// One page of the leaderboard joined with car details.
///
/// Winners whose car no longer exists are left out but keep their slot in
/// the numbering.
pub async fn load_winners(api: &ApiClient, state: &WinnersState) -> (Vec<WinnerRow>, usize) {
    let page = api
        .list_winners(state.page, WINNERS_PAGE_SIZE, state.sort)
        .await;

    let cars = join_all(page.items.iter().map(|w| api.get_car(w.id))).await;
    let rows = page
        .items
        .iter()
        .zip(cars)
        .enumerate()
        .filter_map(|(index, (winner, car))| {
            Some(WinnerRow {
                position: (state.page - 1) * WINNERS_PAGE_SIZE + index + 1,
                car: car?,
                wins: winner.wins,
                time: winner.time,
            })
        })
        .collect();
    (rows, page.total_count)
}
