//! The REST client against an in-process copy of the JSON backend.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use dashmap::{DashMap, DashSet};
use garage::api::{ApiClient, ApiError, TOTAL_COUNT_HEADER};
use garage::garage::{generate_random_cars, load_winners, remove_car, WinnersState};
use garage::winners::{reconcile, RaceResult};
use serde_json::json;
use shared::protocol::{
    Car, NewCar, SortField, SortOrder, SortState, Winner, WinnerUpdate,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
struct Backend {
    cars: Arc<DashMap<u32, Car>>,
    winners: Arc<DashMap<u32, Winner>>,
    next_id: Arc<AtomicU32>,
    broken: Arc<DashSet<u32>>,
    bad_params: Arc<DashSet<u32>>,
    omit_count: Arc<AtomicBool>,
    garbage_list: Arc<AtomicBool>,
}

impl Backend {
    fn add_car(&self, name: &str) -> Car {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let car = Car {
            id,
            name: name.to_string(),
            color: "#123456".to_string(),
        };
        self.cars.insert(id, car.clone());
        car
    }
}

type Params = Query<HashMap<String, String>>;

fn param(params: &HashMap<String, String>, key: &str, default: usize) -> usize {
    params.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn paged<T: serde::Serialize>(backend: &Backend, items: Vec<T>, params: &HashMap<String, String>) -> Response {
    let total = items.len();
    let page = param(params, "_page", 1).max(1);
    let limit = param(params, "_limit", total.max(1));
    let slice: Vec<T> = items.into_iter().skip((page - 1) * limit).take(limit).collect();
    if backend.omit_count.load(Ordering::SeqCst) {
        return Json(slice).into_response();
    }
    ([(TOTAL_COUNT_HEADER, total.to_string())], Json(slice)).into_response()
}

async fn list_cars(State(backend): State<Backend>, Query(params): Params) -> Response {
    if backend.garbage_list.load(Ordering::SeqCst) {
        return Json(json!({ "cars": "nope" })).into_response();
    }
    let mut cars: Vec<Car> = backend.cars.iter().map(|e| e.value().clone()).collect();
    cars.sort_by_key(|c| c.id);
    paged(&backend, cars, &params)
}

async fn get_car(State(backend): State<Backend>, Path(id): Path<u32>) -> Response {
    match backend.cars.get(&id) {
        Some(car) => Json(car.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({}))).into_response(),
    }
}

async fn create_car(State(backend): State<Backend>, Json(body): Json<NewCar>) -> Response {
    if body.name == "shapeless" {
        return (StatusCode::CREATED, Json(json!({ "oops": true }))).into_response();
    }
    let car = backend.add_car(&body.name);
    (StatusCode::CREATED, Json(car)).into_response()
}

async fn update_car(
    State(backend): State<Backend>,
    Path(id): Path<u32>,
    Json(body): Json<NewCar>,
) -> Response {
    match backend.cars.get_mut(&id) {
        Some(mut car) => {
            car.name = body.name;
            car.color = body.color;
            Json(car.clone()).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({}))).into_response(),
    }
}

async fn delete_car(State(backend): State<Backend>, Path(id): Path<u32>) -> Response {
    match backend.cars.remove(&id) {
        Some(_) => Json(json!({})).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({}))).into_response(),
    }
}

async fn engine(State(backend): State<Backend>, Query(params): Params) -> Response {
    let id = param(&params, "id", 0) as u32;
    if !backend.cars.contains_key(&id) {
        return (StatusCode::NOT_FOUND, "Car not found").into_response();
    }
    match params.get("status").map(String::as_str) {
        Some("started") if backend.bad_params.contains(&id) => {
            (StatusCode::BAD_REQUEST, "Wrong parameters").into_response()
        }
        Some("started") => Json(json!({ "velocity": 100.0, "distance": 500000.0 })).into_response(),
        Some("stopped") => Json(json!({ "velocity": 0.0, "distance": 500000.0 })).into_response(),
        Some("drive") if backend.broken.contains(&id) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Engine broke down").into_response()
        }
        Some("drive") => Json(json!({ "success": true })).into_response(),
        _ => (StatusCode::BAD_REQUEST, "Wrong parameters").into_response(),
    }
}

async fn list_winners(State(backend): State<Backend>, Query(params): Params) -> Response {
    let mut winners: Vec<Winner> = backend.winners.iter().map(|e| *e.value()).collect();
    match params.get("_sort").map(String::as_str) {
        Some("wins") => winners.sort_by_key(|w| w.wins),
        Some("time") => winners.sort_by(|a, b| a.time.total_cmp(&b.time)),
        _ => winners.sort_by_key(|w| w.id),
    }
    if params.get("_order").map(String::as_str) == Some("DESC") {
        winners.reverse();
    }
    paged(&backend, winners, &params)
}

async fn get_winner(State(backend): State<Backend>, Path(id): Path<u32>) -> Response {
    match backend.winners.get(&id) {
        Some(winner) => Json(*winner).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({}))).into_response(),
    }
}

async fn create_winner(State(backend): State<Backend>, Json(winner): Json<Winner>) -> Response {
    if backend.winners.contains_key(&winner.id) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Duplicate id").into_response();
    }
    backend.winners.insert(winner.id, winner);
    (StatusCode::CREATED, Json(winner)).into_response()
}

async fn update_winner(
    State(backend): State<Backend>,
    Path(id): Path<u32>,
    Json(body): Json<WinnerUpdate>,
) -> Response {
    match backend.winners.get_mut(&id) {
        Some(mut winner) => {
            winner.wins = body.wins;
            winner.time = body.time;
            Json(*winner).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({}))).into_response(),
    }
}

async fn delete_winner(State(backend): State<Backend>, Path(id): Path<u32>) -> Response {
    match backend.winners.remove(&id) {
        Some(_) => Json(json!({})).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({}))).into_response(),
    }
}

async fn spawn_backend() -> (Backend, ApiClient) {
    let backend = Backend::default();
    let app = Router::new()
        .route("/garage", get(list_cars).post(create_car))
        .route("/garage/:id", get(get_car).put(update_car).delete(delete_car))
        .route("/engine", patch(engine))
        .route("/winners", get(list_winners).post(create_winner))
        .route(
            "/winners/:id",
            get(get_winner).put(update_winner).delete(delete_winner),
        )
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = ApiClient::new(&format!("http://{}", addr)).unwrap();
    (backend, client)
}

#[tokio::test]
async fn test_list_cars_pages_with_total_count() {
    let (backend, client) = spawn_backend().await;
    for i in 0..10 {
        backend.add_car(&format!("car {}", i));
    }

    let page = client.list_cars(2, 7).await;

    assert_eq!(page.total_count, 10);
    let ids: Vec<u32> = page.items.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![8, 9, 10]);
}

#[tokio::test]
async fn test_missing_total_count_is_zero() {
    let (backend, client) = spawn_backend().await;
    backend.add_car("Tesla Model S");
    backend.omit_count.store(true, Ordering::SeqCst);

    let page = client.list_cars(1, 7).await;

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.total_count, 0);
}

#[tokio::test]
async fn test_malformed_list_degrades_to_empty() {
    let (backend, client) = spawn_backend().await;
    backend.add_car("Tesla Model S");
    backend.garbage_list.store(true, Ordering::SeqCst);

    let page = client.list_cars(1, 7).await;

    assert!(page.items.is_empty());
    assert_eq!(page.total_count, 0);
}

#[tokio::test]
async fn test_car_crud() {
    let (_backend, client) = spawn_backend().await;

    let created = client
        .create_car(&NewCar { name: "BMW M5".into(), color: "#0000ff".into() })
        .await
        .unwrap();
    assert_eq!(client.get_car(created.id).await, Some(created.clone()));

    let updated = client
        .update_car(created.id, &NewCar { name: "BMW M5 CS".into(), color: "#00ff00".into() })
        .await
        .unwrap();
    assert_eq!(updated.name, "BMW M5 CS");

    client.delete_car(created.id).await.unwrap();
    assert_eq!(client.get_car(created.id).await, None);
    assert!(client.delete_car(created.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_create_with_wrong_shape_is_an_error() {
    let (_backend, client) = spawn_backend().await;

    let result = client
        .create_car(&NewCar { name: "shapeless".into(), color: "#000000".into() })
        .await;

    assert!(matches!(result, Err(ApiError::Shape(_))));
}

#[tokio::test]
async fn test_engine_errors_are_classified() {
    let (backend, client) = spawn_backend().await;
    let ok = backend.add_car("ok");
    let bad = backend.add_car("bad");
    let broken = backend.add_car("broken");
    backend.bad_params.insert(bad.id);
    backend.broken.insert(broken.id);

    let engine = client.start_engine(ok.id).await.unwrap();
    assert_eq!(engine.velocity, 100.0);
    client.drive(ok.id).await.unwrap();
    client.stop_engine(ok.id).await.unwrap();

    assert!(matches!(client.start_engine(99).await, Err(ApiError::NotFound(99))));
    assert!(matches!(
        client.start_engine(bad.id).await,
        Err(ApiError::InvalidParameters(id)) if id == bad.id
    ));
    match client.drive(broken.id).await {
        Err(ApiError::DriveRefused { id, status }) => {
            assert_eq!(id, broken.id);
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        }
        other => panic!("expected a refused drive, got {:?}", other),
    }
}

#[tokio::test]
async fn test_remove_car_deletes_winner_too() {
    let (backend, client) = spawn_backend().await;
    let winner = backend.add_car("Audi RS7");
    let plain = backend.add_car("Porsche 911");
    backend.winners.insert(winner.id, Winner::first_win(winner.id, 4.2));

    remove_car(&client, winner.id).await.unwrap();
    assert_eq!(client.get_car(winner.id).await, None);
    assert_eq!(client.get_winner(winner.id).await, None);

    // never won, so the winner delete 404s
    remove_car(&client, plain.id).await.unwrap();
    assert!(backend.cars.is_empty());
}

#[tokio::test]
async fn test_reconcile_through_the_client() {
    let (backend, client) = spawn_backend().await;
    let car = backend.add_car("McLaren P1");
    let result = |time| RaceResult { car_id: car.id, name: car.name.clone(), time };

    let first = reconcile(&client, &result(6.0)).await.unwrap();
    assert_eq!(first, Winner { id: car.id, wins: 1, time: 6.0 });

    let second = reconcile(&client, &result(7.5)).await.unwrap();
    assert_eq!(second, Winner { id: car.id, wins: 2, time: 6.0 });
    assert_eq!(backend.winners.get(&car.id).map(|w| *w), Some(second));
}

#[tokio::test]
async fn test_winners_sorted_and_joined_with_cars() {
    let (backend, client) = spawn_backend().await;
    let a = backend.add_car("Ferrari SF90");
    let b = backend.add_car("Bugatti Chiron");
    let gone = backend.add_car("Koenigsegg Jesko");
    backend.winners.insert(a.id, Winner { id: a.id, wins: 3, time: 5.0 });
    backend.winners.insert(b.id, Winner { id: b.id, wins: 1, time: 3.0 });
    backend.winners.insert(gone.id, Winner { id: gone.id, wins: 2, time: 4.0 });
    backend.cars.remove(&gone.id);

    let sort = SortState { field: SortField::Time, order: SortOrder::Desc };
    let page = client.list_winners(1, 10, sort).await;
    let times: Vec<f64> = page.items.iter().map(|w| w.time).collect();
    assert_eq!(times, vec![5.0, 4.0, 3.0]);

    let (rows, total) = load_winners(&client, &WinnersState { page: 1, sort }).await;
    assert_eq!(total, 3);
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].position, rows[0].car.id), (1, a.id));
    assert_eq!((rows[1].position, rows[1].car.id), (3, b.id));
}

#[tokio::test]
async fn test_generate_random_cars() {
    let (backend, client) = spawn_backend().await;

    assert_eq!(generate_random_cars(&client, 25).await, 25);

    assert_eq!(backend.cars.len(), 25);
    assert_eq!(client.list_cars(1, 7).await.total_count, 25);
}
