//! Typed access to the garage, engine and winners endpoints.
//!
//! Read paths degrade to empty results and log; write paths log and hand the
//! error back. Every body is decoded through serde so a response with the
//! wrong shape fails the same way a transport error does.

use reqwest::{header::CONTENT_TYPE, header::HeaderMap, Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::protocol::{
    Car, CarId, EngineResponse, EngineStatus, NewCar, Page, SortState, Winner, WinnerUpdate,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Lowercase so it can be used directly as a `HeaderName`.
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("malformed payload: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("car {0} not found")]
    NotFound(CarId),
    #[error("invalid engine parameters for car {0}")]
    InvalidParameters(CarId),
    #[error("engine of car {id} broke down ({status})")]
    DriveRefused { id: CarId, status: StatusCode },
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApiError::NotFound(_) | ApiError::Status(StatusCode::NOT_FOUND)
        )
    }
}

/// Engine phases of a single car's run.
#[allow(async_fn_in_trait)]
pub trait EngineControl {
    async fn start_engine(&self, id: CarId) -> Result<EngineResponse, ApiError>;
    async fn stop_engine(&self, id: CarId) -> Result<EngineResponse, ApiError>;
    /// Resolves once the car crosses the line, or fails if the engine breaks.
    async fn drive(&self, id: CarId) -> Result<(), ApiError>;
}

/// Winner records keyed by car id.
#[allow(async_fn_in_trait)]
pub trait WinnerStore {
    async fn get_winner(&self, id: CarId) -> Option<Winner>;
    async fn create_winner(&self, winner: &Winner) -> Result<Winner, ApiError>;
    async fn update_winner(&self, winner: &Winner) -> Result<Winner, ApiError>;
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = Client::builder().user_agent("garage/0.1").build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn list_cars(&self, page: usize, limit: usize) -> Page<Car> {
        let path = format!("/garage?_page={}&_limit={}", page, limit);
        match self.fetch_page(&path).await {
            Ok(cars) => cars,
            Err(e) => {
                warn!("Error fetching cars: {}", e);
                Page::empty()
            }
        }
    }

    pub async fn get_car(&self, id: CarId) -> Option<Car> {
        let request = self.http.get(self.url(&format!("/garage/{}", id)));
        match self.fetch(request).await {
            Ok(car) => Some(car),
            Err(e) => {
                warn!("Error fetching car with id {}: {}", id, e);
                None
            }
        }
    }

    pub async fn create_car(&self, car: &NewCar) -> Result<Car, ApiError> {
        let request = with_json(self.http.post(self.url("/garage")), car)?;
        self.fetch(request)
            .await
            .inspect_err(|e| warn!("Error creating car: {}", e))
    }

    pub async fn update_car(&self, id: CarId, car: &NewCar) -> Result<Car, ApiError> {
        let request = with_json(self.http.put(self.url(&format!("/garage/{}", id))), car)?;
        self.fetch(request)
            .await
            .inspect_err(|e| warn!("Error updating car with id {}: {}", id, e))
    }

    pub async fn delete_car(&self, id: CarId) -> Result<(), ApiError> {
        let request = self.http.delete(self.url(&format!("/garage/{}", id)));
        send(request)
            .await
            .map(|_| ())
            .inspect_err(|e| warn!("Error deleting car with id {}: {}", id, e))
    }

    pub async fn start_engine(&self, id: CarId) -> Result<EngineResponse, ApiError> {
        let response = self
            .http
            .patch(self.engine_url(id, EngineStatus::Started))
            .send()
            .await
            .inspect_err(|e| warn!("Error starting engine for car {}: {}", id, e))?;

        let result = match response.status() {
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(id)),
            StatusCode::BAD_REQUEST => Err(ApiError::InvalidParameters(id)),
            status if !status.is_success() => Err(ApiError::Status(status)),
            _ => decode(response).await,
        };
        result.inspect_err(|e| warn!("Error starting engine for car {}: {}", id, e))
    }

    pub async fn stop_engine(&self, id: CarId) -> Result<EngineResponse, ApiError> {
        let request = self.http.patch(self.engine_url(id, EngineStatus::Stopped));
        self.fetch(request)
            .await
            .inspect_err(|e| warn!("Error stopping engine for car {}: {}", id, e))
    }

    pub async fn drive(&self, id: CarId) -> Result<(), ApiError> {
        let response = self
            .http
            .patch(self.engine_url(id, EngineStatus::Drive))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            debug!("Drive refused for car {} with status {}", id, status);
            return Err(ApiError::DriveRefused { id, status });
        }
        Ok(())
    }

    pub async fn list_winners(&self, page: usize, limit: usize, sort: SortState) -> Page<Winner> {
        let path = format!(
            "/winners?_page={}&_limit={}&_sort={}&_order={}",
            page,
            limit,
            sort.field.as_query(),
            sort.order.as_query()
        );
        match self.fetch_page(&path).await {
            Ok(winners) => winners,
            Err(e) => {
                warn!("Error fetching winners: {}", e);
                Page::empty()
            }
        }
    }

    pub async fn get_winner(&self, id: CarId) -> Option<Winner> {
        let request = self.http.get(self.url(&format!("/winners/{}", id)));
        match self.fetch(request).await {
            Ok(winner) => Some(winner),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!("Error fetching winner {}: {}", id, e);
                None
            }
        }
    }

    pub async fn create_winner(&self, winner: &Winner) -> Result<Winner, ApiError> {
        let request = with_json(self.http.post(self.url("/winners")), winner)?;
        self.fetch(request)
            .await
            .inspect_err(|e| warn!("Error creating winner: {}", e))
    }

    pub async fn update_winner(&self, winner: &Winner) -> Result<Winner, ApiError> {
        let body = WinnerUpdate::from(winner);
        let request = with_json(
            self.http.put(self.url(&format!("/winners/{}", winner.id))),
            &body,
        )?;
        self.fetch(request)
            .await
            .inspect_err(|e| warn!("Error updating winner {}: {}", winner.id, e))
    }

    pub async fn delete_winner(&self, id: CarId) -> Result<(), ApiError> {
        let request = self.http.delete(self.url(&format!("/winners/{}", id)));
        send(request).await.map(|_| ())
    }

    fn engine_url(&self, id: CarId, status: EngineStatus) -> String {
        self.url(&format!("/engine?id={}&status={}", id, status.as_query()))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = send(request).await?;
        decode(response).await
    }

    async fn fetch_page<T: DeserializeOwned>(&self, path: &str) -> Result<Page<T>, ApiError> {
        let response = send(self.http.get(self.url(path))).await?;
        let total_count = total_count(response.headers());
        let items = decode(response).await?;
        Ok(Page { items, total_count })
    }
}

impl EngineControl for ApiClient {
    async fn start_engine(&self, id: CarId) -> Result<EngineResponse, ApiError> {
        ApiClient::start_engine(self, id).await
    }

    async fn stop_engine(&self, id: CarId) -> Result<EngineResponse, ApiError> {
        ApiClient::stop_engine(self, id).await
    }

    async fn drive(&self, id: CarId) -> Result<(), ApiError> {
        ApiClient::drive(self, id).await
    }
}

impl WinnerStore for ApiClient {
    async fn get_winner(&self, id: CarId) -> Option<Winner> {
        ApiClient::get_winner(self, id).await
    }

    async fn create_winner(&self, winner: &Winner) -> Result<Winner, ApiError> {
        ApiClient::create_winner(self, winner).await
    }

    async fn update_winner(&self, winner: &Winner) -> Result<Winner, ApiError> {
        ApiClient::update_winner(self, winner).await
    }
}

async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status(status));
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

fn with_json<B: Serialize>(request: RequestBuilder, body: &B) -> Result<RequestBuilder, ApiError> {
    Ok(request
        .header(CONTENT_TYPE, "application/json")
        .body(serde_json::to_vec(body)?))
}

/// Missing or non-numeric header counts as zero.
pub fn total_count(headers: &HeaderMap) -> usize {
    headers
        .get(TOTAL_COUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_total_count_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(total_count(&headers), 0);

        headers.insert(TOTAL_COUNT_HEADER, HeaderValue::from_static("12"));
        assert_eq!(total_count(&headers), 12);

        headers.insert(TOTAL_COUNT_HEADER, HeaderValue::from_static("twelve"));
        assert_eq!(total_count(&headers), 0);
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ApiError::NotFound(3).is_not_found());
        assert!(ApiError::Status(StatusCode::NOT_FOUND).is_not_found());
        assert!(!ApiError::Status(StatusCode::INTERNAL_SERVER_ERROR).is_not_found());
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = ApiClient::new("http://127.0.0.1:3000/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:3000");
        assert_eq!(
            client.engine_url(4, EngineStatus::Drive),
            "http://127.0.0.1:3000/engine?id=4&status=drive"
        );
    }
}
