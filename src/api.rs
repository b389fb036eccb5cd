use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Config, Endpoints};
use crate::ingest;
use crate::models::IncidentRecord;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },
    #[error("session expired or not authorized; log in again")]
    Unauthorized,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{url} returned malformed JSON: {source}")]
    Malformed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub user: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Dataset {
    InfrastructureStatus,
    InfrastructureByDistrict,
    CompensationSummary,
    Agriculture,
    Livestock,
    WarehouseStock,
    WarehouseTrend,
    WarehouseTopItems,
    GisDistricts,
}

impl Dataset {
    fn locate<'a>(&self, endpoints: &'a Endpoints) -> (&'a str, &'static str) {
        match self {
            Dataset::InfrastructureStatus => (&endpoints.relief, "/infrastructure/status"),
            Dataset::InfrastructureByDistrict => (&endpoints.relief, "/infrastructure/by-district"),
            Dataset::CompensationSummary => (&endpoints.relief, "/compensation/summary"),
            Dataset::Agriculture => (&endpoints.relief, "/agriculture/impacts"),
            Dataset::Livestock => (&endpoints.relief, "/livestock/losses"),
            Dataset::WarehouseStock => (&endpoints.warehouse, "/warehouse/stock"),
            Dataset::WarehouseTrend => (&endpoints.warehouse, "/warehouse/trend"),
            Dataset::WarehouseTopItems => (&endpoints.warehouse, "/warehouse/top-items"),
            Dataset::GisDistricts => (&endpoints.gis, "/gis/districts"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &Config, token: Option<String>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            endpoints: config.endpoints.clone(),
            token,
        })
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let url = format!("{}/auth/log-in", self.endpoints.auth);
        let response = self
            .http
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "login rejected");
            return Err(ApiError::InvalidCredentials);
        }

        let login = response
            .json::<LoginResponse>()
            .await
            .map_err(|source| ApiError::Malformed { url, source })?;
        info!("logged in");
        Ok(login)
    }

    pub async fn fetch_incidents(&self, date: NaiveDate) -> Result<Vec<IncidentRecord>, ApiError> {
        let url = format!("{}/incidents", self.endpoints.incidents);
        let day = date.format("%Y-%m-%d").to_string();
        let payload = self.get_json(&url, &[("date", day.as_str())]).await?;
        let records = ingest::parse_incidents(&payload);
        info!(%date, records = records.len(), "fetched incident snapshot");
        Ok(records)
    }

    pub async fn fetch_dataset(&self, dataset: Dataset) -> Result<Vec<Value>, ApiError> {
        let (base, path) = dataset.locate(&self.endpoints);
        let url = format!("{base}{path}");
        let payload = self.get_json(&url, &[]).await?;
        Ok(unwrap_collection(payload))
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        let mut request = self.http.get(url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        debug!(url, "GET");
        let response = request.send().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(ApiError::Unauthorized),
            status if !status.is_success() => {
                return Err(ApiError::Status {
                    url: url.to_string(),
                    status,
                })
            }
            _ => {}
        }

        response.json::<Value>().await.map_err(|source| ApiError::Malformed {
            url: url.to_string(),
            source,
        })
    }
}

/// Flattens the shapes the read-only endpoints answer with into a list.
/// A `{success, data}` envelope without usable data is an empty list.
pub fn unwrap_collection(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            Some(Value::Object(inner)) => match inner.get("features") {
                Some(Value::Array(features)) => features.clone(),
                _ => vec![Value::Object(inner)],
            },
            Some(_) => Vec::new(),
            None => match map.remove("features") {
                Some(Value::Array(features)) => features,
                _ if map.contains_key("success") => Vec::new(),
                _ => vec![Value::Object(map)],
            },
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config_for(server: &MockServer) -> Config {
        let base = server.uri();
        Config {
            endpoints: Endpoints {
                auth: base.clone(),
                incidents: base.clone(),
                relief: base.clone(),
                warehouse: base.clone(),
                gis: base,
            },
            request_timeout: None,
        }
    }

    #[tokio::test]
    async fn login_returns_token_and_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/log-in"))
            .and(body_json(json!({"username": "ops", "password": "floods2025"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "a.b.c",
                "user": {"username": "ops", "role": "viewer"}
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server), None).unwrap();
        let login = client.login("ops", "floods2025").await.unwrap();
        assert_eq!(login.access_token, "a.b.c");
        assert_eq!(login.user["role"], "viewer");
    }

    #[tokio::test]
    async fn rejected_login_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/log-in"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server), None).unwrap();
        let err = client.login("ops", "wrong").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials));
    }

    #[tokio::test]
    async fn incidents_are_fetched_by_date_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/incidents"))
            .and(query_param("date", "2025-08-15"))
            .and(header("authorization", "Bearer a.b.c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [
                    {"district": "Buner", "deaths": "92", "housesFull": 80},
                    {"district": "Swat", "deaths": 17}
                ]
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server), Some("a.b.c".to_string())).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();
        let records = client.fetch_incidents(date).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].deaths, 92);
        assert_eq!(records[0].houses_full, 80);
    }

    #[tokio::test]
    async fn unauthorized_and_server_errors_are_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/incidents"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/warehouse/stock"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server), None).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();
        assert!(matches!(
            client.fetch_incidents(date).await.unwrap_err(),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            client.fetch_dataset(Dataset::WarehouseStock).await.unwrap_err(),
            ApiError::Status { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/livestock/losses"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server), None).unwrap();
        assert!(matches!(
            client.fetch_dataset(Dataset::Livestock).await.unwrap_err(),
            ApiError::Malformed { .. }
        ));
    }

    #[test]
    fn collections_unwrap_from_every_shape() {
        assert_eq!(unwrap_collection(json!([1, 2])).len(), 2);
        assert_eq!(unwrap_collection(json!({"success": true, "data": [1]})).len(), 1);
        assert_eq!(unwrap_collection(json!({"success": true, "data": {"total": 5}})).len(), 1);
        assert!(unwrap_collection(json!({"success": false})).is_empty());
        assert!(unwrap_collection(json!({"success": true, "data": null})).is_empty());
        assert_eq!(
            unwrap_collection(json!({"type": "FeatureCollection", "features": [{}, {}, {}]})).len(),
            3
        );
        assert_eq!(unwrap_collection(json!({"totalPaid": 12})).len(), 1);
        assert!(unwrap_collection(json!("text")).is_empty());
    }
}
