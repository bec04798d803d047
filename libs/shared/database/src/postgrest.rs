use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Error surfaced by the relational store API. The HTTP status is preserved
/// so callers can tell constraint violations apart from everything else
/// without parsing error text.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("store returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("store transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl DbError {
    /// Unique or exclusion constraint violation (PostgREST maps these to 409).
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Status { status: 409, .. })
    }
}

/// Thin client for a PostgREST-style relational API. The backend
/// authenticates with the configured service key; end-user identity never
/// reaches the store.
pub struct PostgrestClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl PostgrestClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.database_api_url.clone(),
            service_key: config.database_service_key.clone(),
        }
    }

    fn headers(&self, returning: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.service_key).unwrap());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.service_key)).unwrap(),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if returning {
            headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        }

        headers
    }

    /// GET rows: `filters` is a raw PostgREST query string such as
    /// `doctor_id=eq.{id}&order=start_time.asc`.
    pub async fn select<T>(&self, table: &str, filters: &str) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}?{}", table, filters);
        self.request(Method::GET, &path, None, false).await
    }

    pub async fn insert<T>(&self, table: &str, body: Value) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}", table);
        self.request(Method::POST, &path, Some(body), true).await
    }

    pub async fn update<T>(&self, table: &str, filters: &str, body: Value) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}?{}", table, filters);
        self.request(Method::PATCH, &path, Some(body), true).await
    }

    pub async fn delete<T>(&self, table: &str, filters: &str) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/{}?{}", table, filters);
        self.request(Method::DELETE, &path, None, true).await
    }

    async fn request<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        returning: bool,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Store request {} {}", method, url);

        let mut req = self
            .client
            .request(method, &url)
            .headers(self.headers(returning));

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Store API error ({}): {}", status, error_text);

            return Err(DbError::Status {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
