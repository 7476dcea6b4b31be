//! HTTP remote store
//!
//! JSON client for the items API:
//!
//! | Operation   | Request                 | Body                |
//! |-------------|-------------------------|---------------------|
//! | `fetch_all` | `GET {api}/items`       |                     |
//! | `create`    | `POST {api}/items`      | `{"value": "..."}`  |
//! | `update`    | `PUT {api}/items/{id}`  | `{"value": "..."}`  |
//! | `delete`    | `DELETE {api}/items/{id}` |                   |
//!
//! Non-2xx answers are turned into [`TransportError::Status`], using the
//! `message` (or `error`) field of a JSON error body when the server sends one.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::error::status_message;
use super::{RemoteStore, TransportError, TransportResult};
use crate::config::Config;
use crate::models::{Item, ItemId};

/// Request body for create and update
#[derive(Debug, Serialize)]
struct ValueBody<'a> {
    value: &'a str,
}

/// `GET /items` may answer with a bare array or an `{"items": [...]}` envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemsResponse {
    List(Vec<Item>),
    Envelope { items: Vec<Item> },
}

impl ItemsResponse {
    fn into_items(self) -> Vec<Item> {
        match self {
            ItemsResponse::List(items) | ItemsResponse::Envelope { items } => items,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Remote store backed by the items HTTP API
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
}

impl HttpRemoteStore {
    /// Create a store for the API rooted at `api_url` (e.g. `http://localhost:3000/v1`)
    pub fn new(api_url: &str) -> TransportResult<Self> {
        Self::with_client(Client::new(), api_url)
    }

    /// Create a store that sends requests through an existing client
    pub fn with_client(client: Client, api_url: &str) -> TransportResult<Self> {
        let invalid = |details: String| TransportError::InvalidUrl {
            url: api_url.to_string(),
            details,
        };

        let base_url = Url::parse(api_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "unsupported scheme '{}'",
                base_url.scheme()
            )));
        }
        if base_url.cannot_be_a_base() {
            return Err(invalid("URL cannot be used as a base".to_string()));
        }

        Ok(Self { client, base_url })
    }

    /// Create a store from the configured API URL
    pub fn from_config(config: &Config) -> TransportResult<Self> {
        Self::new(&config.api_url)
    }

    /// The API root this store talks to
    pub fn api_url(&self) -> &Url {
        &self.base_url
    }

    fn items_url(&self) -> Url {
        self.endpoint(&["items"])
    }

    fn item_url(&self, id: &ItemId) -> Url {
        self.endpoint(&["items", id.as_str()])
    }

    /// Append path segments to the API root, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `with_client`: the base URL always has path segments
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request and turn non-success statuses into errors
    async fn send(&self, request: RequestBuilder, url: &Url) -> TransportResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, url.as_str()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = error_message(&body)
            .unwrap_or_else(|| status_message(status.as_u16(), status.canonical_reason()));
        warn!("{} answered {}: {}", url, status, message);

        Err(TransportError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// Extract a message from a JSON error body
fn error_message(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    parsed
        .message
        .or(parsed.error)
        .filter(|message| !message.trim().is_empty())
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_all(&self) -> TransportResult<Vec<Item>> {
        let url = self.items_url();
        debug!("GET {}", url);

        let response = self.send(self.client.get(url.clone()), &url).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(e, url.as_str()))?;

        let parsed: ItemsResponse =
            serde_json::from_slice(&body).map_err(|e| TransportError::Decode {
                url: url.to_string(),
                details: e.to_string(),
            })?;
        Ok(parsed.into_items())
    }

    async fn create(&self, value: &str) -> TransportResult<()> {
        let url = self.items_url();
        debug!("POST {}", url);

        let request = self.client.post(url.clone()).json(&ValueBody { value });
        self.send(request, &url).await?;
        Ok(())
    }

    async fn update(&self, id: &ItemId, value: &str) -> TransportResult<()> {
        let url = self.item_url(id);
        debug!("PUT {}", url);

        let request = self.client.put(url.clone()).json(&ValueBody { value });
        self.send(request, &url).await?;
        Ok(())
    }

    async fn delete(&self, id: &ItemId) -> TransportResult<()> {
        let url = self.item_url(id);
        debug!("DELETE {}", url);

        self.send(self.client.delete(url.clone()), &url).await?;
        Ok(())
    }
}
