//! Remote authority client
//!
//! The server side of the sync protocol: single-record fetch and
//! form-encoded save. The session rides on cookies; a 401 anywhere means
//! the caller must re-authenticate.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::codec::WireRecord;
use crate::error::{Error, Result};
use crate::models::Record;

/// Protocol revision announced to the server on every request.
const CLIENT_VERSION_HEADER: &str = "x-jot-client-version";
const CLIENT_VERSION: &str = "3";

/// The operations the sync engine needs from the remote authority
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Fetch the current server copy of a record.
    async fn fetch(&self, id: i64) -> Result<WireRecord>;

    /// Save a record. An empty reply means the record was deleted remotely
    /// or rejected.
    async fn save(&self, record: &Record) -> Result<Option<WireRecord>>;
}

/// HTTP implementation of the remote authority protocol
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Create a client for the given endpoint, e.g. `https://host/jot`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl RemoteAuthority for HttpRemote {
    async fn fetch(&self, id: i64) -> Result<WireRecord> {
        let response = self
            .client
            .get(format!("{}/record/{id}", self.base_url))
            .header("Accept", "application/json")
            .header(CLIENT_VERSION_HEADER, CLIENT_VERSION)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let payload = response.json::<RecordReply>().await?;
                payload
                    .record
                    .ok_or_else(|| Error::Api(format!("record {id} missing from fetch reply")))
            }
            StatusCode::UNAUTHORIZED => Err(Error::Unauthenticated),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Api(parse_api_error(status, &body)))
            }
        }
    }

    async fn save(&self, record: &Record) -> Result<Option<WireRecord>> {
        let mut form: Vec<(&str, String)> = Vec::with_capacity(3);
        if let Some(group) = &record.group {
            form.push(("group_id", group.id.to_string()));
        }
        if record.id >= 0 {
            form.push(("record_id", record.id.to_string()));
        }
        form.push(("text", record.text.clone()));

        let response = self
            .client
            .post(format!("{}/record/", self.base_url))
            .header("Accept", "application/json")
            .header(CLIENT_VERSION_HEADER, CLIENT_VERSION)
            .form(&form)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let payload = response.json::<RecordReply>().await?;
                Ok(payload.record)
            }
            StatusCode::UNAUTHORIZED => Err(Error::Unauthenticated),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Api(parse_api_error(status, &body)))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordReply {
    record: Option<WireRecord>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(Error::InvalidInput("endpoint must not be empty".into()));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "endpoint must include http:// or https://".into(),
        ))
    }
}
