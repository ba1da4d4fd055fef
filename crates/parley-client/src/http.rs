//! REST implementation of the message API.
//!
//! Only the [`MessageApi`] collaborator is provided; object storage and the
//! change feed are vendor services wired in by the embedding application.
//! Timeouts are whatever the supplied [`reqwest::Client`] is configured with.

use parley_core::{Contact, ConversationId, Message};
use serde::de::DeserializeOwned;

use crate::{
    backend::{BackendError, MessageApi, PageRequest, SendRequest},
    config::ClientConfig,
};

impl From<reqwest::Error> for BackendError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// [`MessageApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpApi {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    /// Client for the API rooted at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http_client: reqwest::Client::new(), base_url: base_url.into() }
    }

    /// Client for the configured API base URL.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_base_url.clone())
    }

    /// Use a preconfigured HTTP client (timeouts, auth headers, ...).
    #[must_use]
    pub fn with_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

/// Check the status and decode the JSON body.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let reason = response.text().await.unwrap_or_default();
        return Err(BackendError::Status { status: status.as_u16(), reason });
    }
    response.json::<T>().await.map_err(|e| BackendError::Decode(e.to_string()))
}

impl MessageApi for HttpApi {
    async fn fetch_contacts(&self) -> Result<Vec<Contact>, BackendError> {
        let response = self.http_client.get(self.url("contacts")).send().await?;
        decode(response).await
    }

    async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, BackendError> {
        let response =
            self.http_client.get(self.url("contacts/search")).query(&[("q", query)]).send().await?;
        decode(response).await
    }

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        page: PageRequest,
    ) -> Result<Vec<Message>, BackendError> {
        tracing::debug!(conversation_id = %conversation_id, page = page.page, "fetching page");
        let response = self
            .http_client
            .get(self.url(&format!("messages/{conversation_id}")))
            .query(&[("page", page.page), ("limit", page.limit)])
            .send()
            .await?;
        decode(response).await
    }

    async fn send_message(&self, request: SendRequest) -> Result<Message, BackendError> {
        let response = self.http_client.post(self.url("messages")).json(&request).send().await?;
        decode(response).await
    }
}
