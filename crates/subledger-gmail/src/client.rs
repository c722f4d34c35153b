//! Gmail REST implementation of [`MailApi`].

use reqwest::{Client, Response, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::api::{ChangePage, MailApi, SearchPage};
use crate::error::{Error, Result};
use crate::message::{METADATA_HEADERS, Message, MessageFormat, MessageRef, RawMessage};

/// Gmail API root for the authenticated user.
pub const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/";

/// Which endpoint a request targets; decides how 404 is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Search,
    Message,
    History,
    Profile,
}

/// HTTP client for the Gmail API.
///
/// The bearer token is opaque to this crate; refreshing it after an
/// [`Error::Unauthorized`] is the caller's job.
#[derive(Debug, Clone)]
pub struct GmailClient {
    base_url: Url,
    access_token: String,
    http_client: Client,
}

impl GmailClient {
    /// Creates a client against the public Gmail endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in base URL fails to parse.
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(DEFAULT_BASE_URL)?,
            access_token: access_token.into(),
            http_client: Client::new(),
        })
    }

    /// Points the client at a different API root (proxies, test servers).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Result<Self> {
        let mut raw = base_url.as_ref().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        self.base_url = Url::parse(&raw)?;
        Ok(self)
    }

    /// Returns the configured API root.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        endpoint: Endpoint,
    ) -> Result<T> {
        let url = self.base_url.join(path)?;
        debug!("GET {} ({:?})", url.path(), endpoint);

        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        let response = check_status(response, endpoint, path).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(Into::into)
    }
}

/// Maps non-success statuses onto the error taxonomy.
async fn check_status(response: Response, endpoint: Endpoint, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Err(Error::RateLimited { retry_after })
        }
        StatusCode::UNAUTHORIZED => Err(Error::Unauthorized),
        StatusCode::NOT_FOUND if endpoint == Endpoint::History => Err(Error::CursorExpired),
        StatusCode::NOT_FOUND => Err(Error::NotFound(path.to_string())),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(Error::status(status.as_u16(), body))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    #[serde(default)]
    history: Vec<HistoryRecord>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    history_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    #[serde(default)]
    messages_added: Vec<MessageAdded>,
}

#[derive(Debug, Deserialize)]
struct MessageAdded {
    message: MessageRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    history_id: String,
}

impl From<HistoryResponse> for ChangePage {
    fn from(response: HistoryResponse) -> Self {
        let mut added_ids: Vec<String> = Vec::new();
        for record in response.history {
            for added in record.messages_added {
                if !added_ids.contains(&added.message.id) {
                    added_ids.push(added.message.id);
                }
            }
        }
        Self {
            added_ids,
            next_page_token: response.next_page_token,
            cursor: response.history_id,
        }
    }
}

impl MailApi for GmailClient {
    async fn search_message_ids(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<SearchPage> {
        let page_size = page_size.to_string();
        let mut params = vec![("q", query), ("maxResults", page_size.as_str())];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response: SearchResponse = self.get_json("messages", &params, Endpoint::Search).await?;
        Ok(SearchPage {
            ids: response.messages.into_iter().map(|m| m.id).collect(),
            next_page_token: response.next_page_token,
        })
    }

    async fn get_message(&self, id: &str, format: MessageFormat) -> Result<Message> {
        let mut params = vec![("format", format.as_str())];
        if format == MessageFormat::Metadata {
            params.extend(METADATA_HEADERS.iter().map(|h| ("metadataHeaders", *h)));
        }

        let raw: RawMessage = self
            .get_json(&format!("messages/{id}"), &params, Endpoint::Message)
            .await?;
        Ok(Message::from(raw))
    }

    async fn get_changes_since(
        &self,
        cursor: &str,
        label_filter: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ChangePage> {
        let mut params = vec![("startHistoryId", cursor), ("historyTypes", "messageAdded")];
        if let Some(label) = label_filter {
            params.push(("labelId", label));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response: HistoryResponse = self.get_json("history", &params, Endpoint::History).await?;
        Ok(ChangePage::from(response))
    }

    async fn current_cursor(&self) -> Result<String> {
        let profile: ProfileResponse = self.get_json("profile", &[], Endpoint::Profile).await?;
        Ok(profile.history_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = GmailClient::new("token").unwrap();
        assert_eq!(client.base_url().as_str(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = GmailClient::new("token")
            .unwrap()
            .with_base_url("http://localhost:8080/gmail/v1/users/me")
            .unwrap();
        assert_eq!(
            client.base_url().join("messages").unwrap().as_str(),
            "http://localhost:8080/gmail/v1/users/me/messages"
        );
    }

    #[test]
    fn test_history_response_flattens_added_ids() {
        let json = r#"{
            "history": [
                {"id": "10", "messagesAdded": [{"message": {"id": "a", "threadId": "t"}}]},
                {"id": "11", "messagesAdded": [
                    {"message": {"id": "b", "threadId": "t"}},
                    {"message": {"id": "a", "threadId": "t"}}
                ]},
                {"id": "12"}
            ],
            "historyId": "12"
        }"#;

        let response: HistoryResponse = serde_json::from_str(json).unwrap();
        let page = ChangePage::from(response);
        assert_eq!(page.added_ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(page.cursor.as_deref(), Some("12"));
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn test_search_response_without_messages() {
        let response: SearchResponse =
            serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(response.messages.is_empty());
        assert!(response.next_page_token.is_none());
    }
}
