//! Logical remote mail API surface.
//!
//! [`MailApi`] is the seam between the resilience layer and the transport.
//! [`crate::GmailClient`] implements it over HTTPS; tests implement it with
//! scripted fakes.

use std::future::Future;

use crate::error::Result;
use crate::message::{Message, MessageFormat};

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    /// Message ids on this page.
    pub ids: Vec<String>,
    /// Token for the next page, if any.
    pub next_page_token: Option<String>,
}

/// One page of change records since a history cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangePage {
    /// Ids of messages added since the cursor.
    pub added_ids: Vec<String>,
    /// Token for the next page, if any.
    pub next_page_token: Option<String>,
    /// Latest history cursor reported by the server.
    pub cursor: Option<String>,
}

/// Remote mail operations consumed by the fetch layer.
///
/// Every method maps HTTP failures onto [`crate::Error`]: 429 is
/// `RateLimited`, 401 is `Unauthorized`, and an expired history cursor is
/// `CursorExpired`.
pub trait MailApi: Send + Sync + 'static {
    /// Paginated keyword search.
    fn search_message_ids(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<SearchPage>> + Send;

    /// Fetches a single message.
    fn get_message(
        &self,
        id: &str,
        format: MessageFormat,
    ) -> impl Future<Output = Result<Message>> + Send;

    /// Lists `messageAdded` change records since `cursor`.
    fn get_changes_since(
        &self,
        cursor: &str,
        label_filter: Option<&str>,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<ChangePage>> + Send;

    /// Returns the mailbox's current history cursor.
    fn current_cursor(&self) -> impl Future<Output = Result<String>> + Send;
}
