//! # subledger-gmail
//!
//! Gmail REST client for subscription detection.
//!
//! ## Features
//!
//! - **Search**: paginated keyword search over the mailbox
//! - **Metadata fetch**: Subject/From/Date/List-Unsubscribe only
//! - **History sync**: `messageAdded` changes since a history cursor
//! - **Resilience**: rate limiting with `Retry-After`, exponential backoff
//!   with jitter, circuit breaking and adaptive batch widths
//!
//! ## Quick Start
//!
//! ```ignore
//! use subledger_gmail::{GmailClient, MailApi, MessageFormat, SearchQuery};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GmailClient::new(std::env::var("ACCESS_TOKEN")?)?;
//!     let query = SearchQuery::new().to_query_string();
//!     let page = client.search_message_ids(&query, 100, None).await?;
//!     for id in &page.ids {
//!         let message = client.get_message(id, MessageFormat::Metadata).await?;
//!         println!("{}: {}", message.from, message.subject);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The client itself never retries. Wrap calls with the primitives in
//! [`resilience`] (see `subledger-core`'s fetch layer).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod api;
mod client;
mod error;
mod message;
mod query;
pub mod resilience;

pub use api::{ChangePage, MailApi, SearchPage};
pub use client::{DEFAULT_BASE_URL, GmailClient};
pub use error::{Error, Result};
pub use message::{METADATA_HEADERS, Message, MessageFormat, MessageRef};
pub use query::SearchQuery;
