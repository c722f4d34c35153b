//! Paginated search, batched detail fetches and history paging.

use std::collections::HashSet;
use std::sync::Arc;

use subledger_gmail::resilience::CircuitState;
use subledger_gmail::{Error as ApiError, MailApi, Message, SearchQuery};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::guard::ResilienceGuard;
use crate::cache::MessageCache;
use crate::config::{Config, FetchSettings};
use crate::sync::compare_cursors;
use crate::Result;

/// Messages resolved for a set of ids.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Resolved messages, oldest first.
    pub messages: Vec<Message>,
    /// Ids served from the cache.
    pub cached: usize,
    /// Ids fetched from the remote API.
    pub fetched: usize,
    /// Ids the remote API no longer knows about.
    pub missing: usize,
}

/// Added message ids since a cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Added ids, deduplicated, in server order.
    pub ids: Vec<String>,
    /// Newest cursor reported across pages.
    pub cursor: Option<String>,
}

/// Mail API client wrapped in pacing, retries, circuit breaking and the
/// message cache.
pub struct ResilientFetchClient<A: MailApi> {
    api: Arc<A>,
    guard: ResilienceGuard,
    cache: Arc<MessageCache>,
    query: SearchQuery,
    settings: FetchSettings,
}

impl<A: MailApi> ResilientFetchClient<A> {
    /// Creates a client using the resilience and fetch sections of `config`.
    #[must_use]
    pub fn new(api: Arc<A>, cache: Arc<MessageCache>, config: &Config) -> Self {
        let guard = ResilienceGuard::new(
            config.rate_limit.into(),
            config.circuit_breaker.into(),
            config.batch.into(),
        );
        Self {
            api,
            guard,
            cache,
            query: config.query.clone(),
            settings: config.fetch.clone(),
        }
    }

    /// Shared resilience state.
    #[must_use]
    pub const fn guard(&self) -> &ResilienceGuard {
        &self.guard
    }

    /// Backing message cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<MessageCache> {
        &self.cache
    }

    /// Current circuit state.
    pub async fn circuit_state(&self) -> CircuitState {
        self.guard.circuit_state().await
    }

    /// Mailbox's current history cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails after retries.
    pub async fn current_cursor(&self) -> Result<String> {
        Ok(self
            .guard
            .call("current_cursor", || self.api.current_cursor())
            .await?)
    }

    /// Collects message ids for the configured query, up to `max_results`.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fails after retries.
    pub async fn search_ids(&self) -> Result<Vec<String>> {
        let query = self.query.to_query_string();
        let limit = self.query.max_results;
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut token: Option<String> = None;

        while ids.len() < limit {
            let remaining = u32::try_from(limit - ids.len()).unwrap_or(u32::MAX);
            let page_size = self.query.page_size.clamp(1, remaining.max(1));
            let page = self
                .guard
                .call("search", || {
                    self.api
                        .search_message_ids(&query, page_size, token.as_deref())
                })
                .await?;

            for id in page.ids {
                if ids.len() >= limit {
                    break;
                }
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
            match page.next_page_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        debug!("Search returned {} ids", ids.len());
        Ok(ids)
    }

    /// Resolves ids to messages, serving hits from the cache and fetching
    /// the rest in concurrent batches.
    ///
    /// Batch width comes from the adaptive sizer at each launch. Ids the
    /// server reports as missing are skipped. Fetched messages are written
    /// back to the cache batch by batch.
    ///
    /// # Errors
    ///
    /// Returns the first non-skippable failure in a batch.
    pub async fn fetch_messages(&self, ids: &[String]) -> Result<FetchOutcome> {
        let (mut messages, pending) = self.cache.partition(ids).await;
        let mut outcome = FetchOutcome {
            cached: messages.len(),
            ..FetchOutcome::default()
        };

        let format = self.settings.message_format;
        let pacing = self.settings.batch_pacing();
        let mut remaining = pending.as_slice();
        let mut first = true;

        while !remaining.is_empty() {
            if !first && !pacing.is_zero() {
                sleep(pacing).await;
            }
            first = false;

            let width = self.guard.batch_size().await.clamp(1, remaining.len());
            let (batch, rest) = remaining.split_at(width);
            remaining = rest;

            let mut join_set = JoinSet::new();
            for id in batch {
                let api = Arc::clone(&self.api);
                let guard = self.guard.clone();
                let id = id.clone();
                join_set.spawn(async move {
                    let result = guard
                        .call("get_message", || api.get_message(&id, format))
                        .await;
                    (id, result)
                });
            }

            let mut fetched = Vec::with_capacity(batch.len());
            let mut failure = None;
            while let Some(joined) = join_set.join_next().await {
                let (id, result) = joined?;
                match result {
                    Ok(message) => fetched.push(message),
                    Err(ApiError::NotFound(_)) => {
                        warn!("Message {} disappeared before it could be fetched", id);
                        outcome.missing += 1;
                    }
                    Err(e) => {
                        failure.get_or_insert(e);
                    }
                }
            }

            self.cache.insert_many(&fetched).await;
            outcome.fetched += fetched.len();
            messages.extend(fetched);

            if let Some(e) = failure {
                return Err(e.into());
            }
        }

        messages.sort_by(|a, b| {
            a.internal_date
                .cmp(&b.internal_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        info!(
            "Resolved {} messages ({} cached, {} fetched, {} missing)",
            messages.len(),
            outcome.cached,
            outcome.fetched,
            outcome.missing
        );
        outcome.messages = messages;
        Ok(outcome)
    }

    /// Searches and resolves every matching message.
    ///
    /// # Errors
    ///
    /// Returns an error if the search or any fetch batch fails.
    pub async fn full_scan(&self) -> Result<FetchOutcome> {
        let ids = self.search_ids().await?;
        self.fetch_messages(&ids).await
    }

    /// Lists ids added since `cursor` across all pages.
    ///
    /// # Errors
    ///
    /// Returns `CursorExpired` when the server can no longer answer from
    /// `cursor`, or any failure after retries.
    pub async fn changes_since(&self, cursor: &str) -> Result<ChangeSet> {
        let label = self.settings.history_label.as_deref();
        let mut seen = HashSet::new();
        let mut changes = ChangeSet::default();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .guard
                .call("history", || {
                    self.api
                        .get_changes_since(cursor, label, token.as_deref())
                })
                .await?;

            for id in page.added_ids {
                if seen.insert(id.clone()) {
                    changes.ids.push(id);
                }
            }
            if let Some(next) = page.cursor.filter(|c| !c.is_empty()) {
                let newer = changes.cursor.as_deref().is_none_or(|current| {
                    compare_cursors(&next, current).is_some_and(std::cmp::Ordering::is_gt)
                });
                if newer {
                    changes.cursor = Some(next);
                }
            }
            match page.next_page_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        debug!(
            "History since {} added {} ids",
            cursor,
            changes.ids.len()
        );
        Ok(changes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use subledger_gmail::{ChangePage, MessageFormat, SearchPage};

    use super::*;
    use crate::cache::CacheConfig;

    #[derive(Default)]
    struct FakeApi {
        pages: Vec<SearchPage>,
        messages: HashMap<String, Message>,
        history: Vec<ChangePage>,
        detail_calls: AtomicUsize,
        page_tokens: Mutex<Vec<Option<String>>>,
    }

    impl MailApi for FakeApi {
        async fn search_message_ids(
            &self,
            _query: &str,
            _page_size: u32,
            page_token: Option<&str>,
        ) -> subledger_gmail::Result<SearchPage> {
            self.page_tokens
                .lock()
                .unwrap()
                .push(page_token.map(str::to_string));
            let index = page_token.map_or(0, |t| t.parse::<usize>().unwrap());
            Ok(self.pages[index].clone())
        }

        async fn get_message(
            &self,
            id: &str,
            _format: MessageFormat,
        ) -> subledger_gmail::Result<Message> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            self.messages
                .get(id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(id.to_string()))
        }

        async fn get_changes_since(
            &self,
            _cursor: &str,
            _label_filter: Option<&str>,
            page_token: Option<&str>,
        ) -> subledger_gmail::Result<ChangePage> {
            let index = page_token.map_or(0, |t| t.parse::<usize>().unwrap());
            Ok(self.history[index].clone())
        }

        async fn current_cursor(&self) -> subledger_gmail::Result<String> {
            Ok("100".into())
        }
    }

    fn message(id: &str, day: i64) -> Message {
        Message {
            id: id.into(),
            thread_id: id.into(),
            snippet: String::new(),
            subject: format!("Receipt {id}"),
            from: "Acme <billing@acme.io>".into(),
            internal_date: day * 86_400_000,
            has_unsubscribe_header: false,
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> SearchPage {
        SearchPage {
            ids: ids.iter().map(|s| (*s).to_string()).collect(),
            next_page_token: next.map(str::to_string),
        }
    }

    fn client(api: FakeApi) -> ResilientFetchClient<FakeApi> {
        let mut config = Config::default();
        config.rate_limit.min_interval_ms = 0;
        config.fetch.batch_pacing_ms = 0;
        let cache = Arc::new(MessageCache::memory_only(CacheConfig::default()));
        ResilientFetchClient::new(Arc::new(api), cache, &config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_follows_pages_and_dedupes() {
        let api = FakeApi {
            pages: vec![page(&["a", "b"], Some("1")), page(&["b", "c"], None)],
            ..FakeApi::default()
        };
        let client = client(api);

        let ids = client.search_ids().await.unwrap();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(
            *client.api.page_tokens.lock().unwrap(),
            vec![None, Some("1".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_uses_cache_and_skips_missing() {
        let mut messages = HashMap::new();
        for (id, day) in [("a", 1), ("b", 2), ("c", 3)] {
            messages.insert(id.to_string(), message(id, day));
        }
        let client = client(FakeApi {
            messages,
            ..FakeApi::default()
        });
        client.cache.insert_many(&[message("a", 1)]).await;

        let ids: Vec<String> = ["c", "a", "b", "gone"].map(String::from).to_vec();
        let outcome = client.fetch_messages(&ids).await.unwrap();

        assert_eq!(outcome.cached, 1);
        assert_eq!(outcome.fetched, 2);
        assert_eq!(outcome.missing, 1);
        let order: Vec<_> = outcome.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(client.api.detail_calls.load(Ordering::SeqCst), 3);

        let again = client.fetch_messages(&ids[..3]).await.unwrap();
        assert_eq!(again.cached, 3);
        assert_eq!(client.api.detail_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_merge_pages_and_keep_newest_cursor() {
        let client = client(FakeApi {
            history: vec![
                ChangePage {
                    added_ids: vec!["x".into(), "y".into()],
                    next_page_token: Some("1".into()),
                    cursor: Some("120".into()),
                },
                ChangePage {
                    added_ids: vec!["y".into(), "z".into()],
                    next_page_token: None,
                    cursor: Some("110".into()),
                },
            ],
            ..FakeApi::default()
        });

        let changes = client.changes_since("100").await.unwrap();
        assert_eq!(changes.ids, vec!["x", "y", "z"]);
        assert_eq!(changes.cursor.as_deref(), Some("120"));
    }
}
