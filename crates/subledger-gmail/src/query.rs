//! Gmail search query construction.

use serde::{Deserialize, Serialize};

/// Keyword search used for full scans.
///
/// Renders to Gmail search syntax: `{a b}` is a disjunction, `-{a b}`
/// excludes any of the terms, `newer_than:12m` bounds recency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    /// Terms matched against the subject line.
    pub subject_keywords: Vec<String>,
    /// Terms matched anywhere in the message.
    pub body_keywords: Vec<String>,
    /// Terms whose presence removes a message from the results.
    pub excluded_keywords: Vec<String>,
    /// Optional provider-side category (e.g. `updates`, `purchases`).
    pub category: Option<String>,
    /// Recency window in months.
    pub lookback_months: u32,
    /// Search page size.
    pub page_size: u32,
    /// Cap on collected message references.
    pub max_results: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            subject_keywords: to_strings(&[
                "receipt",
                "subscription",
                "renewal",
                "invoice",
                "membership",
                "billing",
                "payment",
                "trial",
            ]),
            body_keywords: to_strings(&[
                "subscription",
                "renews",
                "auto-renew",
                "billed monthly",
                "billed annually",
                "recurring",
                "your plan",
                "next billing date",
            ]),
            excluded_keywords: to_strings(&["shipped", "tracking number", "out for delivery"]),
            category: None,
            lookback_months: 12,
            page_size: 100,
            max_results: 500,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Quotes multi-word terms.
fn term(keyword: &str) -> String {
    if keyword.contains(char::is_whitespace) {
        format!("\"{keyword}\"")
    } else {
        keyword.to_string()
    }
}

fn disjunction(keywords: &[String]) -> String {
    let terms: Vec<String> = keywords.iter().map(|k| term(k)).collect();
    format!("{{{}}}", terms.join(" "))
}

impl SearchQuery {
    /// Creates the default subscription-oriented query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the provider-side category filter.
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the recency window in months.
    #[must_use]
    pub const fn lookback_months(mut self, months: u32) -> Self {
        self.lookback_months = months;
        self
    }

    /// Sets the cap on collected references.
    #[must_use]
    pub const fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Renders the Gmail search string.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let mut parts = Vec::new();

        let required = match (
            self.subject_keywords.is_empty(),
            self.body_keywords.is_empty(),
        ) {
            (false, false) => Some(format!(
                "(subject:{} OR {})",
                disjunction(&self.subject_keywords),
                disjunction(&self.body_keywords)
            )),
            (false, true) => Some(format!("subject:{}", disjunction(&self.subject_keywords))),
            (true, false) => Some(disjunction(&self.body_keywords)),
            (true, true) => None,
        };
        parts.extend(required);

        if !self.excluded_keywords.is_empty() {
            parts.push(format!("-{}", disjunction(&self.excluded_keywords)));
        }
        if let Some(category) = &self.category {
            parts.push(format!("category:{category}"));
        }
        if self.lookback_months > 0 {
            parts.push(format!("newer_than:{}m", self.lookback_months));
        }

        parts.join(" ")
    }
}
