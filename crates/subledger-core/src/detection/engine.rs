//! Two-pass subscription detection.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use subledger_gmail::Message;
use tracing::debug;

use super::grouping::group_candidates;
use super::model::{
    Confidence, ContentAnalysis, DetectionSource, MerchantCandidate, PatternAnalysis, Subscription,
};
use super::rules::RuleSet;
use super::scoring::{analyze_content, analyze_pattern, chronological, volume_bonus};
use super::sender::{Sender, capitalize, clean_display_name, domain_stem};
use crate::config::DetectionSettings;
use crate::merchant::{MerchantDatabase, normalize_name};
use crate::{Error, Result};

const KNOWN_MERCHANT: i64 = 30;
const PROCESSOR_NAME: i64 = 25;
const MAX_PRICE: f64 = 1000.0;

/// Why a scored candidate was not reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A hard-exclusion keyword zeroed the score.
    HardExcluded,
    /// Score under the threshold or low confidence.
    LowScore,
    /// No usable price.
    NoPrice,
    /// Cancellation language was found.
    Cancelled,
    /// The latest message is too old for the cadence.
    Stale,
}

/// Full scoring breakdown for one candidate.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Display name chosen for the candidate.
    pub name: String,
    /// Final, non-negative score.
    pub score: u32,
    /// Tier for `score`.
    pub confidence: Confidence,
    /// Content signals.
    pub content: ContentAnalysis,
    /// Timing signals.
    pub pattern: PatternAnalysis,
    /// Reported subscription, or the reason it was withheld.
    pub outcome: std::result::Result<Subscription, Rejection>,
}

/// Turns fetched messages into scored subscriptions.
#[derive(Debug, Clone)]
pub struct DetectionEngine {
    rules: RuleSet,
    merchants: Arc<MerchantDatabase>,
    min_score: u32,
}

impl DetectionEngine {
    /// Builds an engine over `merchants` with the given thresholds.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule patterns fail to compile.
    pub fn new(merchants: Arc<MerchantDatabase>, settings: &DetectionSettings) -> Result<Self> {
        let rules = RuleSet::with_extra_blocked_domains(&settings.extra_blocked_domains)
            .map_err(|e| Error::Config(format!("detection rules: {e}")))?;
        Ok(Self {
            rules,
            merchants,
            min_score: settings.min_score,
        })
    }

    /// Engine with the built-in merchant table and default thresholds.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule patterns fail to compile.
    pub fn with_defaults() -> Result<Self> {
        Self::new(
            Arc::new(MerchantDatabase::builtin()),
            &DetectionSettings::default(),
        )
    }

    /// Compiled rules.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Sender domain a message would be grouped under.
    #[must_use]
    pub fn sender_domain(message: &Message) -> Option<String> {
        Sender::parse(&message.from).map(|s| s.domain)
    }

    /// Pass 1: filters senders and groups messages into candidates.
    #[must_use]
    pub fn group(&self, messages: &[Message]) -> Vec<MerchantCandidate> {
        group_candidates(&self.rules, &self.merchants, messages)
    }

    /// Pass 2 for one candidate, relative to `now`.
    #[must_use]
    pub fn evaluate(&self, candidate: &MerchantCandidate, now: DateTime<Utc>) -> Evaluation {
        let messages = chronological(&candidate.messages);
        let content = analyze_content(&self.rules, &messages, candidate.merchant.as_ref());
        let pattern = analyze_pattern(&messages);

        let mut raw = content.score + pattern.score + volume_bonus(messages.len());
        if candidate.merchant.is_some() {
            raw += KNOWN_MERCHANT;
        }
        if candidate.via_processor && candidate.extracted_name.is_some() {
            raw += PROCESSOR_NAME;
        }

        let score = if content.hard_excluded {
            0
        } else {
            u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
        };
        let confidence = Confidence::from_score(score);
        let name = display_name(candidate);

        let outcome = self
            .rejection(&content, &pattern, score, confidence, now)
            .map_or_else(
                || Ok(build_subscription(candidate, &name, &content, &pattern, score, confidence)),
                Err,
            );

        debug!(
            "Candidate {:?} ({}): score={} raw={} content={} pattern={} cadence={} price={:?} -> {:?}",
            name,
            candidate.domain,
            score,
            raw,
            content.score,
            pattern.score,
            pattern.cadence.as_str(),
            content.price,
            outcome.as_ref().err()
        );

        Evaluation {
            name,
            score,
            confidence,
            content,
            pattern,
            outcome,
        }
    }

    /// Runs both passes and returns deduplicated subscriptions, best first.
    #[must_use]
    pub fn detect(&self, messages: &[Message], now: DateTime<Utc>) -> Vec<Subscription> {
        let candidates = self.group(messages);

        let mut best: HashMap<String, Subscription> = HashMap::new();
        for candidate in &candidates {
            let Ok(subscription) = self.evaluate(candidate, now).outcome else {
                continue;
            };
            let key = subscription.name.to_lowercase();
            match best.get(&key) {
                Some(existing) if existing.score >= subscription.score => {}
                _ => {
                    best.insert(key, subscription);
                }
            }
        }

        let mut subscriptions: Vec<Subscription> = best.into_values().collect();
        subscriptions.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));

        debug!(
            "Detected {} subscriptions from {} candidates",
            subscriptions.len(),
            candidates.len()
        );
        subscriptions
    }

    fn rejection(
        &self,
        content: &ContentAnalysis,
        pattern: &PatternAnalysis,
        score: u32,
        confidence: Confidence,
        now: DateTime<Utc>,
    ) -> Option<Rejection> {
        if content.hard_excluded {
            return Some(Rejection::HardExcluded);
        }
        if score < self.min_score || confidence == Confidence::Low {
            return Some(Rejection::LowScore);
        }
        if !content.price.is_some_and(|p| p > 0.0 && p < MAX_PRICE) {
            return Some(Rejection::NoPrice);
        }
        if content.cancellation {
            return Some(Rejection::Cancelled);
        }
        let stale = pattern.last_date.is_none_or(|last| {
            now.signed_duration_since(last).num_days() > pattern.cadence.stale_after_days()
        });
        if stale {
            return Some(Rejection::Stale);
        }
        None
    }
}

fn build_subscription(
    candidate: &MerchantCandidate,
    name: &str,
    content: &ContentAnalysis,
    pattern: &PatternAnalysis,
    score: u32,
    confidence: Confidence,
) -> Subscription {
    let merchant_id = match (&candidate.merchant, &candidate.extracted_name) {
        (Some(merchant), _) => merchant.id.clone(),
        (None, Some(extracted)) if candidate.via_processor => normalize_name(extracted),
        _ => candidate.domain.clone(),
    };
    let cadence = pattern.cadence;

    Subscription {
        merchant_id,
        name: name.to_string(),
        price: content.price.unwrap_or_default(),
        cadence,
        confidence,
        score,
        last_charge: pattern.last_date,
        next_charge: pattern.last_date.and_then(|d| cadence.advance(d)),
        email_count: candidate.messages.len(),
        sender_address: candidate.sender_address.clone(),
        source: if candidate.via_processor {
            DetectionSource::PaymentProcessor
        } else {
            DetectionSource::Email
        },
    }
}

/// Known merchant, then extracted name, then sender name, then domain.
fn display_name(candidate: &MerchantCandidate) -> String {
    if let Some(merchant) = &candidate.merchant {
        return merchant.name.clone();
    }
    if let Some(extracted) = &candidate.extracted_name {
        return extracted.clone();
    }
    if let Some(cleaned) = candidate.display_name.as_deref().and_then(clean_display_name) {
        return cleaned;
    }
    capitalize(domain_stem(&candidate.domain))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::detection::Cadence;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn message(id: &str, from: &str, subject: &str, days_ago: i64) -> Message {
        Message {
            id: id.into(),
            thread_id: id.into(),
            snippet: String::new(),
            subject: subject.into(),
            from: from.into(),
            internal_date: (now() - Duration::days(days_ago)).timestamp_millis(),
            has_unsubscribe_header: true,
        }
    }

    fn monthly(prefix: &str, from: &str, subject: &str, count: i64) -> Vec<Message> {
        (0..count)
            .map(|i| message(&format!("{prefix}{i}"), from, subject, 2 + i * 30))
            .collect()
    }

    #[test]
    fn test_known_merchant_named_from_table() {
        let engine = DetectionEngine::with_defaults().unwrap();
        let messages = monthly(
            "n",
            "Netflix <info@mailer.netflix.com>",
            "Your Netflix membership: $15.49/month",
            4,
        );
        let subs = engine.detect(&messages, now());

        assert_eq!(subs.len(), 1);
        let netflix = &subs[0];
        assert_eq!(netflix.merchant_id, "netflix");
        assert_eq!(netflix.name, "Netflix");
        assert_eq!(netflix.price, 15.49);
        assert_eq!(netflix.cadence, Cadence::Monthly);
        assert_eq!(netflix.source, DetectionSource::Email);
        assert_eq!(netflix.email_count, 4);
        assert_eq!(netflix.sender_address, "info@mailer.netflix.com");
    }

    #[test]
    fn test_unknown_sender_named_from_domain() {
        let engine = DetectionEngine::with_defaults().unwrap();
        let messages = monthly(
            "a",
            "no-reply@acme-tools.io",
            "Your subscription renews: $9.00/mo",
            4,
        );
        let subs = engine.detect(&messages, now());
        assert_eq!(subs[0].name, "Acme-tools");
        assert_eq!(subs[0].merchant_id, "acme-tools.io");
    }

    #[test]
    fn test_processor_candidate() {
        let engine = DetectionEngine::with_defaults().unwrap();
        let messages = monthly(
            "r",
            "Stripe <receipts@stripe.com>",
            "Your receipt from Raycast for your subscription: $8.00/mo",
            3,
        );
        let subs = engine.detect(&messages, now());

        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].name, "Raycast");
        assert_eq!(subs[0].merchant_id, "raycast");
        assert_eq!(subs[0].source, DetectionSource::PaymentProcessor);
    }

    #[test]
    fn test_known_merchant_bonus() {
        let engine = DetectionEngine::with_defaults().unwrap();
        let messages = monthly(
            "n",
            "Netflix <info@mailer.netflix.com>",
            "Your Netflix membership: $15.49/month",
            4,
        );
        let candidates = engine.group(&messages);
        let evaluation = engine.evaluate(&candidates[0], now());
        let signals = evaluation.content.score + evaluation.pattern.score + volume_bonus(4);
        assert_eq!(i64::from(evaluation.score), signals + 30);
    }

    #[test]
    fn test_processor_name_bonus() {
        let engine = DetectionEngine::with_defaults().unwrap();
        let messages = monthly(
            "r",
            "Stripe <receipts@stripe.com>",
            "Your receipt from Raycast for your subscription: $8.00/mo",
            3,
        );
        let candidates = engine.group(&messages);
        assert!(candidates[0].merchant.is_none());
        let evaluation = engine.evaluate(&candidates[0], now());
        let signals = evaluation.content.score + evaluation.pattern.score + volume_bonus(3);
        assert_eq!(i64::from(evaluation.score), signals + 25);
    }

    #[test]
    fn test_stale_subscription_dropped() {
        let engine = DetectionEngine::with_defaults().unwrap();
        let messages: Vec<Message> = (0..4)
            .map(|i| {
                message(
                    &i.to_string(),
                    "Acme <billing@acme.io>",
                    "Your subscription renews: $9.00/mo",
                    90 + i * 30,
                )
            })
            .collect();

        let candidates = engine.group(&messages);
        let evaluation = engine.evaluate(&candidates[0], now());
        assert!(evaluation.score >= 70);
        assert_eq!(evaluation.outcome.unwrap_err(), Rejection::Stale);
    }

    #[test]
    fn test_missing_price_dropped() {
        let engine = DetectionEngine::with_defaults().unwrap();
        let messages = monthly("p", "Acme <billing@acme.io>", "Your subscription renews", 6);
        let candidates = engine.group(&messages);
        let evaluation = engine.evaluate(&candidates[0], now());
        assert_eq!(evaluation.outcome.unwrap_err(), Rejection::NoPrice);
    }

    #[test]
    fn test_duplicate_names_keep_highest_score() {
        let engine = DetectionEngine::with_defaults().unwrap();
        let mut messages = monthly(
            "a",
            "Acme <billing@acme.io>",
            "Your subscription renews: $9.00/mo",
            6,
        );
        messages.extend(monthly(
            "b",
            "Acme <hello@acme.com>",
            "Your subscription renews: $9.00/mo",
            3,
        ));

        let subs = engine.detect(&messages, now());
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].sender_address, "billing@acme.io");
        assert_eq!(subs[0].email_count, 6);
    }

    #[test]
    fn test_next_charge_follows_cadence() {
        let engine = DetectionEngine::with_defaults().unwrap();
        let messages = monthly(
            "a",
            "Acme <billing@acme.io>",
            "Your subscription renews: $9.00/mo",
            4,
        );
        let subs = engine.detect(&messages, now());
        let last = subs[0].last_charge.unwrap();
        assert_eq!(last, now() - Duration::days(2));
        assert_eq!(subs[0].next_charge, Cadence::Monthly.advance(last));
    }

    #[test]
    fn test_extra_blocked_domain_from_settings() {
        let settings = DetectionSettings {
            extra_blocked_domains: vec!["acme.io".into()],
            ..DetectionSettings::default()
        };
        let engine = DetectionEngine::new(Arc::new(MerchantDatabase::builtin()), &settings).unwrap();
        let messages = monthly(
            "a",
            "Acme <billing@acme.io>",
            "Your subscription renews: $9.00/mo",
            4,
        );
        assert!(engine.detect(&messages, now()).is_empty());
    }
}
