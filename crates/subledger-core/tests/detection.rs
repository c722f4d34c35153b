//! Detection scenarios over hand-built mailboxes.

#![allow(clippy::unwrap_used)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use subledger_core::detection::{
    Cadence, Confidence, DetectionEngine, Rejection, RuleSet, classify_interval,
};
use subledger_gmail::Message;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

fn message(id: &str, from: &str, subject: &str, days_ago: i64) -> Message {
    Message {
        id: id.into(),
        thread_id: id.into(),
        snippet: String::new(),
        subject: subject.into(),
        from: from.into(),
        internal_date: (now() - Duration::days(days_ago)).timestamp_millis(),
        has_unsubscribe_header: false,
    }
}

fn figma_history() -> Vec<Message> {
    [3, 33, 62, 93, 122, 153]
        .iter()
        .enumerate()
        .map(|(i, days_ago)| {
            let mut m = message(
                &format!("figma-{i}"),
                "Figma <billing@figma.com>",
                "Receipt from Figma for your subscription",
                *days_ago,
            );
            m.snippet = "Professional plan $12.00/mo, billed monthly".into();
            m.has_unsubscribe_header = true;
            m
        })
        .collect()
}

#[test]
fn test_monthly_receipts_detected_with_high_confidence() {
    let engine = DetectionEngine::with_defaults().unwrap();
    let subscriptions = engine.detect(&figma_history(), now());

    assert_eq!(subscriptions.len(), 1);
    let figma = &subscriptions[0];
    assert_eq!(figma.name, "Figma");
    assert_eq!(figma.merchant_id, "figma.com");
    assert!(figma.score >= 70, "score was {}", figma.score);
    assert_eq!(figma.confidence, Confidence::High);
    assert_eq!(figma.cadence, Cadence::Monthly);
    assert!((figma.price - 12.00).abs() < f64::EPSILON);
    assert_eq!(figma.email_count, 6);
    assert_eq!(figma.sender_address, "billing@figma.com");
}

#[test]
fn test_shipping_notice_is_zeroed_and_dropped() {
    let engine = DetectionEngine::with_defaults().unwrap();
    let messages = vec![
        message(
            "ship-1",
            "Acme Store <orders@acmestore.com>",
            "Your order #4471 has shipped - tracking number 1Z999AA1",
            2,
        ),
        message(
            "ship-2",
            "Acme Store <orders@acmestore.com>",
            "Your Acme subscription renewed: $9.99/month",
            32,
        ),
    ];

    let candidates = engine.group(&messages);
    assert_eq!(candidates.len(), 1);
    let evaluation = engine.evaluate(&candidates[0], now());
    assert_eq!(evaluation.score, 0);
    assert!(evaluation.content.hard_excluded);
    assert_eq!(evaluation.outcome, Err(Rejection::HardExcluded));

    assert!(engine.detect(&messages, now()).is_empty());
}

#[test]
fn test_cancellation_vetoes_a_high_score() {
    let engine = DetectionEngine::with_defaults().unwrap();
    let mut messages: Vec<Message> = [90, 60, 30]
        .iter()
        .enumerate()
        .map(|(i, days_ago)| {
            message(
                &format!("charge-{i}"),
                "Acme <billing@acme.io>",
                "Your Acme Pro subscription renewed: $9.99/month",
                *days_ago,
            )
        })
        .collect();
    messages.push(message(
        "cancel",
        "Acme <billing@acme.io>",
        "Your subscription has been cancelled",
        0,
    ));

    let candidates = engine.group(&messages);
    let evaluation = engine.evaluate(&candidates[0], now());
    assert!(evaluation.score >= 50, "score was {}", evaluation.score);
    assert!(evaluation.content.cancellation);
    assert_eq!(evaluation.outcome, Err(Rejection::Cancelled));
}

#[test]
fn test_lapsed_subscription_is_dropped() {
    let engine = DetectionEngine::with_defaults().unwrap();
    let messages: Vec<Message> = figma_history()
        .into_iter()
        .map(|mut m| {
            m.internal_date -= Duration::days(120).num_milliseconds();
            m
        })
        .collect();
    assert!(engine.detect(&messages, now()).is_empty());
}

#[test]
fn test_results_independent_of_arrival_order() {
    let engine = DetectionEngine::with_defaults().unwrap();
    let mut messages = figma_history();
    let forward = engine.detect(&messages, now());
    messages.reverse();
    let reversed = engine.detect(&messages, now());
    assert_eq!(forward, reversed);
}

#[test]
fn test_cadence_band_edges() {
    assert_eq!(classify_interval(6.0).0, Cadence::Weekly);
    assert_eq!(classify_interval(8.0).0, Cadence::Weekly);
    assert_eq!(classify_interval(25.0), (Cadence::Monthly, 20));
    assert_eq!(classify_interval(35.0), (Cadence::Monthly, 20));
    assert_eq!(classify_interval(85.0), (Cadence::Quarterly, 15));
    assert_eq!(classify_interval(100.0), (Cadence::Quarterly, 15));
    assert_eq!(classify_interval(355.0), (Cadence::Yearly, 15));
    assert_eq!(classify_interval(375.0), (Cadence::Yearly, 15));
    assert_eq!(classify_interval(5.0), (Cadence::Weekly, 5));
    assert_eq!(classify_interval(50.0), (Cadence::Monthly, 5));
    assert_eq!(classify_interval(200.0), (Cadence::Quarterly, 5));
}

#[test]
fn test_structural_price_preferred_over_bare_amount() {
    let rules = RuleSet::new().unwrap();
    let prices = rules.extract_prices("Charged $4.00 today. Plan: €8,99/month");
    assert_eq!(prices, vec![8.99]);
}

proptest! {
    #[test]
    fn prop_confidence_tiers(score in 0_u32..1000) {
        let tier = Confidence::from_score(score);
        if score >= 70 {
            prop_assert_eq!(tier, Confidence::High);
        } else if score >= 50 {
            prop_assert_eq!(tier, Confidence::Medium);
        } else {
            prop_assert_eq!(tier, Confidence::Low);
        }
    }

    #[test]
    fn prop_blocked_and_excluded_match_any_case_and_subdomain(
        sub in "[a-z0-9]{1,10}",
        upper in any::<bool>(),
        blocked_idx in 0_usize..4,
        excluded_idx in 0_usize..4,
    ) {
        let rules = RuleSet::new().unwrap();
        let blocked = ["gmail.com", "facebookmail.com", "eventbrite.com", "x.com"][blocked_idx];
        let excluded = ["ups.com", "fedex.com", "uber.com", "chase.com"][excluded_idx];

        let spellings = |domain: &str| {
            let nested = format!("{sub}.{domain}");
            if upper {
                (domain.to_uppercase(), nested.to_uppercase())
            } else {
                (domain.to_string(), nested)
            }
        };

        let (bare, nested) = spellings(blocked);
        prop_assert!(rules.is_blocked(&bare));
        prop_assert!(rules.is_blocked(&nested));

        let (bare, nested) = spellings(excluded);
        prop_assert!(rules.is_hard_excluded(&bare));
        prop_assert!(rules.is_hard_excluded(&nested));
    }

    #[test]
    fn prop_lookalike_suffix_is_not_blocked(prefix in "[a-z]{1,8}") {
        let rules = RuleSet::new().unwrap();
        let lookalike = format!("{prefix}gmail.com");
        prop_assert!(!rules.is_blocked(&lookalike));
    }
}
