//! Detection data model.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use subledger_gmail::Message;

use crate::merchant::Merchant;

/// Billing frequency class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    /// About every 7 days.
    Weekly,
    /// About every 30 days.
    Monthly,
    /// About every 90 days.
    Quarterly,
    /// About every 365 days.
    Yearly,
    /// Not enough evidence.
    #[default]
    Unknown,
}

impl Cadence {
    /// Known cadences with their reference interval in days.
    pub const REFERENCE_DAYS: [(Self, f64); 4] = [
        (Self::Weekly, 7.0),
        (Self::Monthly, 30.0),
        (Self::Quarterly, 90.0),
        (Self::Yearly, 365.0),
    ];

    /// Maximum age of the latest message before the subscription counts as
    /// lapsed.
    #[must_use]
    pub const fn stale_after_days(self) -> i64 {
        match self {
            Self::Weekly => 14,
            Self::Monthly => 45,
            Self::Quarterly => 120,
            Self::Yearly => 400,
            Self::Unknown => 60,
        }
    }

    /// Date one billing period after `date`. Calendar months are used for
    /// monthly and longer cadences.
    #[must_use]
    pub fn advance(self, date: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Weekly => date.checked_add_signed(Duration::days(7)),
            Self::Monthly => date.checked_add_months(Months::new(1)),
            Self::Quarterly => date.checked_add_months(Months::new(3)),
            Self::Yearly => date.checked_add_months(Months::new(12)),
            Self::Unknown => None,
        }
    }

    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::Unknown => "unknown",
        }
    }
}

/// Confidence tier derived from the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Score below 50.
    Low,
    /// Score 50 to 69.
    Medium,
    /// Score 70 and above.
    High,
}

impl Confidence {
    /// Tier for a (non-negative) score.
    #[must_use]
    pub const fn from_score(score: u32) -> Self {
        if score >= 70 {
            Self::High
        } else if score >= 50 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Where a subscription was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Mail sent by the merchant itself.
    Email,
    /// Receipt relayed by a payment processor.
    PaymentProcessor,
}

/// Messages attributed to one probable merchant, before scoring.
#[derive(Debug, Clone)]
pub struct MerchantCandidate {
    /// Sender domain (the processor's domain for relayed receipts).
    pub domain: String,
    /// Address of the most recent message.
    pub sender_address: String,
    /// Display name of the most recent message.
    pub display_name: Option<String>,
    /// Supporting messages, oldest first.
    pub messages: Vec<Message>,
    /// Matched reference entry.
    pub merchant: Option<Merchant>,
    /// Whether the messages came through a payment processor.
    pub via_processor: bool,
    /// Merchant name mined from processor receipts.
    pub extracted_name: Option<String>,
}

/// Message-content signals for a candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentAnalysis {
    /// Signed score contribution.
    pub score: i64,
    /// Selected price.
    pub price: Option<f64>,
    /// Whether every priced message agreed on one price (two or more).
    pub consistent_price: bool,
    /// Structural per-period price or billing phrase seen.
    pub structural_price: bool,
    /// Trial-conversion language seen.
    pub trial: bool,
    /// Cancellation language seen.
    pub cancellation: bool,
    /// A hard-exclusion keyword fired.
    pub hard_excluded: bool,
    /// A bulk-unsubscribe header was present.
    pub unsubscribe_header: bool,
}

/// Timing signals for a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternAnalysis {
    /// Score contribution.
    pub score: i64,
    /// Inferred cadence.
    pub cadence: Cadence,
    /// Mean of the retained gaps in days.
    pub average_interval_days: Option<f64>,
    /// Date of the most recent message.
    pub last_date: Option<DateTime<Utc>>,
}

/// A detected recurring subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Known merchant id, or the domain / extracted name otherwise.
    pub merchant_id: String,
    /// Display name.
    pub name: String,
    /// Price per period.
    pub price: f64,
    /// Billing cadence.
    pub cadence: Cadence,
    /// Confidence tier.
    pub confidence: Confidence,
    /// Final score.
    pub score: u32,
    /// Most recent supporting message date.
    pub last_charge: Option<DateTime<Utc>>,
    /// Projected next charge.
    pub next_charge: Option<DateTime<Utc>>,
    /// Supporting messages.
    pub email_count: usize,
    /// Representative sender address.
    pub sender_address: String,
    /// Detection source.
    pub source: DetectionSource,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(Confidence::from_score(0), Confidence::Low);
        assert_eq!(Confidence::from_score(49), Confidence::Low);
        assert_eq!(Confidence::from_score(50), Confidence::Medium);
        assert_eq!(Confidence::from_score(69), Confidence::Medium);
        assert_eq!(Confidence::from_score(70), Confidence::High);
    }

    #[test]
    fn test_advance_uses_calendar_months() {
        let jan31 = Utc.with_ymd_and_hms(2024, 1, 31, 9, 0, 0).unwrap();
        let feb = Cadence::Monthly.advance(jan31).unwrap();
        assert_eq!(feb, Utc.with_ymd_and_hms(2024, 2, 29, 9, 0, 0).unwrap());

        let year = Cadence::Yearly.advance(jan31).unwrap();
        assert_eq!(year, Utc.with_ymd_and_hms(2025, 1, 31, 9, 0, 0).unwrap());

        let week = Cadence::Weekly.advance(jan31).unwrap();
        assert_eq!(week, Utc.with_ymd_and_hms(2024, 2, 7, 9, 0, 0).unwrap());

        assert!(Cadence::Unknown.advance(jan31).is_none());
    }

    #[test]
    fn test_cadence_serde() {
        let json = serde_json::to_string(&Cadence::Quarterly).unwrap();
        assert_eq!(json, "\"quarterly\"");
    }
}
