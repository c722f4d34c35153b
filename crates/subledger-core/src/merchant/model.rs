//! Merchant reference data.

use serde::{Deserialize, Serialize};

use crate::detection::Cadence;

/// Broad product category of a merchant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MerchantCategory {
    /// Video streaming.
    Streaming,
    /// Music and audio.
    Music,
    /// Software and developer tools.
    Software,
    /// Cloud storage.
    Cloud,
    /// News and publications.
    News,
    /// Fitness and wellbeing.
    Fitness,
    /// Games and gaming services.
    Gaming,
    /// Education and learning.
    Education,
    /// Security and VPN.
    Security,
    /// Shopping memberships.
    Shopping,
    /// Anything else.
    #[default]
    Other,
}

/// A known merchant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Sender domains (subdomains match too).
    pub domains: Vec<String>,
    /// Terms that tell this merchant apart from others on a shared domain.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Product category.
    #[serde(default)]
    pub category: MerchantCategory,
    /// Usual plan prices.
    #[serde(default)]
    pub typical_prices: Vec<f64>,
    /// Usual billing cadence.
    #[serde(default)]
    pub typical_cadence: Cadence,
}

impl Merchant {
    /// Number of this merchant's keywords present in `text` (lowercased).
    pub(crate) fn keyword_hits(&self, lowered_text: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| lowered_text.contains(&k.to_lowercase()))
            .count()
    }

    /// Typical price nearest to `price`.
    #[must_use]
    pub fn closest_typical_price(&self, price: f64) -> Option<f64> {
        self.typical_prices
            .iter()
            .copied()
            .min_by(|a, b| (a - price).abs().total_cmp(&(b - price).abs()))
    }
}
