//! Pass 2 signal extraction: content keywords, prices and billing rhythm.

use std::cmp::Reverse;
use std::collections::HashMap;

use subledger_gmail::Message;

use super::model::{Cadence, ContentAnalysis, PatternAnalysis};
use super::rules::RuleSet;
use crate::merchant::Merchant;

pub(crate) const HARD_EXCLUSION_PENALTY: i64 = -100;
pub(crate) const SOFT_EXCLUSION_PENALTY: i64 = -25;
pub(crate) const STRONG_KEYWORD: i64 = 20;
pub(crate) const MEDIUM_KEYWORD: i64 = 10;
pub(crate) const STRUCTURAL_PRICE: i64 = 15;
pub(crate) const TRIAL_SIGNAL: i64 = 18;
pub(crate) const UNSUBSCRIBE_HEADER: i64 = 5;
pub(crate) const CONSISTENT_PRICE: i64 = 15;
pub(crate) const NEAREST_CADENCE: i64 = 5;
pub(crate) const TIGHT_INTERVALS: i64 = 10;
pub(crate) const LOOSE_INTERVALS: i64 = 5;
/// Pattern score when no gap survives: the floor of the cadence scale.
pub(crate) const NO_RHYTHM: i64 = NEAREST_CADENCE;

/// Gaps outside this window (days) are treated as noise.
const GAP_WINDOW: (f64, f64) = (5.0, 400.0);
const MS_PER_DAY: f64 = 86_400_000.0;

/// Messages oldest first, ties broken by id.
pub(crate) fn chronological(messages: &[Message]) -> Vec<&Message> {
    let mut sorted: Vec<&Message> = messages.iter().collect();
    sorted.sort_by(|a, b| {
        a.internal_date
            .cmp(&b.internal_date)
            .then_with(|| a.id.cmp(&b.id))
    });
    sorted
}

/// Walks the keyword tables over each message.
///
/// A message with a hard-exclusion keyword contributes only its penalty.
/// Cancellation language is recorded from every message.
pub(crate) fn analyze_content(
    rules: &RuleSet,
    messages: &[&Message],
    merchant: Option<&Merchant>,
) -> ContentAnalysis {
    let mut analysis = ContentAnalysis::default();
    let mut all_prices: Vec<(i64, usize, usize)> = Vec::new();
    let mut message_prices: Vec<i64> = Vec::new();

    for (idx, message) in messages.iter().enumerate() {
        let text = message.text();

        if rules.has_cancellation(&text) {
            analysis.cancellation = true;
        }
        if rules.has_hard_exclusion(&text) {
            analysis.score += HARD_EXCLUSION_PENALTY;
            analysis.hard_excluded = true;
            continue;
        }
        if rules.has_soft_exclusion(&text) {
            analysis.score += SOFT_EXCLUSION_PENALTY;
        }

        if rules.has_strong_keyword(&text) {
            analysis.score += STRONG_KEYWORD;
        } else if rules.has_medium_keyword(&text) {
            analysis.score += MEDIUM_KEYWORD;
        }

        analysis.structural_price |= rules.has_structural_price(&text);
        analysis.trial |= rules.has_trial_signal(&text);
        analysis.unsubscribe_header |= message.has_unsubscribe_header;

        let prices = rules.extract_prices(&text);
        if let Some(&first) = prices.first() {
            message_prices.push(to_cents(first));
        }
        all_prices.extend(
            prices
                .into_iter()
                .enumerate()
                .map(|(pos, p)| (to_cents(p), idx, pos)),
        );
    }

    if analysis.structural_price {
        analysis.score += STRUCTURAL_PRICE;
    }
    if analysis.trial {
        analysis.score += TRIAL_SIGNAL;
    }
    if analysis.unsubscribe_header {
        analysis.score += UNSUBSCRIBE_HEADER;
    }

    analysis.consistent_price =
        message_prices.len() >= 2 && message_prices.iter().all(|&p| p == message_prices[0]);
    if analysis.consistent_price {
        analysis.score += CONSISTENT_PRICE;
    }

    analysis.price = select_price(&all_prices).map(|price| correct_price(price, merchant));
    analysis
}

/// Most frequent price in cents; ties go to the most recently seen value,
/// then to the one quoted first in that message.
///
/// Entries are `(cents, message_index, position)` with indexes increasing
/// over time and positions in text order.
pub(crate) fn select_price(prices: &[(i64, usize, usize)]) -> Option<f64> {
    let mut tally: HashMap<i64, (usize, usize, usize)> = HashMap::new();
    for &(cents, idx, pos) in prices {
        let entry = tally.entry(cents).or_insert((0, idx, pos));
        entry.0 += 1;
        if idx > entry.1 {
            entry.1 = idx;
            entry.2 = pos;
        } else if idx == entry.1 {
            entry.2 = entry.2.min(pos);
        }
    }
    tally
        .into_iter()
        .max_by_key(|&(_, (count, latest, pos))| (count, latest, Reverse(pos)))
        .map(|(cents, _)| from_cents(cents))
}

/// Replaces a price far outside the merchant's typical range with the
/// closest typical price.
pub(crate) fn correct_price(price: f64, merchant: Option<&Merchant>) -> f64 {
    let Some(merchant) = merchant else {
        return price;
    };
    let min = merchant.typical_prices.iter().copied().reduce(f64::min);
    let max = merchant.typical_prices.iter().copied().reduce(f64::max);
    match (min, max) {
        (Some(min), Some(max)) if price < min / 2.0 || price > max * 2.0 => {
            merchant.closest_typical_price(price).unwrap_or(price)
        }
        _ => price,
    }
}

/// Infers cadence from the day gaps between consecutive messages.
///
/// Without a surviving gap the cadence is unknown and the score is
/// [`NO_RHYTHM`]. A single gap has zero deviation and earns the full
/// consistency bonus.
pub(crate) fn analyze_pattern(messages: &[&Message]) -> PatternAnalysis {
    let last_date = messages.last().map(|m| m.date());

    #[allow(clippy::cast_precision_loss)]
    let gaps: Vec<f64> = messages
        .windows(2)
        .map(|pair| (pair[1].internal_date - pair[0].internal_date) as f64 / MS_PER_DAY)
        .filter(|gap| (GAP_WINDOW.0..=GAP_WINDOW.1).contains(gap))
        .collect();

    if gaps.is_empty() {
        return PatternAnalysis {
            score: NO_RHYTHM,
            cadence: Cadence::Unknown,
            average_interval_days: None,
            last_date,
        };
    }

    let average = mean(&gaps);
    let (cadence, mut score) = classify_interval(average);

    let deviations: Vec<f64> = gaps.iter().map(|g| (g - average).abs()).collect();
    let deviation = mean(&deviations);
    if deviation <= 3.0 {
        score += TIGHT_INTERVALS;
    } else if deviation <= 7.0 {
        score += LOOSE_INTERVALS;
    }

    PatternAnalysis {
        score,
        cadence,
        average_interval_days: Some(average),
        last_date,
    }
}

/// Maps an average interval to a cadence and its score.
///
/// Intervals outside every band take the nearest reference cadence at a
/// reduced score.
#[must_use]
pub fn classify_interval(days: f64) -> (Cadence, i64) {
    if (6.0..=8.0).contains(&days) {
        (Cadence::Weekly, 10)
    } else if (25.0..=35.0).contains(&days) {
        (Cadence::Monthly, 20)
    } else if (85.0..=100.0).contains(&days) {
        (Cadence::Quarterly, 15)
    } else if (355.0..=375.0).contains(&days) {
        (Cadence::Yearly, 15)
    } else {
        let nearest = Cadence::REFERENCE_DAYS
            .iter()
            .min_by(|(_, a), (_, b)| (a - days).abs().total_cmp(&(b - days).abs()))
            .map_or(Cadence::Unknown, |(cadence, _)| *cadence);
        (nearest, NEAREST_CADENCE)
    }
}

/// Bonus for the number of supporting messages.
pub(crate) const fn volume_bonus(count: usize) -> i64 {
    match count {
        0..=2 => 0,
        3..=5 => 5,
        _ => 10,
    }
}

fn mean(values: &[f64]) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let len = values.len() as f64;
    values.iter().sum::<f64>() / len
}

#[allow(clippy::cast_possible_truncation)]
fn to_cents(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

#[allow(clippy::cast_precision_loss)]
fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}
