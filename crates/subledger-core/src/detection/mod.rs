//! Subscription detection.
//!
//! Pass 1 filters senders and groups messages into merchant candidates;
//! Pass 2 scores each candidate from keyword, price and timing signals and
//! keeps the ones that look like active recurring charges.
//!
//! All analysis is pure: given the same messages and `now`, the output is
//! identical regardless of fetch order.

mod engine;
mod grouping;
mod model;
mod rules;
mod scoring;
mod sender;

pub use engine::{DetectionEngine, Evaluation, Rejection};
pub use model::{
    Cadence, Confidence, ContentAnalysis, DetectionSource, MerchantCandidate, PatternAnalysis,
    Subscription,
};
pub use rules::{PRICE_RANGE, RuleSet};
pub use scoring::classify_interval;
pub use sender::Sender;
