//! Compiled detection rules.
//!
//! Every keyword table and price pattern is compiled once into a
//! [`RuleSet`] so scoring is a walk over prebuilt matchers.

use regex::Regex;

/// Senders that are never subscriptions: carriers, banks, ride-hailing.
const HARD_EXCLUDED_DOMAINS: &[&str] = &[
    "ups.com",
    "fedex.com",
    "usps.com",
    "dhl.com",
    "ontrac.com",
    "uber.com",
    "lyft.com",
    "doordash.com",
    "grubhub.com",
    "instacart.com",
    "chase.com",
    "bankofamerica.com",
    "wellsfargo.com",
    "capitalone.com",
    "citi.com",
    "americanexpress.com",
    "discover.com",
    "irs.gov",
];

/// Personal mailboxes and social or notification-only senders.
const BLOCKED_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "icloud.com",
    "me.com",
    "aol.com",
    "proton.me",
    "protonmail.com",
    "facebookmail.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "redditmail.com",
    "pinterest.com",
    "quora.com",
    "nextdoor.com",
    "meetup.com",
    "eventbrite.com",
    "glassdoor.com",
    "indeed.com",
    "accounts.google.com",
    "calendar-notification.google.com",
    "docs.google.com",
];

/// Payment facilitators that relay receipts for other merchants.
const PAYMENT_PROCESSORS: &[&str] = &[
    "stripe.com",
    "paypal.com",
    "paddle.com",
    "squareup.com",
    "gumroad.com",
    "fastspring.com",
    "lemonsqueezy.com",
    "chargebee.com",
];

/// Extracted names that describe a transaction rather than a merchant.
const GENERIC_NAMES: &[&str] = &[
    "payment",
    "payments",
    "subscription",
    "subscriptions",
    "invoice",
    "receipt",
    "order",
    "your order",
    "you",
    "your account",
    "account",
    "customer",
    "merchant",
    "unknown",
    "billing",
    "transaction",
    "purchase",
    "service",
    "services",
    "us",
    "stripe",
    "paypal",
    "paddle",
    "square",
    "gumroad",
];

/// Words in a quoted display name that mark a business mailbox.
const SERVICE_WORDS: &[&str] = &[
    "team",
    "billing",
    "support",
    "receipts",
    "payments",
    "notifications",
    "store",
    "app",
    "premium",
    "plus",
    "pro",
    "music",
    "cloud",
    "news",
    "service",
];

/// Trailing legal-form words dropped from extracted names.
const LEGAL_SUFFIXES: &[&str] = &["inc", "llc", "ltd", "gmbh", "corp", "limited"];

/// Price amount: thousands-grouped or plain, with optional two-digit decimals.
const AMOUNT: &str = r"(?P<amount>\d{1,3}(?:,\d{3})+(?:\.\d{2})?|\d{1,4}(?:[.,]\d{2})?)";

/// Lowest and highest plausible subscription price.
pub const PRICE_RANGE: (f64, f64) = (0.99, 500.0);

const STRUCTURAL_PRICE_PATTERNS: &[&str] = &[
    r"(?i)(?:[$€£]|\b(?:usd|eur|gbp)\b)\s?{amount}\s*(?:/|per|a|an|every)\s*(?:mo|mth|month|wk|week|yr|year|annum|quarter)\b",
    r"(?i)\b{amount}\s?(?:[$€£]|(?:usd|eur|gbp)\b)\s*(?:/|per|a|every)\s*(?:mo|mth|month|wk|week|yr|year|annum|quarter)\b",
    r"(?i)[$€£]\s?{amount}\s+(?:billed\s+)?(?:monthly|weekly|yearly|annually|quarterly)\b",
];

const CURRENCY_PRICE_PATTERNS: &[&str] = &[
    r"(?i)(?:[$€£]|\b(?:usd|eur|gbp)\b)\s?{amount}",
    r"(?i)\b{amount}\s?(?:[$€£]|(?:usd|eur|gbp)\b)",
];

const PROCESSOR_NAME_PATTERNS: &[&str] = &[
    r"(?i)\breceipt\s+from\s+(?P<name>[^\n\r|#]{2,80})",
    r"(?i)\bpayment\s+to\s+(?P<name>[^\n\r|#]{2,80})",
    r"(?i)\bstatement\s+descriptor\s*:?\s*(?P<name>[^\n\r|#]{2,80})",
    r"(?i)\bmerchant\s*:\s*(?P<name>[^\n\r|#]{2,80})",
    r"(?i)\bpaid\s+(?P<name>[^\n\r|#$€£]{2,80}?)\s+[$€£]",
];

/// Compiled keyword tables, domain sets and extraction patterns.
#[derive(Debug, Clone)]
pub struct RuleSet {
    hard_excluded_domains: Vec<String>,
    blocked_domains: Vec<String>,
    payment_processors: Vec<String>,
    hard_keywords: Regex,
    soft_keywords: Regex,
    strong_keywords: Regex,
    medium_keywords: Regex,
    trial_keywords: Regex,
    cancellation_keywords: Regex,
    structural_signal: Regex,
    personal_keywords: Regex,
    relayed_name: Regex,
    person_name: Regex,
    name_stop: Regex,
    structural_prices: Vec<Regex>,
    currency_prices: Vec<Regex>,
    processor_names: Vec<Regex>,
}

impl RuleSet {
    /// Compiles the built-in rules.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_extra_blocked_domains(&[])
    }

    /// Compiles the built-in rules plus additional blocked domains.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn with_extra_blocked_domains(extra: &[String]) -> Result<Self, regex::Error> {
        let mut blocked_domains = lowered(BLOCKED_DOMAINS);
        blocked_domains.extend(
            extra
                .iter()
                .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty()),
        );

        Ok(Self {
            hard_excluded_domains: lowered(HARD_EXCLUDED_DOMAINS),
            blocked_domains,
            payment_processors: lowered(PAYMENT_PROCESSORS),
            hard_keywords: Regex::new(
                r"(?i)\b(?:order\s+confirmation|order\s*(?:#|no\.?|number)\s*[a-z0-9-]*\d|has\s+shipped|(?:was|been)\s+shipped|tracking\s+(?:number|#|id)|bank\s+statement|thanks\s+for\s+riding|your\s+(?:trip|ride)\s+with|out\s+for\s+delivery)",
            )?,
            soft_keywords: Regex::new(
                r"(?i)\b(?:shipping|shipment|delivered|delivery|refund(?:ed)?|account\s+statement|statement\s+is\s+(?:ready|available)|ride|driver|fare)\b",
            )?,
            strong_keywords: Regex::new(
                r"(?i)\b(?:subscriptions?|subscribed|membership|renewal|renews?|renewed|auto-?renew(?:al|s)?|recurring|billing\s+(?:cycle|period)|your\s+plan|next\s+billing\s+date|billed\s+(?:monthly|annually|yearly|weekly|quarterly))\b",
            )?,
            medium_keywords: Regex::new(
                r"(?i)\b(?:receipt|invoice|payment\s+(?:confirmation|confirmed|received|successful)|thank\s+you\s+for\s+your\s+payment|your\s+payment)\b",
            )?,
            trial_keywords: Regex::new(
                r"(?i)\b(?:free\s+trial|trial\s+(?:ends|ending|is\s+ending|will\s+end|expires|expiring|period\s+ends)|trial\s+has\s+ended|after\s+your\s+trial|converted?\s+to\s+(?:a\s+)?paid)\b",
            )?,
            cancellation_keywords: Regex::new(
                r"(?i)\b(?:cancel(?:l)?ed|cancellation\s+(?:confirmed|confirmation|complete)|subscription\s+(?:has\s+)?(?:ended|expired)|final\s+payment|unsubscribed|account\s+(?:has\s+been\s+)?closed|membership\s+(?:has\s+)?ended|sorry\s+to\s+see\s+you\s+go)\b",
            )?,
            structural_signal: Regex::new(
                r"(?i)(?:[$€£]\s?\d[\d.,]*\s*(?:/|per)\s*(?:mo|mth|month|wk|week|yr|year|quarter)\b|\bbilled\s+(?:monthly|weekly|annually|yearly|quarterly|every)\b|\b(?:monthly|annual|yearly|quarterly)\s+(?:plan|subscription|membership|fee|charge)\b)",
            )?,
            personal_keywords: Regex::new(
                r"(?i)\b(?:mom|dad|mother|father|grandma|grandpa|grandmother|grandfather|aunt|uncle|brother|sister|cousin|wife|husband|son|daughter|family|friend)\b",
            )?,
            relayed_name: Regex::new(r"(?i)\bvia\b")?,
            person_name: Regex::new(r"^[A-Z][a-z]+(?:\s+[A-Z]\.)?(?:\s+[A-Z][a-z'-]+){1,2}$")?,
            name_stop: Regex::new(
                r"(?i)(?:\s+(?:for|on|via|amount|total|receipt|invoice|was|has|is|your|thank|thanks|dated|date|paid|with|at)\b|\s+[-–—:]|\s+\d|[\[\(\$€£,;!?|])",
            )?,
            structural_prices: compile_amount_patterns(STRUCTURAL_PRICE_PATTERNS)?,
            currency_prices: compile_amount_patterns(CURRENCY_PRICE_PATTERNS)?,
            processor_names: PROCESSOR_NAME_PATTERNS
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Domain dropped before any grouping.
    #[must_use]
    pub fn is_hard_excluded(&self, domain: &str) -> bool {
        domain_in(domain, &self.hard_excluded_domains)
    }

    /// Domain on the blocklist.
    #[must_use]
    pub fn is_blocked(&self, domain: &str) -> bool {
        domain_in(domain, &self.blocked_domains)
    }

    /// Domain belongs to a payment processor.
    #[must_use]
    pub fn is_payment_processor(&self, domain: &str) -> bool {
        domain_in(domain, &self.payment_processors)
    }

    /// Whether a sender looks like a person rather than a business.
    ///
    /// `brand` is the sender domain's stem; a quoted name that mentions it
    /// is treated as a business mailbox.
    #[must_use]
    pub fn looks_like_individual(&self, display_name: &str, quoted: bool, brand: &str) -> bool {
        if self.relayed_name.is_match(display_name) {
            return true;
        }
        if self.personal_keywords.is_match(display_name) {
            return true;
        }
        if !quoted || !self.person_name.is_match(display_name.trim()) {
            return false;
        }
        let lowered = display_name.to_lowercase();
        let mentions_brand = !brand.is_empty() && lowered.contains(&brand.to_lowercase());
        let service_word = lowered
            .split_whitespace()
            .any(|word| SERVICE_WORDS.contains(&word));
        !mentions_brand && !service_word
    }

    /// Hard-exclusion keyword present.
    #[must_use]
    pub fn has_hard_exclusion(&self, text: &str) -> bool {
        self.hard_keywords.is_match(text)
    }

    /// Soft anti-keyword present.
    #[must_use]
    pub fn has_soft_exclusion(&self, text: &str) -> bool {
        self.soft_keywords.is_match(text)
    }

    /// Strong subscription keyword present.
    #[must_use]
    pub fn has_strong_keyword(&self, text: &str) -> bool {
        self.strong_keywords.is_match(text)
    }

    /// Medium (receipt-like) keyword present.
    #[must_use]
    pub fn has_medium_keyword(&self, text: &str) -> bool {
        self.medium_keywords.is_match(text)
    }

    /// Trial-conversion language present.
    #[must_use]
    pub fn has_trial_signal(&self, text: &str) -> bool {
        self.trial_keywords.is_match(text)
    }

    /// Cancellation language present.
    #[must_use]
    pub fn has_cancellation(&self, text: &str) -> bool {
        self.cancellation_keywords.is_match(text)
    }

    /// Structural per-period price or billing phrase present.
    #[must_use]
    pub fn has_structural_price(&self, text: &str) -> bool {
        self.structural_signal.is_match(text)
            || self.structural_prices.iter().any(|re| re.is_match(text))
    }

    /// Plausible prices in `text`, in order of appearance.
    ///
    /// Structural per-period prices win; bare currency amounts are only
    /// used when no structural price is present.
    #[must_use]
    pub fn extract_prices(&self, text: &str) -> Vec<f64> {
        let structural = amounts(&self.structural_prices, text);
        if structural.is_empty() {
            amounts(&self.currency_prices, text)
        } else {
            structural
        }
    }

    /// Merchant name embedded in a payment-processor receipt.
    #[must_use]
    pub fn extract_processor_merchant(&self, text: &str) -> Option<String> {
        self.processor_names.iter().find_map(|re| {
            let raw = re.captures(text)?.name("name")?.as_str();
            self.clean_extracted_name(raw)
        })
    }

    fn clean_extracted_name(&self, raw: &str) -> Option<String> {
        let mut name = raw;
        if let Some(stop) = self.name_stop.find(name) {
            name = &name[..stop.start()];
        }

        let mut name = trim_stray(name).to_string();
        loop {
            let Some((head, last)) = name.rsplit_once(char::is_whitespace) else {
                break;
            };
            let last = last.trim_end_matches('.').to_ascii_lowercase();
            if !LEGAL_SUFFIXES.contains(&last.as_str()) {
                break;
            }
            name = trim_stray(head).to_string();
        }

        let len = name.chars().count();
        if !(2..=50).contains(&len) {
            return None;
        }
        let lowered = name.to_lowercase();
        if GENERIC_NAMES.contains(&lowered.as_str()) {
            return None;
        }
        Some(name)
    }
}

fn lowered(items: &[&str]) -> Vec<String> {
    items.iter().map(|d| d.to_ascii_lowercase()).collect()
}

/// Case-insensitive exact or parent-domain match.
fn domain_in(domain: &str, list: &[String]) -> bool {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    list.iter().any(|entry| {
        domain
            .strip_suffix(entry.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.ends_with('.'))
    })
}

fn compile_amount_patterns(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|p| Regex::new(&p.replace("{amount}", AMOUNT)))
        .collect()
}

fn amounts(patterns: &[Regex], text: &str) -> Vec<f64> {
    let mut found: Vec<(usize, f64)> = patterns
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| {
            let m = caps.name("amount")?;
            Some((m.start(), parse_amount(m.as_str())?))
        })
        .filter(|(_, price)| (PRICE_RANGE.0..=PRICE_RANGE.1).contains(price))
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found.dedup_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, price)| price).collect()
}

/// Parses an amount, treating `12,99` as a decimal comma and `1,299` as
/// a thousands separator.
pub(crate) fn parse_amount(raw: &str) -> Option<f64> {
    let normalized = if raw.contains('.') {
        raw.replace(',', "")
    } else if let Some((int, frac)) = raw.split_once(',')
        && frac.len() == 2
    {
        format!("{int}.{frac}")
    } else {
        raw.replace(',', "")
    };
    normalized.parse().ok()
}

fn trim_stray(s: &str) -> &str {
    s.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '.' | ',' | ':' | ';' | '-' | '!' | '?' | '"' | '\'' | '*')
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rules() -> RuleSet {
        RuleSet::new().unwrap()
    }

    #[test]
    fn test_domain_suffix_matching() {
        let rules = rules();
        assert!(rules.is_hard_excluded("ups.com"));
        assert!(rules.is_hard_excluded("Email.UPS.com"));
        assert!(!rules.is_hard_excluded("groups.com"));
        assert!(rules.is_blocked("accounts.google.com"));
        assert!(!rules.is_blocked("google.com"));
        assert!(rules.is_payment_processor("mail.stripe.com"));
    }

    #[test]
    fn test_extra_blocked_domains() {
        let rules = RuleSet::with_extra_blocked_domains(&[" .Example.org ".into()]).unwrap();
        assert!(rules.is_blocked("news.example.org"));
        assert!(!rules.is_blocked("example.com"));
    }

    #[test]
    fn test_individual_heuristic() {
        let rules = rules();
        assert!(rules.looks_like_individual("Jane Doe", true, "acme"));
        assert!(rules.looks_like_individual("Jane Doe (via Google Docs)", false, "google"));
        assert!(rules.looks_like_individual("Jane via Dropbox", false, "dropbox"));
        assert!(rules.looks_like_individual("Sam Lee (Via Slack)", false, "slack"));
        assert!(!rules.looks_like_individual("Viaplay", false, "viaplay"));
        assert!(!rules.looks_like_individual("Trivia Club", false, "trivia"));
        assert!(rules.looks_like_individual("Mom", false, "gmail"));
        assert!(!rules.looks_like_individual("Jane Doe", false, "acme"));
        assert!(!rules.looks_like_individual("Figma Billing", true, "figma"));
        assert!(!rules.looks_like_individual("Apple Music", true, "apple"));
        assert!(!rules.looks_like_individual("Netflix", true, "netflix"));
    }

    #[test]
    fn test_keyword_tiers() {
        let rules = rules();
        assert!(rules.has_strong_keyword("Your subscription renews soon"));
        assert!(!rules.has_strong_keyword("You have unsubscribed"));
        assert!(rules.has_medium_keyword("Your receipt from Acme"));
        assert!(rules.has_hard_exclusion("Your order #4471 has shipped"));
        assert!(rules.has_hard_exclusion("tracking number 1Z999AA1"));
        assert!(rules.has_soft_exclusion("Your refund was processed"));
        assert!(rules.has_trial_signal("Your free trial ends tomorrow"));
        assert!(rules.has_cancellation("Your subscription has been cancelled"));
        assert!(rules.has_cancellation("Subscription canceled"));
        assert!(!rules.has_cancellation("Cancel anytime"));
    }

    #[test]
    fn test_structural_price_preferred() {
        let rules = rules();
        let prices = rules.extract_prices("Save $5.00 today. Plan: $12.00/mo");
        assert_eq!(prices, vec![12.0]);

        let prices = rules.extract_prices("Total charged: $12.00");
        assert_eq!(prices, vec![12.0]);
        assert!(rules.has_structural_price("billed monthly"));
        assert!(rules.has_structural_price("$9.99 per month"));
        assert!(!rules.has_structural_price("Total charged: $12.00"));
    }

    #[test]
    fn test_comma_decimal_normalized() {
        let rules = rules();
        assert_eq!(rules.extract_prices("Betrag: 12,99 €"), vec![12.99]);
        assert_eq!(parse_amount("1,299"), Some(1299.0));
        assert_eq!(parse_amount("1,299.50"), Some(1299.5));
        assert_eq!(parse_amount("9.99"), Some(9.99));
    }

    #[test]
    fn test_prices_out_of_range_ignored() {
        let rules = rules();
        assert!(rules.extract_prices("$0.50 credit").is_empty());
        assert!(rules.extract_prices("$1,299.00 laptop").is_empty());
    }

    #[test]
    fn test_processor_name_extraction() {
        let rules = rules();
        assert_eq!(
            rules
                .extract_processor_merchant("Your receipt from Acme Cloud Inc. #1234-5678")
                .as_deref(),
            Some("Acme Cloud")
        );
        assert_eq!(
            rules
                .extract_processor_merchant("You sent a payment to Linear Orbit for $8.00")
                .as_deref(),
            Some("Linear Orbit")
        );
        assert_eq!(
            rules
                .extract_processor_merchant("Statement descriptor: TAILSCALE")
                .as_deref(),
            Some("TAILSCALE")
        );
        assert_eq!(
            rules
                .extract_processor_merchant("You paid Raycast $8.00 USD")
                .as_deref(),
            Some("Raycast")
        );
        assert!(
            rules
                .extract_processor_merchant("Receipt from Payment")
                .is_none()
        );
        assert!(rules.extract_processor_merchant("Hello there").is_none());
    }
}
