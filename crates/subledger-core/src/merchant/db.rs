//! Merchant lookup.

use std::collections::HashMap;

use tracing::debug;

use super::builtin;
use super::model::Merchant;
use crate::Result;

/// Read-only lookup of known merchants by sender domain or name.
#[derive(Debug, Clone)]
pub struct MerchantDatabase {
    merchants: Vec<Merchant>,
    by_domain: HashMap<String, Vec<usize>>,
    by_name: HashMap<String, usize>,
}

impl Default for MerchantDatabase {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MerchantDatabase {
    /// Database over the built-in table.
    #[must_use]
    pub fn builtin() -> Self {
        Self::with_merchants(builtin::merchants())
    }

    /// Database over an arbitrary merchant list.
    #[must_use]
    pub fn with_merchants(merchants: Vec<Merchant>) -> Self {
        let mut by_domain: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_name = HashMap::new();

        for (idx, merchant) in merchants.iter().enumerate() {
            for domain in &merchant.domains {
                by_domain
                    .entry(domain.to_ascii_lowercase())
                    .or_default()
                    .push(idx);
            }
            by_name.entry(normalize_name(&merchant.name)).or_insert(idx);
            by_name.entry(normalize_name(&merchant.id)).or_insert(idx);
        }

        Self {
            merchants,
            by_domain,
            by_name,
        }
    }

    /// Parses a JSON array of merchants.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a merchant list.
    pub fn from_json(json: &str) -> Result<Self> {
        let merchants: Vec<Merchant> = serde_json::from_str(json)?;
        debug!("Loaded {} merchants from JSON", merchants.len());
        Ok(Self::with_merchants(merchants))
    }

    /// Number of merchants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.merchants.len()
    }

    /// True if the database holds no merchants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.merchants.is_empty()
    }

    /// All merchants in table order.
    #[must_use]
    pub fn merchants(&self) -> &[Merchant] {
        &self.merchants
    }

    /// Merchant by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Merchant> {
        self.merchants.iter().find(|m| m.id == id)
    }

    /// Finds the merchant behind a sender domain.
    ///
    /// Subdomains match their parent (`billing.netflix.com` finds
    /// `netflix.com`). When several merchants share a domain, `text` picks
    /// the one with the most keyword hits; no hits means no match.
    #[must_use]
    pub fn find(&self, domain: &str, text: &str) -> Option<&Merchant> {
        let candidates = self.domain_candidates(domain);
        match candidates.as_slice() {
            [] => None,
            [only] => Some(&self.merchants[*only]),
            many => {
                let lowered = text.to_lowercase();
                let mut best: Option<(usize, usize)> = None;
                for &idx in many {
                    let hits = self.merchants[idx].keyword_hits(&lowered);
                    if hits > 0 && best.is_none_or(|(_, h)| hits > h) {
                        best = Some((idx, hits));
                    }
                }
                best.map(|(idx, _)| &self.merchants[idx])
            }
        }
    }

    /// Finds a merchant by display name or id, ignoring case and punctuation.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Merchant> {
        self.by_name
            .get(&normalize_name(name))
            .map(|&idx| &self.merchants[idx])
    }

    /// Merchants registered for `domain` or its nearest registered parent.
    fn domain_candidates(&self, domain: &str) -> Vec<usize> {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        let mut suffix = domain.as_str();
        loop {
            if let Some(found) = self.by_domain.get(suffix) {
                return found.clone();
            }
            match suffix.split_once('.') {
                Some((_, rest)) if rest.contains('.') => suffix = rest,
                _ => return Vec::new(),
            }
        }
    }
}

/// Lowercase alphanumerics only.
pub(crate) fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::detection::Cadence;

    #[test]
    fn test_exact_and_subdomain_match() {
        let db = MerchantDatabase::builtin();
        assert_eq!(db.find("netflix.com", "").unwrap().id, "netflix");
        assert_eq!(db.find("Mailer.Netflix.com", "").unwrap().id, "netflix");
        assert!(db.find("notnetflix.com", "").is_none());
        assert!(db.find("com", "").is_none());
    }

    #[test]
    fn test_shared_domain_disambiguated_by_keywords() {
        let db = MerchantDatabase::builtin();
        let music = db
            .find("email.apple.com", "Your Apple Music subscription renews")
            .unwrap();
        assert_eq!(music.id, "apple_music");

        let storage = db
            .find("apple.com", "Your iCloud+ storage plan renews")
            .unwrap();
        assert_eq!(storage.id, "icloud");

        assert!(db.find("apple.com", "Your receipt").is_none());
    }

    #[test]
    fn test_unknown_merchant_absent() {
        let db = MerchantDatabase::builtin();
        assert!(db.find("figma.com", "Figma Professional").is_none());
        assert!(db.find_by_name("Figma").is_none());
    }

    #[test]
    fn test_find_by_name() {
        let db = MerchantDatabase::builtin();
        assert_eq!(db.find_by_name("netflix").unwrap().id, "netflix");
        assert_eq!(db.find_by_name("DISNEY+").unwrap().id, "disney_plus");
        assert_eq!(db.find_by_name("1password").unwrap().id, "one_password");
    }

    #[test]
    fn test_from_json() {
        let db = MerchantDatabase::from_json(
            r#"[{
                "id": "acme",
                "name": "Acme Cloud",
                "domains": ["acme.io"],
                "typical_prices": [5.0, 10.0],
                "typical_cadence": "yearly"
            }]"#,
        )
        .unwrap();

        assert_eq!(db.len(), 1);
        let acme = db.find("billing.acme.io", "").unwrap();
        assert_eq!(acme.typical_cadence, Cadence::Yearly);
        assert_eq!(acme.closest_typical_price(8.0), Some(10.0));
        assert!(db.find_by_name("acme cloud").is_some());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(MerchantDatabase::from_json("{}").is_err());
    }
}
