//! `From` header parsing.

/// Parsed sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    /// Display name, unquoted.
    pub display_name: Option<String>,
    /// Whether the display name was written in double quotes.
    pub quoted: bool,
    /// Lowercased address.
    pub address: String,
    /// Lowercased domain (after the last `@`).
    pub domain: String,
}

impl Sender {
    /// Parses `Display Name <addr@domain>` or a bare address.
    ///
    /// Returns `None` when no domain can be found.
    #[must_use]
    pub fn parse(from: &str) -> Option<Self> {
        let from = from.trim();
        let (name_part, address) = match (from.rfind('<'), from.rfind('>')) {
            (Some(open), Some(close)) if open < close => {
                (Some(from[..open].trim()), from[open + 1..close].trim())
            }
            _ => (None, from),
        };

        let address = address.to_ascii_lowercase();
        let (_, domain) = address.rsplit_once('@')?;
        let domain = domain.trim_end_matches('.').to_string();
        if domain.is_empty() {
            return None;
        }

        let (display_name, quoted) = match name_part {
            Some(raw) if !raw.is_empty() => {
                let quoted = raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"');
                let name = raw.trim_matches('"').trim().to_string();
                ((!name.is_empty()).then_some(name), quoted)
            }
            _ => (None, false),
        };

        Some(Self {
            display_name,
            quoted,
            address,
            domain,
        })
    }

    /// Registrable-name stem of the domain (`mail.figma.com` gives `figma`).
    #[must_use]
    pub fn brand(&self) -> &str {
        domain_stem(&self.domain)
    }
}

/// Second-level label of a domain, skipping `co.uk`-style public suffixes.
#[must_use]
pub fn domain_stem(domain: &str) -> &str {
    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    match labels.as_slice() {
        [] => "",
        [only] => *only,
        [.., stem, second, tld]
            if tld.len() == 2 && matches!(*second, "co" | "com" | "org" | "net" | "ac" | "gov") =>
        {
            *stem
        }
        [.., stem, _] => *stem,
    }
}

/// Capitalizes the first character.
#[must_use]
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Display name stripped of mailbox words like "Billing" or "no-reply".
///
/// Returns `None` when nothing merchant-like is left.
#[must_use]
pub fn clean_display_name(name: &str) -> Option<String> {
    const NOISE: &[&str] = &[
        "billing",
        "team",
        "support",
        "receipts",
        "receipt",
        "payments",
        "notifications",
        "no-reply",
        "noreply",
        "do-not-reply",
        "donotreply",
        "info",
        "hello",
        "account",
        "accounts",
    ];

    let words: Vec<&str> = name
        .split_whitespace()
        .filter(|w| {
            let w = w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
            !NOISE.contains(&w.to_lowercase().as_str())
        })
        .collect();
    let cleaned = words.join(" ");
    let cleaned = cleaned.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '|' | ','));

    if cleaned.chars().count() < 2 || cleaned.contains('@') {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display_form() {
        let sender = Sender::parse("\"Figma Billing\" <Billing@Mail.Figma.com>").unwrap();
        assert_eq!(sender.display_name.as_deref(), Some("Figma Billing"));
        assert!(sender.quoted);
        assert_eq!(sender.address, "billing@mail.figma.com");
        assert_eq!(sender.domain, "mail.figma.com");
        assert_eq!(sender.brand(), "figma");
    }

    #[test]
    fn test_parse_bare_address() {
        let sender = Sender::parse("receipts@stripe.com").unwrap();
        assert!(sender.display_name.is_none());
        assert!(!sender.quoted);
        assert_eq!(sender.domain, "stripe.com");
    }

    #[test]
    fn test_parse_uses_last_at() {
        let sender = Sender::parse("Odd <a@b@example.org>").unwrap();
        assert_eq!(sender.domain, "example.org");
        assert!(Sender::parse("Nobody <nobody>").is_none());
        assert!(Sender::parse("").is_none());
    }

    #[test]
    fn test_domain_stem() {
        assert_eq!(domain_stem("netflix.com"), "netflix");
        assert_eq!(domain_stem("email.bbc.co.uk"), "bbc");
        assert_eq!(domain_stem("localhost"), "localhost");
    }

    #[test]
    fn test_clean_display_name() {
        assert_eq!(clean_display_name("Figma Billing").as_deref(), Some("Figma"));
        assert_eq!(clean_display_name("The Verge").as_deref(), Some("The Verge"));
        assert!(clean_display_name("no-reply").is_none());
        assert!(clean_display_name("billing@acme.io").is_none());
        assert_eq!(capitalize("figma"), "Figma");
    }
}
