//! Built-in merchant table.

use super::model::{Merchant, MerchantCategory};
use crate::detection::Cadence;

use Cadence::{Monthly, Yearly};
use MerchantCategory::{
    Cloud, Education, Fitness, Gaming, Music, News, Security, Shopping, Software, Streaming,
};

struct Entry {
    id: &'static str,
    name: &'static str,
    domains: &'static [&'static str],
    keywords: &'static [&'static str],
    category: MerchantCategory,
    prices: &'static [f64],
    cadence: Cadence,
}

const ENTRIES: &[Entry] = &[
    Entry {
        id: "netflix",
        name: "Netflix",
        domains: &["netflix.com"],
        keywords: &["netflix"],
        category: Streaming,
        prices: &[6.99, 15.49, 22.99],
        cadence: Monthly,
    },
    Entry {
        id: "disney_plus",
        name: "Disney+",
        domains: &["disneyplus.com"],
        keywords: &["disney+", "disney plus"],
        category: Streaming,
        prices: &[7.99, 13.99],
        cadence: Monthly,
    },
    Entry {
        id: "hulu",
        name: "Hulu",
        domains: &["hulu.com", "hulumail.com"],
        keywords: &["hulu"],
        category: Streaming,
        prices: &[7.99, 17.99],
        cadence: Monthly,
    },
    Entry {
        id: "max",
        name: "Max",
        domains: &["max.com", "hbomax.com"],
        keywords: &["max", "hbo"],
        category: Streaming,
        prices: &[9.99, 16.99, 20.99],
        cadence: Monthly,
    },
    Entry {
        id: "paramount_plus",
        name: "Paramount+",
        domains: &["paramountplus.com"],
        keywords: &["paramount"],
        category: Streaming,
        prices: &[7.99, 12.99],
        cadence: Monthly,
    },
    Entry {
        id: "crunchyroll",
        name: "Crunchyroll",
        domains: &["crunchyroll.com"],
        keywords: &["crunchyroll"],
        category: Streaming,
        prices: &[7.99, 9.99, 14.99],
        cadence: Monthly,
    },
    Entry {
        id: "youtube_premium",
        name: "YouTube Premium",
        domains: &["youtube.com", "google.com"],
        keywords: &["youtube premium", "youtube music"],
        category: Streaming,
        prices: &[13.99, 22.99],
        cadence: Monthly,
    },
    Entry {
        id: "google_one",
        name: "Google One",
        domains: &["google.com"],
        keywords: &["google one", "storage plan"],
        category: Cloud,
        prices: &[1.99, 2.99, 9.99, 19.99],
        cadence: Monthly,
    },
    Entry {
        id: "spotify",
        name: "Spotify",
        domains: &["spotify.com"],
        keywords: &["spotify", "premium"],
        category: Music,
        prices: &[11.99, 16.99, 19.99],
        cadence: Monthly,
    },
    Entry {
        id: "apple_music",
        name: "Apple Music",
        domains: &["apple.com"],
        keywords: &["apple music"],
        category: Music,
        prices: &[10.99, 16.99],
        cadence: Monthly,
    },
    Entry {
        id: "icloud",
        name: "iCloud+",
        domains: &["apple.com", "icloud.com"],
        keywords: &["icloud", "storage"],
        category: Cloud,
        prices: &[0.99, 2.99, 9.99, 29.99],
        cadence: Monthly,
    },
    Entry {
        id: "apple_tv",
        name: "Apple TV+",
        domains: &["apple.com"],
        keywords: &["apple tv"],
        category: Streaming,
        prices: &[9.99],
        cadence: Monthly,
    },
    Entry {
        id: "audible",
        name: "Audible",
        domains: &["audible.com"],
        keywords: &["audible", "credit"],
        category: Music,
        prices: &[7.95, 14.95],
        cadence: Monthly,
    },
    Entry {
        id: "amazon_prime",
        name: "Amazon Prime",
        domains: &["amazon.com"],
        keywords: &["prime membership", "amazon prime"],
        category: Shopping,
        prices: &[14.99, 139.0],
        cadence: Monthly,
    },
    Entry {
        id: "dropbox",
        name: "Dropbox",
        domains: &["dropbox.com", "dropboxmail.com"],
        keywords: &["dropbox"],
        category: Cloud,
        prices: &[11.99, 19.99, 119.88],
        cadence: Monthly,
    },
    Entry {
        id: "adobe",
        name: "Adobe Creative Cloud",
        domains: &["adobe.com"],
        keywords: &["creative cloud", "adobe", "photoshop", "acrobat"],
        category: Software,
        prices: &[9.99, 22.99, 59.99],
        cadence: Monthly,
    },
    Entry {
        id: "microsoft_365",
        name: "Microsoft 365",
        domains: &["microsoft.com"],
        keywords: &["microsoft 365", "office 365"],
        category: Software,
        prices: &[6.99, 9.99, 69.99, 99.99],
        cadence: Yearly,
    },
    Entry {
        id: "github",
        name: "GitHub",
        domains: &["github.com"],
        keywords: &["github", "copilot"],
        category: Software,
        prices: &[4.0, 10.0, 100.0],
        cadence: Monthly,
    },
    Entry {
        id: "notion",
        name: "Notion",
        domains: &["notion.so", "makenotion.com"],
        keywords: &["notion"],
        category: Software,
        prices: &[8.0, 10.0, 96.0],
        cadence: Monthly,
    },
    Entry {
        id: "slack",
        name: "Slack",
        domains: &["slack.com"],
        keywords: &["slack"],
        category: Software,
        prices: &[7.25, 8.75],
        cadence: Monthly,
    },
    Entry {
        id: "zoom",
        name: "Zoom",
        domains: &["zoom.us"],
        keywords: &["zoom"],
        category: Software,
        prices: &[13.33, 15.99, 149.9],
        cadence: Monthly,
    },
    Entry {
        id: "openai",
        name: "ChatGPT Plus",
        domains: &["openai.com"],
        keywords: &["chatgpt", "openai"],
        category: Software,
        prices: &[20.0, 200.0],
        cadence: Monthly,
    },
    Entry {
        id: "one_password",
        name: "1Password",
        domains: &["1password.com"],
        keywords: &["1password"],
        category: Security,
        prices: &[2.99, 4.99, 35.88, 59.88],
        cadence: Yearly,
    },
    Entry {
        id: "nordvpn",
        name: "NordVPN",
        domains: &["nordvpn.com", "nordaccount.com"],
        keywords: &["nordvpn", "nord"],
        category: Security,
        prices: &[12.99, 59.88, 99.0],
        cadence: Yearly,
    },
    Entry {
        id: "nytimes",
        name: "The New York Times",
        domains: &["nytimes.com"],
        keywords: &["new york times", "nytimes"],
        category: News,
        prices: &[4.0, 17.0, 25.0],
        cadence: Monthly,
    },
    Entry {
        id: "wsj",
        name: "The Wall Street Journal",
        domains: &["wsj.com", "dowjones.com"],
        keywords: &["wall street journal", "wsj"],
        category: News,
        prices: &[4.0, 38.99],
        cadence: Monthly,
    },
    Entry {
        id: "peloton",
        name: "Peloton",
        domains: &["onepeloton.com"],
        keywords: &["peloton"],
        category: Fitness,
        prices: &[12.99, 24.0, 44.0],
        cadence: Monthly,
    },
    Entry {
        id: "strava",
        name: "Strava",
        domains: &["strava.com"],
        keywords: &["strava"],
        category: Fitness,
        prices: &[11.99, 79.99],
        cadence: Yearly,
    },
    Entry {
        id: "headspace",
        name: "Headspace",
        domains: &["headspace.com"],
        keywords: &["headspace"],
        category: Fitness,
        prices: &[12.99, 69.99],
        cadence: Yearly,
    },
    Entry {
        id: "xbox_game_pass",
        name: "Xbox Game Pass",
        domains: &["xbox.com"],
        keywords: &["game pass", "xbox"],
        category: Gaming,
        prices: &[9.99, 16.99, 19.99],
        cadence: Monthly,
    },
    Entry {
        id: "playstation_plus",
        name: "PlayStation Plus",
        domains: &["playstation.com", "sonyentertainmentnetwork.com"],
        keywords: &["playstation plus", "ps plus"],
        category: Gaming,
        prices: &[9.99, 79.99, 159.99],
        cadence: Yearly,
    },
    Entry {
        id: "nintendo_online",
        name: "Nintendo Switch Online",
        domains: &["nintendo.com", "nintendo.net"],
        keywords: &["switch online", "nintendo"],
        category: Gaming,
        prices: &[3.99, 19.99, 49.99],
        cadence: Yearly,
    },
    Entry {
        id: "duolingo",
        name: "Duolingo",
        domains: &["duolingo.com"],
        keywords: &["duolingo", "super"],
        category: Education,
        prices: &[12.99, 83.99],
        cadence: Yearly,
    },
    Entry {
        id: "linkedin_premium",
        name: "LinkedIn Premium",
        domains: &["linkedin.com"],
        keywords: &["premium"],
        category: Education,
        prices: &[39.99, 59.99],
        cadence: Monthly,
    },
];

/// Materializes the built-in table.
pub(super) fn merchants() -> Vec<Merchant> {
    ENTRIES
        .iter()
        .map(|e| Merchant {
            id: e.id.to_string(),
            name: e.name.to_string(),
            domains: e.domains.iter().map(|d| (*d).to_string()).collect(),
            keywords: e.keywords.iter().map(|k| (*k).to_string()).collect(),
            category: e.category,
            typical_prices: e.prices.to_vec(),
            typical_cadence: e.cadence,
        })
        .collect()
}
