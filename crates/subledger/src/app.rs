//! Command implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use subledger_core::{
    Config, DetectionEngine, JsonFileStorage, KeyringTokenStore, MerchantDatabase, MessageCache,
    MessageStore, ResilientFetchClient, ScanReport, SubscriptionScanner, SyncStateStore,
    TokenStore,
};
use subledger_gmail::GmailClient;
use tracing::{info, warn};

const APP_DIR: &str = "subledger";
const TOKEN_ENV: &str = "SUBLEDGER_ACCESS_TOKEN";

/// On-disk locations for configuration and state.
#[derive(Debug, Clone)]
pub struct Paths {
    config: PathBuf,
    merchants: PathBuf,
    data_dir: PathBuf,
}

impl Paths {
    pub fn resolve(config_override: Option<PathBuf>) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("no configuration directory on this platform")?
            .join(APP_DIR);
        let data_dir = dirs::data_dir()
            .context("no data directory on this platform")?
            .join(APP_DIR);

        Ok(Self {
            config: config_override.unwrap_or_else(|| config_dir.join("config.json")),
            merchants: config_dir.join("merchants.json"),
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn cache_db(&self) -> PathBuf {
        self.data_dir.join("cache.db")
    }

    fn sync_state(&self) -> PathBuf {
        self.data_dir.join("sync.json")
    }
}

/// Runs a scan and prints the report.
pub async fn scan(paths: &Paths, account: &str, full: bool, json: bool) -> Result<()> {
    let config = Config::load(&paths.config)
        .await
        .with_context(|| format!("loading {}", paths.config.display()))?;
    let token = access_token(account)?;

    let api = Arc::new(GmailClient::new(token).context("creating Gmail client")?);
    let cache = open_cache(paths, &config).await?;
    let client = ResilientFetchClient::new(api, cache, &config);
    let sync = SyncStateStore::load(JsonFileStorage::new(paths.sync_state())).await;
    let merchants = Arc::new(load_merchants(&paths.merchants).await?);
    let engine = DetectionEngine::new(merchants, &config.detection)?;
    let scanner = SubscriptionScanner::new(client, sync, engine);

    let report = match scanner.scan(full).await {
        Ok(report) => report,
        Err(e) if e.is_unauthorized() => {
            bail!("access token rejected; store a fresh one with `subledger token set`")
        }
        Err(e) => return Err(e).context("scan failed"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Prints the sync checkpoint and cache size.
pub async fn status(paths: &Paths) -> Result<()> {
    let sync = SyncStateStore::load(JsonFileStorage::new(paths.sync_state())).await;
    let state = sync.snapshot().await;

    println!("cursor:              {}", state.cursor.as_deref().unwrap_or("-"));
    println!("last full scan:      {}", format_time(state.full_scan_at));
    println!("last incremental:    {}", format_time(state.incremental_sync_at));
    println!("processed messages:  {}", state.processed_ids.len());
    println!("last emails scanned: {}", state.last_emails_scanned);
    println!("last subscriptions:  {}", state.last_subscription_count);

    if tokio::fs::try_exists(paths.cache_db()).await.unwrap_or(false) {
        let store = MessageStore::open_or_recreate(&paths.cache_db()).await?;
        println!("cached messages:     {}", store.count().await?);
    } else {
        println!("cached messages:     0");
    }
    Ok(())
}

/// Clears the checkpoint and the durable cache.
pub async fn reset(paths: &Paths) -> Result<()> {
    let sync = SyncStateStore::load(JsonFileStorage::new(paths.sync_state())).await;
    sync.reset().await.context("clearing sync state")?;

    if tokio::fs::try_exists(paths.cache_db()).await.unwrap_or(false) {
        let store = MessageStore::open_or_recreate(&paths.cache_db()).await?;
        store.clear().await.context("clearing message cache")?;
    }
    println!("Sync state and message cache cleared.");
    Ok(())
}

pub fn set_token(account: &str, token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        bail!("token is empty");
    }
    KeyringTokenStore::new(account).set_token(token)?;
    println!("Access token stored for {account}.");
    Ok(())
}

pub fn clear_token(account: &str) -> Result<()> {
    KeyringTokenStore::new(account).clear_token()?;
    println!("Access token removed for {account}.");
    Ok(())
}

/// Token from the environment, else from the keyring.
fn access_token(account: &str) -> Result<String> {
    if let Ok(token) = std::env::var(TOKEN_ENV)
        && !token.trim().is_empty()
    {
        return Ok(token.trim().to_string());
    }
    KeyringTokenStore::new(account)
        .require_token()
        .with_context(|| format!("no access token: set {TOKEN_ENV} or run `subledger token set`"))
}

async fn open_cache(paths: &Paths, config: &Config) -> Result<Arc<MessageCache>> {
    tokio::fs::create_dir_all(&paths.data_dir)
        .await
        .with_context(|| format!("creating {}", paths.data_dir.display()))?;
    let store = MessageStore::open_or_recreate(&paths.cache_db()).await?;
    Ok(Arc::new(MessageCache::new(config.cache, Some(store))))
}

/// Built-in merchants, or `merchants.json` when present.
async fn load_merchants(path: &Path) -> Result<MerchantDatabase> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => {
            let db = MerchantDatabase::from_json(&json)
                .with_context(|| format!("parsing {}", path.display()))?;
            info!("Loaded {} merchants from {}", db.len(), path.display());
            Ok(db)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MerchantDatabase::builtin()),
        Err(e) => {
            warn!("Ignoring unreadable {}: {}", path.display(), e);
            Ok(MerchantDatabase::builtin())
        }
    }
}

fn print_report(report: &ScanReport) {
    println!(
        "{} scan: {} messages examined, {} new",
        report.strategy.as_str(),
        report.emails_scanned,
        report.new_messages
    );
    if report.subscriptions.is_empty() {
        println!("No subscriptions detected.");
        return;
    }

    println!();
    println!(
        "{:<28} {:>9} {:<10} {:<7} {:>5}  {:<10}",
        "NAME", "PRICE", "CADENCE", "CONF", "SCORE", "NEXT"
    );
    for sub in &report.subscriptions {
        let next = sub
            .next_charge
            .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string());
        println!(
            "{:<28} {:>9.2} {:<10} {:<7} {:>5}  {:<10}",
            truncate(&sub.name, 28),
            sub.price,
            sub.cadence.as_str(),
            sub.confidence.as_str(),
            sub.score,
            next
        );
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}
