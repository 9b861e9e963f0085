use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use scraper::Html;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use onetool_scout::crm::CrmClient;
use onetool_scout::extract::ProfileExtractor;
use onetool_scout::features::{CredentialStore, FileStore};
use onetool_scout::scraping::browser_manager::{self, LaunchOptions};
use onetool_scout::scraping::CdpPage;
use onetool_scout::sync::{Cycle, CycleSettings, PageSession};
use onetool_scout::{load_scout_config, CachedCredential, ContactDraft, ScoutConfig};

const DEFAULT_START_URL: &str = "https://www.linkedin.com/feed/";

#[derive(Debug, Parser)]
#[command(name = "onetool-scout", version, about = "Sync LinkedIn profiles into 1Tool CRM")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authenticate against 1Tool and cache the token.
    Login(LoginArgs),
    /// Forget the cached token.
    Logout,
    /// Show who is logged in.
    Status,
    /// Look up contacts by name.
    Lookup(LookupArgs),
    /// Extract a profile from saved HTML.
    Extract(ExtractArgs),
    /// Open a browser and sync every profile visited in it.
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
struct LoginArgs {
    #[arg(long, env = "ONETOOL_EMAIL")]
    email: String,
    #[arg(long, env = "ONETOOL_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Debug, Args)]
struct LookupArgs {
    #[arg(long)]
    first: String,
    #[arg(long)]
    last: String,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    /// Saved profile page.
    #[arg(long = "html")]
    file: PathBuf,
    /// URL the page was saved from.
    #[arg(long, default_value = "https://www.linkedin.com/in/unknown/")]
    url: String,
}

#[derive(Debug, Args)]
struct WatchArgs {
    #[arg(long, default_value = DEFAULT_START_URL)]
    url: String,
    #[arg(long)]
    headless: bool,
}

fn credential_store(config: &ScoutConfig) -> Result<CredentialStore> {
    let path = config
        .resolve_storage_path()
        .ok_or_else(|| anyhow!("no home directory; set ONETOOL_STORAGE_PATH"))?;
    Ok(CredentialStore::new(Arc::new(FileStore::new(path))))
}

async fn require_credential(store: &CredentialStore) -> Result<CachedCredential> {
    store
        .load()
        .await?
        .ok_or_else(|| anyhow!("not logged in; run `onetool-scout login` first"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_scout_config();

    match cli.command {
        Command::Login(args) => login(&config, args).await,
        Command::Logout => {
            credential_store(&config)?.clear().await?;
            println!("Logged out.");
            Ok(())
        }
        Command::Status => status(&config).await,
        Command::Lookup(args) => lookup(&config, args).await,
        Command::Extract(args) => extract(&config, args),
        Command::Watch(args) => watch(config, args).await,
    }
}

async fn login(config: &ScoutConfig, args: LoginArgs) -> Result<()> {
    let store = credential_store(config)?;
    let crm = CrmClient::from_config(config)?;
    info!("🔑 authenticating {} against {}", args.email, crm.base_url());

    let envelope = crm.authenticate(&args.email, &args.password).await;
    if let Some(response) = envelope.data() {
        let credential = CachedCredential::from_auth_response(response, &args.email);
        store.save(&credential).await?;
        println!("Logged in as {} ({})", credential.user, credential.tenant);
        return Ok(());
    }

    let reason = envelope
        .failure()
        .map(|f| {
            f.validation()
                .map(|v| v.message.clone())
                .unwrap_or_else(|| f.to_string())
        })
        .unwrap_or_else(|| "empty response".to_string());
    Err(anyhow!("Failed to login: {}", reason))
}

async fn status(config: &ScoutConfig) -> Result<()> {
    match credential_store(config)?.load().await? {
        Some(credential) => {
            let since = credential
                .logged_in_at
                .map(|t| format!(" since {}", t.to_rfc3339()))
                .unwrap_or_default();
            println!(
                "Logged in as {} (tenant {}){}",
                credential.user, credential.tenant, since
            );
        }
        None => println!("Not logged in."),
    }
    Ok(())
}

async fn lookup(config: &ScoutConfig, args: LookupArgs) -> Result<()> {
    let credential = require_credential(&credential_store(config)?).await?;
    let crm = CrmClient::from_config(config)?.with_credential(&credential);
    let filter = ContactDraft {
        vorname: Some(args.first),
        name: Some(args.last),
        ..Default::default()
    };
    let envelope = crm.find_contacts(&filter).await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn extract(config: &ScoutConfig, args: ExtractArgs) -> Result<()> {
    let html = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let doc = Html::parse_document(&html);
    let extractor = ProfileExtractor::new(config.resolve_name_strategy());
    let snapshot = extractor.snapshot(&doc, &args.url);
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn watch(config: ScoutConfig, args: WatchArgs) -> Result<()> {
    let store = credential_store(&config)?;
    if store.load().await?.is_none() {
        warn!("not logged in; profiles will show a login notice until `onetool-scout login` runs");
    }
    let crm = CrmClient::from_config(&config)?;

    let executable = browser_manager::find_chrome_executable()
        .ok_or_else(|| anyhow!("no Chromium-family browser found; set CHROME_EXECUTABLE"))?;
    let mut options = LaunchOptions::new(executable);
    options.headless = args.headless;
    options.profile_dir = config.resolve_browser_profile_dir();

    let (mut browser, handler) = browser_manager::launch(&options).await?;
    let page = browser
        .new_page(args.url.as_str())
        .await
        .map_err(|e| anyhow!("failed to open {}: {}", args.url, e))?;
    let page = Arc::new(CdpPage::new(page));
    page.install_navigation_hook().await?;

    let cycle = Arc::new(Cycle::new(
        page.clone(),
        store,
        crm,
        CycleSettings::from_config(&config),
    ));
    let session = PageSession::new(cycle).with_settle_delay(config.resolve_settle_delay());

    let shutdown = CancellationToken::new();
    // The hook queues `load` for the already-open document; the first drain
    // delivers it.
    let (tx, rx) = mpsc::channel(32);

    let pump = {
        let page = page.clone();
        let cancel = shutdown.clone();
        let interval = config.resolve_poll_interval();
        tokio::spawn(async move { page.pump_events(tx, interval, cancel).await })
    };
    let browser_closed = {
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            let _ = handler.await;
            info!("browser closed");
            cancel.cancel();
        })
    };
    let interrupted = {
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("🛑 interrupted");
                cancel.cancel();
            }
        })
    };

    info!("👀 watching {}", args.url);
    let report = session.run(rx, shutdown.clone()).await;
    shutdown.cancel();
    let _ = pump.await;
    interrupted.abort();

    info!(
        "{} cycle(s): {} completed, {} cancelled, {} failed",
        report.finished, report.completed, report.cancelled, report.failed
    );

    if let Err(e) = browser.close().await {
        warn!("browser close failed: {}", e);
    }
    browser_closed.abort();
    Ok(())
}
