use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use statusboard::api;
use statusboard::fetch::StatusFetcher;
use statusboard::scheduler::PollerHandle;
use statusboard::settings::PollSettings;
use statusboard::storage::{Storage, config_path};
use statusboard::store::ServiceStore;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "statusboard", version)]
#[command(about = "Polls status pages and serves their current state to a dashboard")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Classify a single status page URL, print the result as JSON and exit
    #[arg(long, value_name = "URL")]
    probe: Option<String>,
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let settings = PollSettings::from_env();
    let fetcher =
        Arc::new(StatusFetcher::new(settings.fetch_timeout).context("failed to build HTTP client")?);

    if let Some(url) = cli.probe {
        let outcome = fetcher.fetch(&url).await;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let path = match cli.config {
        Some(path) => path,
        None => config_path()?,
    };
    let store = Arc::new(
        ServiceStore::open(Storage::new(&path))
            .with_context(|| format!("failed to load {}", path.display()))?,
    );
    info!("Using config file {}", path.display());

    let (poller, commands) = PollerHandle::channel(16);
    api::build(store, fetcher, settings, poller, commands)
        .launch()
        .await
        .map_err(|err| anyhow::anyhow!("server error: {err}"))?;
    Ok(())
}

fn init_tracing() {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
