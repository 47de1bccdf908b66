//! PredictX: prediction-market client
//!
//! Entry point. Loads configuration, initialises structured logging and
//! runs one CLI command against the configured backend.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use predictx::api::http::HttpPredictionApi;
use predictx::config::AppConfig;
use predictx::projection::{self, format_usd, PredictionCard};
use predictx::store::{PredictionStore, StoreError};
use predictx::types::{Outcome, PredictionId, PredictorType, StakeChoice};
use predictx::wager::WagerSession;
use predictx::wallet::{StaticWallet, WalletProvider};

type Store = PredictionStore<HttpPredictionApi>;

#[derive(Parser)]
#[command(name = "predictx", version, about = "PredictX prediction-market client")]
struct Args {
    #[command(subcommand)]
    command: Commands,
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Override `[api] base_url`.
    #[arg(short, long)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print every prediction.
    List {
        #[arg(short, long)]
        predictor: Option<PredictorType>,
    },
    /// Poll the backend and print new predictions until Ctrl-C.
    Watch {
        #[arg(short, long)]
        predictor: Option<PredictorType>,
        /// Override `[refresh] interval_secs`.
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Ask the backend for an AI prediction.
    Generate { asset: Option<String> },
    /// Stake on a prediction.
    #[command(group(
        ArgGroup::new("side")
            .required(true)
            .args(["yes", "no", "support", "oppose"]),
    ))]
    Stake {
        #[arg(short, long)]
        id: PredictionId,
        #[arg(short, long)]
        amount: String,
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        no: bool,
        #[arg(long)]
        support: bool,
        #[arg(long)]
        oppose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let args = Args::parse();
    let cfg = AppConfig::load_or_default(&args.config)?;

    init_logging();

    let base_url = args.url.clone().unwrap_or_else(|| cfg.api.base_url.clone());
    info!(base_url = %base_url, timeout_secs = cfg.api.timeout_secs, "PredictX starting up");

    let api = HttpPredictionApi::new(&base_url, cfg.api.timeout())?;
    let store = Arc::new(PredictionStore::new(api));

    let result = match args.command {
        Commands::List { predictor } => list(&store, predictor).await,
        Commands::Watch {
            predictor,
            interval,
        } => {
            let every = interval
                .map(|s| Duration::from_secs(s.max(1)))
                .unwrap_or_else(|| cfg.refresh.interval());
            watch(&store, predictor, every).await
        }
        Commands::Generate { asset } => {
            let asset = asset.unwrap_or_else(|| cfg.display.default_asset.clone());
            generate(&store, &asset).await
        }
        Commands::Stake {
            id,
            amount,
            yes,
            no,
            support,
            oppose: _,
        } => {
            let choice = if yes {
                StakeChoice::Outcome(Outcome::Yes)
            } else if no {
                StakeChoice::Outcome(Outcome::No)
            } else {
                StakeChoice::SupportAi(support)
            };
            let wallet = StaticWallet::new(cfg.wallet_address());
            stake(&store, &wallet, id, &amount, choice).await
        }
    };

    store.shutdown();
    result
}

/// Print the current collection, optionally filtered by author type.
async fn list(store: &Store, predictor: Option<PredictorType>) -> Result<()> {
    let predictions = store.fetch_all().await?;
    let now = Utc::now();
    let parts = projection::partition(&predictions);

    for predictor_type in PredictorType::ALL {
        if predictor.is_some_and(|p| p != *predictor_type) {
            continue;
        }
        let section = parts.get(*predictor_type);
        println!("== {} predictions ({}) ==", predictor_type.label(), section.len());
        for p in section {
            println!("{}\n", PredictionCard::build(p, now));
        }
    }
    Ok(())
}

/// Poll on the refresh interval and print predictions not seen before.
async fn watch(store: &Store, predictor: Option<PredictorType>, every: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(every);
    let mut seen: HashSet<PredictionId> = HashSet::new();

    // Set up graceful shutdown via Ctrl-C
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(interval_secs = every.as_secs(), "Watching predictions");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.fetch_all().await {
                    Ok(predictions) => {
                        let now = Utc::now();
                        let fresh: Vec<_> = predictions
                            .iter()
                            .filter(|p| predictor.map_or(true, |t| p.predictor_type == t))
                            .filter(|p| seen.insert(p.id))
                            .collect();
                        for p in &fresh {
                            println!("{}\n", PredictionCard::build(p, now));
                        }
                        info!(total = predictions.len(), new = fresh.len(), "Refresh complete");
                    }
                    Err(StoreError::Superseded { .. }) => {}
                    Err(e) => warn!(error = %e, "Refresh failed, keeping last list"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }
    Ok(())
}

async fn generate(store: &Store, asset: &str) -> Result<()> {
    let created = store
        .create_ai_prediction(asset)
        .await
        .with_context(|| format!("Could not generate a prediction for {asset}"))?;
    println!("{}", PredictionCard::build(&created, Utc::now()));
    Ok(())
}

async fn stake(
    store: &Store,
    wallet: &StaticWallet,
    id: PredictionId,
    amount: &str,
    choice: StakeChoice,
) -> Result<()> {
    store.fetch_all().await?;
    let snapshot = store.snapshot();
    let prediction = snapshot
        .find(id)
        .with_context(|| format!("Prediction #{id} not found"))?;

    wallet.login().await?;

    let mut session = WagerSession::new(prediction.clone());
    if !session.choose(choice) {
        bail!("{choice} does not apply to a {}", prediction.kind.name());
    }
    if !session.enter_amount(amount) {
        bail!("Invalid stake amount: {amount:?}");
    }
    if let Some(payout) = session.payout_preview() {
        println!("Potential payout: {}", format_usd(payout));
    }

    match session.submit(store, wallet).await {
        Some(Ok(receipt)) => {
            println!("Stake confirmed: {receipt}");
            Ok(())
        }
        Some(Err(e)) => Err(e).context("Stake rejected"),
        None => bail!("Stake was not submitted (phase: {})", session.phase()),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("predictx=info"));

    let json_logging = std::env::var("PREDICTX_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
