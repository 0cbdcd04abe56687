use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cfmirror::api::{CodeforcesApi, CodeforcesClient};
use cfmirror::cache::{CacheSystem, RanklistMode};
use cfmirror::config::Config;
use cfmirror::events::EventSystem;
use cfmirror::metrics;
use cfmirror::models::{Contest, Phase};
use cfmirror::ranklist::{RatingCalculator, StandingEntry};
use cfmirror::server::{AdminServer, AppState};
use cfmirror::storage::SqliteCacheStore;
use cfmirror::utils::{duration_until, format_duration, unix_now};

#[derive(Parser)]
#[command(
    name = "cfmirror",
    version,
    about = "Local mirror of Codeforces contests, problems and rating changes",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML). Environment variables are used otherwise.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json). Overrides the configured format.
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every cache until interrupted
    Run {
        /// Serve the admin API even if disabled in the configuration
        #[arg(long, default_value = "false")]
        serve: bool,
    },

    /// Fetch the contest list once and print it by phase
    Contests {
        /// Include gym contests
        #[arg(long, default_value = "false")]
        gym: bool,
    },

    /// Predict rating changes of a contest
    Predict {
        /// Contest id
        contest_id: i32,

        /// Number of rows to print
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,
    },

    /// Run the rating calculator over a JSON standings file
    Calc {
        /// File holding an array of {party, points, penalty, rating}
        file: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    tracing::info!("cfmirror starting");

    match cli.command {
        Commands::Run { serve } => {
            tracing::info!(serve = %serve, "Starting run command");
            run(config, serve).await?;
        }
        Commands::Contests { gym } => {
            tracing::info!(gym = %gym, "Starting contests command");
            contests(config, gym).await?;
        }
        Commands::Predict { contest_id, top } => {
            tracing::info!(contest_id = %contest_id, top = %top, "Starting predict command");
            predict(config, contest_id, top).await?;
        }
        Commands::Calc { file } => {
            tracing::info!(file = %file.display(), "Starting calc command");
            calc(&file)?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config).context("Failed to render config")?);
        }
    }

    tracing::info!("cfmirror completed successfully");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("cfmirror=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("cfmirror={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}

fn cache_system(config: &Config) -> Result<CacheSystem> {
    let api = Arc::new(CodeforcesClient::new(&config.api).context("Failed to build API client")?);
    let store = Arc::new(
        SqliteCacheStore::new(&config.database.sqlite_path).with_context(|| {
            format!("Failed to open database: {}", config.database.sqlite_path.display())
        })?,
    );
    Ok(CacheSystem::new(
        api,
        store,
        Arc::new(EventSystem::new()),
        config.cache.clone(),
    ))
}

async fn run(config: Config, serve: bool) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let caches = Arc::new(cache_system(&config)?);
    caches.run().await.context("Failed to start caches")?;

    let shutdown = CancellationToken::new();
    let server = if serve || config.server.enabled {
        let server = AdminServer::new(config.server.bind_addr, AppState::new(caches.clone()));
        let token = shutdown.clone();
        Some(tokio::spawn(async move {
            server
                .start_with_shutdown(async move { token.cancelled().await })
                .await
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Interrupt received, shutting down");

    shutdown.cancel();
    if let Some(handle) = server {
        match handle.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin server failed"),
            Err(e) => tracing::error!(error = %e, "Admin server task panicked"),
            Ok(Ok(())) => {}
        }
    }
    caches.shutdown().await;
    Ok(())
}

async fn contests(config: Config, gym: bool) -> Result<()> {
    let client = CodeforcesClient::new(&config.api)?;
    let contests = client.contest_list(Some(gym)).await?;
    let now = unix_now();

    let mut by_phase: BTreeMap<&'static str, Vec<_>> = BTreeMap::new();
    for contest in &contests {
        by_phase.entry(contest.phase.as_str()).or_default().push(contest);
    }

    for phase in [Phase::Before, Phase::Coding, Phase::PendingSystemTest, Phase::SystemTest] {
        if let Some(list) = by_phase.get(phase.as_str()) {
            println!("{} ({})", phase.as_str(), list.len());
            for contest in list {
                println!("{}", contest_line(contest, now));
            }
        }
    }
    let finished = by_phase.get(Phase::Finished.as_str()).map_or(0, Vec::len);
    println!("{} ({finished})", Phase::Finished.as_str());
    Ok(())
}

/// One row of the `contests` listing
fn contest_line(contest: &Contest, now: i64) -> String {
    let mut line = format!("  {:>6}  {}  {}", contest.id, contest.name, contest.url());
    if let (Phase::Before, Some(start)) = (contest.phase, contest.start_time) {
        let until = format_duration(duration_until(start, now));
        line.push_str(&format!("  (starts in {until})"));
    }
    line
}

async fn predict(config: Config, contest_id: i32, top: usize) -> Result<()> {
    let caches = cache_system(&config)?;
    caches.rating_changes.run()?;

    let result = caches
        .ranklist
        .generate_ranklist(contest_id, RanklistMode::Predict, false)
        .await;
    caches.shutdown().await;
    let ranklist = result?;

    println!("{} ({:?})", ranklist.contest.name, ranklist.status());
    if !ranklist.is_rated() {
        println!("Contest is not rated");
        return Ok(());
    }

    for row in ranklist.standings.iter().take(top) {
        let Some(handle) = row.party.first_handle() else {
            continue;
        };
        match ranklist.deltas().get(handle) {
            Some(delta) => println!("{:>6}  {:<24} {:+}", row.rank, handle, delta),
            None => println!("{:>6}  {:<24} -", row.rank, handle),
        }
    }
    Ok(())
}

fn calc(file: &std::path::Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read standings file: {}", file.display()))?;
    let standings: Vec<StandingEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse standings file: {}", file.display()))?;

    let calculator = RatingCalculator::new(standings);
    for contestant in calculator.contestants() {
        println!(
            "{:>8.1}  {:<24} {:>5} {:+}",
            contestant.rank, contestant.party, contestant.rating, contestant.delta
        );
    }
    Ok(())
}
