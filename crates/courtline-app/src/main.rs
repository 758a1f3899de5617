// Courtline entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, stdout is reserved for reports)
// 2. Load config (copying defaults on first run)
// 3. Open database
// 4. Spawn the audit writer task
// 5. Run the requested command
// 6. Drop the staking engine and wait for the audit writer to drain

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use courtline_app::{audit, report};
use courtline_core::config::{self, Config};
use courtline_core::db::Database;
use courtline_core::model::{PlayerId, Surface, TierLevel};
use courtline_engine::rating::compute_performance_ratings;
use courtline_engine::{
    set_score_distribution, AnalysisRequest, BestOf, MatchAnalyzer, StakeContext, StakingEngine,
};
use serde::Serialize;
use tracing::{error, info};

/// Tennis match analysis and stake sizing.
#[derive(Parser, Debug)]
#[command(name = "courtline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print machine-readable JSON instead of the text report
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a matchup between two players
    Analyze {
        player_a: PlayerId,
        player_b: PlayerId,

        /// Court surface (hard, clay, grass, carpet)
        #[arg(long, short = 's', value_parser = parse_surface)]
        surface: Option<Surface>,

        /// Analysis date (YYYY-MM-DD), defaults to today
        #[arg(long, short = 'd')]
        date: Option<NaiveDate>,

        /// Decimal price for the first player
        #[arg(long)]
        price_a: Option<f64>,

        /// Decimal price for the second player
        #[arg(long)]
        price_b: Option<f64>,

        /// Tournament name, used to place the match on the tier ladder
        #[arg(long, short = 't')]
        tournament: Option<String>,
    },

    /// Evaluate a single bet
    Stake {
        /// Model win probability (0-1)
        probability: f64,

        /// Decimal odds
        odds: f64,

        /// Event tier (tour, challenger, itf)
        #[arg(long, value_parser = parse_tier)]
        tier: Option<TierLevel>,
    },

    /// Set-score distribution for a match probability
    Sets {
        /// Match win probability for the first player (0-1)
        probability: f64,

        /// Match format: 3 or 5
        #[arg(long, default_value_t = 3)]
        best_of: u8,
    },

    /// Rebuild stored performance ratings
    Rate {
        /// Rating date (YYYY-MM-DD), defaults to today
        #[arg(long, short = 'd')]
        date: Option<NaiveDate>,
    },
}

fn parse_surface(s: &str) -> Result<Surface, String> {
    Surface::from_str_surface(s).ok_or_else(|| format!("unknown surface: {s}"))
}

fn parse_tier(s: &str) -> Result<TierLevel, String> {
    TierLevel::from_str_level(s).ok_or_else(|| format!("unknown tier: {s}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Initialize tracing
    init_tracing()?;
    info!("courtline starting: {:?}", cli.command);

    // 2. Load config
    let base_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let config = config::load_config(&base_dir).context("failed to load configuration")?;

    // 3. Open database
    let db = Arc::new(Database::open(&config.db_path).context("failed to open database")?);
    info!("Database opened at {}", config.db_path);

    // 4. Spawn the audit writer
    let (sink, audit_handle) = audit::audit_channel(db.clone());
    let staking = StakingEngine::with_audit(config.staking.clone(), Arc::new(sink));

    // 5. Run the command
    let result = run(cli, &config, db, &staking).await;
    if let Err(e) = &result {
        error!("command failed: {e:#}");
    }

    // 6. Drain the audit trail
    drop(staking);
    match tokio::time::timeout(std::time::Duration::from_secs(5), audit_handle).await {
        Ok(Ok(written)) => info!("{written} audit records written"),
        Ok(Err(e)) => error!("audit writer failed: {e}"),
        Err(_) => error!("timed out waiting for audit writer"),
    }

    result
}

async fn run(cli: Cli, config: &Config, db: Arc<Database>, staking: &StakingEngine) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Analyze {
            player_a,
            player_b,
            surface,
            date,
            price_a,
            price_b,
            tournament,
        } => {
            let mut req = AnalysisRequest::new(player_a, player_b);
            req.surface = surface;
            req.as_of = date;
            req.price_a = price_a;
            req.price_b = price_b;
            req.tournament = tournament;

            let analyzer = MatchAnalyzer::new(db, config.engine.clone());
            let result = tokio::task::spawn_blocking(move || analyzer.analyze(&req))
                .await
                .context("analysis task panicked")??;

            let mut stakes = Vec::new();
            let sides = [
                (&result.side_a.name, result.p1_probability, price_a),
                (&result.side_b.name, result.p2_probability, price_b),
            ];
            for (name, probability, price) in sides {
                let Some(odds) = price else { continue };
                let ctx = StakeContext {
                    tier: result.match_tier(),
                    selection: Some(format!(
                        "{name} ({} v {})",
                        result.side_a.name, result.side_b.name
                    )),
                };
                stakes.push((name.clone(), staking.evaluate_stake(probability, odds, &ctx)?));
            }

            if json {
                #[derive(Serialize)]
                struct Output<'a, A, S> {
                    analysis: &'a A,
                    stakes: &'a [S],
                }
                emit_json(&Output {
                    analysis: &result,
                    stakes: &stakes,
                })?;
            } else {
                print_lines(&report::analysis_lines(&result));
                for (name, decision) in &stakes {
                    println!();
                    println!("{name}");
                    print_lines(&report::stake_lines(decision));
                }
            }
        }

        Commands::Stake {
            probability,
            odds,
            tier,
        } => {
            let ctx = StakeContext {
                tier,
                selection: Some(format!("manual {probability:.3} @ {odds:.2}")),
            };
            let decision = staking.evaluate_stake(probability, odds, &ctx)?;
            if json {
                emit_json(&decision)?;
            } else {
                print_lines(&report::stake_lines(&decision));
            }
        }

        Commands::Sets {
            probability,
            best_of,
        } => {
            if !(0.0..=1.0).contains(&probability) {
                bail!("probability must be within [0, 1], got {probability}");
            }
            let format = BestOf::try_from(best_of)?;
            let dist = set_score_distribution(probability, format);
            if json {
                emit_json(&dist)?;
            } else {
                print_lines(&report::set_score_lines(&dist));
            }
        }

        Commands::Rate { date } => {
            let as_of = date.unwrap_or_else(|| Utc::now().date_naive());
            let cfg = config.engine.rating.clone();
            let stored = tokio::task::spawn_blocking(move || -> Result<usize> {
                let since = as_of - Duration::days(cfg.window_days);
                let matches = db.matches_between(since, as_of)?;
                let canonical = db.canonical_map()?;
                let ratings = compute_performance_ratings(&matches, &canonical, as_of, &cfg);
                let mut rows: Vec<(PlayerId, f64)> = ratings.into_iter().collect();
                rows.sort_by_key(|(id, _)| *id);
                db.store_performance_ratings(&rows, as_of)?;
                info!(
                    "Performance ratings rebuilt from {} matches for {} players",
                    matches.len(),
                    rows.len()
                );
                Ok(rows.len())
            })
            .await
            .context("rating task panicked")??;

            if json {
                emit_json(&serde_json::json!({ "as_of": as_of, "players": stored }))?;
            } else {
                println!("Stored performance ratings for {stored} players as of {as_of}");
            }
        }
    }
    Ok(())
}

fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{out}");
    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

/// Initialize tracing to log to a file so stdout stays clean for reports.
fn init_tracing() -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("courtline.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("courtline=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
