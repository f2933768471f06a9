use clap::{Parser, Subcommand};
use rallytrack::config::Config;
use rallytrack::recorder::{load_capture, replay};
use rallytrack::session::GameMode;
use rallytrack::store::SessionStore;
use rallytrack::summary::{format_calories, format_date, format_duration, format_heart_rate, SessionSummary};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rallytrack", version, about = "Badminton session tracking from motion and heart-rate sensors")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a session from a JSON-lines sensor capture and save it
    Replay {
        capture: PathBuf,
        /// singles, doubles or mixed
        #[arg(long, default_value = "singles")]
        mode: GameMode,
        /// Print the summary without saving
        #[arg(long)]
        dry_run: bool,
    },
    /// List saved sessions, newest first
    History {
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        page_size: i64,
    },
    /// Totals for sessions started in [from, to), epoch milliseconds
    Stats {
        #[arg(long)]
        from: i64,
        #[arg(long)]
        to: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let store = SessionStore::open(&config);

    match cli.command {
        Command::Replay {
            capture,
            mode,
            dry_run,
        } => {
            let updates = load_capture(&capture)?;
            let mut session = replay(updates, mode, &config);
            if !dry_run {
                session.id = Some(store.save_session(&session).await?);
            }
            println!("{}", SessionSummary::new(&session));
            if let Some(id) = session.id {
                println!("Saved as session {}", id);
            }
        }
        Command::History { page, page_size } => {
            let outcome = store.get_history_list(page, page_size).await;
            if outcome.is_fallback() {
                log::warn!("History unavailable, showing an empty page");
            }
            let history = outcome.into_inner();
            println!(
                "Page {}/{} ({} sessions)",
                history.page,
                history.total_pages.max(1),
                history.total
            );
            for item in &history.items {
                println!(
                    "#{:<5} {}  {:<7}  {}  {:>4} strokes  {}",
                    item.id,
                    format_date(item.date),
                    item.mode.as_str(),
                    format_duration(item.duration),
                    item.strokes,
                    format_calories(item.calories)
                );
            }
        }
        Command::Stats { from, to } => {
            let outcome = store.get_stats_by_range(from, to).await;
            if outcome.is_fallback() {
                log::warn!("Stats unavailable for [{}, {})", from, to);
            }
            let stats = outcome.into_inner();
            println!("Sessions:   {}", stats.heart_rate_series.len());
            println!("Duration:   {}", format_duration(stats.total_duration));
            println!("Calories:   {}", format_calories(stats.total_calories as f64));
            println!("Strokes:    {}", stats.total_strokes);
            println!("Heart rate: {}", format_heart_rate(stats.avg_heart_rate));
        }
    }

    Ok(())
}
