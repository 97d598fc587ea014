use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tably::api::{DirectApi, RelayApi, ReservationApi};
use tably::config::Settings;
use tably::engine::{self, GlobalBackoff, PoolContext, Stats, SystemClock};
use tably::notify::{Notifier, NullNotifier, TelegramNotifier};
use tably::shutdown;

#[derive(Parser)]
#[command(
    name = "tably",
    version,
    about = "Reservation availability sniper with burst-window polling",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll availability and book the moment a matching slot appears
    Run,

    /// Validate configuration and auth token, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Run => run().await,
        Commands::Check => check(),
    }
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("tably=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("tably=info,warn")
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

async fn run() -> Result<()> {
    let settings = Settings::from_env()?;
    settings.validate()?;

    let tasks = settings.tasks();
    if tasks.is_empty() {
        anyhow::bail!("no tasks configured");
    }

    tracing::info!(
        tasks = tasks.len(),
        venue_id = %settings.venue_id,
        party_sizes = %settings.party_sizes,
        hour_window = format!("{}:00-{}:00", settings.start_time, settings.end_time),
        days_out = format!("{}-{}", settings.min_days_out, settings.max_days_out),
        report_interval_hours = settings.status_report_interval_hours,
        "tably starting"
    );

    let notifier: Arc<dyn Notifier> = match settings.telegram() {
        Some(config) => Arc::new(TelegramNotifier::new(config)),
        None => {
            tracing::info!("Telegram credentials not set, notifications disabled");
            Arc::new(NullNotifier)
        }
    };

    let stats = Arc::new(Stats::new());
    let stop = Arc::new(AtomicBool::new(false));
    let ctx = PoolContext {
        backoff: Arc::new(GlobalBackoff::new()),
        stats: Arc::clone(&stats),
        notifier: Arc::clone(&notifier),
        clock: Arc::new(SystemClock),
        stop: Arc::clone(&stop),
        stagger: settings.stagger(),
    };

    shutdown::spawn_stop_on_signal(Arc::clone(&stop));
    spawn_status_reporter(
        Arc::clone(&stats),
        Arc::clone(&notifier),
        Arc::clone(&stop),
        settings.report_interval(),
    );

    let proxy = match settings.proxy_config() {
        Ok(proxy) => proxy,
        Err(e) => {
            notifier.notify_fatal(&e.to_string()).await;
            return Err(e);
        }
    };

    let auth_token = settings.auth_token.clone();
    let relay_url = settings.relay_url.clone();
    let outcomes = engine::run_tasks(tasks, ctx, move |_task| {
        let direct = DirectApi::new(&auth_token, proxy.clone())?;
        Ok(match &relay_url {
            Some(url) => {
                Arc::new(RelayApi::new(direct, url, &auth_token)) as Arc<dyn ReservationApi>
            }
            None => Arc::new(direct) as Arc<dyn ReservationApi>,
        })
    })
    .await;

    tracing::info!(finished = outcomes.len(), "All tasks finished");
    Ok(())
}

fn spawn_status_reporter(
    stats: Arc<Stats>,
    notifier: Arc<dyn Notifier>,
    stop: Arc<AtomicBool>,
    interval: std::time::Duration,
) {
    tokio::spawn(async move {
        let started = Instant::now();
        loop {
            tokio::time::sleep(interval).await;
            if stop.load(Ordering::Relaxed) {
                break;
            }

            let uptime_hours = started.elapsed().as_secs_f64() / 3600.0;
            let (scan_count, availability) = stats.drain();
            tracing::info!(scan_count, uptime_hours, "Sending status report");
            notifier
                .notify_status_report(scan_count, &availability, uptime_hours)
                .await;
        }
    });
}

fn check() -> Result<()> {
    let settings = Settings::from_env()?;
    settings.validate()?;

    println!("Configuration OK");
    println!("  Venue: {}", settings.venue_id);
    println!("  Party sizes: {}", settings.party_sizes);
    println!(
        "  Hour window: {}:00-{}:00",
        settings.start_time, settings.end_time
    );
    println!(
        "  Days out: {}-{}",
        settings.min_days_out, settings.max_days_out
    );
    println!(
        "  Burst window: {}-{} ({})",
        settings.burst_start,
        settings.burst_end,
        tably::engine::timing::REFERENCE_TZ
    );

    let (valid, message) = tably::auth::check_expiry(&settings.auth_token);
    println!("  Token: {message}");
    if !valid {
        anyhow::bail!("auth token is not usable");
    }

    if let Some(hours) = tably::auth::hours_remaining(&settings.auth_token) {
        println!("  Token hours remaining: {hours:.1}");
    }

    println!(
        "  Notifications: {}",
        if settings.telegram().is_some() { "telegram" } else { "disabled" }
    );
    println!(
        "  Booking transport: {}",
        settings.relay_url.as_deref().unwrap_or("direct")
    );

    Ok(())
}
