use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use room_notifier::audit;
use room_notifier::calendar_client::GoogleCalendarSource;
use room_notifier::config::{Config, DEFAULT_CONFIG_PATH};
use room_notifier::db::SqliteStore;
use room_notifier::error::ConfigError;
use room_notifier::janitor;
use room_notifier::notifier::{ChatChannel, Notifier};
use room_notifier::poller::{AppContext, PollSettings};
use room_notifier::scheduler::PollingScheduler;
use room_notifier::telegram::TelegramChannel;

/// Exit code for configuration problems found before startup
const EXIT_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(name = "room-notifier")]
#[command(about = "Announces new meeting-room bookings to a Telegram chat")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(
        short,
        long,
        default_value = DEFAULT_CONFIG_PATH,
        env = "ROOM_NOTIFIER_CONFIG"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the room calendar and announce new bookings (default)
    Run,
    /// Remove processed events and log entries past the retention horizon, then exit
    Prune,
    /// Validate the config file and exit
    CheckConfig,
    /// Write a config template if none exists yet
    InitConfig,
    /// List chats the bot has recently seen, to find `telegram.chat_id`
    Chats,
    /// Print the most recent audit log entries
    Logs {
        /// Number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_notifier=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            if e.downcast_ref::<ConfigError>().is_some() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Command::Run) {
        Command::InitConfig => {
            if Config::write_template(&cli.config)? {
                tracing::info!("Created config template at {}", cli.config.display());
            } else {
                tracing::info!("Config file {} already exists", cli.config.display());
            }
            Ok(())
        }
        Command::CheckConfig => {
            load_config(&cli.config)?;
            tracing::info!("Config {} is valid", cli.config.display());
            Ok(())
        }
        Command::Chats => {
            let config = Config::load(&cli.config)?;
            config.validate_bot_token()?;
            list_chats(&config).await
        }
        Command::Logs { limit } => {
            let config = load_config(&cli.config)?;
            let mut store = open_store(&config).await?;
            for entry in store.recent_logs(limit).await?.into_iter().rev() {
                println!("{} [{}] {}", entry.created_at, entry.log_type, entry.message);
            }
            Ok(())
        }
        Command::Prune => {
            let config = load_config(&cli.config)?;
            let mut store = open_store(&config).await?;
            let counts = janitor::prune_expired(&mut store, Utc::now(), config.retention()).await?;
            println!(
                "Removed {} event record(s) and {} log entr(ies)",
                counts.events, counts.logs
            );
            Ok(())
        }
        Command::Run => run_service(load_config(&cli.config)?).await,
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load(path)?;
    config.validate()?;
    Ok(config)
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open(&config.db_file)
        .await
        .with_context(|| format!("Failed to open database {}", config.db_file))
}

async fn list_chats(config: &Config) -> Result<()> {
    let mut channel = TelegramChannel::new(
        &config.telegram,
        &config.session_name,
        config.request_timeout(),
    );
    let chats = channel
        .recent_chats()
        .await
        .context("Failed to fetch recent chats from Telegram")?;
    channel.disconnect().await;

    if chats.is_empty() {
        println!("No chats found. Add the bot to the group and post a message there first.");
        return Ok(());
    }

    println!("{:<16} | {:<10} | {}", "ID", "TYPE", "NAME");
    println!("{}", "-".repeat(60));
    for chat in chats {
        println!("{:<16} | {:<10} | {}", chat.id, chat.kind, chat.name);
    }
    Ok(())
}

async fn run_service(config: Config) -> Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let tz = config.time_zone()?;
    let mut store = open_store(&config).await?;
    audit::info(
        &mut store,
        format!(
            "Starting room booking monitor for {} (poll interval: {} min)",
            config.room_id, config.poll_interval_minutes
        ),
    )
    .await;

    let source = match GoogleCalendarSource::new(&config.calendar, tz).await {
        Ok(source) => source,
        Err(e) => {
            audit::error(&mut store, format!("Failed to set up calendar source: {}", e)).await;
            return Err(e.into());
        }
    };

    let channel = TelegramChannel::new(
        &config.telegram,
        &config.session_name,
        config.request_timeout(),
    );
    let notifier = Notifier::new(
        channel,
        config.telegram.chat_id.to_string(),
        config.request_timeout(),
    );

    let settings = PollSettings {
        room_id: config.room_id.clone(),
        lookahead: config.lookahead(),
        retention: config.retention(),
        fetch_timeout: config.request_timeout(),
        tz,
    };
    let mut context = AppContext::new(settings, source, store, notifier);

    let stop = CancellationToken::new();
    tokio::spawn({
        let stop = stop.clone();
        async move {
            wait_for_shutdown().await;
            tracing::info!("Shutdown signal received, stopping after the current cycle...");
            stop.cancel();
        }
    });

    let scheduler = PollingScheduler::new(config.poll_interval(), config.cleanup_interval(), stop);
    scheduler.run(&mut context).await;

    tracing::info!("Room notifier stopped");
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
