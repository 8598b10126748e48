use std::sync::Arc;

use {
    clap::Parser,
    secrecy::Secret,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    crosspost_directory::SqliteStore,
    crosspost_telegram::{BotConfig, start_polling},
};

#[derive(Parser)]
#[command(name = "crosspost", about = "Telegram bot for mutual post exchanges")]
struct Cli {
    /// Bot token from @BotFather.
    #[arg(long, env = "CROSSPOST_BOT_TOKEN", hide_env_values = true)]
    token: String,

    /// SQLite database URL. `mode=rwc` creates the file on first run.
    #[arg(
        long,
        env = "CROSSPOST_DATABASE_URL",
        default_value = "sqlite:crosspost.db?mode=rwc"
    )]
    database_url: String,

    /// User IDs allowed to open the admin panel (comma-separated).
    #[arg(long, env = "CROSSPOST_ADMINS", value_delimiter = ',')]
    admins: Vec<i64>,

    /// Channel username (without @) users must be subscribed to.
    #[arg(long, env = "CROSSPOST_REQUIRED_CHANNEL")]
    required_channel: Option<String>,

    /// Seconds of inactivity before an exchange is dropped.
    #[arg(long, env = "CROSSPOST_NEGOTIATION_TTL_SECS", default_value_t = 86_400)]
    negotiation_ttl_secs: u64,

    /// Seconds between idle-exchange sweeps.
    #[arg(long, env = "CROSSPOST_SWEEP_INTERVAL_SECS", default_value_t = 600)]
    sweep_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "crosspost starting");

    let store = Arc::new(SqliteStore::new(&cli.database_url).await?);

    let config = BotConfig {
        token: Secret::new(cli.token),
        admins: cli.admins,
        required_channel: cli.required_channel,
        negotiation_ttl_secs: cli.negotiation_ttl_secs,
        sweep_interval_secs: cli.sweep_interval_secs,
    };

    let cancel = start_polling(
        config,
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
    )
    .await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    cancel.cancel();

    Ok(())
}
