mod config_commands;

use std::{path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    clinic_common::{ConsultationId, MessageBody},
    clinic_store::{MemoryMessageStore, MessageStore, SqliteMessageStore},
};

#[derive(Parser)]
#[command(name = "clinic", about = "Clinic consultation chat backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Only look for `clinic.{toml,yaml,yml,json}` in this directory.
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Gateway {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long, env = "PORT")]
        port: Option<u16>,
        /// Keep messages in memory only; nothing survives a restart.
        #[arg(long)]
        ephemeral: bool,
    },
    /// Print the stored chat history of a consultation.
    History {
        consultation: String,
        /// Print the raw message records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

async fn open_store(url: &str) -> anyhow::Result<Arc<dyn MessageStore>> {
    let store = SqliteMessageStore::connect(url).await?;
    Ok(Arc::new(store))
}

async fn print_history(consultation: &str, json: bool) -> anyhow::Result<()> {
    let config = clinic_config::discover_and_load();
    let store = open_store(&config.database.url).await?;
    let messages = store.history(&ConsultationId::new(consultation)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }
    if messages.is_empty() {
        println!("No messages for consultation {consultation}");
        return Ok(());
    }
    for msg in &messages {
        let body = match &msg.body {
            MessageBody::Text(text) => text.clone(),
            MessageBody::Attachment(a) => format!(
                "[{}] {}",
                a.mime,
                a.filename.as_deref().unwrap_or(a.url.as_str())
            ),
        };
        println!(
            "{} {} ({}): {}",
            msg.sent_at.format("%Y-%m-%d %H:%M:%S"),
            msg.author.name,
            msg.author.role,
            body
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(dir) = &cli.config_dir {
        clinic_config::set_config_dir(dir.clone());
    }

    match cli.command {
        Commands::Gateway {
            bind,
            port,
            ephemeral,
        } => {
            info!(version = env!("CARGO_PKG_VERSION"), "clinic starting");
            let mut config = clinic_config::discover_and_load();
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let store: Arc<dyn MessageStore> = if ephemeral {
                info!("using in-memory message store");
                Arc::new(MemoryMessageStore::new())
            } else {
                open_store(&config.database.url).await?
            };
            clinic_gateway::start_gateway(config, store).await
        },
        Commands::History { consultation, json } => print_history(&consultation, json).await,
        Commands::Config { action } => config_commands::handle_config(action),
    }
}
