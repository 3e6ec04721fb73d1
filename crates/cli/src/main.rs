use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{error, info, warn};

use gatedeck_api::GatewayApi;
use gatedeck_client::HttpGateway;
use gatedeck_console::{Alert, AlertKind, Console, PairingPhase, PairingView, Renderer, StatusOverlay};
use gatedeck_core::{Account, ChatbotConfig};
use gatedeck_persist::SqliteStore;

#[derive(Parser, Debug)]
#[command(name = "gatedeckctl", version, about = "Gatedeck operator console")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Gateway base URL
    #[arg(long = "url", global = true, env = "GATEDECK_URL", default_value = "http://127.0.0.1:3000")]
    url: String,

    /// Local state database path (default: GATEDECK_DB_PATH or ~/.gatedeck)
    #[arg(long = "db", global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Attach a resident console: push events, debounced refresh,
    /// periodic reconciliation. Runs until ctrl-c or session loss.
    Attach,
    /// List accounts known to the gateway
    Accounts,
    /// Aggregate gateway statistics
    Stats,
    /// Gateway health probe
    Health,
    /// Tail recent service logs
    Logs {
        #[arg(long = "limit", default_value_t = 100)]
        limit: usize,
    },
    /// Start (or restart) pairing for an account and wait for the code
    Pair {
        account_id: String,
    },
    /// Ask the gateway to reconnect a disconnected account
    Reconnect {
        account_id: String,
    },
    /// Delete an account. Refuses without --yes.
    Delete {
        account_id: String,
        #[arg(long = "yes", action = ArgAction::SetTrue)]
        yes: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("GATEDECK_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("GATEDECK_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid GATEDECK_METRICS_ADDR; expected host:port");
        }
    }
}

/// Terminal renderer for the resident console: accounts as a table,
/// pairing codes and alerts on stdout, everything else via tracing.
struct TermRenderer;

impl Renderer for TermRenderer {
    fn render_accounts(&self, visible: &[Account], overlay: &StatusOverlay) {
        println!("{:<14} {:<20} {:<14} PHONE", "ID", "NAME", "STATUS");
        for a in visible {
            let status = overlay.get(&a.id).copied().unwrap_or(a.status);
            println!(
                "{:<14} {:<20} {:<14} {}",
                a.id,
                a.name,
                status,
                a.phone_number.as_deref().unwrap_or("-")
            );
        }
    }

    fn render_pairing(&self, view: &PairingView) {
        match &view.phase {
            PairingPhase::Requested => {
                println!("pairing {}: waiting for code...", view.account_id)
            }
            PairingPhase::Displayed { artifact, .. } => {
                println!("pairing {}: code {}", view.account_id, artifact.0)
            }
        }
    }

    fn clear_pairing(&self) {
        info!("pairing window closed");
    }

    fn render_alert(&self, alert: &Alert) {
        match alert.kind {
            AlertKind::Error => error!("{}", alert.text),
            AlertKind::Warn => warn!("{}", alert.text),
            _ => info!("{}", alert.text),
        }
    }

    fn render_unread_badge(&self, unread: usize) {
        if unread > 0 {
            info!(unread, "unread notifications");
        }
    }

    fn render_chatbot(&self, account_id: &str, cfg: &ChatbotConfig) {
        info!(account = %account_id, provider = %cfg.provider, model = %cfg.model, active = cfg.is_active, "chatbot configuration");
    }

    fn redirect_to_login(&self) {
        eprintln!("session ended; log in to the gateway and re-attach");
    }
}

fn open_store(db: Option<&str>) -> Result<SqliteStore> {
    match db {
        Some(path) => SqliteStore::open(path),
        None => SqliteStore::open_default(),
    }
}

async fn attach(api: Arc<HttpGateway>, db: Option<&str>) -> Result<()> {
    let store = Arc::new(open_store(db)?);
    let console = Console::new(
        api,
        store.clone(),
        store,
        Arc::new(TermRenderer),
    );
    console.start().await?;
    info!("console attached; ctrl-c to detach");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("detaching");
        }
        _ = console.wait_shutdown() => {
            // session loss already redirected; nothing left to run
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let api = Arc::new(HttpGateway::new(&cli.url)?);

    match cli.command {
        Commands::Attach => attach(api, cli.db.as_deref()).await?,
        Commands::Accounts => {
            let accounts = api.list_accounts().await?;
            match cli.output {
                Output::Human => {
                    TermRenderer.render_accounts(&accounts, &StatusOverlay::default())
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&accounts)?),
            }
        }
        Commands::Stats => {
            let stats = api.stats().await?;
            match cli.output {
                Output::Human => println!(
                    "accounts {}/{} ready • {} messages today • {} webhook deliveries",
                    stats.accounts_ready,
                    stats.accounts_total,
                    stats.messages_today,
                    stats.webhook_deliveries
                ),
                Output::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            }
        }
        Commands::Health => {
            let report = api.health().await?;
            match cli.output {
                Output::Human => {
                    let state = if report.healthy { "healthy" } else { "unhealthy" };
                    println!(
                        "{} • up {}s • {}",
                        state,
                        report.uptime_secs,
                        report.version.as_deref().unwrap_or("unknown version")
                    );
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
        Commands::Logs { limit } => {
            for line in api.service_logs(limit).await? {
                println!("{}", line);
            }
        }
        Commands::Pair { account_id } => {
            // cached code first; only then ask the gateway to generate one
            if let Some(code) = api.pairing_code(&account_id).await? {
                println!("pairing {}: code {}", account_id, code.0);
                return Ok(());
            }
            let resp = api.request_pairing(&account_id).await?;
            match resp.status {
                Some(s) if !s.can_pair() => println!("{} is already {}", account_id, s),
                _ => {
                    // the code arrives over push; poll the cached endpoint
                    for _ in 0..30 {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        if let Some(code) = api.pairing_code(&account_id).await? {
                            println!("pairing {}: code {}", account_id, code.0);
                            return Ok(());
                        }
                    }
                    warn!(account = %account_id, "no pairing code after 30s; try `attach`");
                }
            }
        }
        Commands::Reconnect { account_id } => {
            api.reconnect(&account_id).await?;
            println!("reconnect requested for {}", account_id);
        }
        Commands::Delete { account_id, yes } => {
            if !yes {
                eprintln!("refusing to delete {} without --yes", account_id);
                std::process::exit(2);
            }
            api.delete_account(&account_id).await?;
            println!("deleted {}", account_id);
        }
    }
    Ok(())
}
