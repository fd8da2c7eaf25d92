mod sim_host;

use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use contracts::{ConfigIssueKind, PursuitConfig, TimestampMs};
use pursuit_api::PursuitServer;
use sim_host::ScriptedHost;
use tracing::info;

#[derive(Parser)]
#[command(name = "pursuit-cli", version, about = "Pursuit economy runtime tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a config document and list the fields that fell back to defaults
    CheckConfig {
        path: PathBuf,
        /// Print the fully resolved document as JSON
        #[arg(long)]
        print: bool,
    },
    /// Drive the server against a scripted in-process host
    Simulate(SimulateArgs),
}

#[derive(Args)]
struct SimulateArgs {
    /// Config document; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    targets: usize,
    #[arg(long, default_value_t = 2)]
    pursuers: usize,
    #[arg(long, default_value_t = 240)]
    duration_secs: u64,
    /// Host polling step
    #[arg(long, default_value_t = 100)]
    step_ms: u64,
    /// Account store; also read from PURSUIT_SQLITE_PATH
    #[arg(long)]
    sqlite: Option<PathBuf>,
    /// Override general.worker_threads
    #[arg(long)]
    worker_threads: Option<u64>,
    /// Follow the wall clock instead of virtual time
    #[arg(long)]
    realtime: bool,
}

fn sqlite_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        std::env::var("PURSUIT_SQLITE_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
    })
}

fn check_config(path: PathBuf, print: bool) -> Result<(), String> {
    let (config, issues) = PursuitConfig::load(&path)
        .map_err(|err| format!("failed to load {}: {err}", path.display()))?;
    for issue in &issues {
        let label = match issue.kind {
            ConfigIssueKind::Missing => "missing",
            ConfigIssueKind::Invalid => "invalid",
        };
        println!("{label:<8} {} (default used)", issue.path);
    }
    println!("{} field(s) fell back to defaults", issues.len());
    if print {
        let rendered = serde_json::to_string_pretty(&config)
            .map_err(|err| format!("failed to render config: {err}"))?;
        println!("{rendered}");
    }
    Ok(())
}

fn step(server: &mut PursuitServer, host: &mut ScriptedHost, now: TimestampMs) {
    host.advance(now);
    for event in host.due_events(now) {
        server.handle_event(host, event, now);
    }
    server.pump(host, now);
}

async fn run_simulation(args: SimulateArgs) -> Result<(), String> {
    let mut config = match &args.config {
        Some(path) => PursuitConfig::load_or_default(path),
        None => PursuitConfig::default(),
    };
    if let Some(threads) = args.worker_threads {
        config.general.worker_threads = threads;
    }
    let step_ms = args.step_ms.max(1);
    let end = args.duration_secs.saturating_mul(1_000);

    let mut server = PursuitServer::from_config(config, 0);
    let store_path = sqlite_path(args.sqlite);
    if let Some(path) = &store_path {
        server
            .attach_account_store(path)
            .map_err(|err| format!("failed to attach account store: {err}"))?;
    }
    let mut host = ScriptedHost::new(args.targets, args.pursuers);
    let adopted = server.adopt_connected(&mut host, 0);
    info!(adopted, realtime = args.realtime, "simulation started");

    let mut now = 0;
    if args.realtime {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(Duration::from_millis(step_ms));
        while now < end {
            ticker.tick().await;
            now = u64::try_from(started.elapsed().as_millis())
                .unwrap_or(u64::MAX)
                .min(end);
            step(&mut server, &mut host, now);
        }
    } else {
        while now < end {
            now = now.saturating_add(step_ms).min(end);
            step(&mut server, &mut host, now);
        }
    }

    for event in host.disconnect_all() {
        server.handle_event(&mut host, event, now);
    }
    if store_path.is_some() {
        server
            .save_all(now)
            .map_err(|err| format!("final save failed: {err}"))?;
    }
    if let Some(error) = server.last_persistence_error() {
        return Err(format!("persistence error after simulation: {error}"));
    }

    print_summary(&server, &host, now);
    Ok(())
}

fn print_summary(server: &PursuitServer, host: &ScriptedHost, now: TimestampMs) {
    println!("simulated {} ms", now);
    println!("events:");
    for (kind, count) in server.event_counts() {
        println!("  {kind:<24} {count}");
    }
    println!("ledger entries: {}", server.ledger_entries_seen());
    println!("notices:");
    for (key, count) in &host.notices {
        println!("  {key:<24} {count}");
    }
    for (key, count) in &host.broadcasts {
        println!("  {key:<24} {count} (broadcast)");
    }
    println!("ui events: {}", host.ui_events);
    println!("accounts:");
    for record in server.engine().ledger().records() {
        println!(
            "  {:<12} {:<8} {:>8} {}",
            record.id,
            record.role.as_str(),
            record.balance,
            record.locale
        );
    }
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::CheckConfig { path, print } => check_config(path, print),
        Commands::Simulate(args) => run_simulation(args).await,
    };
    if let Err(message) = result {
        eprintln!("error: {message}");
        process::exit(1);
    }
}
