use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use scan_telemetry::config::{StreamConfig, DEFAULT_BASE_URL};
use scan_telemetry::connection::ConnectionManager;
use scan_telemetry::render;
use scan_telemetry::transport::{ScriptedTransport, Transport, WebSocketTransport};
use scan_telemetry::types::ScanState;

/// scan-watch — follow a running scan's live telemetry stream.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scan-watch",
    version,
    about = "Follow a running scan's live telemetry stream and print its progress.",
    long_about = None
)]
struct Cli {
    /// Scan identifier assigned by the scanning backend.
    #[arg(long = "scan-id")]
    scan_id: Option<String>,

    /// WebSocket origin of the scanning backend.
    #[arg(long = "base-url", env = "SCAN_TELEMETRY_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Replay a recorded JSON-lines stream instead of connecting.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Write the final scan state as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Only print the final summary.
    #[arg(long, default_value_t = false)]
    quiet: bool,

    /// Verbose diagnostics (same as RUST_LOG=debug).
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if !cli.quiet {
        println!("scan-watch configuration:");
        println!("  scan_id  : {}", cli.scan_id.as_deref().unwrap_or("<none>"));
        println!("  base_url : {}", cli.base_url);
        println!(
            "  replay   : {}",
            cli.replay
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<live>".to_string())
        );
    }

    let config = StreamConfig::new(cli.base_url.clone());
    let state = match cli.replay.as_deref() {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read replay file: {}", path.display()))?;
            follow(&cli, config, ScriptedTransport::from_json_lines(&content)).await
        }
        None => follow(&cli, config, WebSocketTransport::new()).await,
    };

    println!("\n{}", render::summary(&state));

    if let Some(path) = cli.output.as_deref() {
        render::write_state_json(path, &state)?;
        println!("Wrote scan state to {}", path.display());
    }

    if state.finished {
        Ok(())
    } else {
        anyhow::bail!(
            "scan stream ended before completion ({})",
            state.connection_status.as_str()
        )
    }
}

async fn follow<T: Transport>(cli: &Cli, config: StreamConfig, transport: T) -> ScanState {
    let mut manager = ConnectionManager::new(config, transport)
        .on_complete(|s| println!("Scan completed: {} vulnerabilities found.", s.vuln_count));

    let mut updates = manager.subscribe();
    let quiet = cli.quiet;
    let printer = tokio::spawn(async move {
        let mut printed = 0usize;
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if quiet {
                continue;
            }
            for line in state.log_lines.iter().skip(printed) {
                println!("$ {line}");
            }
            printed = state.log_lines.len();
            println!("{}", render::status_line(&state));
        }
    });

    if let Err(e) = manager.open(cli.scan_id.as_deref()).await {
        eprintln!("Failed to open scan stream: {e}");
        let state = manager.state().clone();
        drop(manager);
        let _ = printer.await;
        return state;
    }

    // Ctrl-C closes the stream.
    let cancel = manager.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let state = manager.run().await;
    drop(manager);
    let _ = printer.await;
    state
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
