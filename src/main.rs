//! # Bitnodes country reporter
//! Posts the Bitcoin node count per country, and how it moved since the last
//! post, to a Telegram chat every 30 minutes. Numbers come from the public
//! Bitnodes census (bitnodes.io).
//!
//! # Credentials
//! ```bash
//! export TELEGRAM_BOT_TOKEN=123456:ABC...
//! export TELEGRAM_CHAT_ID=-1001234567890
//! ```
//!
//! # Configuration
//! Optional, every field has a default. Read from `config.json` or from the
//! path in `BITNODES_REPORTER_CONFIG`.
//! ```json
//! {
//!     "top_n": 15,
//!     "report_interval_sec": 1800,
//!     "state_path": "state.json",
//!     "timezone": { "utc_offset_minutes": 300, "label": "PKT" }
//! }
//! ```
//!
//! # Run
//! ```bash
//! cargo run --release            # post every interval until SIGINT/SIGTERM
//! cargo run --release -- --once  # post a single report and exit, for cron
//! ```
use bitnodes_reporter::config::{self, Credentials};
use bitnodes_reporter::{scheduler, Config, Reporter};
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bitnodes_reporter=info")),
        )
        .init();

    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    let config_path = std::env::var(config::CONFIG_PATH_ENV)
        .unwrap_or_else(|_| config::DEFAULT_CONFIG_PATH.to_string());
    let configs = Config::load(&config_path).unwrap_or_else(|err| {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    });

    let credentials = Credentials::from_env().unwrap_or_else(|err| {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    });

    let reporter = Reporter::new(&configs, &credentials).unwrap_or_else(|err| {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    });

    if once {
        let summary = reporter.run_cycle().await?;
        tracing::info!(ts = summary.ts, total = summary.total, "posted update");
        return Ok(());
    }

    tracing::info!(
        interval_sec = configs.report_interval_sec,
        top_n = configs.top_n,
        state = %configs.state_path,
        "starting Bitnodes country delta reporter"
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => {
                tracing::info!("shutdown signal received");
                signal_cancel.cancel();
            }
            Err(e) => tracing::error!("failed to listen for shutdown signals: {}", e),
        }
    });

    scheduler::run(&reporter, cancel).await;

    tracing::info!("Shutting down.");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
