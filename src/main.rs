use std::sync::Arc;

use subsidy_intake::channels::{Channel, CliChannel};
use subsidy_intake::config::IntakeConfig;
use subsidy_intake::conversation::{Conversation, Dispatcher, InMemorySessionStore};
use subsidy_intake::store::LibSqlBackend;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Stderr logging, plus a daily-rotated file when `log_dir` is set. The
/// returned guard must live until exit so buffered lines get flushed.
fn init_tracing(log_dir: Option<&std::path::Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "intake.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IntakeConfig::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("Subsidy intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Card prefix: {}", config.card_prefix);
    eprintln!(
        "   Closing window: {} - {} WIB",
        config.closing_window.start, config.closing_window.end
    );
    eprintln!("   Admins: {}", config.admin_senders.len());

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Conversation ─────────────────────────────────────────────────────
    let channel = CliChannel::new(config.admin_senders.clone());
    let conversation = Arc::new(Conversation::new(
        config,
        db.clone(),
        db,
        InMemorySessionStore::new(),
    ));

    eprintln!("   Paste a message and end it with a blank line. /as NAME switches sender.\n");

    let incoming = channel.start().await?;
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let dispatcher = tokio::spawn(Dispatcher::new(conversation).run(incoming, tx));

    while let Some(response) = rx.recv().await {
        if let Err(e) = channel.respond(&response).await {
            tracing::warn!(error = %e, sender = %response.sender, "Failed to deliver reply");
        }
    }

    dispatcher.await?;
    channel.shutdown().await?;
    tracing::info!("Inbound stream closed, shutting down");
    Ok(())
}
