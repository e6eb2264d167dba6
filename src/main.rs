use anyhow::{anyhow, Result};
use clap::Parser;
use notisync::config::{Cli, Config};
use notisync::details::compose_message;
use notisync::session::SyncSession;
use notisync::version;
use std::fs::File;
use tokio::select;
use tracing::{info, level_filters::LevelFilter, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.conf.as_deref() {
        Some(path) if std::path::Path::new(path).exists() => {
            Config::load(path).expect("Failed to load config")
        }
        _ => Config::default(),
    };

    let mut log_fmt = tracing_subscriber::fmt();
    if let Some(ref level) = config.log_level {
        if let Ok(lv) = level.as_str().parse::<LevelFilter>() {
            log_fmt = log_fmt.with_max_level(lv);
        }
    }

    if let Some(ref log_file) = config.log_file {
        let file = File::create(log_file).expect("Failed to create log file");
        let (non_blocking, _guard) = tracing_appender::non_blocking(file);
        log_fmt.with_writer(non_blocking).try_init().ok();
    } else {
        log_fmt.try_init().ok();
    }

    let account = cli
        .account
        .or_else(|| config.account.clone())
        .ok_or_else(|| anyhow!("no account given; pass --account or set it in the config"))?;

    info!("starting {}", version::get_useragent());
    let session = SyncSession::new(&config, account);

    let _subscription = session.store().subscribe(|snapshot| {
        info!(
            unread = snapshot.unread_count,
            total = snapshot.items.len(),
            "notification list updated"
        );
    });

    let mut alert_rx = session.alerts().subscribe_alerts();
    tokio::spawn(async move {
        while let Ok(alert) = alert_rx.recv().await {
            info!(severity = ?alert.severity, "alert: {}", alert.message);
        }
    });

    let mut refresh_rx = session.alerts().subscribe_refresh();
    tokio::spawn(async move {
        while refresh_rx.recv().await.is_ok() {
            info!("dependent views asked to re-pull");
        }
    });

    if let Err(e) = session.initialize().await {
        warn!("initial snapshot failed, will keep the push channel: {}", e);
    }

    // What a view adapter would do for visible transaction rows: enrich and
    // log the refined message, falling back to the generic form.
    for item in session
        .store()
        .list()
        .iter()
        .filter(|n| n.kind.is_transaction())
        .take(5)
    {
        let Some(reference) = item.transaction_ref() else {
            continue;
        };
        let message = match session.details().get_details(reference).await {
            Ok(details) => compose_message(&item.kind, Some(&details)),
            Err(_) => compose_message(&item.kind, None),
        };
        info!(id = %item.id, "{}", message);
    }

    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received CTRL+C, shutting down");
        }
    }
    session.teardown();
    Ok(())
}
