//! Newsstand - demo entry point
//!
//! Wires the kiosk core to the HTTP feed client, fetches the initial
//! overview window, prints the catalog, and downloads the newest issue.
//! The real reading UI sits on top of the same facade.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;
use std::time::Duration;

use newsstand::clock::SystemClock;
use newsstand::constants::APP_VERSION;
use newsstand::feed::HttpFeedClient;
use newsstand::kiosk::{Kiosk, KioskContext, KioskNotice};
use newsstand::settings::Settings;
use newsstand::store::Store;
use newsstand::utils::{format_bytes, get_data_dir};
use tracing::{error, info};

/// Initialize file logging. Returns a guard that must be held for the app lifetime.
fn init_logging(data_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let logs_dir = data_dir.join("logs");
    std::fs::create_dir_all(&logs_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&logs_dir, "newsstand.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,newsstand=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    guard
}

fn main() {
    let data_dir = get_data_dir();
    std::fs::create_dir_all(&data_dir).ok();

    // Guard must live for the entire run.
    let _log_guard = init_logging(&data_dir);
    info!(version = APP_VERSION, "Newsstand starting");

    let settings = Settings::load(&data_dir);

    let store = match Store::open(&data_dir.join("newsstand.db")) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to open store");
            eprintln!("failed to open store: {e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to start tokio runtime");
            eprintln!("failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    let content_dir = settings.content_dir_or_default(&data_dir);
    let feed = Arc::new(
        HttpFeedClient::new(settings.base_url.clone(), content_dir)
            .with_max_parallel(settings.max_parallel_files)
            .with_progress(Arc::new(|name, downloaded, total| {
                if total > 0 && downloaded >= total {
                    println!("  fetched {name} ({})", format_bytes(total));
                }
            })),
    );

    let mut kiosk = Kiosk::new(KioskContext {
        feed,
        store,
        settings,
        clock: Arc::new(SystemClock),
        runtime: runtime.handle().clone(),
    });

    kiosk.subscribe(|notice| {
        if let KioskNotice::OverviewStalled(e) = notice {
            eprintln!("overview fetch failed: {e}");
        }
    });

    // Kick off the initial window and pump until it lands.
    kiosk.jump_to_newest();
    for _ in 0..100 {
        std::thread::sleep(Duration::from_millis(100));
        kiosk.pump();
        if !kiosk.is_empty() || kiosk.overview_stalled() {
            break;
        }
    }

    println!("feed: {}", kiosk.feed_id());
    for record in kiosk.records() {
        let size: u64 = record.file_manifest.iter().map(|f| f.size).sum();
        println!(
            "{}  {:?}  sections: {}  files: {} ({})",
            record.date,
            record.status,
            record.sections.len(),
            record.file_manifest.len(),
            format_bytes(size),
        );
    }
    info!(issues = kiosk.len(), "Initial window loaded");

    // Pull the newest issue so the run leaves something readable behind.
    if !kiosk.is_empty() {
        match kiosk.open(0) {
            Ok(()) => {
                for _ in 0..600 {
                    std::thread::sleep(Duration::from_millis(100));
                    kiosk.pump();
                    if !kiosk.is_busy() {
                        break;
                    }
                }
                if let Some(record) = kiosk.record(0) {
                    println!("newest issue: {:?}", record.status);
                }
            }
            Err(e) => eprintln!("open failed: {e}"),
        }
    }
}
