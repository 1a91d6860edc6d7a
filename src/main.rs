use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use standard_logger::{
    context, Align, FacadeLayer, Level, LoggerFacade, LoggerOptions, ProgressLayout,
};

fn main() -> Result<()> {
    // Optional path to a TOML options file
    let options = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => LoggerOptions::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => LoggerOptions::new("standard-logger-demo")
            .min_level(Level::Debug)
            .panic_hook(true),
    };

    let facade = LoggerFacade::new();
    let log = facade.configure(options).context("Failed to configure logging")?;

    // Route tracing events from dependencies into the same sinks
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(FacadeLayer::new(log.clone()))
        .try_init()
        .context("Failed to install tracing bridge")?;

    log.rule("standard_logger demo", '─', Align::Center);
    match log.log_file() {
        Some(path) => log.info(format!("Logging to: {}", path.display())),
        None => log.warning("File logging is disabled"),
    }

    let worker = log.named("demo.worker").bind("job", "import");
    worker.debug("Reading input");
    worker.log(Level::Info, "Imported rows", context! { "rows" => 1200, "skipped" => 3 });
    tracing::warn!(target: "demo.tracing", attempt = 2, "Retrying upstream call");

    let mut progress = log.progress("Processing items", ProgressLayout::TaskCounter).with_total(50);
    for _ in 0..50 {
        std::thread::sleep(std::time::Duration::from_millis(20));
        progress.advance(1);
    }
    progress.finish();

    let mut download = log.progress("Downloading data.bin", ProgressLayout::FileTransfer).with_total(1_500_000);
    while download.position() < 1_500_000 {
        std::thread::sleep(std::time::Duration::from_millis(30));
        download.advance(120_000);
    }
    download.finish();

    if let Err(e) = std::fs::read_to_string("/definitely/not/here.csv") {
        log.exception("Import step failed", &e, context! { "path" => "/definitely/not/here.csv" });
    }

    log.panel("rows: 1200\nskipped: 3\nstatus: done", Some("Summary"), true);

    log.flush();
    facade.shutdown();
    Ok(())
}
