//! Lurepot - decoy service for lookup-expression injection attacks.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use lurepot_core::{Event, Sink};
use lurepot_server::{FileSink, Server};

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LUREPOT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

fn main() -> ExitCode {
    init_tracing();

    let config = cli::Cli::parse().into_config();
    if let Err(e) = config.validate() {
        eprintln!("lurepot: {e}");
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &config.fetch.storage_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("lurepot: cannot create download dir {}: {e}", dir.display());
            return ExitCode::FAILURE;
        }
    }

    let sink: Arc<dyn Sink> = match FileSink::open(&config.log_file) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            eprintln!("lurepot: cannot open log file {}: {e}", config.log_file.display());
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            warn!(%e, "failed to build tokio runtime");
            eprintln!("runtime error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = sink.append(&Event::start()) {
        warn!(%e, "failed to append start event");
    }

    let result = rt.block_on(serve(&config, Arc::clone(&sink)));

    if let Err(e) = sink.append(&Event::end()) {
        warn!(%e, "failed to append end event");
    }

    match result {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            warn!(%e, "server error");
            eprintln!("lurepot: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: &lurepot_core::Config, sink: Arc<dyn Sink>) -> eyre::Result<()> {
    let server = Server::bind(config, sink).await?;
    info!(ports = ?config.ports, "decoy service started");

    tokio::select! {
        () = server.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupt received, shutting down");
        }
    }

    Ok(())
}
