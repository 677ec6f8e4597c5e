//! Coordinator daemon entry point.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use quill_coordinator::Server;
use tokio::signal::unix::{SignalKind, signal};

const LOG_PATH: &str = "logs/name_server.log";

#[derive(Parser)]
#[command(version, about = "quill coordinator")]
struct Args {
    /// Port to listen on for clients and storage nodes.
    port: u16,
    /// Durable client registry file.
    #[arg(long, default_value = "name_server_users.txt")]
    registry: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = quill_core::logging::init_file_logger("coordinator", Path::new(LOG_PATH)) {
        eprintln!("cannot open log file: {e}");
        return ExitCode::FAILURE;
    }

    let server = match Server::bind(args.port, args.registry).await {
        Ok(server) => server,
        Err(e) => {
            log::error!("startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    match server.local_addr() {
        Ok(addr) => log::info!("listening on {addr}"),
        Err(e) => log::warn!("listener address unavailable: {e}"),
    }

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            log::error!("cannot install SIGTERM handler: {e}");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                log::error!("coordinator failed: {e}");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down on SIGINT");
        }
        _ = sigterm.recv() => {
            log::info!("shutting down on SIGTERM");
        }
    }
    ExitCode::SUCCESS
}
