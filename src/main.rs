use std::sync::Arc;

use tracing::{error, info};

mod audio;
mod common;
mod config;
mod process;
mod rest;
mod stream;

use common::{Error, Result};
use config::{Config, ToolsConfig};
use process::Process;
use rest::AppState;
use stream::registry::Registry;

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config.toml: {}", e);
            std::process::exit(1);
        }
    };
    common::logger::init(&config);
    common::banner::print_banner();

    if let Err(e) = verify_tools(&config.tools) {
        error!("{}", e);
        error!("please make sure a reasonably recent version of ffmpeg is installed");
        std::process::exit(1);
    }

    let state = Arc::new(AppState {
        registry: Registry::new(&config),
        config: config.clone(),
    });
    let app = rest::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {}", e);
        std::process::exit(1);
    }
    info!("shut down");
}

/// Both external tools must answer a version query before we accept work.
fn verify_tools(tools: &ToolsConfig) -> Result<()> {
    for tool in [&tools.ffmpeg, &tools.ffprobe] {
        match Process::exec_collect(tool, &["-version"], &[]) {
            Ok((0, _, _)) => {}
            Ok((code, _, err)) => {
                return Err(Error::Subprocess(format!(
                    "{} -version exited with {}: {}",
                    tool,
                    code,
                    String::from_utf8_lossy(&err).trim()
                )));
            }
            Err(e) => {
                return Err(Error::Subprocess(format!(
                    "{} binary not found: {}",
                    tool, e
                )));
            }
        }
    }
    Ok(())
}

/// First interrupt stops accepting and drains; a second one exits hard.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!("interrupt received, shutting down (press ctrl-c again to force)");
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(1);
        }
    });
}
