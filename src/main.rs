use grid_gate::server::{self, Server};
use grid_gate::{cli, Config, Gate, GridClient, GridFetcher};
use log::warn;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")] // one request at a time over stdio
async fn main() -> anyhow::Result<()> {
    let cmd = cli::build_cli();
    let matches = cmd.get_matches();
    let log_level = matches.get_one::<String>("log-level").cloned();
    let version_flag = matches.get_flag("version");

    cli::init_logging(log_level.as_deref());

    if version_flag {
        println!("grid-gate {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let fetcher = Config::from_env().and_then(|cfg| {
        let gate = Arc::new(Gate::new(cfg.gate));
        GridClient::new(cfg, gate)
            .map(GridFetcher::new)
            .map_err(|e| e.to_string())
    });
    if let Err(e) = &fetcher {
        warn!("GRID client unavailable: {}", e);
    }

    server::run_stdio_server(Server::new(fetcher)).await?;
    Ok(())
}
