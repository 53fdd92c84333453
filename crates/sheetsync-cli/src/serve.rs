//! `serve` subcommand implementation.

use sheetsync_server::ServerConfig;
use std::path::PathBuf;

/// Starts the spreadsheet server and blocks until it shuts down.
pub async fn execute(host: String, port: u16, sheets_dir: String) -> anyhow::Result<()> {
    let config = ServerConfig {
        host,
        port,
        sheets_dir: PathBuf::from(sheets_dir),
    };

    tracing::info!(host = %config.host, port = config.port, sheets_dir = %config.sheets_dir.display(), "starting sheetsync server");

    sheetsync_server::serve(config).await?;

    Ok(())
}
