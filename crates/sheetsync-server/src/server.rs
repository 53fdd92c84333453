//! Process-wide server state, the TCP accept loop, and graceful shutdown.

use crate::error::ServerResult;
use crate::hub::Hub;
use crate::protocol::ServerMessage;
use crate::session;
use sheetsync_core::SheetRegistry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory sheets are loaded from at boot and persisted to on
    /// shutdown.
    pub sheets_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1100,
            sheets_dir: PathBuf::from("./spreadsheets"),
        }
    }
}

/// The single value that owns every piece of process-wide state: the
/// sheet registry, the session pools, and where sheets live on disk.
/// Nothing here is a module-level static; a second `Server` could be
/// constructed in the same process (as tests do) without interfering
/// with the first.
pub struct Server {
    pub registry: SheetRegistry,
    pub hub: Hub,
    pub sheets_dir: PathBuf,
}

impl Server {
    pub fn new(sheets_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry: SheetRegistry::new(),
            hub: Hub::new(),
            sheets_dir: sheets_dir.into(),
        }
    }

    /// Scans `sheets_dir` non-recursively and loads every file in it as a
    /// sheet, skipping subdirectories and files that fail to parse.
    pub async fn load_sheets_from_disk(&self) -> std::io::Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.sheets_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.sheets_dir).await?;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let stem = sheetsync_core::persist::stem_before_first_dot(filename);

            match sheetsync_core::persist::load_sheet(&path, stem).await {
                Ok(sheet) => {
                    tracing::info!(sheet = stem, "loaded sheet from disk");
                    self.registry.install(sheet).await;
                }
                Err(err) => {
                    tracing::warn!(file = %path.display(), %err, "skipping unreadable sheet file at boot");
                }
            }
        }

        Ok(())
    }

    /// Persists every sheet currently in the registry to `sheets_dir`.
    pub async fn persist_all_sheets(&self) {
        for sheet in self.registry.all().await {
            let path = self.sheets_dir.join(format!("{}.sht", sheet.name));
            if let Err(err) = sheetsync_core::persist::write_sheet(&sheet, &path).await {
                tracing::error!(sheet = %sheet.name, %err, "failed to persist sheet on shutdown");
            }
        }
    }
}

/// Accepts connections on `listener` forever, spawning one task per
/// connection. Split out from [`serve`] so integration tests can drive a
/// loopback listener without going through the signal-handling shutdown
/// path.
pub async fn accept_loop(server: Arc<Server>, listener: TcpListener) -> ServerResult<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let server = server.clone();
        tokio::spawn(async move {
            tracing::debug!(%peer_addr, "accepted connection");
            if let Err(err) = session::handle_connection(server, stream).await {
                tracing::warn!(%peer_addr, %err, "session ended with an error");
            }
        });
    }
}

/// Runs the accept loop until a shutdown signal (Ctrl+C or SIGTERM)
/// arrives, then broadcasts a shutdown notice, persists every sheet, and
/// returns.
pub async fn serve(config: ServerConfig) -> ServerResult<()> {
    let server = Arc::new(Server::new(config.sheets_dir.clone()));
    server.load_sheets_from_disk().await?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| {
            crate::error::ServerError::InvalidAddress(format!("{}:{}", config.host, config.port))
        })?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "sheetsync server listening");

    let mut shutdown = shutdown_signal();

    tokio::select! {
        result = accept_loop(server.clone(), listener) => {
            result?;
        }
        _ = &mut shutdown => {
            tracing::info!("shutdown signal received");
        }
    }

    server
        .hub
        .broadcast_to_all(&ServerMessage::ServerError {
            message: "server is shutting down".to_string(),
        })
        .await;
    server.persist_all_sheets().await;
    tracing::info!("all sheets persisted, exiting");

    Ok(())
}

/// Resolves when either Ctrl+C or SIGTERM is received. SIGTERM handling
/// is Unix-only; other platforms fall back to Ctrl+C alone.
fn shutdown_signal() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async {
        #[cfg(unix)]
        {
            let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
    })
}
