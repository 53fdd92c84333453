//! Per-connection state machine: handshake, initial state transfer, and
//! the request dispatch loop.
//!
//! A session moves through four states (`PendingUsername`,
//! `PendingSheet`, `Ready`, `Closed`), modeled explicitly rather than
//! inferred from which function happens to be running, so a stray
//! request arriving before handshake completion has somewhere concrete to
//! be rejected.

use crate::error::ServerResult;
use crate::hub::Peer;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::server::Server;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;

/// Where a connection sits in the handshake/ready lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    PendingUsername,
    PendingSheet,
    Ready,
    Closed,
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

async fn send_message(writer: &mut OwnedWriteHalf, msg: &ServerMessage) -> std::io::Result<()> {
    let json = serde_json::to_string(msg).expect("ServerMessage always serializes");
    write_line(writer, &json).await
}

/// Drives one client connection end to end. Errors bubble up only to be
/// logged by the caller; a single misbehaving client never brings down
/// the accept loop.
pub async fn handle_connection(server: Arc<Server>, stream: TcpStream) -> ServerResult<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let mut state = SessionState::PendingUsername;

    // --- Handshake: username ---
    let Some(raw_username) = lines.next_line().await? else {
        return Ok(());
    };
    let username = raw_username.trim().to_string();
    state = SessionState::PendingSheet;
    tracing::debug!(%username, ?state, "received username");

    // Offer the list of known sheets, terminated by an empty line.
    for name in server.registry.names().await {
        write_line(&mut write_half, &name).await?;
    }
    write_line(&mut write_half, "").await?;

    // --- Handshake: sheet choice ---
    let Some(raw_sheet_name) = lines.next_line().await? else {
        return Ok(());
    };
    let sheet_name = raw_sheet_name.trim().to_string();
    tracing::debug!(%username, %sheet_name, "received sheet choice");

    let id = server.hub.next_id();
    let sheet = server.registry.get_or_create(&sheet_name).await;

    // Hold the sheet lock across the whole initial-state transfer and
    // registration so no edit can land between the snapshot we send and
    // the moment this session starts receiving broadcasts.
    {
        let guard = sheet.lock().await;
        for (cell_name, contents) in guard.all_cells() {
            send_message(&mut write_half, &ServerMessage::CellUpdated { cell_name, contents }).await?;
        }
        for (cell_name, (client_name, client_id)) in guard.all_selects() {
            send_message(
                &mut write_half,
                &ServerMessage::CellSelected {
                    cell_name,
                    username: client_name,
                    selector: client_id.to_string(),
                },
            )
            .await?;
        }
        write_line(&mut write_half, &id.to_string()).await?;

        let peer = Arc::new(Peer::new(id, username.clone(), sheet_name.clone(), write_half));
        server.hub.register(peer).await;
    }

    state = SessionState::Ready;
    tracing::info!(session_id = id, %username, %sheet_name, ?state, "session ready");

    let mut current_cell: Option<String> = None;

    loop {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<ClientMessage, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(req) => req,
            Err(err) => {
                tracing::debug!(session_id = id, %err, "discarding malformed request");
                continue;
            }
        };

        dispatch(&server, id, &username, &sheet_name, &mut current_cell, request).await;
    }

    state = SessionState::Closed;
    tracing::info!(session_id = id, %username, ?state, "session closed");

    let mut guard = sheet.lock().await;
    guard.deselect_all(id);
    if server.hub.remove(id).await.is_some() {
        server
            .hub
            .broadcast_to_all(&ServerMessage::Disconnected { selector: id.to_string() })
            .await;
    }
    drop(guard);

    Ok(())
}

/// Dispatches one request. Every branch that mutates the sheet holds the
/// sheet lock through its broadcast call rather than releasing it first:
/// the recipient list and delivery order must be observed as a single
/// atomic unit, matching the mandated lock order (sheet lock acquired,
/// then the hub's pool lock for the broadcast, never the reverse).
async fn dispatch(
    server: &Arc<Server>,
    id: u64,
    username: &str,
    sheet_name: &str,
    current_cell: &mut Option<String>,
    request: ClientMessage,
) {
    let sheet = server.registry.get_or_create(sheet_name).await;

    match request {
        ClientMessage::EditCell { cell_name, contents } => {
            let mut guard = sheet.lock().await;
            if guard.set_cell(&cell_name, &contents, id) {
                tracing::debug!(session_id = id, %cell_name, "edit accepted");
                server
                    .hub
                    .broadcast_to_sheet(
                        sheet_name,
                        &ServerMessage::CellUpdated { cell_name, contents },
                        None,
                    )
                    .await;
                drop(guard);
            } else {
                drop(guard);
                tracing::debug!(session_id = id, %cell_name, "edit rejected");
                reply_error(server, id, cell_name, "Unable to edit cell as desired").await;
            }
        }

        ClientMessage::SelectCell { cell_name } => {
            let mut guard = sheet.lock().await;
            if guard.select_cell(&cell_name, username, id, current_cell.as_deref()) {
                *current_cell = Some(cell_name.clone());
                tracing::debug!(session_id = id, %cell_name, "selection accepted");
                server
                    .hub
                    .broadcast_to_sheet(
                        sheet_name,
                        &ServerMessage::CellSelected {
                            cell_name,
                            username: username.to_string(),
                            selector: id.to_string(),
                        },
                        None,
                    )
                    .await;
                drop(guard);
            } else {
                drop(guard);
                tracing::debug!(session_id = id, %cell_name, "selection rejected");
                reply_error(server, id, cell_name, "Unable to select cell as desired").await;
            }
        }

        ClientMessage::Undo => {
            let mut guard = sheet.lock().await;
            match guard.undo() {
                Some((cell_name, contents)) => {
                    tracing::debug!(session_id = id, %cell_name, "undo accepted");
                    server
                        .hub
                        .broadcast_to_sheet(
                            sheet_name,
                            &ServerMessage::CellUpdated { cell_name, contents },
                            None,
                        )
                        .await;
                    drop(guard);
                }
                None => {
                    drop(guard);
                    tracing::debug!(session_id = id, "undo rejected: stack empty");
                    reply_error(
                        server,
                        id,
                        "N/A - Undo request".to_string(),
                        "Unable to undo spreadsheet as desired",
                    )
                    .await;
                }
            }
        }

        ClientMessage::RevertCell { cell_name } => {
            let mut guard = sheet.lock().await;
            match guard.revert_cell(&cell_name) {
                Some(contents) => {
                    tracing::debug!(session_id = id, %cell_name, "revert accepted");
                    server
                        .hub
                        .broadcast_to_sheet(
                            sheet_name,
                            &ServerMessage::CellUpdated { cell_name, contents },
                            None,
                        )
                        .await;
                    drop(guard);
                }
                None => {
                    drop(guard);
                    tracing::debug!(session_id = id, %cell_name, "revert rejected");
                    reply_error(server, id, cell_name, "Unable to revert spreadsheet as desired").await;
                }
            }
        }
    }
}

async fn reply_error(server: &Arc<Server>, id: u64, cell_name: String, message: &str) {
    server
        .hub
        .send_to(id, &ServerMessage::RequestError { cell_name, message: message.to_string() })
        .await;
}
