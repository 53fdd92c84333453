//! Wire messages exchanged between client and server.
//!
//! The protocol is line-delimited JSON, not a framed binary format: every
//! message is exactly one JSON object followed by `\n`. Client requests
//! are tagged by `requestType`; server messages are tagged by
//! `messageType`.

use serde::{Deserialize, Serialize};

/// A request sent by a client once it has reached the `Ready` state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "requestType", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Set a cell's contents. Requires the sender to currently hold the
    /// selection on `cell_name`.
    EditCell { cell_name: String, contents: String },

    /// Claim a cell's selection, releasing any selection this client
    /// already holds elsewhere on the same sheet.
    SelectCell { cell_name: String },

    /// Undo the most recent edit made to any cell on the sheet.
    Undo,

    /// Revert a cell to its previous value.
    RevertCell { cell_name: String },
}

/// A message sent by the server, either in reply to a request or as a
/// broadcast to every client attached to a sheet.
///
/// `selector` is always serialized as a JSON string, even though it
/// carries a numeric session id. Clients historically parse it as a
/// string token, and a bare JSON number broke them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "camelCase")]
pub enum ServerMessage {
    /// A cell's contents changed; `selector` is absent for the initial
    /// state transfer during handshake and present for live edits so
    /// clients can attribute the change.
    CellUpdated {
        cell_name: String,
        contents: String,
    },

    /// A client selected a cell.
    CellSelected {
        cell_name: String,
        selector: String,
        #[serde(rename = "selectorName")]
        username: String,
    },

    /// A request was rejected. Sent only to the requester, never
    /// broadcast. `cell_name` is `"N/A - Undo request"` for a failed
    /// `undo`, since that request names no cell of its own.
    RequestError { cell_name: String, message: String },

    /// The server is shutting down. Broadcast to every ready session
    /// immediately before sheets are persisted and the process exits.
    ServerError { message: String },

    /// A client disconnected. Broadcast to the entire ready pool, not
    /// just clients on the same sheet, matching the reference
    /// implementation. Carries only the departing session's id, no
    /// username field, per the reference implementation's
    /// `disconnect_message["user"]`-only payload.
    Disconnected {
        #[serde(rename = "user")]
        selector: String,
    },
}
