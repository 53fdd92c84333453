//! The session-pool registry and broadcast fan-out.
//!
//! This is the "registry lock" named throughout the locking discipline:
//! callers that need to mutate a sheet and then notify its sessions must
//! acquire the sheet's own lock first and the [`Hub`]'s pool lock second,
//! never the reverse. Broadcast functions here assume the caller is
//! already holding the sheet lock for the change being announced, so the
//! recipient list and the change are observed as one atomic unit by every
//! peer that gets written to.

use crate::protocol::ServerMessage;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};

/// A connected, fully-registered client: its outbound half and the
/// identity it announced during handshake.
pub struct Peer {
    pub id: u64,
    pub username: String,
    pub sheet_name: String,
    writer: Mutex<OwnedWriteHalf>,
}

impl Peer {
    pub fn new(id: u64, username: String, sheet_name: String, writer: OwnedWriteHalf) -> Self {
        Self {
            id,
            username,
            sheet_name,
            writer: Mutex::new(writer),
        }
    }

    /// Writes one line-delimited JSON message. Failures are the caller's
    /// to log and ignore: a write failure here means the peer is gone
    /// and will be cleaned up once its own read loop notices the socket
    /// closed, not a reason to fail the broadcast for everyone else.
    pub async fn send(&self, msg: &ServerMessage) -> std::io::Result<()> {
        let mut line = serde_json::to_string(msg).expect("ServerMessage always serializes");
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await
    }
}

#[derive(Default)]
struct Pools {
    ready: FxHashMap<u64, Arc<Peer>>,
    by_sheet: FxHashMap<String, Vec<u64>>,
}

/// Session pools plus the monotonic id counter, matching the reference
/// implementation's `sessions` / `sessions_by_ss` maps and `curr_id`
/// counter, both historically guarded by one mutex.
pub struct Hub {
    next_id: AtomicU64,
    pools: RwLock<Pools>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pools: RwLock::new(Pools::default()),
        }
    }

    /// Allocates the next session id. Ids are never reused.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Moves a session from pending into the ready pool once the
    /// handshake completes.
    pub async fn register(&self, peer: Arc<Peer>) {
        let mut pools = self.pools.write().await;
        pools
            .by_sheet
            .entry(peer.sheet_name.clone())
            .or_default()
            .push(peer.id);
        pools.ready.insert(peer.id, peer);
    }

    /// Sends a message to exactly one session. Used for request-scoped
    /// errors, which are never broadcast.
    pub async fn send_to(&self, id: u64, msg: &ServerMessage) {
        let peer = self.pools.read().await.ready.get(&id).cloned();
        if let Some(peer) = peer
            && let Err(err) = peer.send(msg).await
        {
            tracing::debug!(session_id = id, %err, "failed to deliver direct reply");
        }
    }

    /// Removes a session on disconnect, returning it so the caller can
    /// broadcast its departure.
    pub async fn remove(&self, id: u64) -> Option<Arc<Peer>> {
        let mut pools = self.pools.write().await;
        let peer = pools.ready.remove(&id)?;
        if let Some(ids) = pools.by_sheet.get_mut(&peer.sheet_name) {
            ids.retain(|&existing| existing != id);
        }
        Some(peer)
    }

    /// Broadcasts to every ready session attached to `sheet_name`,
    /// skipping `exclude` if given.
    pub async fn broadcast_to_sheet(
        &self,
        sheet_name: &str,
        msg: &ServerMessage,
        exclude: Option<u64>,
    ) {
        let pools = self.pools.read().await;
        let Some(ids) = pools.by_sheet.get(sheet_name) else {
            return;
        };
        for &id in ids {
            if Some(id) == exclude {
                continue;
            }
            if let Some(peer) = pools.ready.get(&id)
                && let Err(err) = peer.send(msg).await
            {
                tracing::debug!(session_id = id, %err, "failed to write to peer, will be reaped on its own read loop");
            }
        }
    }

    /// Broadcasts to the entire ready pool, across every sheet. Used for
    /// disconnect notices and the shutdown announcement, matching the
    /// reference implementation's choice to notify everyone rather than
    /// just same-sheet sessions.
    pub async fn broadcast_to_all(&self, msg: &ServerMessage) {
        let pools = self.pools.read().await;
        for peer in pools.ready.values() {
            if let Err(err) = peer.send(msg).await {
                tracing::debug!(session_id = peer.id, %err, "failed to write to peer during global broadcast");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_start_at_one() {
        let hub = Hub::new();
        assert_eq!(hub.next_id(), 1);
        assert_eq!(hub.next_id(), 2);
        assert_eq!(hub.next_id(), 3);
    }
}
