//! Pump loops wiring transport connections into hub and replica state.
//!
//! Each participant stays a single logical thread of control: every channel
//! pumps into the same mutex-guarded state, so no two handlers for one
//! participant ever run concurrently.

use crate::session::{Hub, Replica};
use crate::transport::{Connection, Listener};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Accept incoming channels and pump each into the hub
pub fn spawn_hub(hub: Arc<Mutex<Hub>>, mut listener: Listener) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(conn) = listener.accept().await {
            let Connection { handle, mut rx } = conn;
            hub.lock()
                .expect("hub lock poisoned")
                .on_peer_connected(handle.clone());

            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    hub.lock()
                        .expect("hub lock poisoned")
                        .on_message(&handle, msg);
                }
                tracing::info!("Channel from {} closed", handle.peer());
            });
        }
    })
}

/// Attach the replica to its hub channel and pump inbound broadcasts
pub fn spawn_replica(replica: Arc<Mutex<Replica>>, conn: Connection) -> JoinHandle<()> {
    let Connection { handle, mut rx } = conn;
    replica
        .lock()
        .expect("replica lock poisoned")
        .attach(handle);

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            replica
                .lock()
                .expect("replica lock poisoned")
                .on_message(msg);
        }
        tracing::info!("Hub channel closed");
    })
}
