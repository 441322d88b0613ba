//! Canco server: shared canvas rooms over WebSocket.
//!
//! Clients join a room at `ws://{CANCO_BIND_ADDR}/api/join/{room}`.
//! Logging is controlled with `RUST_LOG` (e.g. `RUST_LOG=info`).

mod config;

use std::error::Error;

use log::info;

use canco_collab::SyncServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config = config::from_env()?;
    info!(
        "Starting canvas server on {} (outbound capacity {}, write timeout {} ms, {} users per room)",
        config.bind_addr, config.outbound_capacity, config.write_timeout_ms, config.max_users_per_room
    );

    let server = SyncServer::new(config);
    tokio::select! {
        result = server.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            let stats = server.stats().await;
            info!(
                "Shutting down: {} connections served, {} messages, {} rooms",
                stats.total_connections, stats.total_messages, stats.active_rooms
            );
        }
    }

    Ok(())
}
