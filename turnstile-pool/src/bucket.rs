use std::sync::Arc;

use turnstile_core::Services;

use crate::error::PoolError;
use crate::worker::WorkerSocket;

/// A contiguous run of worker sockets covering `sockets_per_bucket *
/// users_per_socket` users.
///
/// Ports are assigned with the "socket-count stride" scheme: bucket `i`
/// occupies `[user_port_start + i * sockets_per_bucket, ...)`. See
/// `TurnstileConfig::validate` for the startup overlap check this
/// stride choice requires.
pub struct Bucket {
    base_port: u16,
    sockets: Vec<Arc<WorkerSocket>>,
}

impl Bucket {
    pub fn new(base_port: u16, sockets_per_bucket: u32, capacity_per_socket: usize, services: Services) -> Self {
        let sockets = (0..sockets_per_bucket)
            .map(|offset| {
                let port = base_port + offset as u16;
                Arc::new(WorkerSocket::new(port, capacity_per_socket, services.clone()))
            })
            .collect();
        Self { base_port, sockets }
    }

    pub fn base_port(&self) -> u16 {
        self.base_port
    }

    pub async fn start_all(&self) -> Result<(), PoolError> {
        for socket in &self.sockets {
            socket.start().await?;
        }
        Ok(())
    }

    pub async fn shutdown_all(&self) {
        for socket in &self.sockets {
            socket.shutdown().await;
        }
    }

    /// First-fit scan across member sockets; returns the port the caller
    /// should hand back to the client.
    pub async fn reserve(&self, key: u32, username: &str) -> Option<u16> {
        for socket in &self.sockets {
            if socket.reserve(key, username).await.is_some() {
                return Some(socket.port());
            }
        }
        None
    }

    pub async fn is_full(&self) -> bool {
        for socket in &self.sockets {
            if !socket.is_full().await {
                return false;
            }
        }
        true
    }
}
