use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::*;

use turnstile_core::Services;

use crate::error::{PoolError, SetupStage};
use crate::slot::SlotState;

const MAX_CONSECUTIVE_ACCEPT_ERRORS: u32 = 3;

/// Lifecycle status of a worker socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Unused,
    Active,
    Error,
}

/// A dedicated back-end TCP listener with its own accept loop, admitting
/// up to `capacity` pre-reserved clients identified by session key.
///
/// The accept loop spawns a task per connection and waits on
/// `tokio::select!` between `accept()` and a shutdown watch channel,
/// giving cooperative cancellation without busy-polling.
pub struct WorkerSocket {
    port: u16,
    capacity: usize,
    slots: Arc<Mutex<Vec<SlotState>>>,
    status: Arc<Mutex<WorkerStatus>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
    connection_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    services: Services,
}

impl WorkerSocket {
    pub fn new(port: u16, capacity: usize, services: Services) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            port,
            capacity,
            slots: Arc::new(Mutex::new(vec![SlotState::Free; 0])),
            status: Arc::new(Mutex::new(WorkerStatus::Unused)),
            shutdown_tx,
            shutdown_rx,
            listener_task: Mutex::new(None),
            connection_tasks: Arc::new(Mutex::new(Vec::new())),
            services,
        }
        .with_empty_slots(capacity)
    }

    fn with_empty_slots(self, capacity: usize) -> Self {
        // `SlotState` isn't `Copy`, build the vec by hand.
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || SlotState::Free);
        *self
            .slots
            .try_lock()
            .expect("no concurrent access during construction") = slots;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn status(&self) -> WorkerStatus {
        *self.status.lock().await
    }

    pub async fn current_connections(&self) -> usize {
        self.slots.lock().await.iter().filter(|s| s.is_admitted()).count()
    }

    pub async fn is_full(&self) -> bool {
        self.slots.lock().await.iter().all(|s| !s.is_free())
    }

    /// First-fit scan for a free slot; reserves it for `key` under
    /// `username`. Concurrency-safe: the whole scan-and-write happens
    /// under one lock acquisition.
    pub async fn reserve(&self, key: u32, username: &str) -> Option<usize> {
        let mut slots = self.slots.lock().await;
        let index = slots.iter().position(|s| s.is_free())?;
        slots[index] = SlotState::Reserved {
            key,
            username: username.to_owned(),
        };
        Some(index)
    }

    /// Binds, listens (backlog from config), and spawns the accept loop.
    pub async fn start(self: &Arc<Self>) -> Result<(), PoolError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = TcpListener::bind(addr).await.map_err(|source| PoolError::IoSetupFailed {
            stage: SetupStage::Bind,
            source,
        })?;

        *self.status.lock().await = WorkerStatus::Active;
        info!(port = self.port, "worker socket listening");

        let this = self.clone();
        let handle = tokio::spawn(async move { this.accept_loop(listener).await });
        *self.listener_task.lock().await = Some(handle);
        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut consecutive_errors = 0u32;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!(port = self.port, "worker socket shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _peer)) => {
                            consecutive_errors = 0;
                            self.clone().spawn_handshake(stream);
                        }
                        Err(error) => {
                            consecutive_errors += 1;
                            warn!(port = self.port, %error, "accept failed");
                            if consecutive_errors >= MAX_CONSECUTIVE_ACCEPT_ERRORS {
                                error!(port = self.port, "three consecutive accept errors, marking socket Error");
                                *self.status.lock().await = WorkerStatus::Error;
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Reads the 4-byte session key handshake and either admits the
    /// connection or rejects it.
    fn spawn_handshake(self: Arc<Self>, mut stream: TcpStream) {
        let max_message_size = self.services.config.max_message_size;
        let connection_timeout = Duration::from_secs(self.services.config.connection_timeout_secs);
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut key_buf = [0u8; 4];
            if stream.read_exact(&mut key_buf).await.is_err() {
                let _ = stream.write_all(b"Invalid session key\n").await;
                return;
            }
            let received_key = u32::from_le_bytes(key_buf);

            let slot_index = {
                let mut slots = this.slots.lock().await;
                slots.iter().position(|s| s.reserved_key() == Some(received_key))
            };

            let Some(index) = slot_index else {
                let _ = stream.write_all(b"Invalid session key\n").await;
                return;
            };

            let username = {
                let mut slots = this.slots.lock().await;
                let username = slots[index].username().unwrap_or_default().to_owned();
                slots[index] = SlotState::Admitted {
                    key: received_key,
                    username: username.clone(),
                    last_active: Utc::now(),
                };
                username
            };

            if stream.write_all(b"Connection accepted\n").await.is_err() {
                this.release_slot(index).await;
                this.services.sessions.remove(&username).await;
                return;
            }

            this.serve_admitted(stream, index, username, max_message_size, connection_timeout)
                .await;
        });

        let connection_tasks = self.connection_tasks.clone();
        tokio::spawn(async move {
            connection_tasks.lock().await.push(handle);
        });
    }

    /// Placeholder application protocol: echoes whatever the admitted
    /// client sends, refreshing `last_active` (both the slot's and the
    /// session cache's) on every read. A stand-in for the real handler
    /// this socket would eventually hand off to.
    ///
    /// Each read is bounded by `connection_timeout`: a client that goes
    /// quiet for longer than that is evicted exactly like one that
    /// disconnected, so an idle admitted client can never hold its slot
    /// forever.
    async fn serve_admitted(
        self: Arc<Self>,
        mut stream: TcpStream,
        index: usize,
        username: String,
        max_message_size: usize,
        connection_timeout: Duration,
    ) {
        let mut buf = vec![0u8; max_message_size];
        loop {
            match tokio::time::timeout(connection_timeout, stream.read(&mut buf)).await {
                Err(_) => {
                    debug!(port = self.port, %username, "admitted client idle timeout, evicting");
                    break;
                }
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    {
                        let mut slots = self.slots.lock().await;
                        if let SlotState::Admitted { last_active, .. } = &mut slots[index] {
                            *last_active = Utc::now();
                        }
                    }
                    self.services.sessions.touch(&username).await;
                    if stream.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
                Ok(Err(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Ok(Err(_)) => break,
            }
        }

        self.release_slot(index).await;
        self.services.sessions.remove(&username).await;
        debug!(port = self.port, %username, "admitted client disconnected, slot released");
    }

    async fn release_slot(&self, index: usize) {
        let mut slots = self.slots.lock().await;
        slots[index] = SlotState::Free;
    }

    /// Signals the accept loop to exit, then closes out every admitted
    /// connection task.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.listener_task.lock().await.take() {
            let _ = handle.await;
        }
        let mut tasks = self.connection_tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        *self.status.lock().await = WorkerStatus::Unused;
    }
}
