use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::*;

use turnstile_common::{validate_credential_lengths, AuthenticateOutcome, RegisterOutcome};
use turnstile_core::{InsertOutcome, Services};
use turnstile_pool::WorkerPool;

const MAX_REQUEST_SIZE: usize = 1024;
const RESERVE_RETRIES: u32 = 3;

enum Command<'a> {
    Auth { username: &'a str, password: &'a str },
    Reg { username: &'a str, password: &'a str },
    Unknown,
}

/// `None` means the line isn't exactly three whitespace-separated tokens
/// ("Invalid command format"); `Some(Command::Unknown)` means it is, but
/// the first token isn't `AUTH`/`REG` ("Unknown command") — two distinct
/// wire outcomes that must not collapse into one.
fn parse_command(line: &str) -> Option<Command<'_>> {
    let mut tokens = line.split_whitespace();
    let command = tokens.next()?;
    let username = tokens.next()?;
    let password = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }
    match command {
        "AUTH" => Some(Command::Auth { username, password }),
        "REG" => Some(Command::Reg { username, password }),
        _ => Some(Command::Unknown),
    }
}

/// The front-door dispatcher: one listener, a connection task per client,
/// orchestrating the session cache, the abuse cache, the user store and
/// the worker pool. Each connection runs a sequential `async fn` that
/// reads one line, replies, then reads the next, so strict request/response
/// ordering falls out for free rather than needing an explicit state machine.
pub struct Router {
    port: u16,
    services: Services,
    pool: Arc<WorkerPool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    listener_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    pub fn new(services: Services, pool: Arc<WorkerPool>) -> Self {
        let port = services.config.main_port;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            port,
            services,
            pool,
            shutdown_tx,
            shutdown_rx,
            listener_task: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = TcpListener::bind(addr).await?;
        info!(port = self.port, "router listening");

        let this = self.clone();
        let handle = tokio::spawn(async move { this.accept_loop(listener).await });
        *self.listener_task.lock().await = Some(handle);
        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!("router shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let this = self.clone();
                            tokio::spawn(async move { this.serve_connection(stream, peer.ip()).await });
                        }
                        Err(error) => {
                            warn!(%error, "router accept failed");
                        }
                    }
                }
            }
        }
    }

    async fn serve_connection(self: Arc<Self>, mut stream: TcpStream, ip: IpAddr) {
        let mut buf = vec![0u8; MAX_REQUEST_SIZE];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) => return,
                Ok(n) => n,
                Err(error) => {
                    debug!(%error, "router connection read failed");
                    return;
                }
            };

            let line = String::from_utf8_lossy(&buf[..n]);
            let line = line.trim_end_matches(['\r', '\n']);

            let reply = match parse_command(line) {
                None => "Invalid command format. Use: AUTH username password or REG username password\n".to_owned(),
                Some(Command::Unknown) => "Unknown command\n".to_owned(),
                Some(Command::Reg { username, password }) => self.handle_register(username, password).await,
                Some(Command::Auth { username, password }) => self.handle_auth(username, password, ip).await,
            };

            if stream.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }

    async fn handle_register(&self, username: &str, password: &str) -> String {
        if validate_credential_lengths(username, password).is_err() {
            return "Registration failed\n".to_owned();
        }
        match self.services.user_store.register(username, password).await {
            Ok(RegisterOutcome::Ok) => "Registration successful\n".to_owned(),
            Ok(RegisterOutcome::AlreadyExists) => "Registration failed\n".to_owned(),
            Err(error) => {
                error!(%error, "registration failed");
                "Registration failed\n".to_owned()
            }
        }
    }

    /// The authentication algorithm: rate-limit gate, dedupe gate,
    /// credential check, then bucket reservation with bounded retries.
    async fn handle_auth(&self, username: &str, password: &str, ip: IpAddr) -> String {
        if validate_credential_lengths(username, password).is_err() {
            return "Invalid command format. Use: AUTH username password or REG username password\n".to_owned();
        }

        if self.services.abuse.is_blocked(username, ip).await {
            return "Too many failed attempts. Try again later.\n".to_owned();
        }

        if let Some(entry) = self.services.sessions.lookup(username).await {
            return format!(
                "User already logged in\nPort: {}\nSession key: {}\n",
                entry.assigned_port, entry.session_key
            );
        }

        match self.services.user_store.authenticate(username, password).await {
            Ok(AuthenticateOutcome::Ok) => {}
            Ok(AuthenticateOutcome::Failed) => {
                self.services.abuse.record_failure(username, ip).await;
                return "Authentication failed: Invalid username or password\n".to_owned();
            }
            Err(error) => {
                error!(%error, "authentication backend error");
                self.services.abuse.record_failure(username, ip).await;
                return "Authentication failed: Invalid username or password\n".to_owned();
            }
        }

        self.services.abuse.reset(username, ip).await;

        let Ok(session_key) = turnstile_common::generate_session_key() else {
            error!("session key generation failed");
            return "Authentication successful but failed to assign port\n".to_owned();
        };

        let mut assigned_port = None;
        for attempt in 0..RESERVE_RETRIES {
            if let Some(port) = self.pool.reserve(session_key, username).await {
                assigned_port = Some(port);
                break;
            }
            if attempt + 1 < RESERVE_RETRIES {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        }

        let Some(port) = assigned_port else {
            return "Authentication successful but failed to assign port\n".to_owned();
        };

        match self.services.sessions.insert(username, port, session_key).await {
            InsertOutcome::Ok => format!(
                "Authentication successful\nAssigned to port: {port}\nSession key: {session_key}\n"
            ),
            InsertOutcome::AlreadyPresent => {
                // Lost the race against another concurrent AUTH for this
                // username after the dedupe-gate check above; report the
                // winner's assignment instead of a phantom success.
                let entry = self
                    .services
                    .sessions
                    .lookup(username)
                    .await
                    .expect("entry must exist, insert raced on it");
                format!(
                    "User already logged in\nPort: {}\nSession key: {}\n",
                    entry.assigned_port, entry.session_key
                )
            }
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.listener_task.lock().await.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::AsyncReadExt;
    use turnstile_common::{FileUserStore, TurnstileConfig};

    async fn harness(mut config: TurnstileConfig) -> (Arc<Router>, Arc<WorkerPool>) {
        let dir = std::env::temp_dir().join(format!("turnstile-router-test-{}", rand::random::<u64>()));
        let store = Arc::new(FileUserStore::open(&dir).await.unwrap());

        // Bind the router on an ephemeral port, picked the same way the
        // worker pool finds free ports for its own tests.
        let probe = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        config.main_port = probe.local_addr().unwrap().port();
        drop(probe);

        let services = Services::new(config, store);
        let pool = Arc::new(WorkerPool::new(&services));
        pool.start_all().await.unwrap();

        let router = Arc::new(Router::new(services, pool.clone()));
        router.start().await.unwrap();
        (router, pool)
    }

    async fn connect(port: u16) -> TcpStream {
        TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap()
    }

    async fn request(stream: &mut TcpStream, line: &str) -> String {
        stream.write_all(line.as_bytes()).await.unwrap();
        let mut buf = vec![0u8; 1024];
        let n = stream.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    fn small_capacity_config() -> TurnstileConfig {
        TurnstileConfig {
            number_of_users: 10,
            sockets_per_bucket: 2,
            users_per_socket: 5,
            user_port_start: 30000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn e1_register_then_auth_then_handshake() {
        let (router, pool) = harness(small_capacity_config()).await;
        let port = router.port;

        let mut reg = connect(port).await;
        assert_eq!(request(&mut reg, "REG alice secret\n").await, "Registration successful\n");

        let mut auth = connect(port).await;
        let reply = request(&mut auth, "AUTH alice secret\n").await;
        assert!(reply.starts_with("Authentication successful\nAssigned to port: "));

        let worker_port: u16 = reply
            .lines()
            .nth(1)
            .unwrap()
            .strip_prefix("Assigned to port: ")
            .unwrap()
            .parse()
            .unwrap();
        let key: u32 = reply
            .lines()
            .nth(2)
            .unwrap()
            .strip_prefix("Session key: ")
            .unwrap()
            .parse()
            .unwrap();

        let mut worker_conn = connect(worker_port).await;
        worker_conn.write_all(&key.to_le_bytes()).await.unwrap();
        let mut buf = [0u8; 32];
        let n = worker_conn.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"Connection accepted\n");

        router.shutdown().await;
        pool.shutdown_all().await;
    }

    #[tokio::test]
    async fn e2_wrong_password_fails() {
        let (router, pool) = harness(small_capacity_config()).await;
        let port = router.port;

        let mut reg = connect(port).await;
        request(&mut reg, "REG alice secret\n").await;

        let mut auth = connect(port).await;
        assert_eq!(
            request(&mut auth, "AUTH alice wrong\n").await,
            "Authentication failed: Invalid username or password\n"
        );

        router.shutdown().await;
        pool.shutdown_all().await;
    }

    #[tokio::test]
    async fn e3_double_login_reports_existing_assignment() {
        let (router, pool) = harness(small_capacity_config()).await;
        let port = router.port;

        let mut reg = connect(port).await;
        request(&mut reg, "REG alice secret\n").await;

        let mut first = connect(port).await;
        let first_reply = request(&mut first, "AUTH alice secret\n").await;
        assert!(first_reply.starts_with("Authentication successful"));

        let mut second = connect(port).await;
        let second_reply = request(&mut second, "AUTH alice secret\n").await;
        assert!(second_reply.starts_with("User already logged in\n"));

        router.shutdown().await;
        pool.shutdown_all().await;
    }

    #[tokio::test]
    async fn e4_rate_limit_trips_after_threshold() {
        let mut config = small_capacity_config();
        config.max_user_fails = 5;
        let (router, pool) = harness(config).await;
        let port = router.port;

        let mut reg = connect(port).await;
        request(&mut reg, "REG alice secret\n").await;

        for _ in 0..5 {
            let mut attempt = connect(port).await;
            request(&mut attempt, "AUTH alice wrong\n").await;
        }

        let mut sixth = connect(port).await;
        assert_eq!(
            request(&mut sixth, "AUTH alice wrong\n").await,
            "Too many failed attempts. Try again later.\n"
        );

        router.shutdown().await;
        pool.shutdown_all().await;
    }

    #[tokio::test]
    async fn e6_malformed_command_keeps_connection_open() {
        let (router, pool) = harness(small_capacity_config()).await;
        let port = router.port;

        let mut conn = connect(port).await;
        let reply = request(&mut conn, "HELLO\n").await;
        assert_eq!(
            reply,
            "Invalid command format. Use: AUTH username password or REG username password\n"
        );

        // The connection stays open: a well-formed request on the same
        // socket still gets served.
        let second_reply = request(&mut conn, "REG bob secret\n").await;
        assert_eq!(second_reply, "Registration successful\n");

        router.shutdown().await;
        pool.shutdown_all().await;
    }

    #[tokio::test]
    async fn e5_unknown_command_is_distinct_from_malformed() {
        let (router, pool) = harness(small_capacity_config()).await;
        let port = router.port;

        let mut conn = connect(port).await;
        let reply = request(&mut conn, "FOO alice secret\n").await;
        assert_eq!(reply, "Unknown command\n");

        router.shutdown().await;
        pool.shutdown_all().await;
    }

    #[tokio::test]
    async fn capacity_saturation_yields_failed_assignment() {
        let (router, pool) = harness(small_capacity_config()).await;
        let port = router.port;

        for i in 0..10 {
            let username = format!("user{i}");
            let mut reg = connect(port).await;
            request(&mut reg, &format!("REG {username} secret\n")).await;
            let mut auth = connect(port).await;
            let reply = request(&mut auth, &format!("AUTH {username} secret\n")).await;
            assert!(reply.starts_with("Authentication successful\n"), "user {i} failed: {reply}");
        }

        let mut reg = connect(port).await;
        request(&mut reg, "REG overflow secret\n").await;
        let mut auth = connect(port).await;
        let reply = request(&mut auth, "AUTH overflow secret\n").await;
        assert_eq!(reply, "Authentication successful but failed to assign port\n");

        router.shutdown().await;
        pool.shutdown_all().await;
    }
}
