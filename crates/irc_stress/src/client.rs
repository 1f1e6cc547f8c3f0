use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::barrier::LatchTicket;
use crate::config::ClientSettings;
use crate::errors::{StressError, StressResult};
use crate::events::WaitMessage;
use crate::message::Inbound;
use crate::server::Server;
use crate::socket::Socket;
use crate::transport::dial;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Closed,
}

/// How the read loop saw the connection end.
#[derive(Debug, Clone, PartialEq)]
pub enum Closure {
    /// We asked to leave and the server confirmed with `ERROR`/`QUIT`.
    Clean,
    /// We asked to leave but the stream ended without a confirmation.
    Unconfirmed,
    /// The server dropped us without being asked.
    Unexpected,
    /// Read error.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectOutcome {
    Clean,
    Unclean(Closure),
    /// The connection was already gone when the client reached the barrier.
    Early,
    /// No confirmation within the disconnect timeout.
    TimedOut,
    NotConnected,
}

impl DisconnectOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, DisconnectOutcome::Clean)
    }
}

/// State shared between a client and its read loop.
#[derive(Debug)]
struct ClientShared {
    nick: String,
    close_expected: AtomicBool,
    success_recorded: AtomicBool,
    lines_seen: AtomicU64,
    last_line: Mutex<String>,
}

impl ClientShared {
    fn record_line(&self, line: &str) {
        self.lines_seen.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_line.lock() {
            line.clone_into(&mut last);
        }
    }
}

/// Everything that only exists while a socket is open.
struct Connection {
    socket: Arc<Socket>,
    pong_rx: watch::Receiver<u64>,
    closure_rx: watch::Receiver<Option<Closure>>,
    inbound_rx: broadcast::Receiver<String>,
    reader: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.socket.close();
        self.reader.abort();
    }
}

/// One simulated IRC user.
pub struct Client {
    shared: Arc<ClientShared>,
    settings: Arc<ClientSettings>,
    state: ClientState,
    connection: Option<Connection>,
    ping_seq: u64,
}

impl Display for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.shared.nick)
    }
}

impl Client {
    pub fn new(nick: impl Into<String>, settings: Arc<ClientSettings>) -> Self {
        Client {
            shared: Arc::new(ClientShared {
                nick: nick.into(),
                close_expected: AtomicBool::new(false),
                success_recorded: AtomicBool::new(false),
                lines_seen: AtomicU64::new(0),
                last_line: Mutex::new(String::new()),
            }),
            settings,
            state: ClientState::Idle,
            connection: None,
            ping_seq: 0,
        }
    }

    pub fn nick(&self) -> &str {
        &self.shared.nick
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn lines_seen(&self) -> u64 {
        self.shared.lines_seen.load(Ordering::Relaxed)
    }

    pub fn last_line(&self) -> String {
        self.shared
            .last_line
            .lock()
            .map(|last| last.clone())
            .unwrap_or_default()
    }

    /// Latest ping sequence acknowledged by the server.
    pub fn last_pong(&self) -> u64 {
        self.connection
            .as_ref()
            .map_or(0, |conn| *conn.pong_rx.borrow())
    }

    fn connection(&self) -> StressResult<&Connection> {
        self.connection.as_ref().ok_or(StressError::NotConnected)
    }

    pub async fn connect(&mut self, server: &Arc<Server>) -> StressResult<()> {
        if self.state != ClientState::Idle {
            return Err(StressError::ScriptViolation(format!(
                "{} cannot connect twice",
                self.shared.nick
            )));
        }

        self.state = ClientState::Connecting;
        let transport = match dial(&server.conn, self.settings.dial_timeout).await {
            Ok(transport) => transport,
            Err(e) => {
                self.state = ClientState::Closed;
                error!("[{}] could not connect to {}: {e}", self.shared.nick, server.name);
                return Err(e);
            }
        };

        let socket = Arc::new(Socket::new(transport));
        let (pong_tx, pong_rx) = watch::channel(0);
        let (closure_tx, closure_rx) = watch::channel(None);
        let (inbound_tx, inbound_rx) = broadcast::channel(self.settings.inbound_buffer);

        let reader = tokio::spawn(read_loop(
            socket.clone(),
            server.clone(),
            self.shared.clone(),
            pong_tx,
            closure_tx,
            inbound_tx,
        ));

        self.connection = Some(Connection {
            socket,
            pong_rx,
            closure_rx,
            inbound_rx,
            reader,
        });
        self.state = ClientState::Connected;
        debug!("[{}] connected to {}", self.shared.nick, server.name);
        Ok(())
    }

    pub async fn send_line(&self, line: &str) -> StressResult<()> {
        let conn = self.connection()?;
        conn.socket
            .write_line(line.trim_end_matches(['\r', '\n']))
            .await
    }

    /// Waits for an inbound line matching `wait`, counting from the
    /// moment the connection was opened. Returns the matching line.
    pub async fn wait_for(&mut self, wait: &WaitMessage) -> StressResult<String> {
        let timeout = self.settings.reply_timeout;
        let nick = self.shared.nick.clone();
        let conn = self.connection.as_mut().ok_or(StressError::NotConnected)?;

        let waiting = async {
            loop {
                match conn.inbound_rx.recv().await {
                    Ok(line) if wait.matches(&line) => return Ok(line),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[{nick}] skipped {skipped} lines while waiting for {wait}");
                    }
                    Err(RecvError::Closed) => return Err(StressError::Closed),
                }
            }
        };

        tokio::time::timeout(timeout, waiting)
            .await
            .map_err(|_| StressError::Timeout {
                waiting_for: "reply",
                after: timeout,
            })?
    }

    /// Sends `PING <seq>` and waits until the server has answered this
    /// sequence number or a later one.
    pub async fn ping(&mut self) -> StressResult<()> {
        let timeout = self.settings.ping_timeout;
        self.ping_seq += 1;
        let seq = self.ping_seq;
        let conn = self.connection()?;

        conn.socket.write_line(&format!("PING {seq}")).await?;

        let mut pong_rx = conn.pong_rx.clone();
        let acked = tokio::time::timeout(timeout, pong_rx.wait_for(|acked| *acked >= seq))
            .await
            .map(|acked| acked.map(|acked| *acked));
        match acked {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(StressError::Closed),
            Err(_) => Err(StressError::Timeout {
                waiting_for: "ping reply",
                after: timeout,
            }),
        }
    }

    /// Leaves the server together with every other client of the run.
    ///
    /// Arrives at the ready-to-disconnect barrier first. A client whose
    /// connection is already gone leaves right away; the others wait for the
    /// whole group, then send `QUIT` and wait for the server to confirm.
    pub async fn disconnect(&mut self, ready: LatchTicket) -> DisconnectOutcome {
        let nick = self.shared.nick.clone();
        let Some(conn) = self.connection.take() else {
            ready.arrive();
            warn!("[{nick}] asked to disconnect but was never connected");
            return DisconnectOutcome::NotConnected;
        };

        self.state = ClientState::Disconnecting;
        let barrier = ready.arrive();

        if conn.socket.is_closed() {
            warn!("[{nick}] connection closed before disconnect");
            self.state = ClientState::Closed;
            return DisconnectOutcome::Early;
        }

        debug!(
            "[{nick}] waiting for {} clients before disconnecting",
            barrier.remaining()
        );
        barrier.wait().await;

        self.shared.close_expected.store(true, Ordering::SeqCst);
        let quit = format!("QUIT :{}", self.settings.quit_message);
        let timeout = self.settings.disconnect_timeout;
        let mut closure_rx = conn.closure_rx.clone();
        // a peer that stops reading can stall the QUIT write too
        let confirmation = async {
            if let Err(e) = conn.socket.write_line(&quit).await {
                warn!("[{nick}] could not send QUIT: {e}");
            }
            closure_rx
                .wait_for(Option::is_some)
                .await
                .map(|closure| closure.clone())
                .ok()
                .flatten()
        };
        let closure = tokio::time::timeout(timeout, confirmation).await.ok();
        self.state = ClientState::Closed;
        drop(conn);

        let confirmed = self.shared.success_recorded.load(Ordering::Acquire);
        if closure.is_none() && !confirmed {
            warn!("[{nick}] no disconnect confirmation after {timeout:?}");
        }
        disconnect_outcome(&nick, closure, confirmed)
    }

    /// Drops a connection the script never closed.
    pub fn abandon(&mut self) {
        if self.connection.take().is_some() {
            warn!("[{}] script ended with the connection still open", self.shared.nick);
        }
        self.state = ClientState::Closed;
    }
}

/// `closure` is `None` when the confirmation wait timed out. A success the
/// read loop already recorded wins over a timeout that raced it.
fn disconnect_outcome(
    nick: &str,
    closure: Option<Option<Closure>>,
    confirmed: bool,
) -> DisconnectOutcome {
    match closure {
        Some(Some(Closure::Clean)) => DisconnectOutcome::Clean,
        Some(Some(closure)) => {
            warn!("[{nick}] unclean disconnect: {closure:?}");
            DisconnectOutcome::Unclean(closure)
        }
        Some(None) => DisconnectOutcome::Unclean(Closure::Failed(
            "read loop ended without reporting".to_owned(),
        )),
        None if confirmed => DisconnectOutcome::Clean,
        None => DisconnectOutcome::TimedOut,
    }
}

/// Reads every inbound line, answers keepalives, tracks ping replies and
/// decides how the connection ended.
async fn read_loop(
    socket: Arc<Socket>,
    server: Arc<Server>,
    shared: Arc<ClientShared>,
    pong_tx: watch::Sender<u64>,
    closure_tx: watch::Sender<Option<Closure>>,
    inbound_tx: broadcast::Sender<String>,
) {
    let nick = shared.nick.as_str();
    let closure = loop {
        let line = match socket.read().await {
            Ok(line) => line,
            Err(StressError::Closed) => {
                if shared.close_expected.load(Ordering::SeqCst) {
                    break Closure::Unconfirmed;
                }
                break Closure::Unexpected;
            }
            Err(e) => break Closure::Failed(e.to_string()),
        };

        debug!("[{nick}] << {line}");
        shared.record_line(&line);

        match Inbound::classify(&line, nick) {
            Inbound::Terminal if shared.close_expected.load(Ordering::SeqCst) => {
                if !shared.success_recorded.swap(true, Ordering::AcqRel) {
                    server.record_success();
                }
                info!("[{nick}] disconnect confirmed: {line}");
                socket.close();
                break Closure::Clean;
            }
            Inbound::Terminal => {
                warn!("[{nick}] unexpected closure: {line}");
            }
            Inbound::Pong(seq) => {
                pong_tx.send_if_modified(|acked| {
                    if seq > *acked {
                        *acked = seq;
                        true
                    } else {
                        false
                    }
                });
            }
            Inbound::Ping(token) => {
                if let Err(e) = socket.write_line(&format!("PONG :{token}")).await {
                    debug!("[{nick}] could not answer PING: {e}");
                }
            }
            Inbound::Other => {}
        }

        // nobody waiting is fine
        let _ = inbound_tx.send(line);
    };

    debug!("[{nick}] read loop finished: {closure:?}");
    closure_tx.send_replace(Some(closure));
}
