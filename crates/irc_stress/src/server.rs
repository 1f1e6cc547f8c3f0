use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::barrier::{Latch, LatchTicket};
use crate::errors::{StressError, StressResult};
use crate::transport::ConnectionDetails;

/// A server under test, shared by every client targeting it.
#[derive(Debug)]
pub struct Server {
    pub name: String,
    pub conn: ConnectionDetails,
    succeeded: AtomicUsize,
    ready_to_disconnect: Arc<Latch>,
    finished: Arc<Latch>,
}

/// A client's two barrier slots on one server.
#[derive(Debug)]
pub struct ClientTickets {
    pub ready_to_disconnect: LatchTicket,
    pub finished: LatchTicket,
}

impl Server {
    /// Both barriers are sized to `clients`, the exact number of clients that
    /// will run against this server.
    pub fn new(name: impl Into<String>, conn: ConnectionDetails, clients: usize) -> Arc<Self> {
        Arc::new(Server {
            name: name.into(),
            conn,
            succeeded: AtomicUsize::new(0),
            ready_to_disconnect: Latch::new("ready-to-disconnect", clients),
            finished: Latch::new("finished", clients),
        })
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::AcqRel);
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::Acquire)
    }

    pub fn tickets(&self) -> StressResult<ClientTickets> {
        Ok(ClientTickets {
            ready_to_disconnect: self.ready_to_disconnect.ticket()?,
            finished: self.finished.ticket()?,
        })
    }

    /// Must pass before any client is launched, otherwise the run would
    /// either hang or report completion early.
    pub fn verify_barriers(&self) -> StressResult<()> {
        self.ready_to_disconnect.verify_fully_issued()?;
        self.finished.verify_fully_issued()
    }

    pub fn waiting_to_disconnect(&self) -> usize {
        self.ready_to_disconnect.remaining()
    }

    pub async fn wait_finished(&self) {
        self.finished.wait().await;
    }
}

/// `Name,Addr,TLS` as given on the command line, TLS being `yes` or `no`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerDetails {
    pub name: String,
    pub conn: ConnectionDetails,
}

impl FromStr for ServerDetails {
    type Err = StressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StressError::InvalidServerDetails(s.to_owned());
        let parts: Vec<&str> = s.split(',').collect();
        let [name, address, tls] = parts[..] else {
            return Err(invalid());
        };
        if name.trim().is_empty() || address.trim().is_empty() {
            return Err(invalid());
        }
        let is_tls = match tls.trim().to_ascii_lowercase().as_str() {
            "yes" => true,
            "no" => false,
            _ => return Err(invalid()),
        };
        Ok(ServerDetails {
            name: name.trim().to_owned(),
            conn: ConnectionDetails::new(address.trim(), is_tls),
        })
    }
}

impl ServerDetails {
    pub fn build(&self, clients: usize) -> Arc<Server> {
        Server::new(self.name.clone(), self.conn.clone(), clients)
    }
}
