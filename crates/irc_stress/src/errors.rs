use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StressError {
    #[error("could not connect to '{address}': {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS error: '{0}'")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The socket was already closed, by us or by the peer.
    #[error("socket closed")]
    Closed,

    #[error("client is not connected")]
    NotConnected,

    #[error("timed out after {after:?} waiting for {waiting_for}")]
    Timeout {
        waiting_for: &'static str,
        after: Duration,
    },

    #[error("script contract violated: '{0}'")]
    ScriptViolation(String),

    #[error("barrier '{barrier}' is sized for {size} participants, refusing another")]
    BarrierOverIssued { barrier: &'static str, size: usize },

    #[error("barrier '{barrier}' is sized for {size} participants but only {issued} were issued")]
    BarrierUnderIssued {
        barrier: &'static str,
        issued: usize,
        size: usize,
    },

    #[error("could not parse server details '{0}'")]
    InvalidServerDetails(String),

    #[error("configuration error: '{0}'")]
    Config(String),

    #[error("could not load nick list '{}': {source}", path.display())]
    NickList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type StressResult<T> = Result<T, StressError>;
