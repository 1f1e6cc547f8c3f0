use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, watch};

use crate::errors::{StressError, StressResult};

/// Any duplex byte stream we can speak IRC over (TCP, TLS, Unix, or an
/// in-memory pipe in tests).
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

pub type BoxedTransport = Box<dyn Transport>;

/// Line-oriented IRC socket.
///
/// Reads and writes go through separate locks so one reader task and one
/// writer can work at the same time. The closed flag lives in a watch channel:
/// closing wakes a pending `read` and every later `read`/`write` fails fast.
pub struct Socket {
    reader: Mutex<BufReader<ReadHalf<BoxedTransport>>>,
    writer: Mutex<WriteHalf<BoxedTransport>>,
    closed: watch::Sender<bool>,
}

impl Socket {
    pub fn new(transport: BoxedTransport) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        let (closed, _) = watch::channel(false);
        Socket {
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(write_half),
            closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Marks the socket closed. Returns `true` only for the call that actually
    /// closed it.
    pub fn close(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    /// Reads one line, without its trailing `\r\n`.
    ///
    /// A partial line followed by end-of-stream is still handed out once (the
    /// server usually sends `ERROR` right before hanging up); the socket is
    /// closed by then and the next call fails.
    pub async fn read(&self) -> StressResult<String> {
        let mut closed_rx = self.closed.subscribe();
        if *closed_rx.borrow_and_update() {
            return Err(StressError::Closed);
        }

        let mut reader = self.reader.lock().await;
        let mut buf = Vec::new();
        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => read,
            _ = closed_rx.wait_for(|closed| *closed) => return Err(StressError::Closed),
        };

        match read {
            Ok(0) => {
                self.close();
                Err(StressError::Closed)
            }
            Ok(_) => {
                if buf.last() != Some(&b'\n') {
                    // end of stream after a partial line
                    self.close();
                    if String::from_utf8_lossy(&buf).trim().is_empty() {
                        return Err(StressError::Closed);
                    }
                }
                let line = String::from_utf8_lossy(&buf);
                Ok(line.trim_end_matches(['\r', '\n']).to_owned())
            }
            Err(e) => {
                self.close();
                Err(StressError::Io(e))
            }
        }
    }

    pub async fn write(&self, data: &str) -> StressResult<()> {
        if self.is_closed() {
            return Err(StressError::Closed);
        }

        let result = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(data.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };

        result.map_err(|e| {
            self.close();
            StressError::Io(e)
        })
    }

    pub async fn write_line(&self, line: &str) -> StressResult<()> {
        self.write(&format!("{line}\r\n")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};

    fn socket_pair() -> (Socket, tokio::io::DuplexStream) {
        let (ours, theirs) = duplex(1024);
        (Socket::new(Box::new(ours)), theirs)
    }

    #[tokio::test]
    async fn strips_line_endings() {
        let (socket, mut peer) = socket_pair();
        peer.write_all(b":srv 001 bob :Welcome\r\nPING :x\n").await.unwrap();

        assert_eq!(socket.read().await.unwrap(), ":srv 001 bob :Welcome");
        assert_eq!(socket.read().await.unwrap(), "PING :x");
        assert!(!socket.is_closed());
    }

    #[tokio::test]
    async fn error_line_is_delivered_before_close() {
        let (socket, mut peer) = socket_pair();
        peer.write_all(b"ERROR :Closing Link\r\n").await.unwrap();
        drop(peer);

        assert_eq!(socket.read().await.unwrap(), "ERROR :Closing Link");
        assert!(matches!(socket.read().await, Err(StressError::Closed)));
        assert!(socket.is_closed());
    }

    #[tokio::test]
    async fn partial_line_at_eof_is_delivered_once() {
        let (socket, mut peer) = socket_pair();
        peer.write_all(b"ERROR :bye").await.unwrap();
        drop(peer);

        assert_eq!(socket.read().await.unwrap(), "ERROR :bye");
        assert!(socket.is_closed());
        assert!(matches!(socket.read().await, Err(StressError::Closed)));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_io() {
        let (socket, _peer) = socket_pair();

        assert!(socket.close());
        assert!(!socket.close());
        assert!(matches!(socket.read().await, Err(StressError::Closed)));
        assert!(matches!(socket.write_line("PING 1").await, Err(StressError::Closed)));
        assert!(matches!(socket.read().await, Err(StressError::Closed)));
    }

    #[tokio::test]
    async fn close_wakes_pending_read() {
        let (socket, _peer) = socket_pair();
        let socket = std::sync::Arc::new(socket);

        let reader = {
            let socket = socket.clone();
            tokio::spawn(async move { socket.read().await })
        };
        tokio::task::yield_now().await;
        socket.close();

        assert!(matches!(reader.await.unwrap(), Err(StressError::Closed)));
    }

    #[tokio::test]
    async fn write_line_appends_terminator() {
        let (socket, mut peer) = socket_pair();
        socket.write_line("NICK alice").await.unwrap();

        let mut buf = [0u8; 12];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"NICK alice\r\n");
    }
}
