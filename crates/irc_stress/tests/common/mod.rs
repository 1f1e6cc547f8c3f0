#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// How the fake server treats its clients.
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    /// Answer `QUIT` with `ERROR` and hang up.
    pub confirm_quit: bool,
    /// Hold back `PONG`s for this nick.
    pub slow_pong: Option<(String, Duration)>,
}

#[derive(Debug, Default)]
pub struct Observed {
    pub quits: Vec<(String, Instant)>,
    pub slow_pong_sent: Option<Instant>,
    pub connections: usize,
}

/// Just enough of an IRC server to drive the stress clients.
pub struct FakeIrcd {
    pub address: String,
    pub observed: Arc<Mutex<Observed>>,
}

impl FakeIrcd {
    pub async fn start(behaviour: Behaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let observed = Arc::new(Mutex::new(Observed::default()));

        let shared = observed.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                shared.lock().unwrap().connections += 1;
                tokio::spawn(serve(stream, behaviour.clone(), shared.clone()));
            }
        });

        FakeIrcd { address, observed }
    }

    pub fn quits(&self) -> Vec<(String, Instant)> {
        self.observed.lock().unwrap().quits.clone()
    }

    pub fn slow_pong_sent(&self) -> Option<Instant> {
        self.observed.lock().unwrap().slow_pong_sent
    }
}

async fn serve(stream: TcpStream, behaviour: Behaviour, observed: Arc<Mutex<Observed>>) {
    let mut peer = BufReader::new(stream);
    let mut nick = String::from("*");
    let mut line = String::new();

    while peer.read_line(&mut line).await.unwrap_or(0) > 0 {
        let request = line.trim_end().to_owned();
        line.clear();

        let (command, rest) = request.split_once(' ').unwrap_or((request.as_str(), ""));
        let reply = match command {
            "NICK" => {
                nick = rest.to_owned();
                None
            }
            "USER" => Some(format!(":fake 001 {nick} :Welcome to the fake network\r\n")),
            "PING" => {
                if let Some((slow, delay)) = &behaviour.slow_pong {
                    if *slow == nick {
                        tokio::time::sleep(*delay).await;
                        observed.lock().unwrap().slow_pong_sent = Some(Instant::now());
                    }
                }
                Some(format!(":fake PONG fake :{rest}\r\n"))
            }
            "QUIT" => {
                observed
                    .lock()
                    .unwrap()
                    .quits
                    .push((nick.clone(), Instant::now()));
                if behaviour.confirm_quit {
                    let bye = format!("ERROR :Closing Link: {nick} (Quit)\r\n");
                    let _ = peer.get_mut().write_all(bye.as_bytes()).await;
                    return;
                }
                None
            }
            _ => None,
        };

        if let Some(reply) = reply {
            if peer.get_mut().write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}
