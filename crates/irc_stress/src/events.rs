use std::fmt::Display;
use std::sync::Arc;

use log::{debug, error};

use crate::client::{Client, DisconnectOutcome};
use crate::errors::{StressError, StressResult};
use crate::message::Message;
use crate::server::{ClientTickets, Server};

/// A line the client should wait for. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaitMessage {
    /// IRC command or numeric, compared case-insensitively.
    pub command: Option<String>,
    /// Expected start of the space-joined params.
    pub params: Option<String>,
}

impl WaitMessage {
    pub fn command(command: impl Into<String>) -> Self {
        WaitMessage {
            command: Some(command.into()),
            params: None,
        }
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = Some(params.into());
        self
    }

    pub fn matches(&self, line: &str) -> bool {
        let Some(message) = Message::parse(line) else {
            return false;
        };
        let command_matches = self
            .command
            .as_deref()
            .is_none_or(|command| message.command.eq_ignore_ascii_case(command));
        let params_matches = self
            .params
            .as_deref()
            .is_none_or(|params| message.joined_params().starts_with(params));
        command_matches && params_matches
    }
}

impl Display for WaitMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}",
            self.command.as_deref().unwrap_or("*"),
            self.params.as_deref().unwrap_or("*")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The client connecting to the server.
    Connect,
    /// The client leaving, in step with every other client of the server.
    Disconnect,
    /// The client sending an IRC line.
    SendLine(String),
    /// The client waiting for a specific line from the server.
    WaitForReply(WaitMessage),
    /// The client waiting until the server has processed everything sent so far.
    Ping,
}

impl Event {
    pub fn line(line: impl Into<String>) -> Self {
        Event::SendLine(line.into())
    }

    fn needs_connection(&self) -> bool {
        matches!(
            self,
            Event::SendLine(_) | Event::WaitForReply(_) | Event::Ping
        )
    }
}

/// How a queue's script ended, when it ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOutcome {
    Disconnected(DisconnectOutcome),
    /// The script had no `Disconnect`; the connection was dropped at the end.
    LeftOpen,
    /// The script never connected.
    NeverConnected,
}

impl QueueOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, QueueOutcome::Disconnected(outcome) if outcome.is_clean())
    }
}

/// The script one client replays against one server.
pub struct EventQueue {
    pub id: usize,
    client: Client,
    events: Vec<Event>,
}

impl EventQueue {
    pub fn new(id: usize, client: Client) -> Self {
        EventQueue {
            id,
            client,
            events: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = Event>) -> Self {
        self.events.extend(events);
        self
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Checks the script is one the executor can honour: a single `Connect`
    /// before any traffic, at most one `Disconnect`, no traffic after it, and
    /// non-empty single lines.
    pub fn validate(&self) -> StressResult<()> {
        let violation = |index: usize, what: &str| {
            Err(StressError::ScriptViolation(format!(
                "queue {} event {index}: {what}",
                self.id
            )))
        };

        let mut connected = false;
        let mut disconnected = false;
        for (index, event) in self.events.iter().enumerate() {
            if event.needs_connection() && (!connected || disconnected) {
                return violation(index, "sends or waits without an open connection");
            }
            match event {
                Event::Connect if connected => return violation(index, "connects twice"),
                Event::Connect => connected = true,
                Event::Disconnect if disconnected => return violation(index, "disconnects twice"),
                Event::Disconnect => disconnected = true,
                Event::SendLine(line) => {
                    let line = line.trim_end_matches(['\r', '\n']);
                    if line.is_empty() {
                        return violation(index, "empty line");
                    }
                    if line.contains(['\r', '\n']) {
                        return violation(index, "more than one line in a single event");
                    }
                }
                Event::WaitForReply(_) | Event::Ping => {}
            }
        }
        Ok(())
    }

    /// Replays the script once against `server`.
    ///
    /// Both barrier tickets are released on every way out of here, errors and
    /// panics included, so the rest of the run never waits on this queue.
    pub async fn run(self, server: Arc<Server>, tickets: ClientTickets) -> StressResult<QueueOutcome> {
        let ClientTickets {
            ready_to_disconnect,
            finished,
        } = tickets;
        let _finished = finished;
        let mut ready = Some(ready_to_disconnect);

        self.validate()?;
        let EventQueue {
            id,
            mut client,
            events,
        } = self;

        let mut outcome = None;
        for event in events {
            debug!("[queue {id}] {} -> {event:?}", client.nick());
            match event {
                Event::Connect => client.connect(&server).await?,
                Event::SendLine(line) => client.send_line(&line).await?,
                Event::WaitForReply(wait) => {
                    client.wait_for(&wait).await?;
                }
                Event::Ping => client.ping().await?,
                Event::Disconnect => {
                    let Some(ticket) = ready.take() else {
                        error!("[queue {id}] disconnect ticket already spent");
                        return Err(StressError::ScriptViolation(format!(
                            "queue {id} disconnects twice"
                        )));
                    };
                    outcome = Some(client.disconnect(ticket).await);
                }
            }
        }

        Ok(match outcome {
            Some(outcome) => QueueOutcome::Disconnected(outcome),
            None if client.is_connected() => {
                client.abandon();
                QueueOutcome::LeftOpen
            }
            None => QueueOutcome::NeverConnected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientSettings;
    use crate::transport::ConnectionDetails;

    fn queue(events: Vec<Event>) -> EventQueue {
        EventQueue::new(7, Client::new("tester", Arc::new(ClientSettings::default())))
            .with_events(events)
    }

    #[test]
    fn wait_message_matching() {
        let welcome = ":irc.example.com 001 alice :Welcome to the network";
        assert!(WaitMessage::default().matches(welcome));
        assert!(WaitMessage::command("001").matches(welcome));
        assert!(WaitMessage::command("001").with_params("alice").matches(welcome));
        assert!(!WaitMessage::command("001").with_params("bob").matches(welcome));
        assert!(!WaitMessage::command("PONG").matches(welcome));
        assert!(WaitMessage::command("join").matches(":alice!u@h JOIN #test"));
        assert!(!WaitMessage::default().matches(""));
    }

    #[test]
    fn accepts_regular_script() {
        let q = queue(vec![
            Event::Connect,
            Event::line("NICK tester"),
            Event::line("USER test 0 * :I am a cool person!\r\n"),
            Event::WaitForReply(WaitMessage::command("001")),
            Event::Ping,
            Event::Disconnect,
        ]);
        assert!(q.validate().is_ok());
        assert_eq!(q.events().len(), 6);
        assert_eq!(q.client().nick(), "tester");
    }

    #[test]
    fn rejects_broken_scripts() {
        let broken = [
            vec![Event::line("NICK x"), Event::Connect],
            vec![Event::Connect, Event::Connect],
            vec![Event::Connect, Event::Disconnect, Event::Disconnect],
            vec![Event::Connect, Event::Disconnect, Event::Ping],
            vec![Event::Connect, Event::line("\r\n")],
            vec![Event::Connect, Event::line("NICK a\r\nUSER b")],
        ];
        for events in broken {
            let q = queue(events.clone());
            assert!(
                matches!(q.validate(), Err(StressError::ScriptViolation(_))),
                "{events:?}"
            );
        }
    }

    #[tokio::test]
    async fn broken_script_still_releases_barriers() {
        let server = Server::new("s", ConnectionDetails::new("127.0.0.1:1", false), 1);
        let tickets = server.tickets().unwrap();
        let q = queue(vec![Event::Ping]);

        assert!(q.run(server.clone(), tickets).await.is_err());
        assert_eq!(server.waiting_to_disconnect(), 0);
        server.wait_finished().await;
    }

    #[tokio::test]
    async fn script_without_connect_never_connects() {
        let server = Server::new("s", ConnectionDetails::new("127.0.0.1:1", false), 1);
        let tickets = server.tickets().unwrap();
        let outcome = queue(Vec::new()).run(server.clone(), tickets).await.unwrap();
        assert_eq!(outcome, QueueOutcome::NeverConnected);
        server.wait_finished().await;
    }
}
