use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::client::Client;
use crate::config::ClientSettings;
use crate::errors::StressResult;
use crate::events::EventQueue;
use crate::scenario::{ScriptOptions, build_script};
use crate::server::Server;

/// Result of running every queue against one server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunSummary {
    pub server: String,
    pub total: usize,
    /// Clients whose disconnect the server confirmed.
    pub succeeded: usize,
    /// Clients that finished their script without a confirmed disconnect.
    pub unclean: usize,
    /// Clients whose script was aborted (dial failure, timeout, I/O error).
    pub failed: usize,
}

/// One queue per nick, all built from the same script options.
pub fn build_queues(
    nicks: &[String],
    options: &ScriptOptions,
    settings: &Arc<ClientSettings>,
) -> Vec<EventQueue> {
    nicks
        .iter()
        .enumerate()
        .map(|(id, nick)| {
            EventQueue::new(id, Client::new(nick.clone(), settings.clone()))
                .with_events(build_script(nick, options))
        })
        .collect()
}

/// Launches every queue against `server` and waits for all of them.
///
/// The server's barriers must be sized to exactly `queues.len()`; anything
/// else is refused before a single client is started.
pub async fn run_server(
    server: Arc<Server>,
    queues: Vec<EventQueue>,
    spawn_delay: Duration,
) -> StressResult<RunSummary> {
    let total = queues.len();
    let mut launches = Vec::with_capacity(total);
    for queue in queues {
        let tickets = server.tickets()?;
        launches.push((queue, tickets));
    }
    server.verify_barriers()?;

    info!("Testing {} at {} with {total} clients", server.name, server.conn.address);
    let mut handles = Vec::with_capacity(total);
    for (queue, tickets) in launches {
        if !spawn_delay.is_zero() {
            tokio::time::sleep(spawn_delay).await;
        }
        let id = queue.id;
        handles.push((id, tokio::spawn(queue.run(server.clone(), tickets))));
    }

    server.wait_finished().await;

    let mut summary = RunSummary {
        server: server.name.clone(),
        total,
        ..RunSummary::default()
    };
    for (id, handle) in handles {
        match handle.await {
            Ok(Ok(outcome)) if outcome.is_clean() => {}
            Ok(Ok(outcome)) => {
                warn!("[queue {id}] finished uncleanly: {outcome:?}");
                summary.unclean += 1;
            }
            Ok(Err(e)) => {
                error!("[queue {id}] aborted: {e}");
                summary.failed += 1;
            }
            Err(e) => {
                error!("[queue {id}] panicked: {e}");
                summary.failed += 1;
            }
        }
    }
    summary.succeeded = server.succeeded();
    info!(
        "{}: {}/{} clients disconnected cleanly",
        summary.server, summary.succeeded, summary.total
    );
    Ok(summary)
}
