mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Behaviour, FakeIrcd};
use irc_stress::client::Client;
use irc_stress::config::ClientSettings;
use irc_stress::events::{Event, EventQueue};
use irc_stress::runner::{build_queues, run_server};
use irc_stress::scenario::{FloodMode, ScriptOptions};
use irc_stress::server::Server;
use irc_stress::transport::ConnectionDetails;

fn settings() -> Arc<ClientSettings> {
    Arc::new(ClientSettings {
        dial_timeout: Duration::from_secs(2),
        reply_timeout: Duration::from_secs(2),
        ping_timeout: Duration::from_secs(2),
        disconnect_timeout: Duration::from_millis(300),
        ..ClientSettings::default()
    })
}

fn pinging_queue(id: usize, nick: &str) -> EventQueue {
    EventQueue::new(id, Client::new(nick, settings())).with_events([
        Event::Connect,
        Event::line(format!("NICK {nick}")),
        Event::line("USER test 0 * :I am a cool person!"),
        Event::Ping,
        Event::Disconnect,
    ])
}

#[tokio::test]
async fn three_clients_disconnect_together() {
    let ircd = FakeIrcd::start(Behaviour {
        confirm_quit: true,
        slow_pong: Some(("c2".to_owned(), Duration::from_millis(300))),
    })
    .await;
    let server = Server::new("fake", ConnectionDetails::new(&ircd.address, false), 3);
    let queues = (0..3).map(|i| pinging_queue(i, &format!("c{i}"))).collect();

    let summary = run_server(server.clone(), queues, Duration::ZERO).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.unclean, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(server.succeeded(), 3);

    // nobody may quit before the slowest client reached the barrier
    let slow_pong_sent = ircd.slow_pong_sent().unwrap();
    let quits = ircd.quits();
    assert_eq!(quits.len(), 3);
    for (nick, at) in quits {
        assert!(at >= slow_pong_sent, "{nick} quit before c2 was ready");
    }
}

#[tokio::test]
async fn raw_ping_line_scripts_all_succeed() {
    let ircd = FakeIrcd::start(Behaviour {
        confirm_quit: true,
        ..Behaviour::default()
    })
    .await;
    let server = Server::new("fake", ConnectionDetails::new(&ircd.address, false), 3);
    let queues = (0..3)
        .map(|i| {
            EventQueue::new(i, Client::new(format!("r{i}"), settings())).with_events([
                Event::Connect,
                Event::line("PING"),
                Event::Disconnect,
            ])
        })
        .collect();

    let summary = run_server(server.clone(), queues, Duration::ZERO).await.unwrap();

    assert_eq!(summary.succeeded, 3);
    assert_eq!(server.succeeded(), 3);
    assert_eq!(ircd.quits().len(), 3);
}

#[tokio::test]
async fn unconfirmed_quit_is_not_a_success() {
    let ircd = FakeIrcd::start(Behaviour::default()).await;
    let server = Server::new("fake", ConnectionDetails::new(&ircd.address, false), 2);
    let queues = (0..2).map(|i| pinging_queue(i, &format!("u{i}"))).collect();

    let summary = run_server(server, queues, Duration::ZERO).await.unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.unclean, 2);
    assert_eq!(ircd.quits().len(), 2);
}

#[tokio::test]
async fn dial_failures_do_not_stall_the_run() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let server = Server::new("gone", ConnectionDetails::new(address, false), 3);
    let queues = (0..3).map(|i| pinging_queue(i, &format!("d{i}"))).collect();

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        run_server(server, queues, Duration::ZERO),
    )
    .await
    .expect("run should finish")
    .unwrap();

    assert_eq!(summary.failed, 3);
    assert_eq!(summary.succeeded, 0);
}

#[tokio::test]
async fn script_without_disconnect_releases_the_others() {
    let ircd = FakeIrcd::start(Behaviour {
        confirm_quit: true,
        ..Behaviour::default()
    })
    .await;
    let server = Server::new("fake", ConnectionDetails::new(&ircd.address, false), 3);

    let lingering = EventQueue::new(2, Client::new("linger", settings())).with_events([
        Event::Connect,
        Event::line("NICK linger"),
        Event::line("USER test 0 * :I am a cool person!"),
    ]);
    let queues = vec![pinging_queue(0, "p0"), pinging_queue(1, "p1"), lingering];

    let summary = run_server(server, queues, Duration::ZERO).await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.unclean, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn waiting_chanflood_against_fake_server() {
    let ircd = FakeIrcd::start(Behaviour {
        confirm_quit: true,
        ..Behaviour::default()
    })
    .await;
    let nicks: Vec<String> = (0..5).map(|i| format!("cf{i}")).collect();
    let options = ScriptOptions {
        mode: FloodMode::Channel {
            channel: "#test".to_owned(),
        },
        wait: true,
    };
    let server = Server::new("fake", ConnectionDetails::new(&ircd.address, false), nicks.len());
    let queues = build_queues(&nicks, &options, &settings());

    let summary = run_server(server, queues, Duration::from_millis(1)).await.unwrap();

    assert_eq!(summary.succeeded, 5);
    assert!(summary.succeeded <= summary.total);
    assert_eq!(ircd.observed.lock().unwrap().connections, 5);
}
