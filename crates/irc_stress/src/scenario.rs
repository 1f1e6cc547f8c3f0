use crate::events::{Event, WaitMessage};

pub const DEFAULT_CHANNEL: &str = "#test";
const USER_LINE: &str = "USER test 0 * :I am a cool person!";
const FLOOD_TEXT: &str = "Test string to flood with here";
const RPL_WELCOME: &str = "001";

#[derive(Debug, Clone, PartialEq)]
pub enum FloodMode {
    /// Register, then leave.
    Connect,
    /// Register, join a shared channel, talk in it, then leave.
    Channel { channel: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOptions {
    pub mode: FloodMode,
    /// Wait for the server to answer each step before the next one.
    pub wait: bool,
}

impl ScriptOptions {
    pub fn describe(&self) -> &'static str {
        if self.wait { "waiting" } else { "not waiting" }
    }
}

/// Builds the event list for one client.
pub fn build_script(nick: &str, options: &ScriptOptions) -> Vec<Event> {
    let mut events = vec![
        Event::Connect,
        Event::line(format!("NICK {nick}")),
        Event::line(USER_LINE),
    ];
    if options.wait {
        events.push(Event::WaitForReply(WaitMessage::command(RPL_WELCOME)));
    }

    match &options.mode {
        FloodMode::Connect => {
            if options.wait {
                events.push(Event::Ping);
            }
        }
        FloodMode::Channel { channel } => {
            for line in [
                format!("JOIN {channel}"),
                format!("PRIVMSG {channel} :{FLOOD_TEXT}"),
            ] {
                events.push(Event::SendLine(line));
                if options.wait {
                    events.push(Event::Ping);
                }
            }
        }
    }

    events.push(Event::Disconnect);
    events
}
