use std::path::PathBuf;

use clap::builder::RangedU64ValueParser;
use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::errors::{StressError, StressResult};
use crate::nicks::{NickSelector, parse_nick_list};
use crate::scenario::{DEFAULT_CHANNEL, FloodMode, ScriptOptions};
use crate::server::ServerDetails;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// ircstress stresses an IRC server through connect flooding and channel
/// message flooding. Each client registers, optionally floods a channel,
/// then every client disconnects at the same moment.
#[derive(Parser, Debug)]
#[command(name = "ircstress", version, about)]
pub struct Args {
    #[command(subcommand)]
    pub mode: Mode,

    /// TOML file with timeouts and run settings.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Connect clients, register them, disconnect them.
    Connectflood(FloodArgs),
    /// Like connectflood, but every client joins a channel and talks in it.
    Chanflood {
        #[command(flatten)]
        flood: FloodArgs,
        /// Channel name to join.
        #[arg(long, default_value = DEFAULT_CHANNEL)]
        chan: String,
    },
}

#[derive(ClapArgs, Debug)]
pub struct FloodArgs {
    /// List to grab nicks from, separated by newlines. Counter nicks otherwise.
    #[arg(long)]
    pub nicks: Option<PathBuf>,

    /// If a nick list is given, randomise the order nicks are used in.
    #[arg(long)]
    pub random_nicks: bool,

    /// Seed for the nick randomisation, for reproducible runs.
    #[arg(long)]
    pub seed: Option<u64>,

    /// The number of clients that should connect.
    #[arg(long, default_value_t = 10000, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub clients: usize,

    /// After each action, wait for the server's response before continuing.
    #[arg(long)]
    pub wait: bool,

    /// Server details as "Name,Addr,TLS", Addr like "localhost:6667" or
    /// "unix:/path/to/socket", TLS either "yes" or "no".
    #[arg(required = true, value_parser = parse_server_details)]
    pub servers: Vec<ServerDetails>,
}

fn parse_server_details(input: &str) -> Result<ServerDetails, String> {
    input.parse().map_err(|e: StressError| e.to_string())
}

impl Mode {
    pub fn flood(&self) -> &FloodArgs {
        match self {
            Mode::Connectflood(flood) | Mode::Chanflood { flood, .. } => flood,
        }
    }

    pub fn script_options(&self) -> ScriptOptions {
        let mode = match self {
            Mode::Connectflood(_) => FloodMode::Connect,
            Mode::Chanflood { chan, .. } => FloodMode::Channel {
                channel: chan.clone(),
            },
        };
        ScriptOptions {
            mode,
            wait: self.flood().wait,
        }
    }
}

impl FloodArgs {
    pub fn client_count(&self) -> usize {
        self.clients
    }

    /// One nick per client: from the nick list when given, `cli<i>` otherwise.
    pub fn nicks(&self) -> StressResult<Vec<String>> {
        let count = self.client_count();
        let Some(path) = &self.nicks else {
            return Ok((0..count).map(|i| format!("cli{i}")).collect());
        };

        let list = std::fs::read_to_string(path).map_err(|source| StressError::NickList {
            path: path.clone(),
            source,
        })?;
        let selector = match self.seed {
            Some(seed) => NickSelector::with_rng(parse_nick_list(&list), StdRng::seed_from_u64(seed)),
            None => NickSelector::from_list(&list),
        };
        let mut selector = selector.random_order(self.random_nicks);
        Ok((0..count).map(|_| selector.get_nick()).collect())
    }
}
