pub mod barrier;
pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod message;
pub mod nicks;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod server;
pub mod socket;
pub mod transport;
