//! Source RCON client used to run console commands on the game server.

pub mod client;
pub mod error;
pub mod packet;

pub use client::{RconClient, RconConnector};
pub use error::RconError;
