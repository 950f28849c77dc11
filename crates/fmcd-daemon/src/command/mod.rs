//! Command channel: serialized delivery of console commands to the game
//! server over a lazily (re)connected executor session.

pub mod channel;
pub mod executor;

pub use channel::{ANNOUNCE_COMMAND, CommandChannel, CommandSettings, CommandState};
pub use executor::{CommandExecutor, ExecutorConnector};
