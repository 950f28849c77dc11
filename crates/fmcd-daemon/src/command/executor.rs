//! Seams between the command channel and the game server connection.

use crate::rcon::RconError;

/// A live session that can run console commands.
pub trait CommandExecutor: Send {
    fn execute(&mut self, command: &str)
    -> impl Future<Output = Result<String, RconError>> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens fresh [`CommandExecutor`] sessions.
pub trait ExecutorConnector: Send + Sync + 'static {
    type Executor: CommandExecutor;

    fn connect(&self) -> impl Future<Output = Result<Self::Executor, RconError>> + Send;
}
