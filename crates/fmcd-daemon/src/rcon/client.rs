//! RCON client connection.

use std::time::Duration;

use fmcd_core::Secret;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::error::RconError;
use super::packet::{
    Packet, SERVERDATA_AUTH, SERVERDATA_AUTH_RESPONSE, SERVERDATA_EXECCOMMAND,
    SERVERDATA_RESPONSE_VALUE,
};
use crate::command::{CommandExecutor, ExecutorConnector};

/// An authenticated RCON session.
#[derive(Debug)]
pub struct RconClient {
    stream: TcpStream,
    next_id: i32,
    io_timeout: Duration,
}

impl RconClient {
    /// Connect to `addr` and authenticate with `password`.
    pub async fn connect(
        addr: &str,
        password: &Secret,
        io_timeout: Duration,
    ) -> Result<Self, RconError> {
        let stream = timeout(io_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| RconError::Timeout(io_timeout))?
            .map_err(|e| RconError::Connection(format!("{addr}: {e}")))?;
        let mut client = Self {
            stream,
            next_id: 1,
            io_timeout,
        };
        timeout(io_timeout, client.authenticate(password))
            .await
            .map_err(|_| RconError::Timeout(io_timeout))??;
        debug!(addr, "RCON session authenticated");
        Ok(client)
    }

    async fn authenticate(&mut self, password: &Secret) -> Result<(), RconError> {
        let id = self.allocate_id();
        Packet::new(id, SERVERDATA_AUTH, password.expose())
            .write_to(&mut self.stream)
            .await?;
        loop {
            let reply = Packet::read_from(&mut self.stream).await?;
            // Servers may send an empty RESPONSE_VALUE ahead of the verdict.
            if reply.kind != SERVERDATA_AUTH_RESPONSE {
                continue;
            }
            if reply.id == -1 {
                return Err(RconError::Auth);
            }
            if reply.id == id {
                return Ok(());
            }
            return Err(RconError::Protocol(format!(
                "auth reply for unexpected id {}",
                reply.id
            )));
        }
    }

    /// Run one console command and return the server's reply.
    pub async fn exec(&mut self, command: &str) -> Result<String, RconError> {
        let io_timeout = self.io_timeout;
        timeout(io_timeout, self.round_trip(command))
            .await
            .map_err(|_| RconError::Timeout(io_timeout))?
    }

    async fn round_trip(&mut self, command: &str) -> Result<String, RconError> {
        let id = self.allocate_id();
        Packet::new(id, SERVERDATA_EXECCOMMAND, command)
            .write_to(&mut self.stream)
            .await?;
        loop {
            let reply = Packet::read_from(&mut self.stream).await?;
            if reply.id == id && reply.kind == SERVERDATA_RESPONSE_VALUE {
                return Ok(reply.body);
            }
            debug!(id = reply.id, kind = reply.kind, "Skipping unrelated RCON packet");
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }

    const fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = if id == i32::MAX { 1 } else { id + 1 };
        id
    }
}

impl CommandExecutor for RconClient {
    async fn execute(&mut self, command: &str) -> Result<String, RconError> {
        self.exec(command).await
    }

    async fn close(self) {
        Self::close(self).await;
    }
}

/// Opens [`RconClient`] sessions for the command channel.
#[derive(Debug, Clone)]
pub struct RconConnector {
    addr: String,
    password: Secret,
    io_timeout: Duration,
}

impl RconConnector {
    pub const fn new(addr: String, password: Secret, io_timeout: Duration) -> Self {
        Self {
            addr,
            password,
            io_timeout,
        }
    }
}

impl ExecutorConnector for RconConnector {
    type Executor = RconClient;

    async fn connect(&self) -> Result<RconClient, RconError> {
        RconClient::connect(&self.addr, &self.password, self.io_timeout).await
    }
}
