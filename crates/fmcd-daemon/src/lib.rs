//! `FactorioMCd` Daemon Library
//!
//! The bridge between a Factorio server and mission control:
//! - Log tailer classifying console output into telemetry and chat
//! - RCON command channel with transparent reconnection
//! - Mission-control WebSocket channel with auth handshake and reconnection
//! - Dispatcher translating between the three
//! - Supervisor owning the task lifecycle

pub mod command;
pub mod control;
pub mod dispatcher;
pub mod rcon;
pub mod reconnect;
pub mod shutdown;
pub mod supervisor;
pub mod tailer;
