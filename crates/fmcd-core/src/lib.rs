//! `FactorioMCd` Core Library
//!
//! Shared functionality for the bridge daemon:
//! - Log line grammar (sentinel telemetry and chat lines)
//! - Translation rules between telemetry, chat, mission-control messages
//!   and RCON commands
//! - Configuration resolution
//! - Common error types

pub mod config;
pub mod error;
pub mod protocol;
pub mod tracing_init;

pub use config::{BridgeConfig, Secret};
pub use error::{Error, Result};
