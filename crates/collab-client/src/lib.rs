//! collab-client library
//!
//! Thin library layer exposing the client components for the binary and
//! for integration testing.

pub mod commands;
pub mod config;
pub mod connection;
pub mod transport;

pub use commands::{Command, CommandError, execute};
pub use config::ClientConfig;
pub use connection::{Connection, ConnectionError, INITIAL_COMMIT};
pub use transport::{HttpTransport, Transport, TransportError};

/// Text inserted and committed after loading when seeding is enabled.
pub const WELCOME_TEXT: &str = "Type something, and then commit it.";
