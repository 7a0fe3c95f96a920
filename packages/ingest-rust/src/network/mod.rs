//! Channel transport: configuration, lifecycle, handle, and socket tasks.

pub mod config;
pub mod connection;
pub mod state;
pub mod transport;

pub use config::*;
pub use connection::*;
pub use state::*;
pub use transport::{connect, start_channel};
