//! # multiuser-server
//!
//! Core of a real-time multiuser messaging server. Clients connect over
//! TCP, log on to a *movie* (an isolated application namespace), join
//! *groups* inside it and exchange typed binary messages with users,
//! groups and the server's command surface.
//!
//! ## Layers
//! - [`core`]: typed values, frame header and the stream codecs
//! - [`protocol`]: message envelope, addressing, routing, system commands
//! - [`directory`]: concurrent server/movie/group/user state
//! - [`extension`]: pluggable per-movie handlers
//! - [`service`]: per-connection sessions, credentials, mail hand-off
//! - [`transport`]: TCP listener with graceful shutdown
//!
//! ## Example
//! ```no_run
//! use multiuser_server::config::ServerSettings;
//! use multiuser_server::directory::Server;
//! use multiuser_server::transport::tcp;
//!
//! # async fn run() -> multiuser_server::error::Result<()> {
//! let settings = ServerSettings::from_env()?;
//! let server = Server::new(settings)?;
//! let reason = tcp::start_server(server).await?;
//! println!("stopped: {reason:?}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod directory;
pub mod error;
pub mod extension;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::{PropList, Value};
pub use crate::directory::{Server, ServerBuilder};
pub use crate::error::{CommandError, ProtocolError, Result};
pub use crate::protocol::{ErrorCode, Message};
