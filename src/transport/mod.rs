//! # Transport
//!
//! TCP listener that spawns one session per connection and shuts down
//! gracefully on CTRL+C or a server shutdown event.

pub mod tcp;
