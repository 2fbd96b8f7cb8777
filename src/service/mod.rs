//! # Services
//!
//! Per-connection session handling and the collaborators the server
//! consults: credential lookup at logon and outbound mail hand-off.

pub mod auth;
pub mod mail;
pub mod session;
