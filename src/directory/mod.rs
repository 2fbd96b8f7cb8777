//! # Directory
//!
//! The live state of the server: movies, their groups and their users.
//!
//! ## Ownership
//! - [`Server`](server::Server) owns the movie map
//! - [`Movie`](movie::Movie) owns its user and group maps
//! - [`Group`](group::Group) holds shared handles to its members
//!
//! Every map is a concurrent map owned by its natural parent, so unrelated
//! movies never share a lock.

pub mod group;
pub mod movie;
pub mod server;
pub mod user;

pub use group::Group;
pub use movie::{Movie, MovieState};
pub use server::{Server, ServerBuilder, ServerEvent};
pub use user::User;
