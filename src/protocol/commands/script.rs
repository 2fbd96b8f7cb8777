//! `system.script.*`: every command is handed to the movie's extension
//! handlers; the server itself never replies.

use crate::error::Result;
use crate::protocol::dispatcher::Dispatcher;

pub fn register(d: &Dispatcher) -> Result<()> {
    d.register_namespace("script", |ctx, msg| {
        ctx.movie.forward_to_extensions(ctx.user, msg);
        Ok(Vec::new())
    })
}
