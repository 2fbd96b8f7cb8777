//! `system.movie.*`
//!
//! `enable`, `disable` and `delete` need at least one movie name and echo
//! the caller's message. The listing commands default to the caller's
//! movie and reply once per target. Handler commands (`*Script`) act on
//! the caller's movie unless noted.

use super::{count_value, string_list, string_targets};
use crate::core::proplist::PropList;
use crate::core::value::Value;
use crate::directory::movie::Movie;
use crate::error::{CommandError, CommandResult, Result};
use crate::protocol::dispatcher::{CommandContext, Dispatcher};
use crate::protocol::error_code::ErrorCode;
use crate::protocol::message::Message;
use std::sync::Arc;

pub fn register(d: &Dispatcher) -> Result<()> {
    d.register("movie.enable", |ctx, msg| {
        for name in required_targets(msg)? {
            ctx.server.enable_movie(&name);
        }
        Ok(vec![ctx.echo(msg)])
    })?;
    d.register("movie.disable", |ctx, msg| {
        for name in required_targets(msg)? {
            ctx.server.disable_movie(&name);
        }
        Ok(vec![ctx.echo(msg)])
    })?;
    d.register("movie.delete", |ctx, msg| {
        let targets = required_targets(msg)?;
        // Echo before the caller may lose its own connection.
        ctx.user.send(ctx.echo(msg));
        for name in targets {
            // Unknown movies are skipped.
            let _ = ctx.server.delete_movie(&name);
        }
        Ok(Vec::new())
    })?;

    d.register("movie.getGroupCount", |ctx, msg| {
        Ok(per_movie(ctx, msg, |movie| {
            Ok(PropList::new()
                .with("movieID", movie.name())
                .with("numberGroups", count_value(movie.group_count()))
                .into())
        }, |name| {
            (
                ErrorCode::InvalidMovieId,
                PropList::new()
                    .with("movieID", name)
                    .with("numberGroups", 0)
                    .into(),
            )
        }))
    })?;
    d.register("movie.getGroups", |ctx, msg| {
        Ok(per_movie(ctx, msg, |movie| {
            Ok(PropList::new()
                .with("movieID", movie.name())
                .with("groups", string_list(movie.group_names()))
                .into())
        }, |name| {
            (
                ErrorCode::BadParameter,
                PropList::new()
                    .with("movieID", name)
                    .with("groups", Value::List(Vec::new()))
                    .into(),
            )
        }))
    })?;
    d.register("movie.getUserCount", |ctx, msg| {
        Ok(per_movie(ctx, msg, |movie| {
            Ok(PropList::new()
                .with("movieID", movie.name())
                .with("numberMembers", count_value(movie.user_count()))
                .into())
        }, |name| {
            (
                ErrorCode::BadParameter,
                PropList::new()
                    .with("movieID", name)
                    .with("numberMembers", 0)
                    .into(),
            )
        }))
    })?;

    d.register("movie.getScriptCount", |ctx, msg| {
        Ok(per_movie(ctx, msg, |movie| Ok(count_value(movie.extension_count())), |name| {
            (
                ErrorCode::InvalidMovieId,
                PropList::new()
                    .with("movieID", name)
                    .with("numberScripts", 0)
                    .into(),
            )
        }))
    })?;
    d.register("movie.reloadAllScripts", |ctx, msg| {
        Ok(per_movie(ctx, msg, |movie| {
            movie.reload_all_extensions(ctx.server.extensions());
            Ok(Value::Void)
        }, |name| {
            (
                ErrorCode::InvalidMovieId,
                PropList::new().with("movieID", name).into(),
            )
        }))
    })?;
    d.register("movie.reloadScript", |ctx, msg| {
        Ok(per_handler(ctx, msg, |movie, name| {
            movie.reload_extension(name, ctx.server.extensions())
        }))
    })?;
    d.register("movie.deleteScript", |ctx, msg| {
        Ok(per_handler(ctx, msg, |movie, name| {
            movie.delete_extension(name, ctx.server.extensions())
        }))
    })?;
    Ok(())
}

fn required_targets(msg: &Message) -> CommandResult<Vec<String>> {
    let targets = string_targets(&msg.content);
    if targets.is_empty() {
        return Err(CommandError::BadParameter);
    }
    Ok(targets)
}

/// Named movies, or the caller's own.
fn targets_or_own(ctx: &CommandContext<'_>, msg: &Message) -> Vec<String> {
    let targets = string_targets(&msg.content);
    if targets.is_empty() {
        vec![ctx.movie.name().to_string()]
    } else {
        targets
    }
}

/// One reply per target movie: `found` builds the content for a live
/// movie, `missing` the error code and content for an unknown one.
fn per_movie<F, M>(ctx: &CommandContext<'_>, msg: &Message, found: F, missing: M) -> Vec<Message>
where
    F: Fn(&Arc<Movie>) -> CommandResult<Value>,
    M: Fn(&str) -> (ErrorCode, Value),
{
    targets_or_own(ctx, msg)
        .iter()
        .map(|name| {
            match ctx.server.find_movie(name).and_then(|movie| found(&movie)) {
                Ok(content) => ctx.reply_with(msg, content),
                Err(_) => {
                    let (code, content) = missing(name.as_str());
                    ctx.reply_with(msg, content).with_error(code)
                }
            }
        })
        .collect()
}

/// One reply per handler name, each carrying the name; failures are
/// flagged with `InvalidMovieId`.
fn per_handler<F>(ctx: &CommandContext<'_>, msg: &Message, op: F) -> Vec<Message>
where
    F: Fn(&Movie, &str) -> bool,
{
    string_targets(&msg.content)
        .iter()
        .map(|name| {
            let reply = ctx.reply_with(msg, Value::String(name.clone()));
            if op(ctx.movie.as_ref(), name.as_str()) {
                reply
            } else {
                reply.with_error(ErrorCode::InvalidMovieId)
            }
        })
        .collect()
}
