//! `system.user.*`

use super::{count_value, string_list, string_targets};
use crate::core::proplist::PropList;
use crate::core::value::Value;
use crate::directory::user::User;
use crate::error::{CommandError, CommandResult, Result};
use crate::protocol::dispatcher::{CommandContext, Dispatcher};
use crate::protocol::error_code::ErrorCode;
use crate::protocol::message::Message;
use std::sync::Arc;

pub fn register(d: &Dispatcher) -> Result<()> {
    d.register("user.delete", |ctx, msg| {
        let targets = required_users(msg)?;
        ctx.user.send(ctx.echo(msg));
        for name in targets {
            if let Ok(user) = ctx.movie.find_user(&name) {
                ctx.server.disconnect_user(&user);
            }
        }
        Ok(Vec::new())
    })?;

    d.register("user.getAddress", |ctx, msg| {
        Ok(per_user(
            ctx,
            &required_users(msg)?,
            msg,
            |user| {
                PropList::new()
                    .with("userID", user.name())
                    .with("ipAddress", user.ip())
            },
            |name| {
                PropList::new()
                    .with("userID", name)
                    .with("ipAddress", "0.0.0.0")
            },
        ))
    })?;

    d.register("user.changeMovie", |ctx, msg| {
        // Only the first name counts.
        let target = required_users(msg)?.swap_remove(0);
        let outcome = ctx.server.change_user_movie(ctx.user, &target);
        let reply = ctx.reply_with(msg, Value::String(target));
        Ok(vec![match outcome {
            Ok(()) => reply,
            Err(e) => reply.with_error(e.code()),
        }])
    })?;

    d.register("user.getGroupCount", |ctx, msg| {
        Ok(per_user(
            ctx,
            &targets_or_self(ctx, msg),
            msg,
            |user| {
                PropList::new()
                    .with("userID", user.name())
                    .with("numberGroups", count_value(user.group_count()))
            },
            |name| PropList::new().with("userID", name).with("numberGroups", 0),
        ))
    })?;

    d.register("user.getGroups", |ctx, msg| {
        Ok(per_user(
            ctx,
            &targets_or_self(ctx, msg),
            msg,
            |user| {
                PropList::new()
                    .with("userID", user.name())
                    .with("groups", string_list(user.group_names()))
            },
            |name| {
                PropList::new()
                    .with("userID", name)
                    .with("groups", Value::List(Vec::new()))
            },
        ))
    })?;
    Ok(())
}

fn required_users(msg: &Message) -> CommandResult<Vec<String>> {
    let users = string_targets(&msg.content);
    if users.is_empty() {
        return Err(CommandError::BadParameter);
    }
    Ok(users)
}

fn targets_or_self(ctx: &CommandContext<'_>, msg: &Message) -> Vec<String> {
    let users = string_targets(&msg.content);
    if users.is_empty() {
        vec![ctx.user.name().to_string()]
    } else {
        users
    }
}

/// One reply per user name; unknown users get the `missing` content and
/// `InvalidUserId`.
fn per_user<F, M>(
    ctx: &CommandContext<'_>,
    names: &[String],
    msg: &Message,
    found: F,
    missing: M,
) -> Vec<Message>
where
    F: Fn(&Arc<User>) -> PropList,
    M: Fn(&str) -> PropList,
{
    names
        .iter()
        .map(|name| match ctx.movie.find_user(name) {
            Ok(user) => ctx.reply_with(msg, found(&user).into()),
            Err(_) => ctx
                .reply_with(msg, missing(name.as_str()).into())
                .with_error(ErrorCode::InvalidUserId),
        })
        .collect()
}
