//! `system.group.*`
//!
//! Attribute commands take a PropList naming the groups under `#group`
//! and report per group inside one reply. The remaining commands (except
//! `createUniqueName`) need at least one group name.

use super::{count_value, name_targets, string_list, string_targets};
use crate::core::proplist::PropList;
use crate::core::value::Value;
use crate::directory::group::Group;
use crate::error::{CommandError, CommandResult, Result};
use crate::protocol::dispatcher::{CommandContext, Dispatcher};
use crate::protocol::error_code::ErrorCode;
use crate::protocol::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeOp {
    Set,
    Get,
    Names,
    Delete,
}

pub fn register(d: &Dispatcher) -> Result<()> {
    d.register("group.setAttribute", |ctx, msg| attributes(ctx, msg, AttributeOp::Set))?;
    d.register("group.getAttribute", |ctx, msg| attributes(ctx, msg, AttributeOp::Get))?;
    d.register("group.getAttributeNames", |ctx, msg| {
        attributes(ctx, msg, AttributeOp::Names)
    })?;
    d.register("group.deleteAttribute", |ctx, msg| {
        attributes(ctx, msg, AttributeOp::Delete)
    })?;

    d.register("group.createUniqueName", |ctx, msg| {
        Ok(vec![ctx.reply_with(msg, Value::String(ctx.movie.create_unique_name()))])
    })?;

    d.register("group.enable", |ctx, msg| {
        for name in required_groups(msg)? {
            ctx.movie.enable_group(&name);
        }
        Ok(vec![ctx.echo(msg)])
    })?;
    d.register("group.disable", |ctx, msg| {
        for name in required_groups(msg)? {
            ctx.movie.disable_group(&name);
        }
        Ok(vec![ctx.echo(msg)])
    })?;
    d.register("group.delete", |ctx, msg| {
        for name in required_groups(msg)? {
            ctx.movie.delete_group(&name);
        }
        Ok(vec![ctx.echo(msg)])
    })?;

    d.register("group.getUsers", |ctx, msg| {
        let replies = required_groups(msg)?
            .iter()
            .map(|name| {
                let base = ctx.reply(msg);
                match ctx.movie.find_group(name) {
                    Ok(group) => Message {
                        content: PropList::new()
                            .with("groupName", group.name())
                            .with("groupMembers", string_list(group.member_names()))
                            .into(),
                        ..base
                    },
                    Err(e) => {
                        let empty = Message {
                            content: PropList::new()
                                .with("groupName", name.as_str())
                                .with("groupMembers", Value::List(Vec::new()))
                                .into(),
                            ..base
                        };
                        // An unknown group is an empty result, not an error.
                        if e == CommandError::GroupNotFound {
                            empty
                        } else {
                            empty.with_error(e.code())
                        }
                    }
                }
            })
            .collect();
        Ok(replies)
    })?;
    d.register("group.getUserCount", |ctx, msg| {
        let replies = required_groups(msg)?
            .iter()
            .map(|name| {
                let base = ctx.reply(msg);
                match ctx.movie.find_group(name) {
                    Ok(group) => Message {
                        content: PropList::new()
                            .with("groupName", group.name())
                            .with("numberMembers", count_value(group.member_count()))
                            .into(),
                        ..base
                    },
                    Err(CommandError::GroupNotFound) => Message {
                        content: PropList::new()
                            .with("groupName", name.as_str())
                            .with("numberMembers", 0)
                            .into(),
                        ..base
                    },
                    Err(e) => Message {
                        content: PropList::new().with("groupName", name.as_str()).into(),
                        ..base
                    }
                    .with_error(e.code()),
                }
            })
            .collect();
        Ok(replies)
    })?;

    d.register("group.join", |ctx, msg| {
        membership(ctx, msg, |name| ctx.movie.join_group(ctx.user, name).map(|_| ()))
    })?;
    d.register("group.leave", |ctx, msg| {
        membership(ctx, msg, |name| ctx.movie.leave_group(ctx.user, name))
    })?;
    Ok(())
}

fn required_groups(msg: &Message) -> CommandResult<Vec<String>> {
    let groups = string_targets(&msg.content);
    if groups.is_empty() {
        return Err(CommandError::BadParameter);
    }
    Ok(groups)
}

/// One reply per group, carrying the group name and the outcome's code.
fn membership<F>(ctx: &CommandContext<'_>, msg: &Message, op: F) -> CommandResult<Vec<Message>>
where
    F: Fn(&str) -> CommandResult<()>,
{
    Ok(required_groups(msg)?
        .into_iter()
        .map(|name| {
            let outcome = op(&name);
            let reply = ctx.reply_with(msg, Value::String(name));
            match outcome {
                Ok(()) => reply,
                Err(e) => reply.with_error(e.code()),
            }
        })
        .collect())
}

fn attributes(ctx: &CommandContext<'_>, msg: &Message, op: AttributeOp) -> CommandResult<Vec<Message>> {
    let args = msg.content.as_prop_list().ok_or(CommandError::BadParameter)?;
    let groups = name_targets(args.find("group").ok_or(CommandError::BadParameter)?);

    let mut reply = ctx.reply(msg);
    let mut results = PropList::new();
    for name in groups {
        let outcome = ctx
            .movie
            .find_group(&name)
            .and_then(|group| apply_attributes(ctx, &group, args, op));
        match outcome {
            Ok(value) => results.push(Value::String(name), value),
            Err(CommandError::BadParameter) => return Err(CommandError::BadParameter),
            Err(_) => {
                reply.error_code = ErrorCode::MessageContainsErrorInfo.code();
                results.push(
                    Value::String(name),
                    PropList::new()
                        .with("errorCode", ErrorCode::InvalidGroupName.code())
                        .into(),
                );
            }
        }
    }
    if !results.is_empty() {
        reply.content = results.into();
    }
    Ok(vec![reply])
}

fn apply_attributes(
    ctx: &CommandContext<'_>,
    group: &Group,
    args: &PropList,
    op: AttributeOp,
) -> CommandResult<Value> {
    let stamp = || -> Value {
        PropList::new()
            .with("lastUpdateTime", ctx.server.timestamp())
            .into()
    };
    match op {
        AttributeOp::Set => {
            let attrs = args
                .find("attribute")
                .and_then(Value::as_prop_list)
                .ok_or(CommandError::BadParameter)?;
            group.set_attributes(attrs)?;
            Ok(stamp())
        }
        AttributeOp::Get => {
            let names = attribute_names(args)?;
            Ok(group.get_attributes(&names).into())
        }
        AttributeOp::Names => Ok(Value::List(group.attribute_names())),
        AttributeOp::Delete => {
            let names = attribute_names(args)?;
            group.delete_attributes(&names);
            Ok(stamp())
        }
    }
}

/// `#attribute` as a Symbol, a String or a List of them.
fn attribute_names(args: &PropList) -> CommandResult<Vec<String>> {
    let names = name_targets(args.find("attribute").ok_or(CommandError::BadParameter)?);
    if names.is_empty() {
        return Err(CommandError::BadParameter);
    }
    Ok(names)
}
