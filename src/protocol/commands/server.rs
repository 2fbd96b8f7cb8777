//! `system.server.*`

use super::{count_value, string_list};
use crate::core::value::Value;
use crate::error::{CommandError, CommandResult, Result};
use crate::protocol::dispatcher::{CommandContext, Dispatcher};
use crate::protocol::message::Message;
use crate::service::mail::OutboundMail;

pub fn register(d: &Dispatcher) -> Result<()> {
    d.register("server.getVersion", |ctx, msg| {
        reply(ctx, msg, ctx.server.version_value())
    })?;
    d.register("server.getTime", |ctx, msg| {
        reply(ctx, msg, Value::String(ctx.server.clock().time_string()))
    })?;
    d.register("server.getUserCount", |ctx, msg| {
        reply(ctx, msg, count_value(ctx.server.user_count()))
    })?;
    d.register("server.getMovieCount", |ctx, msg| {
        reply(ctx, msg, count_value(ctx.server.movie_count()))
    })?;
    d.register("server.getMovies", |ctx, msg| {
        reply(ctx, msg, string_list(ctx.server.movie_names()))
    })?;
    d.register("server.restart", |ctx, msg| {
        ctx.server.schedule_shutdown(true);
        reply(ctx, msg, Value::from("ServerRestarted"))
    })?;
    // Same reply text as restart.
    d.register("server.shutdown", |ctx, msg| {
        ctx.server.schedule_shutdown(false);
        reply(ctx, msg, Value::from("ServerRestarted"))
    })?;
    d.register("server.disable", |ctx, msg| {
        ctx.server.set_enabled(false);
        reply(ctx, msg, Value::from("ServerDisabled"))
    })?;
    d.register("server.enable", |ctx, msg| {
        ctx.server.set_enabled(true);
        reply(ctx, msg, Value::from("ServerEnabled"))
    })?;
    d.register("server.disconnectAll", |ctx, msg| {
        // Queued ahead of the caller's own disconnect.
        ctx.user.send(ctx.reply_with(msg, Value::from("DisconnectAll")));
        ctx.server.disconnect_all();
        Ok(Vec::new())
    })?;
    d.register("server.sendEmail", send_email)?;
    Ok(())
}

fn reply(ctx: &CommandContext<'_>, msg: &Message, content: Value) -> CommandResult<Vec<Message>> {
    Ok(vec![ctx.reply_with(msg, content)])
}

/// Content: `[#sender, #recpt, #subject, #smtphost]` Strings and `#data`,
/// a List of body lines.
fn send_email(ctx: &CommandContext<'_>, msg: &Message) -> CommandResult<Vec<Message>> {
    let args = msg.content.as_prop_list().ok_or(CommandError::BadParameter)?;
    let text = |name: &str| match args.find(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(CommandError::BadParameter),
    };
    let body = match args.find("data") {
        Some(Value::List(lines)) => lines
            .iter()
            .map(|line| line.as_str().map_or_else(|| line.to_string(), str::to_string))
            .collect(),
        _ => return Err(CommandError::BadParameter),
    };

    let mail = OutboundMail {
        sender: text("sender")?,
        recipient: text("recpt")?,
        subject: text("subject")?,
        relay_host: text("smtphost")?,
        body,
    };
    ctx.server.mailer().submit(mail);
    reply(ctx, msg, Value::from("EmailAccepted"))
}
