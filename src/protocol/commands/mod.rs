//! # System Commands
//!
//! Handlers for the `system.<namespace>.<command>` surface, one module per
//! namespace.
//!
//! ## Namespaces
//! - **server**: version, time, counts, restart/shutdown, enable/disable,
//!   disconnect all, outbound email
//! - **movie**: enable/disable/delete, group and user listings, extension
//!   handler control
//! - **group**: attributes, membership, enable/disable/delete
//! - **user**: delete, address lookup, movie transfer, group listings
//! - **script**: forwards the message to the movie's extension handlers
//!
//! Most commands take their targets as a String or a List of Strings;
//! anything else in the content is ignored.

pub mod group;
pub mod movie;
pub mod script;
pub mod server;
pub mod user;

use crate::core::value::Value;
use crate::error::Result;
use crate::protocol::dispatcher::Dispatcher;

pub fn register_all(dispatcher: &Dispatcher) -> Result<()> {
    server::register(dispatcher)?;
    movie::register(dispatcher)?;
    group::register(dispatcher)?;
    user::register(dispatcher)?;
    script::register(dispatcher)?;
    Ok(())
}

/// Every String in `content`, flattening nested Lists.
///
/// Elements of any other type are skipped rather than refused, so
/// `["@a", 5]` targets `@a` alone and a list with no strings counts as no
/// target at all. Clients send mixed lists and expect the strings to apply.
pub(crate) fn string_targets(content: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect(content, &mut out, false);
    out
}

/// Like [`string_targets`], Symbols included.
pub(crate) fn name_targets(content: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect(content, &mut out, true);
    out
}

fn collect(value: &Value, out: &mut Vec<String>, symbols: bool) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Symbol(s) if symbols => out.push(s.clone()),
        Value::List(items) => {
            for item in items {
                collect(item, out, symbols);
            }
        }
        _ => {}
    }
}

/// List of Strings.
pub(crate) fn string_list<I, S>(items: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
}

pub(crate) fn count_value(n: usize) -> Value {
    Value::Integer(i32::try_from(n).unwrap_or(i32::MAX))
}
