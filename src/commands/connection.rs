//! Commands about the calling connection itself.

use itertools::Itertools;

use crate::commands::keys::parse_db;
use crate::commands::{CommandError, Registry};
use crate::dispatcher::Context;
use crate::frame::Frame;
use crate::grammar::{Args, Part};

pub fn register(registry: &mut Registry) {
    registry.add("PING", vec![Part::anonymous("message")], ping);
    registry.add("ECHO", vec![Part::value("message")], echo);
    registry.add("SELECT", vec![Part::value("index")], select);
    registry.add("QUIT", vec![], quit);
    registry.add("RESET", vec![], reset);
    registry.add("CLIENT ID", vec![], client_id);
    registry.add("CLIENT GETNAME", vec![], client_getname);
    registry.add(
        "CLIENT SETNAME",
        vec![Part::value("connection-name")],
        client_setname,
    );
    registry.add("CLIENT SETINFO", vec![Part::list(2)], client_setinfo);
    registry.add("CLIENT LIST", vec![Part::rest()], client_list);
    registry.add("CLIENT INFO", vec![], client_info);
}

/// Returns PONG if no argument is provided, otherwise return a copy of the argument as a bulk.
///
/// Ref: <https://redis.io/docs/latest/commands/ping>
fn ping(_ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    Ok(match args.anonymous() {
        Some(message) => Frame::bulk(message.to_string()),
        None => Frame::Simple("PONG".to_string()),
    })
}

fn echo(_ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    Ok(Frame::bulk(args.value("message").to_string()))
}

/// Select the logical database having the specified zero-based numeric index. New connections
/// always use the database 0.
///
/// Ref: <https://redis.io/docs/latest/commands/select>
fn select(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let index = parse_db(args.value("index"))?;
    ctx.clients.select(ctx.client, index);

    Ok(Frame::ok())
}

/// Replies OK. Closing the connection afterwards is up to the server loop.
fn quit(_ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    Ok(Frame::ok())
}

/// Brings the connection back to its initial state: database 0 and no name.
fn reset(ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    ctx.clients.reset(ctx.client);
    Ok(Frame::Simple("RESET".to_string()))
}

fn client_id(ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    let id = ctx.clients.get(ctx.client).map_or(0, |client| client.id);
    Ok(Frame::Integer(id as i64))
}

fn client_getname(ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    let name = ctx.clients.get(ctx.client).and_then(|client| client.name);
    Ok(Frame::optional_bulk(name))
}

/// Names the connection. An empty name removes it.
///
/// Ref: <https://redis.io/docs/latest/commands/client-setname>
fn client_setname(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let name = args.value("connection-name");

    if name.chars().any(|c| c.is_whitespace() || !c.is_ascii_graphic()) {
        return Err(CommandError::Custom(
            "ERR Client names cannot contain spaces, newlines or special characters.".to_string(),
        )
        .into());
    }

    let name = (!name.is_empty()).then(|| name.to_string());
    ctx.clients.set_name(ctx.client, name);

    Ok(Frame::ok())
}

/// Client libraries announce themselves with it on connect. The attributes are not kept.
fn client_setinfo(_ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    Ok(Frame::ok())
}

fn client_list(ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    let list = ctx
        .clients
        .list()
        .iter()
        .map(|client| format!("{}\n", client.info()))
        .join("");

    Ok(Frame::bulk(list))
}

fn client_info(ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    let info = ctx
        .clients
        .get(ctx.client)
        .map(|client| format!("{}\n", client.info()))
        .unwrap_or_default();

    Ok(Frame::bulk(info))
}
