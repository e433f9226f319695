//! String commands.

use bytes::{Bytes, BytesMut};
use itertools::Itertools;
use num_traits::CheckedAdd;
use std::str::FromStr;

use crate::commands::keys::{expire_at, EXPIRY_OPTIONS};
use crate::commands::{parse_float, parse_int, CommandError, Registry};
use crate::dispatcher::Context;
use crate::frame::Frame;
use crate::grammar::{Args, Part};
use crate::store::{now_millis, Db};
use crate::utils::lcs::lcs;
use crate::value::Value;
use crate::zset::format_score;

/// Strings can't grow beyond 512MB.
const MAX_OFFSET: i64 = 536_870_911;

pub fn register(registry: &mut Registry) {
    let key = || Part::value("key");
    let key_value = || vec![Part::value("key"), Part::value("value")];

    registry.add("APPEND", key_value(), append);
    registry.add("DECR", vec![key()], decr);
    registry.add("DECRBY", vec![key(), Part::value("decrement")], decrby);
    registry.add("GET", vec![key()], get);
    registry.add("GETDEL", vec![key()], getdel);
    registry.add(
        "GETEX",
        vec![
            key(),
            Part::choice(vec![
                Part::option("EX", 1),
                Part::option("PX", 1),
                Part::option("EXAT", 1),
                Part::option("PXAT", 1),
                Part::flag("PERSIST"),
            ]),
        ],
        getex,
    );
    let range = || vec![Part::value("key"), Part::value("start"), Part::value("end")];
    registry.add("GETRANGE", range(), getrange);
    registry.add("SUBSTR", range(), getrange);
    registry.add("GETSET", key_value(), getset);
    registry.add("INCR", vec![key()], incr);
    registry.add("INCRBY", vec![key(), Part::value("increment")], incrby);
    registry.add(
        "INCRBYFLOAT",
        vec![key(), Part::value("increment")],
        incrbyfloat,
    );
    registry.add(
        "LCS",
        vec![Part::value("key1"), Part::value("key2"), Part::flag("LEN")],
        lcs_command,
    );
    registry.add("MGET", vec![Part::list(1)], mget);
    registry.add("MSET", vec![Part::list(2)], mset);
    registry.add("MSETNX", vec![Part::list(2)], msetnx);
    registry.add(
        "SET",
        vec![
            key(),
            Part::value("value"),
            Part::flags(&["NX", "XX"]),
            Part::flag("GET"),
            Part::choice(vec![
                Part::option("EX", 1),
                Part::option("PX", 1),
                Part::option("EXAT", 1),
                Part::option("PXAT", 1),
                Part::flag("KEEPTTL"),
            ]),
        ],
        set,
    );
    registry.add(
        "SETEX",
        vec![key(), Part::value("seconds"), Part::value("value")],
        setex,
    );
    registry.add(
        "PSETEX",
        vec![key(), Part::value("milliseconds"), Part::value("value")],
        setex,
    );
    registry.add("SETNX", key_value(), setnx);
    registry.add(
        "SETRANGE",
        vec![key(), Part::value("offset"), Part::value("value")],
        setrange,
    );
    registry.add("STRLEN", vec![key()], strlen);
}

fn string_bytes(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

/// The string at `key`; `None` when absent, WRONGTYPE for other types.
fn get_string(db: &mut Db, key: &str) -> Result<Option<Bytes>, CommandError> {
    db.get(key).map(|v| v.as_string().cloned()).transpose()
}

/// Ref: <https://redis.io/docs/latest/commands/get/>
fn get(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let value = get_string(ctx.db()?, args.value("key"))?;
    Ok(Frame::optional_bulk(value))
}

fn getdel(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    ctx.db()?.compute(args.value("key"), |slot| {
        let value = match slot {
            Some(value) => value.as_string()?.clone(),
            None => return Ok(Frame::Null),
        };
        *slot = None;
        Ok(Frame::Bulk(value))
    })
}

/// Get the value of key and optionally set its expiration.
///
/// Ref: <https://redis.io/docs/latest/commands/getex/>
fn getex(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let expiry = expiry_option(args, "getex")?;

    ctx.db()?.compute(args.value("key"), |slot| {
        let Some(value) = slot else {
            return Ok(Frame::Null);
        };
        let data = value.as_string()?.clone();

        if args.has("PERSIST") {
            value.expires_at = None;
        } else if let Some(at) = expiry {
            value.expires_at = Some(at);
        }

        Ok(Frame::Bulk(data))
    })
}

/// Returns the substring of the string value stored at key, determined by the offsets start and
/// end (both are inclusive). Negative offsets count from the end of the string.
///
/// Ref: <https://redis.io/docs/latest/commands/getrange/>
fn getrange(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let start: i64 = parse_int(args.value("start"))?;
    let end: i64 = parse_int(args.value("end"))?;

    let value = get_string(ctx.db()?, args.value("key"))?.unwrap_or_default();
    let len = value.len() as i64;

    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { (len + end).max(0) } else { end.min(len - 1) };

    if len == 0 || start > end || start >= len {
        return Ok(Frame::bulk(""));
    }

    Ok(Frame::Bulk(value.slice(start as usize..=end as usize)))
}

fn getset(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let new = string_bytes(args.value("value"));

    ctx.db()?.compute(args.value("key"), |slot| {
        let old = match slot {
            Some(value) => Some(value.as_string()?.clone()),
            None => None,
        };
        *slot = Some(Value::string(new));
        Ok(Frame::optional_bulk(old))
    })
}

fn append(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let suffix = args.value("value").as_bytes();

    ctx.db()?.compute(args.value("key"), |slot| {
        let value = slot.get_or_insert_with(|| Value::string(Bytes::new()));
        let current = value.as_string_mut()?;

        let mut appended = BytesMut::with_capacity(current.len() + suffix.len());
        appended.extend_from_slice(current);
        appended.extend_from_slice(suffix);
        *current = appended.freeze();

        Ok(Frame::Integer(current.len() as i64))
    })
}

/// Adds `delta` to the number stored at `key`, treating a missing key as zero. Any existing
/// expiry is kept.
fn incr_number<T>(db: &mut Db, key: &str, delta: T) -> crate::Result<T>
where
    T: CheckedAdd + FromStr + ToString + Default + Copy,
{
    db.compute(key, |slot| {
        let current = match slot {
            Some(value) => parse_number::<T>(value.as_string()?)?,
            None => T::default(),
        };
        let next = current.checked_add(&delta).ok_or(CommandError::Overflow)?;

        let expires_at = slot.as_ref().and_then(|v| v.expires_at);
        let mut value = Value::string(next.to_string());
        value.expires_at = expires_at;
        *slot = Some(value);

        Ok(next)
    })
}

fn parse_number<T: FromStr>(bytes: &Bytes) -> Result<T, CommandError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotInteger)
}

fn incr(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    incr_number(ctx.db()?, args.value("key"), 1i64).map(Frame::Integer)
}

fn decr(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    incr_number(ctx.db()?, args.value("key"), -1i64).map(Frame::Integer)
}

fn incrby(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let delta: i64 = parse_int(args.value("increment"))?;
    incr_number(ctx.db()?, args.value("key"), delta).map(Frame::Integer)
}

fn decrby(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let delta: i64 = parse_int(args.value("decrement"))?;
    let delta = delta.checked_neg().ok_or(CommandError::Overflow)?;
    incr_number(ctx.db()?, args.value("key"), delta).map(Frame::Integer)
}

/// Increment the string representing a floating point number stored at key by the specified
/// increment. If the key does not exist, it is set to 0 before performing the operation.
///
/// Ref: <https://redis.io/docs/latest/commands/incrbyfloat/>
fn incrbyfloat(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let delta = parse_float(args.value("increment"))?;

    ctx.db()?.compute(args.value("key"), |slot| {
        let current = match slot {
            Some(value) => std::str::from_utf8(value.as_string()?)
                .ok()
                .and_then(|s| parse_float(s).ok())
                .ok_or(CommandError::NotFloat)?,
            None => 0.0,
        };

        let next = current + delta;
        if !next.is_finite() {
            return Err(CommandError::Custom(
                "ERR increment would produce NaN or Infinity".to_string(),
            )
            .into());
        }

        let formatted = format_score(next);
        let expires_at = slot.as_ref().and_then(|v| v.expires_at);
        let mut value = Value::string(formatted.clone());
        value.expires_at = expires_at;
        *slot = Some(value);

        Ok(Frame::bulk(formatted))
    })
}

/// The LCS command implements the longest common subsequence algorithm.
///
/// Note that this is different than the longest common string algorithm, since matching
/// characters in the string does not need to be contiguous.
///
/// Ref: <https://redis.io/docs/latest/commands/lcs>
fn lcs_command(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let db = ctx.db()?;
    let a = get_string(db, args.value("key1"))?.unwrap_or_default();
    let b = get_string(db, args.value("key2"))?.unwrap_or_default();

    let common = lcs(&a, &b);

    if args.has("LEN") {
        Ok(Frame::Integer(common.len() as i64))
    } else {
        Ok(Frame::bulk(common))
    }
}

fn mget(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let db = ctx.db()?;

    let values = args
        .list()
        .iter()
        .map(|key| match db.get(key).map(Value::as_string) {
            Some(Ok(value)) => Frame::Bulk(value.clone()),
            _ => Frame::Null,
        })
        .collect();

    Ok(Frame::Array(values))
}

fn mset(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let db = ctx.db()?;

    for (key, value) in args.list().iter().tuples() {
        db.insert(key.clone(), Value::string(string_bytes(value)));
    }

    Ok(Frame::ok())
}

fn msetnx(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let db = ctx.db()?;

    if args.list().iter().step_by(2).any(|key| db.contains(key)) {
        return Ok(Frame::Integer(0));
    }

    for (key, value) in args.list().iter().tuples() {
        db.insert(key.clone(), Value::string(string_bytes(value)));
    }

    Ok(Frame::Integer(1))
}

/// The absolute expiry requested by an `EX`/`PX`/`EXAT`/`PXAT` option, if any.
fn expiry_option(args: &Args, command: &str) -> Result<Option<u64>, CommandError> {
    let now = now_millis();
    for option in EXPIRY_OPTIONS {
        if let Some(value) = args.option_value(option) {
            return expire_at(option, value, now, command).map(Some);
        }
    }
    Ok(None)
}

/// Set key to hold the string value. If key already holds a value, it is overwritten, regardless
/// of its type. Any previous time to live associated with the key is discarded unless KEEPTTL.
///
/// Ref: <https://redis.io/docs/latest/commands/set/>
fn set(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let expiry = expiry_option(args, "set")?;
    let data = string_bytes(args.value("value"));

    ctx.db()?.compute(args.value("key"), |slot| {
        let old = match slot {
            Some(value) if args.has("GET") => Some(value.as_string()?.clone()),
            _ => None,
        };

        let exists = slot.is_some();
        let skip = (args.has("NX") && exists) || (args.has("XX") && !exists);

        if !skip {
            let expires_at = if args.has("KEEPTTL") {
                slot.as_ref().and_then(|v| v.expires_at)
            } else {
                expiry
            };
            let mut value = Value::string(data);
            value.expires_at = expires_at;
            *slot = Some(value);
        }

        Ok(match (args.has("GET"), skip) {
            (true, _) => Frame::optional_bulk(old),
            (false, true) => Frame::Null,
            (false, false) => Frame::ok(),
        })
    })
}

fn setex(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let (option, amount) = match ctx.command {
        "PSETEX" => ("PX", args.value("milliseconds")),
        _ => ("EX", args.value("seconds")),
    };
    let command = ctx.command.to_lowercase();
    let expires_at = expire_at(option, amount, now_millis(), &command)?;

    let mut value = Value::string(string_bytes(args.value("value")));
    value.expires_at = Some(expires_at);
    ctx.db()?.insert(args.value("key").to_string(), value);

    Ok(Frame::ok())
}

fn setnx(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let db = ctx.db()?;
    let key = args.value("key");

    if db.contains(key) {
        return Ok(Frame::Integer(0));
    }

    db.insert(key.to_string(), Value::string(string_bytes(args.value("value"))));
    Ok(Frame::Integer(1))
}

/// Overwrites part of the string stored at key, starting at the specified offset, for the entire
/// length of value. The string is padded with zero bytes when the offset is past its end.
///
/// Ref: <https://redis.io/docs/latest/commands/setrange/>
fn setrange(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let offset: i64 = parse_int(args.value("offset"))?;
    if !(0..=MAX_OFFSET).contains(&offset) {
        return Err(CommandError::OutOfRange("offset is out of range".to_string()).into());
    }
    let offset = offset as usize;
    let patch = args.value("value").as_bytes();

    ctx.db()?.compute(args.value("key"), |slot| {
        let current = match slot {
            Some(value) => value.as_string()?.clone(),
            None if patch.is_empty() => return Ok(Frame::Integer(0)),
            None => Bytes::new(),
        };

        if patch.is_empty() {
            return Ok(Frame::Integer(current.len() as i64));
        }

        let new_len = offset + patch.len();
        let mut updated = vec![0u8; new_len.max(current.len())];
        updated[..current.len()].copy_from_slice(&current);
        updated[offset..new_len].copy_from_slice(patch);
        let len = updated.len();

        let expires_at = slot.as_ref().and_then(|v| v.expires_at);
        let mut value = Value::string(updated);
        value.expires_at = expires_at;
        *slot = Some(value);

        Ok(Frame::Integer(len as i64))
    })
}

fn strlen(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let value = get_string(ctx.db()?, args.value("key"))?;
    Ok(Frame::Integer(value.map_or(0, |v| v.len()) as i64))
}
