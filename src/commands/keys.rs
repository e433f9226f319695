//! Generic keyspace commands: existence, deletion, renaming and expiry.

use glob_match::glob_match;
use rand::seq::IteratorRandom;

use crate::commands::{parse_int, CommandError, Registry};
use crate::dispatcher::Context;
use crate::frame::Frame;
use crate::grammar::{Args, Part};
use crate::store::{now_millis, DATABASES};

pub(crate) const EXPIRY_OPTIONS: [&str; 4] = ["EX", "PX", "EXAT", "PXAT"];

pub fn register(registry: &mut Registry) {
    let key = || Part::value("key");
    let expire = || {
        vec![
            Part::value("key"),
            Part::value("time"),
            Part::flags(&["NX", "XX", "GT", "LT"]),
        ]
    };

    registry.add(
        "COPY",
        vec![
            Part::value("source"),
            Part::value("destination"),
            Part::option("DB", 1),
            Part::flag("REPLACE"),
        ],
        copy,
    );
    registry.add("DEL", vec![Part::list(1)], del);
    registry.add("UNLINK", vec![Part::list(1)], del);
    registry.add("EXISTS", vec![Part::list(1)], exists);
    registry.add("TOUCH", vec![Part::list(1)], exists);
    registry.add("EXPIRE", expire(), expire_command);
    registry.add("PEXPIRE", expire(), expire_command);
    registry.add("EXPIREAT", expire(), expire_command);
    registry.add("PEXPIREAT", expire(), expire_command);
    registry.add("EXPIRETIME", vec![key()], expiretime);
    registry.add("PEXPIRETIME", vec![key()], expiretime);
    registry.add("TTL", vec![key()], ttl);
    registry.add("PTTL", vec![key()], ttl);
    registry.add("PERSIST", vec![key()], persist);
    registry.add("KEYS", vec![Part::value("pattern")], keys);
    registry.add("MOVE", vec![key(), Part::value("db")], move_key);
    registry.add("RANDOMKEY", vec![], randomkey);
    registry.add(
        "RENAME",
        vec![Part::value("key"), Part::value("newkey")],
        rename,
    );
    registry.add(
        "RENAMENX",
        vec![Part::value("key"), Part::value("newkey")],
        rename,
    );
    registry.add("TYPE", vec![key()], type_command);
}

/// Resolves an `EX`/`PX`/`EXAT`/`PXAT` amount into an absolute expiry in epoch milliseconds.
/// Only positive amounts are valid.
pub(crate) fn expire_at(
    option: &str,
    amount: &str,
    now: u64,
    command: &str,
) -> Result<u64, CommandError> {
    let amount: i64 = parse_int(amount)?;
    let invalid = || CommandError::InvalidExpireTime(command.to_string());

    if amount <= 0 {
        return Err(invalid());
    }

    let millis = match option {
        "EX" | "EXAT" => amount.checked_mul(1000).ok_or_else(invalid)?,
        _ => amount,
    };
    let at = match option {
        "EX" | "PX" => (now as i64).checked_add(millis).ok_or_else(invalid)?,
        _ => millis,
    };

    Ok(at as u64)
}

fn del(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let db = ctx.db()?;
    let removed = args
        .list()
        .iter()
        .filter(|key| db.remove(key).is_some())
        .count();

    Ok(Frame::Integer(removed as i64))
}

/// Counts existing keys; a key given twice counts twice.
fn exists(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let db = ctx.db()?;
    let count = args.list().iter().filter(|key| db.contains(key)).count();

    Ok(Frame::Integer(count as i64))
}

/// Set a timeout on key. After the timeout has expired, the key will automatically be deleted.
///
/// Serves EXPIRE, PEXPIRE, EXPIREAT and PEXPIREAT. A time in the past deletes the key right away.
///
/// Ref: <https://redis.io/docs/latest/commands/expire/>
fn expire_command(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let (unit, absolute) = match ctx.command {
        "PEXPIRE" => (1, false),
        "EXPIREAT" => (1000, true),
        "PEXPIREAT" => (1, true),
        _ => (1000, false),
    };
    let command = ctx.command;
    let invalid = || CommandError::InvalidExpireTime(command.to_lowercase());

    let amount: i64 = parse_int(args.value("time"))?;
    let now = now_millis() as i64;
    let millis = amount.checked_mul(unit).ok_or_else(invalid)?;
    let at = if absolute {
        millis
    } else {
        now.checked_add(millis).ok_or_else(invalid)?
    };

    ctx.db()?.compute(args.value("key"), |slot| {
        let Some(value) = slot else {
            return Ok(Frame::Integer(0));
        };

        let current = value.expires_at.map(|c| c as i64);
        let allowed = if args.has("NX") {
            current.is_none()
        } else if args.has("XX") {
            current.is_some()
        } else if args.has("GT") {
            current.is_some_and(|c| at > c)
        } else if args.has("LT") {
            current.map_or(true, |c| at < c)
        } else {
            true
        };

        if !allowed {
            return Ok(Frame::Integer(0));
        }

        if at <= now {
            *slot = None;
        } else {
            value.expires_at = Some(at as u64);
        }

        Ok(Frame::Integer(1))
    })
}

fn expiretime(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let millis = ctx.command == "PEXPIRETIME";

    let res = match ctx.db()?.get(args.value("key")) {
        None => -2,
        Some(value) => match value.expires_at {
            None => -1,
            Some(at) if millis => at as i64,
            Some(at) => (at / 1000) as i64,
        },
    };

    Ok(Frame::Integer(res))
}

/// Returns the remaining time to live of a key that has a timeout: -2 when the key does not
/// exist, -1 when it has no associated expire.
///
/// Ref: <https://redis.io/docs/latest/commands/ttl/>
fn ttl(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let millis = ctx.command == "PTTL";
    let now = now_millis();

    let res = match ctx.db()?.get(args.value("key")) {
        None => -2,
        Some(value) => match value.expires_at {
            None => -1,
            Some(at) => {
                let remaining = at.saturating_sub(now) as i64;
                if millis {
                    remaining
                } else {
                    (remaining + 500) / 1000
                }
            }
        },
    };

    Ok(Frame::Integer(res))
}

fn persist(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let removed = ctx
        .db()?
        .get_mut(args.value("key"))
        .and_then(|value| value.expires_at.take())
        .is_some();

    Ok(Frame::Integer(removed as i64))
}

/// Returns all keys matching pattern.
///
/// Ref: <https://redis.io/docs/latest/commands/keys/>
fn keys(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let pattern = args.value("pattern");

    let mut matches: Vec<String> = ctx
        .db()?
        .keys()
        .into_iter()
        .filter(|key| glob_match(pattern, key))
        .collect();
    matches.sort();

    Ok(Frame::bulk_array(matches))
}

pub(crate) fn parse_db(s: &str) -> Result<usize, CommandError> {
    let index: i64 = parse_int(s)?;
    usize::try_from(index)
        .ok()
        .filter(|i| *i < DATABASES)
        .ok_or(CommandError::InvalidDbIndex)
}

fn same_object() -> CommandError {
    CommandError::Custom("ERR source and destination objects are the same".to_string())
}

/// Moves a key to another database, unless it already exists there.
fn move_key(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let target = parse_db(args.value("db"))?;
    if target == ctx.db_index {
        return Err(same_object().into());
    }

    let key = args.value("key");
    let (src, dst) = ctx.state.db_pair(ctx.db_index, target)?;

    if dst.contains(key) {
        return Ok(Frame::Integer(0));
    }

    match src.remove(key) {
        Some(value) => {
            dst.insert(key.to_string(), value);
            Ok(Frame::Integer(1))
        }
        None => Ok(Frame::Integer(0)),
    }
}

/// Copies the value stored at the source key to the destination key, possibly in another
/// database. The expiry is copied along.
///
/// Ref: <https://redis.io/docs/latest/commands/copy/>
fn copy(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let source = args.value("source");
    let destination = args.value("destination");
    let replace = args.has("REPLACE");
    let target = match args.option_value("DB") {
        Some(db) => parse_db(db)?,
        None => ctx.db_index,
    };

    if target == ctx.db_index {
        if source == destination {
            return Err(same_object().into());
        }
        let db = ctx.db()?;
        let Some(value) = db.get(source).cloned() else {
            return Ok(Frame::Integer(0));
        };
        if db.contains(destination) && !replace {
            return Ok(Frame::Integer(0));
        }
        db.insert(destination.to_string(), value);
        return Ok(Frame::Integer(1));
    }

    let (src, dst) = ctx.state.db_pair(ctx.db_index, target)?;
    let Some(value) = src.get(source).cloned() else {
        return Ok(Frame::Integer(0));
    };
    if dst.contains(destination) && !replace {
        return Ok(Frame::Integer(0));
    }
    dst.insert(destination.to_string(), value);

    Ok(Frame::Integer(1))
}

fn randomkey(ctx: &mut Context, _args: &Args) -> crate::Result<Frame> {
    let key = ctx
        .db()?
        .keys()
        .into_iter()
        .choose(&mut rand::thread_rng());

    Ok(Frame::optional_bulk(key))
}

/// Serves RENAME and RENAMENX. The value keeps its expiry.
fn rename(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let nx = ctx.command == "RENAMENX";
    let key = args.value("key");
    let newkey = args.value("newkey");
    let db = ctx.db()?;

    if !db.contains(key) {
        return Err(CommandError::NoSuchKey.into());
    }

    if nx && db.contains(newkey) {
        return Ok(Frame::Integer(0));
    }

    if let Some(value) = db.remove(key) {
        db.insert(newkey.to_string(), value);
    }

    Ok(if nx { Frame::Integer(1) } else { Frame::ok() })
}

/// Returns the string representation of the type of the value stored at key.
///
/// Ref: <https://redis.io/docs/latest/commands/type/>
fn type_command(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let name = match ctx.db()?.get(args.value("key")) {
        Some(value) => value.value_type().to_string(),
        None => "none".to_string(),
    };

    Ok(Frame::Simple(name))
}

#[cfg(test)]
mod tests {
    use crate::commands::test_utils::*;
    use crate::frame::Frame;

    #[test]
    fn expire_and_ttl() {
        let d = dispatcher();

        assert_eq!(run(&d, "EXPIRE k 100"), Frame::Integer(0));
        run(&d, "SET k v");
        assert_eq!(run(&d, "TTL k"), Frame::Integer(-1));
        assert_eq!(run(&d, "EXPIRE k 100"), Frame::Integer(1));
        assert!(matches!(run(&d, "TTL k"), Frame::Integer(t) if t > 0 && t <= 100));
        assert!(matches!(run(&d, "PTTL k"), Frame::Integer(t) if t > 0 && t <= 100_000));
        assert_eq!(run(&d, "TTL missing"), Frame::Integer(-2));
    }

    #[test]
    fn expire_conditions() {
        let d = dispatcher();
        run(&d, "SET k v");

        assert_eq!(run(&d, "EXPIRE k 100 XX"), Frame::Integer(0));
        assert_eq!(run(&d, "EXPIRE k 100 NX"), Frame::Integer(1));
        assert_eq!(run(&d, "EXPIRE k 200 NX"), Frame::Integer(0));
        assert_eq!(run(&d, "EXPIRE k 50 GT"), Frame::Integer(0));
        assert_eq!(run(&d, "EXPIRE k 300 GT"), Frame::Integer(1));
        assert_eq!(run(&d, "EXPIRE k 400 LT"), Frame::Integer(0));
        assert_eq!(run(&d, "EXPIRE k 10 LT"), Frame::Integer(1));
        assert!(is_error(&run(&d, "EXPIRE k 10 NX XX")));
    }

    #[test]
    fn expire_in_the_past_deletes() {
        let d = dispatcher();
        run(&d, "SET k v");

        assert_eq!(run(&d, "EXPIRE k -1"), Frame::Integer(1));
        assert_eq!(run(&d, "EXISTS k"), Frame::Integer(0));

        run(&d, "SET k v");
        assert_eq!(run(&d, "PEXPIREAT k 1000"), Frame::Integer(1));
        assert_eq!(run(&d, "GET k"), Frame::Null);
    }

    #[test]
    fn expiretime_and_persist() {
        let d = dispatcher();
        run(&d, "SET k v");

        assert_eq!(run(&d, "EXPIRETIME k"), Frame::Integer(-1));
        assert_eq!(run(&d, "PERSIST k"), Frame::Integer(0));
        assert_eq!(run(&d, "EXPIREAT k 33177117420"), Frame::Integer(1));
        assert_eq!(run(&d, "EXPIRETIME k"), Frame::Integer(33177117420));
        assert_eq!(run(&d, "PEXPIRETIME k"), Frame::Integer(33177117420000));
        assert_eq!(run(&d, "PERSIST k"), Frame::Integer(1));
        assert_eq!(run(&d, "TTL k"), Frame::Integer(-1));
        assert_eq!(run(&d, "EXPIRETIME nokey"), Frame::Integer(-2));
    }

    #[test]
    fn del_exists_touch() {
        let d = dispatcher();
        run(&d, "MSET a 1 b 2");

        assert_eq!(run(&d, "EXISTS a a b c"), Frame::Integer(3));
        assert_eq!(run(&d, "TOUCH a c"), Frame::Integer(1));
        assert_eq!(run(&d, "DEL a c"), Frame::Integer(1));
        assert_eq!(run(&d, "UNLINK b"), Frame::Integer(1));
        assert_eq!(run(&d, "DBSIZE"), Frame::Integer(0));
    }

    #[test]
    fn keys_with_pattern() {
        let d = dispatcher();
        run(&d, "MSET firstname Jack lastname Stuntman age 35");

        assert_eq!(
            run(&d, "KEYS *name*"),
            bulks(&["firstname", "lastname"])
        );
        assert_eq!(run(&d, "KEYS a??"), bulks(&["age"]));
        assert_eq!(run(&d, "KEYS *"), bulks(&["age", "firstname", "lastname"]));
    }

    #[test]
    fn rename() {
        let d = dispatcher();

        assert_eq!(
            run(&d, "RENAME a b"),
            Frame::Error("ERR no such key".to_string())
        );
        run(&d, "SET a 1");
        run(&d, "SET c 3");
        assert_eq!(run(&d, "RENAME a b"), ok());
        assert_eq!(run(&d, "GET b"), bulk("1"));
        assert_eq!(run(&d, "RENAMENX b c"), Frame::Integer(0));
        assert_eq!(run(&d, "RENAMENX b d"), Frame::Integer(1));
        assert_eq!(run(&d, "EXISTS b"), Frame::Integer(0));
    }

    #[test]
    fn move_and_copy_across_databases() {
        let d = dispatcher();
        run(&d, "SET k v");

        assert_eq!(run(&d, "MOVE k 1"), Frame::Integer(1));
        assert_eq!(run(&d, "EXISTS k"), Frame::Integer(0));
        assert!(is_error(&run(&d, "MOVE k 0")));
        assert!(is_error(&run(&d, "MOVE k 16")));

        run(&d, "SELECT 1");
        assert_eq!(run(&d, "GET k"), bulk("v"));
        assert_eq!(run(&d, "COPY k k2"), Frame::Integer(1));
        assert_eq!(run(&d, "COPY k k2"), Frame::Integer(0));
        assert_eq!(run(&d, "COPY k k2 REPLACE"), Frame::Integer(1));
        assert_eq!(run(&d, "COPY k k DB 0"), Frame::Integer(1));

        run(&d, "SELECT 0");
        assert_eq!(run(&d, "GET k"), bulk("v"));
    }

    #[test]
    fn type_and_randomkey() {
        let d = dispatcher();

        assert_eq!(run(&d, "RANDOMKEY"), Frame::Null);
        assert_eq!(run(&d, "TYPE k"), Frame::Simple("none".to_string()));

        run(&d, "SET s v");
        run(&d, "RPUSH l a");
        run(&d, "HSET h f v");
        run(&d, "SADD set a");
        run(&d, "ZADD z 1 a");

        assert_eq!(run(&d, "TYPE s"), Frame::Simple("string".to_string()));
        assert_eq!(run(&d, "TYPE l"), Frame::Simple("list".to_string()));
        assert_eq!(run(&d, "TYPE h"), Frame::Simple("hash".to_string()));
        assert_eq!(run(&d, "TYPE set"), Frame::Simple("set".to_string()));
        assert_eq!(run(&d, "TYPE z"), Frame::Simple("zset".to_string()));
        assert!(matches!(run(&d, "RANDOMKEY"), Frame::Bulk(_)));
    }
}
