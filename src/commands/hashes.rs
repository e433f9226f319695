//! Hash commands.

use crate::commands::{parse_float, parse_int, random_sample, CommandError, Registry};
use crate::dispatcher::Context;
use crate::frame::Frame;
use crate::grammar::{Args, Part};
use crate::value::Hash;
use crate::zset::format_score;

pub fn register(registry: &mut Registry) {
    let key = || Part::value("key");
    let field = || Part::value("field");

    registry.add("HDEL", vec![key(), Part::list(1)], hdel);
    registry.add("HEXISTS", vec![key(), field()], hexists);
    registry.add("HGET", vec![key(), field()], hget);
    registry.add("HGETALL", vec![key()], hgetall);
    registry.add(
        "HINCRBY",
        vec![key(), field(), Part::value("increment")],
        hincrby,
    );
    registry.add(
        "HINCRBYFLOAT",
        vec![key(), field(), Part::value("increment")],
        hincrbyfloat,
    );
    registry.add("HKEYS", vec![key()], hkeys);
    registry.add("HLEN", vec![key()], hlen);
    registry.add("HMGET", vec![key(), Part::list(1)], hmget);
    registry.add("HMSET", vec![key(), Part::list(2)], hset);
    registry.add(
        "HRANDFIELD",
        vec![key(), Part::anonymous_with_terms("count", &["WITHVALUES"])],
        hrandfield,
    );
    registry.add("HSET", vec![key(), Part::list(2)], hset);
    registry.add(
        "HSETNX",
        vec![key(), field(), Part::value("value")],
        hsetnx,
    );
    registry.add("HSTRLEN", vec![key(), field()], hstrlen);
    registry.add("HVALS", vec![key()], hvals);
}

/// Serves both `HSET`, which replies with the number of new fields, and the older `HMSET`, which
/// replies OK.
fn hset(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let added = ctx.db()?.modify(args.value("key"), |hash: &mut Hash| {
        Ok(args
            .list()
            .chunks(2)
            .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
            .count())
    })?;

    if ctx.command == "HMSET" {
        return Ok(Frame::ok());
    }
    Ok(Frame::Integer(added as i64))
}

fn hsetnx(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let field = args.value("field");

    let set = ctx.db()?.modify(args.value("key"), |hash: &mut Hash| {
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), args.value("value").to_string());
        Ok(true)
    })?;

    Ok(Frame::Integer(set as i64))
}

fn hget(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let value = ctx
        .db()?
        .read::<Hash>(args.value("key"))?
        .and_then(|hash| hash.get(args.value("field")))
        .cloned();

    Ok(Frame::optional_bulk(value))
}

fn hmget(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let hash = ctx.db()?.read::<Hash>(args.value("key"))?;

    let values: Vec<Frame> = args
        .list()
        .iter()
        .map(|field| Frame::optional_bulk(hash.and_then(|h| h.get(field)).cloned()))
        .collect();

    Ok(Frame::Array(values))
}

fn hdel(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let removed = ctx
        .db()?
        .modify_existing(args.value("key"), |hash: &mut Hash| {
            Ok(args
                .list()
                .iter()
                .filter(|field| hash.remove(field.as_str()).is_some())
                .count())
        })?
        .unwrap_or(0);

    Ok(Frame::Integer(removed as i64))
}

fn hexists(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let exists = ctx
        .db()?
        .read::<Hash>(args.value("key"))?
        .is_some_and(|hash| hash.contains_key(args.value("field")));

    Ok(Frame::Integer(exists as i64))
}

fn hlen(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let len = ctx
        .db()?
        .read::<Hash>(args.value("key"))?
        .map_or(0, |hash| hash.len());

    Ok(Frame::Integer(len as i64))
}

fn hstrlen(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let len = ctx
        .db()?
        .read::<Hash>(args.value("key"))?
        .and_then(|hash| hash.get(args.value("field")))
        .map_or(0, |value| value.len());

    Ok(Frame::Integer(len as i64))
}

fn hgetall(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let frames: Vec<Frame> = ctx
        .db()?
        .read::<Hash>(args.value("key"))?
        .map(|hash| {
            hash.iter()
                .flat_map(|(field, value)| [Frame::bulk(field.clone()), Frame::bulk(value.clone())])
                .collect()
        })
        .unwrap_or_default();

    Ok(Frame::Array(frames))
}

fn hkeys(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let keys: Vec<String> = ctx
        .db()?
        .read::<Hash>(args.value("key"))?
        .map(|hash| hash.keys().cloned().collect())
        .unwrap_or_default();

    Ok(Frame::bulk_array(keys))
}

fn hvals(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let values: Vec<String> = ctx
        .db()?
        .read::<Hash>(args.value("key"))?
        .map(|hash| hash.values().cloned().collect())
        .unwrap_or_default();

    Ok(Frame::bulk_array(values))
}

fn hincrby(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let delta: i64 = parse_int(args.value("increment"))?;
    let field = args.value("field");

    let next = ctx.db()?.modify(args.value("key"), |hash: &mut Hash| {
        let current: i64 = match hash.get(field) {
            Some(value) => value.parse().map_err(|_| {
                CommandError::Custom("ERR hash value is not an integer".to_string())
            })?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(CommandError::Overflow)?;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    })?;

    Ok(Frame::Integer(next))
}

fn hincrbyfloat(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let delta = parse_float(args.value("increment"))?;
    let field = args.value("field");

    let next = ctx.db()?.modify(args.value("key"), |hash: &mut Hash| {
        let current = match hash.get(field) {
            Some(value) => parse_float(value).map_err(|_| {
                CommandError::Custom("ERR hash value is not a float".to_string())
            })?,
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
        hash.insert(field.to_string(), formatted.clone());
        Ok(formatted)
    })?;

    Ok(Frame::bulk(next))
}

/// Returns random fields of a hash.
///
/// Without a count a single field (or nil) is returned. A positive count returns up to that many
/// distinct fields, a negative one exactly that many fields which may repeat. `WITHVALUES`
/// interleaves each field with its value.
///
/// Ref: <https://redis.io/docs/latest/commands/hrandfield/>
fn hrandfield(ctx: &mut Context, args: &Args) -> crate::Result<Frame> {
    let count = args.anonymous().map(parse_int::<i64>).transpose()?;
    let with_values = args.has_anonymous_term("WITHVALUES");

    let entries: Vec<(String, String)> = ctx
        .db()?
        .read::<Hash>(args.value("key"))?
        .map(|hash| hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
        .unwrap_or_default();

    let Some(count) = count else {
        let picked = random_sample(&entries, 1)?.pop().map(|(field, _)| field);
        return Ok(Frame::optional_bulk(picked));
    };

    let frames = random_sample(&entries, count)?
        .into_iter()
        .flat_map(|(field, value)| {
            let mut frames = vec![Frame::bulk(field)];
            if with_values {
                frames.push(Frame::bulk(value));
            }
            frames
        })
        .collect();

    Ok(Frame::Array(frames))
}

#[cfg(test)]
mod tests {
    use crate::commands::test_utils::*;
    use crate::frame::Frame;

    #[test]
    fn set_get_delete() {
        let d = dispatcher();

        assert_eq!(run(&d, "HSET h a 1 b 2"), Frame::Integer(2));
        assert_eq!(run(&d, "HSET h a 3 c 4"), Frame::Integer(1));
        assert_eq!(run(&d, "HGET h a"), bulk("3"));
        assert_eq!(run(&d, "HGET h nope"), Frame::Null);
        assert_eq!(run(&d, "HGET nohash a"), Frame::Null);
        assert_eq!(run(&d, "HLEN h"), Frame::Integer(3));
        assert_eq!(
            run(&d, "HMGET h a nope c"),
            Frame::Array(vec![bulk("3"), Frame::Null, bulk("4")])
        );

        assert_eq!(run(&d, "HDEL h a b nope"), Frame::Integer(2));
        assert_eq!(run(&d, "HDEL h c"), Frame::Integer(1));
        assert_eq!(run(&d, "EXISTS h"), Frame::Integer(0));
        assert!(is_error(&run(&d, "HSET h a")));
    }

    #[test]
    fn hmset_and_setnx() {
        let d = dispatcher();

        assert_eq!(run(&d, "HMSET h a 1"), ok());
        assert_eq!(run(&d, "HSETNX h a 2"), Frame::Integer(0));
        assert_eq!(run(&d, "HSETNX h b 2"), Frame::Integer(1));
        assert_eq!(run(&d, "HEXISTS h b"), Frame::Integer(1));
        assert_eq!(run(&d, "HEXISTS h z"), Frame::Integer(0));
        assert_eq!(run(&d, "HSTRLEN h a"), Frame::Integer(1));
    }

    #[test]
    fn listing() {
        let d = dispatcher();
        run(&d, "HSET h a 1 b 2");

        assert_eq!(sorted(run(&d, "HKEYS h")), bulks(&["a", "b"]));
        assert_eq!(sorted(run(&d, "HVALS h")), bulks(&["1", "2"]));
        assert_eq!(sorted(run(&d, "HGETALL h")), bulks(&["1", "2", "a", "b"]));
        assert_eq!(run(&d, "HGETALL nohash"), Frame::Array(vec![]));
    }

    #[test]
    fn counters() {
        let d = dispatcher();

        assert_eq!(run(&d, "HINCRBY h n 5"), Frame::Integer(5));
        assert_eq!(run(&d, "HINCRBY h n -7"), Frame::Integer(-2));
        assert_eq!(run(&d, "HINCRBYFLOAT h f 10.5"), bulk("10.5"));
        assert_eq!(run(&d, "HINCRBYFLOAT h f 0.1"), bulk("10.6"));

        run(&d, "HSET h s text");
        assert_eq!(
            run(&d, "HINCRBY h s 1"),
            Frame::Error("ERR hash value is not an integer".to_string())
        );
        assert_eq!(
            run(&d, "HINCRBYFLOAT h s 1"),
            Frame::Error("ERR hash value is not a float".to_string())
        );
        assert!(is_error(&run(&d, "HINCRBY h n x")));

        run(&d, "HSET h big 9223372036854775807");
        assert!(is_error(&run(&d, "HINCRBY h big 1")));
    }

    #[test]
    fn random_fields() {
        let d = dispatcher();
        run(&d, "HSET h a 1 b 2 c 3");

        assert!(matches!(run(&d, "HRANDFIELD h"), Frame::Bulk(_)));
        assert_eq!(run(&d, "HRANDFIELD nohash"), Frame::Null);
        assert_eq!(run(&d, "HRANDFIELD nohash 3"), Frame::Array(vec![]));
        assert_eq!(sorted(run(&d, "HRANDFIELD h 10")), bulks(&["a", "b", "c"]));

        match run(&d, "HRANDFIELD h -5 WITHVALUES") {
            Frame::Array(items) => assert_eq!(items.len(), 10),
            other => panic!("unexpected reply {:?}", other),
        }
        match run(&d, "HRANDFIELD h 2") {
            Frame::Array(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn random_counts_are_bounded() {
        let d = dispatcher();
        run(&d, "HSET h a 1 b 2");

        assert_eq!(
            sorted(run(&d, "HRANDFIELD h 9223372036854775807")),
            bulks(&["a", "b"])
        );
        assert_eq!(
            run(&d, "HRANDFIELD h -9223372036854775807 WITHVALUES"),
            Frame::Error("ERR value is out of range".to_string())
        );
        assert_eq!(
            run(&d, "HRANDFIELD nohash -9223372036854775807"),
            Frame::Error("ERR value is out of range".to_string())
        );
    }
}
